//! Session lifecycle controller
//!
//! `SessionController` owns at most one relay session. Starting a session
//! spawns one background task that runs the relay in a retry loop; the
//! controller itself stays on the observer's task and is only ever touched
//! there.
//!
//! The two tasks share exactly two things:
//! - a oneshot stop signal, sent by [`SessionController::request_stop`]
//! - the `auto_restart` flag, an atomic read fresh after every failure
//!
//! Everything else travels back over the event channel. The retry loop's
//! last message is a session-ended envelope carrying the "Stopped" event;
//! when the observer drains it the controller drops its session handle and
//! returns to [`ControllerState::Idle`]. The loop runs under a supervisor
//! task that posts the same envelope if the loop dies from a panic.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, Role, SessionConfig};
use crate::error::{AppError, Result};
use crate::events::{self, ChannelSink, Envelope, EventReceiver, EventSink, LogEvent};
use crate::relay::{RelayFactory, RelaySession};
use crate::settings::AppSettings;
use crate::status::{self, Controls};

/// Posted before every relay attempt
pub const MSG_CONNECTING: &str = "Connecting...";

/// Always the last event of a session
pub const MSG_STOPPED: &str = "Stopped";

/// Number of ticks in the default retry delay
pub const DEFAULT_RETRY_TICKS: u32 = 5;

/// Length of one retry tick
pub const DEFAULT_RETRY_TICK: Duration = Duration::from_secs(1);

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Running,
}

/// Delay between a failed attempt and the next one
///
/// The delay is split into ticks; a stop request ends the wait at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub ticks: u32,
    pub tick: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ticks: DEFAULT_RETRY_TICKS,
            tick: DEFAULT_RETRY_TICK,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        self.tick * self.ticks
    }

    /// Text posted before waiting, e.g. "Retrying in 5s"
    pub fn announcement(&self) -> String {
        format!("Retrying in {:?}", self.delay())
    }
}

/// The session currently owned by the controller
struct ActiveSession {
    id: u64,
    session: Arc<dyn RelaySession>,
    stop_tx: Option<oneshot::Sender<()>>,
    /// Supervisor task; finishes after the retry loop
    task: JoinHandle<()>,
    retry_abort: AbortHandle,
}

/// Starts, stops and supervises one relay session at a time
pub struct SessionController {
    factory: Arc<dyn RelayFactory>,
    policy: RetryPolicy,
    role: Role,
    auto_restart: Arc<AtomicBool>,
    sink: ChannelSink,
    events: EventReceiver,
    /// Events already pulled off the channel while re-synchronizing
    backlog: VecDeque<LogEvent>,
    active: Option<ActiveSession>,
    next_session_id: u64,
}

impl SessionController {
    pub fn new(factory: Arc<dyn RelayFactory>, role: Role, auto_restart: bool) -> Self {
        let (sink, events) = events::channel();
        Self {
            factory,
            policy: RetryPolicy::default(),
            role,
            auto_restart: Arc::new(AtomicBool::new(auto_restart)),
            sink,
            events,
            backlog: VecDeque::new(),
            active: None,
            next_session_id: 0,
        }
    }

    /// Create a controller from persisted settings
    pub fn from_settings(factory: Arc<dyn RelayFactory>, settings: &AppSettings) -> Self {
        Self::new(factory, settings.role, settings.auto_restart)
    }

    /// Builder method for the retry delay
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> ControllerState {
        if self.active.is_some() {
            ControllerState::Running
        } else {
            ControllerState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn controls(&self) -> Controls {
        Controls::for_state(self.state())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Select the relay role; only allowed while idle
    pub fn set_role(&mut self, role: Role) -> Result<()> {
        if self.is_running() {
            return Err(AppError::InvalidState(
                "role cannot change while a session is running".to_string(),
            ));
        }
        self.role = role;
        Ok(())
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart.load(Ordering::SeqCst)
    }

    /// Toggle automatic restart; a running session sees it after its next failure
    pub fn set_auto_restart(&self, enabled: bool) {
        self.auto_restart.store(enabled, Ordering::SeqCst);
    }

    /// Sink for observer-side messages, ordered with session events
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::new(self.sink.clone())
    }

    /// Load the relay configuration from `path` and start a session with it
    pub fn request_start_from(&mut self, path: &Path) -> Result<()> {
        self.sync_pending();
        if self.is_running() {
            return Err(AppError::AlreadyRunning);
        }
        let relay = match RelayConfig::load(path) {
            Ok(relay) => relay,
            Err(e) => {
                self.sink.error(&e.to_string());
                return Err(e);
            }
        };
        self.start_session(SessionConfig::new(self.role, relay).with_path(path))
    }

    /// Start a session for the current role
    ///
    /// Fails with [`AppError::AlreadyRunning`] if a session is active; in
    /// that case nothing is posted and the running session is untouched.
    pub fn request_start(&mut self, relay: &RelayConfig) -> Result<()> {
        self.start_session(SessionConfig::new(self.role, relay.clone()))
    }

    /// Start a session from a prepared snapshot; its role becomes the selected role
    pub fn request_start_with(&mut self, config: SessionConfig) -> Result<()> {
        self.start_session(config)
    }

    fn start_session(&mut self, config: SessionConfig) -> Result<()> {
        self.sync_pending();
        if self.is_running() {
            return Err(AppError::AlreadyRunning);
        }
        self.role = config.role;

        if let Err(e) = config.relay.validate(config.role) {
            self.sink.error(&e.to_string());
            return Err(e);
        }

        let session = match self.factory.create(&config, self.sink()) {
            Ok(session) => session,
            Err(e) => {
                let err = AppError::Construction(e.to_string());
                self.sink.error(&err.to_string());
                return Err(err);
            }
        };

        for line in status::describe(config.role, &config.relay) {
            self.sink.info(&line);
        }

        self.next_session_id += 1;
        let id = self.next_session_id;
        let (stop_tx, stop_rx) = oneshot::channel();

        let retry = RetryLoop {
            session_id: id,
            session: session.clone(),
            stop_rx,
            auto_restart: self.auto_restart.clone(),
            policy: self.policy,
            sink: self.sink.clone(),
        };
        let retry_task = tokio::spawn(retry.run());
        let retry_abort = retry_task.abort_handle();
        let task = tokio::spawn(supervise(id, retry_task, self.sink.clone()));

        info!("Started {} session {}", config.role, id);
        self.active = Some(ActiveSession {
            id,
            session,
            stop_tx: Some(stop_tx),
            task,
            retry_abort,
        });
        Ok(())
    }

    /// Stop the running session and wait for its task to finish
    ///
    /// Signals the retry loop, closes the relay so a blocked attempt
    /// returns at once, then waits for the loop to post "Stopped". The
    /// controller is idle when this returns. Does nothing while idle.
    pub async fn request_stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        if let Some(stop_tx) = active.stop_tx.take() {
            // The loop may already be gone; then there is nobody to tell.
            let _ = stop_tx.send(());
        }
        active.session.close().await;

        match active.task.await {
            Ok(()) => info!("Session {} stopped", active.id),
            Err(e) => {
                warn!("Session {} task failed: {}", active.id, e);
                self.sink.error(&format!("Session ended unexpectedly: {e}"));
                self.sink.info(MSG_STOPPED);
            }
        }
    }

    /// Wait for the next event, applying any session handback it carries
    pub async fn next_event(&mut self) -> Option<LogEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        let envelope = self.events.recv_envelope().await?;
        Some(self.accept(envelope))
    }

    /// Take every event that is already queued
    pub fn drain_events(&mut self) -> Vec<LogEvent> {
        self.sync_pending();
        self.backlog.drain(..).collect()
    }

    /// Pull queued envelopes into the backlog so state reflects finished sessions
    fn sync_pending(&mut self) {
        while let Some(envelope) = self.events.try_recv_envelope() {
            let event = self.accept(envelope);
            self.backlog.push_back(event);
        }
    }

    fn accept(&mut self, envelope: Envelope) -> LogEvent {
        match envelope {
            Envelope::Event(event) => event,
            Envelope::SessionEnded { session_id, event } => {
                self.finalize(session_id);
                event
            }
        }
    }

    fn finalize(&mut self, session_id: u64) {
        // A session already reclaimed by request_stop leaves a stale id here.
        if self.active.as_ref().map(|a| a.id) == Some(session_id) {
            self.active = None;
            info!("Session {} finished", session_id);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Some(stop_tx) = active.stop_tx.take() {
                let _ = stop_tx.send(());
            }
            active.retry_abort.abort();
            active.task.abort();
            debug!("Aborted session {} on controller drop", active.id);
        }
    }
}

/// Wait for the retry loop and hand the session back if it died
async fn supervise(session_id: u64, retry_task: JoinHandle<()>, sink: ChannelSink) {
    match retry_task.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("Session {} retry loop aborted", session_id),
        Err(e) => {
            warn!("Session {} retry loop failed: {}", session_id, e);
            sink.error(&format!("Session ended unexpectedly: {e}"));
            sink.post_session_ended(session_id, LogEvent::info(MSG_STOPPED));
        }
    }
}

/// Body of the background session task
struct RetryLoop {
    session_id: u64,
    session: Arc<dyn RelaySession>,
    stop_rx: oneshot::Receiver<()>,
    auto_restart: Arc<AtomicBool>,
    policy: RetryPolicy,
    sink: ChannelSink,
}

impl RetryLoop {
    async fn run(mut self) {
        let mut attempt: u64 = 0;

        while !self.stop_requested() {
            attempt += 1;
            debug!("Session {} attempt {}", self.session_id, attempt);
            self.sink.info(MSG_CONNECTING);

            let result = self.session.start().await;
            if self.stop_requested() {
                break;
            }

            match result {
                Ok(()) => {
                    debug!("Session {} relay ended cleanly, reconnecting", self.session_id);
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    self.sink.error(&format!("Connection failed: {e}"));
                    if !self.auto_restart.load(Ordering::SeqCst) {
                        break;
                    }
                    self.sink.info(&self.policy.announcement());
                    if !self.wait_retry_delay().await {
                        break;
                    }
                }
            }
        }

        debug!("Session {} retry loop done after {} attempts", self.session_id, attempt);
        self.sink
            .post_session_ended(self.session_id, LogEvent::info(MSG_STOPPED));
    }

    /// A dropped sender counts as a stop request
    fn stop_requested(&mut self) -> bool {
        !matches!(self.stop_rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Returns false if a stop arrived during the delay
    async fn wait_retry_delay(&mut self) -> bool {
        for _ in 0..self.policy.ticks {
            tokio::select! {
                _ = &mut self.stop_rx => return false,
                _ = tokio::time::sleep(self.policy.tick) => {}
            }
        }
        true
    }
}
