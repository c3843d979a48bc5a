//! Status and log events
//!
//! Events flow one way: producers on the session task post them through an
//! [`EventSink`], and the observer drains them from an [`EventReceiver`] on
//! its own task. The channel is unbounded, so posting never blocks and
//! never fails while the receiver is alive; delivery order is post order.
//!
//! Consumers that render events implement [`LogObserver`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Debug,
}

impl Severity {
    /// Prefix tag used when an event is rendered as a line
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Info => "[INFO]",
            Severity::Warning => "[WARNING]",
            Severity::Error => "[ERROR]",
            Severity::Debug => "[DEBUG]",
        }
    }
}

/// A single status/log line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEvent {
    /// Delivery sequence number, assigned by the receiver
    pub seq: u64,
    pub severity: Severity,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            seq: 0,
            severity,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    pub fn debug(text: impl Into<String>) -> Self {
        Self::new(Severity::Debug, text)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity.tag(), self.text)
    }
}

/// Producer side of the event channel
///
/// `post` is fire-and-forget and safe to call from any task.
pub trait EventSink: Send + Sync {
    fn post(&self, event: LogEvent);

    fn info(&self, text: &str) {
        self.post(LogEvent::info(text));
    }

    fn warning(&self, text: &str) {
        self.post(LogEvent::warning(text));
    }

    fn error(&self, text: &str) {
        self.post(LogEvent::error(text));
    }

    fn debug(&self, text: &str) {
        self.post(LogEvent::debug(text));
    }
}

/// What travels over the channel
#[derive(Debug)]
pub(crate) enum Envelope {
    Event(LogEvent),
    /// Final event of a session task, carrying the session it belongs to
    SessionEnded { session_id: u64, event: LogEvent },
}

impl Envelope {
    fn event_mut(&mut self) -> &mut LogEvent {
        match self {
            Envelope::Event(event) => event,
            Envelope::SessionEnded { event, .. } => event,
        }
    }

    fn into_event(self) -> LogEvent {
        match self {
            Envelope::Event(event) => event,
            Envelope::SessionEnded { event, .. } => event,
        }
    }
}

/// Create an ordered, unbounded event channel
pub fn channel() -> (ChannelSink, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, EventReceiver { rx, next_seq: 1 })
}

/// Sending half of [`channel`]
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelSink {
    pub(crate) fn post_session_ended(&self, session_id: u64, event: LogEvent) {
        if self
            .tx
            .send(Envelope::SessionEnded { session_id, event })
            .is_err()
        {
            tracing::trace!("Event receiver dropped, session {} end not delivered", session_id);
        }
    }
}

impl EventSink for ChannelSink {
    fn post(&self, event: LogEvent) {
        if self.tx.send(Envelope::Event(event)).is_err() {
            tracing::trace!("Event receiver dropped, discarding event");
        }
    }
}

/// Receiving half of [`channel`], owned by the observer
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
    next_seq: u64,
}

impl EventReceiver {
    /// Wait for the next event; `None` once every sink is dropped
    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.recv_envelope().await.map(Envelope::into_event)
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.try_recv_envelope().map(Envelope::into_event)
    }

    pub(crate) async fn recv_envelope(&mut self) -> Option<Envelope> {
        let envelope = self.rx.recv().await?;
        Some(self.stamp(envelope))
    }

    pub(crate) fn try_recv_envelope(&mut self) -> Option<Envelope> {
        let envelope = self.rx.try_recv().ok()?;
        Some(self.stamp(envelope))
    }

    fn stamp(&mut self, mut envelope: Envelope) -> Envelope {
        envelope.event_mut().seq = self.next_seq;
        self.next_seq += 1;
        envelope
    }
}

/// Sink that drops everything
#[derive(Default, Clone)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn post(&self, _event: LogEvent) {}
}

/// Consumer side: renders delivered events on the observer's task
pub trait LogObserver {
    fn on_event(&mut self, event: &LogEvent);
}

/// Prints events to stdout, as text lines or JSON
#[derive(Default, Clone)]
pub struct StdoutObserver {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl StdoutObserver {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    pub fn render(&self, event: &LogEvent) -> String {
        if self.json_output {
            serde_json::to_string(event).unwrap_or_default()
        } else {
            format!("[{}] {}", event.timestamp.format("%H:%M:%S%.3f"), event)
        }
    }
}

impl LogObserver for StdoutObserver {
    fn on_event(&mut self, event: &LogEvent) {
        println!("{}", self.render(event));
    }
}

/// In-memory event list, the backing store of a log view
#[derive(Debug, Default, Clone)]
pub struct LogBuffer {
    events: Vec<LogEvent>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn texts(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl LogObserver for LogBuffer {
    fn on_event(&mut self, event: &LogEvent) {
        self.events.push(event.clone());
    }
}
