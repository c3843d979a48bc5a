//! Relay backed by an external relay executable
//!
//! Each `start` launches the relay binary for the selected role and waits
//! for it to exit. The child's stdout and stderr are forwarded line by
//! line into the event sink, so relay output shows up in the same ordered
//! log as the controller's own events.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::events::{EventSink, LogEvent, Severity};
use crate::relay::{RelayError, RelayFactory, RelaySession};

/// Arguments passed to the relay binary unless overridden
pub const DEFAULT_RELAY_ARGS: &[&str] = &["{role}", "--config", "{config}"];

const ROLE_PLACEHOLDER: &str = "{role}";
const CONFIG_PLACEHOLDER: &str = "{config}";

/// How long to wait for output readers after the child is gone
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Creates [`ProcessRelay`] sessions for a relay executable
#[derive(Debug, Clone)]
pub struct ProcessRelayFactory {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessRelayFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: DEFAULT_RELAY_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builder method for the argument template
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Substitute `{role}` and `{config}` in the argument template
    pub fn expand_args(&self, config: &SessionConfig) -> Result<Vec<String>, RelayError> {
        let role = config.role.to_string();
        self.args
            .iter()
            .map(|arg| {
                let mut arg = arg.replace(ROLE_PLACEHOLDER, &role);
                if arg.contains(CONFIG_PLACEHOLDER) {
                    let path = config.config_path.as_ref().ok_or_else(|| {
                        RelayError::InvalidConfig(
                            "relay arguments need a configuration file path".to_string(),
                        )
                    })?;
                    arg = arg.replace(CONFIG_PLACEHOLDER, &path.to_string_lossy());
                }
                Ok(arg)
            })
            .collect()
    }
}

impl RelayFactory for ProcessRelayFactory {
    fn create(
        &self,
        config: &SessionConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Arc<dyn RelaySession>, RelayError> {
        let args = self.expand_args(config)?;
        debug!("Relay command: {} {:?}", self.program.display(), args);
        Ok(Arc::new(ProcessRelay::new(self.program.clone(), args, sink)))
    }
}

/// One relay process per attempt
pub struct ProcessRelay {
    program: PathBuf,
    args: Vec<String>,
    sink: Arc<dyn EventSink>,
    closed: watch::Sender<bool>,
}

impl ProcessRelay {
    pub fn new(program: PathBuf, args: Vec<String>, sink: Arc<dyn EventSink>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            program,
            args,
            sink,
            closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl RelaySession for ProcessRelay {
    async fn start(&self) -> Result<(), RelayError> {
        let mut closed_rx = self.closed.subscribe();
        if self.is_closed() {
            return Err(RelayError::Closed);
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::Spawn(format!("{}: {e}", self.program.display())))?;

        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, self.sink.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, self.sink.clone())));
        }

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = wait_closed(&mut closed_rx) => None,
        };

        if status.is_none() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill relay process: {}", e);
            }
        }

        // Relay output must land before the caller reports anything else.
        for mut reader in readers {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
                .await
                .is_err()
            {
                reader.abort();
                // Wait until the aborted reader can no longer post.
                let _ = reader.await;
            }
        }

        match status {
            None => Err(RelayError::Closed),
            Some(Err(e)) => Err(RelayError::Io(e)),
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(RelayError::Exited(status.code())),
        }
    }

    async fn close(&self) {
        if !self.closed.send_replace(true) {
            debug!("Relay process closed");
        }
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    loop {
        let closed = *rx.borrow_and_update();
        if closed {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone means the relay itself is gone.
            return;
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, sink: Arc<dyn EventSink>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(event) = classify_line(&line) {
                    sink.post(event);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading relay output: {}", e);
                break;
            }
        }
    }
}

/// Turn one line of relay output into an event
///
/// Lines tagged like our own events keep their severity; anything else is
/// debug output. Blank lines are dropped.
pub fn classify_line(line: &str) -> Option<LogEvent> {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return None;
    }
    for severity in [
        Severity::Error,
        Severity::Warning,
        Severity::Info,
        Severity::Debug,
    ] {
        if let Some(rest) = line.strip_prefix(severity.tag()) {
            return Some(LogEvent::new(severity, rest.trim_start()));
        }
    }
    Some(LogEvent::debug(line))
}
