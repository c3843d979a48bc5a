//! Interactive relay supervision
//!
//! The `run` command is the observer: it owns the controller on the main
//! task, prints every event the relay session produces, and turns stdin
//! commands and Ctrl-C into start/stop requests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relayctl_core::events::{EventSink, LogBuffer, LogObserver, StdoutObserver};
use relayctl_core::{
    caption, status_line, AppError, AppSettings, ProcessRelayFactory, RelayConfig, Role,
    SessionController, SettingsStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::parse_role;

/// Options for `relayctl run`
#[derive(clap::Args, Debug)]
pub struct RunOptions {
    /// Relay role (client or server); remembered for next time
    #[arg(short, long, value_parser = parse_role)]
    role: Option<Role>,

    /// Relay configuration file; remembered for next time
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Restart the relay after a failed connection; remembered for next time
    #[arg(long)]
    auto_restart: Option<bool>,

    /// Relay executable to launch
    #[arg(long, env = "RELAYCTL_RELAY_BIN", default_value = "rproxy")]
    relay_bin: PathBuf,

    /// Relay argument template ({role} and {config} are substituted)
    #[arg(long = "relay-arg", allow_hyphen_values = true)]
    relay_args: Vec<String>,

    /// Wait for a `start` command instead of starting immediately
    #[arg(long)]
    idle: bool,
}

/// A line typed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    Stop,
    AutoRestart(bool),
    SetRole(Role),
    Status,
    Log,
    Quit,
    Unknown(String),
}

/// Parse one stdin line; blank lines are ignored
pub fn parse_command(line: &str) -> Option<UserCommand> {
    let mut words = line.split_whitespace();
    let head = words.next()?.to_ascii_lowercase();
    let arg = words.next().map(|w| w.to_ascii_lowercase());

    let command = match (head.as_str(), arg.as_deref()) {
        ("start", None) => UserCommand::Start,
        ("stop", None) => UserCommand::Stop,
        ("auto", Some("on" | "true" | "1")) => UserCommand::AutoRestart(true),
        ("auto", Some("off" | "false" | "0")) => UserCommand::AutoRestart(false),
        ("role", Some(role)) => match role.parse() {
            Ok(role) => UserCommand::SetRole(role),
            Err(_) => UserCommand::Unknown(line.trim().to_string()),
        },
        ("status", None) => UserCommand::Status,
        ("log", None) => UserCommand::Log,
        ("quit" | "exit", None) => UserCommand::Quit,
        _ => UserCommand::Unknown(line.trim().to_string()),
    };
    Some(command)
}

/// Persist command-line overrides and return the effective settings
fn apply_overrides(store: &SettingsStore, options: &RunOptions) -> Result<AppSettings, AppError> {
    let mut settings = store.load()?;
    if let Some(role) = options.role {
        settings.role = role;
    }
    if let Some(path) = &options.config {
        settings.config_path = Some(path.clone());
    }
    if let Some(enabled) = options.auto_restart {
        settings.auto_restart = enabled;
    }
    store.save(&settings)?;
    Ok(settings)
}

/// Fans each event out to the terminal and the in-memory log
struct Console {
    stdout: StdoutObserver,
    log: LogBuffer,
}

impl LogObserver for Console {
    fn on_event(&mut self, event: &relayctl_core::LogEvent) {
        self.stdout.on_event(event);
        self.log.on_event(event);
    }
}

pub async fn run(
    options: RunOptions,
    settings_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), AppError> {
    let store = match settings_path {
        Some(path) => SettingsStore::open(path)?,
        None => SettingsStore::open_default()?,
    };
    let settings = apply_overrides(&store, &options)?;
    let config_path = settings.config_path.clone().ok_or_else(|| {
        AppError::ConfigValidation("no relay configuration file, pass --config".to_string())
    })?;

    let mut factory = ProcessRelayFactory::new(&options.relay_bin);
    if !options.relay_args.is_empty() {
        factory = factory.with_args(options.relay_args.clone());
    }

    let mut controller = SessionController::from_settings(Arc::new(factory), &settings);
    let mut console = Console {
        stdout: StdoutObserver::new(json_output),
        log: LogBuffer::new(),
    };

    tracing::info!("{}", caption(controller.role()));
    if !options.idle {
        start(&mut controller, &mut console, &config_path);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = controller.next_event() => {
                match event {
                    Some(event) => console.on_event(&event),
                    None => break,
                }
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        let Some(command) = parse_command(&line) else {
                            continue;
                        };
                        match command {
                            UserCommand::Start => start(&mut controller, &mut console, &config_path),
                            UserCommand::Stop => controller.request_stop().await,
                            UserCommand::AutoRestart(enabled) => {
                                controller.set_auto_restart(enabled);
                                store.set_auto_restart(enabled)?;
                                controller
                                    .sink()
                                    .info(&format!("Auto restart {}", if enabled { "on" } else { "off" }));
                            }
                            UserCommand::SetRole(role) => match controller.set_role(role) {
                                Ok(()) => {
                                    store.set_role(role)?;
                                    tracing::info!("{}", caption(role));
                                }
                                Err(e) => eprintln!("{e}"),
                            },
                            UserCommand::Status => print_status(&controller, &config_path),
                            UserCommand::Log => {
                                for event in console.log.events() {
                                    eprintln!("{event}");
                                }
                            }
                            UserCommand::Quit => break,
                            UserCommand::Unknown(text) => {
                                eprintln!("Unknown command '{text}' (start, stop, auto on|off, role client|server, status, log, quit)");
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("stdin closed, waiting for Ctrl-C");
                        stdin_open = false;
                    }
                    Err(e) => {
                        tracing::warn!("Error reading stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }

            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    controller.request_stop().await;
    for event in controller.drain_events() {
        console.on_event(&event);
    }
    Ok(())
}

/// Start a session from the configuration file, reporting refusals
fn start(controller: &mut SessionController, console: &mut Console, config_path: &Path) {
    match controller.request_start_from(config_path) {
        Ok(()) => console.log.clear(),
        Err(AppError::AlreadyRunning) => eprintln!("{}", AppError::AlreadyRunning),
        // Construction and validation failures are already in the event stream.
        Err(e) => tracing::debug!("Start refused: {}", e),
    }
}

fn print_status(controller: &SessionController, config_path: &Path) {
    let controls = controller.controls();
    eprintln!("{}", caption(controller.role()));
    eprintln!(
        "state: {:?}, auto restart: {}, start: {}, stop: {}",
        controller.state(),
        controller.auto_restart(),
        controls.start_enabled,
        controls.stop_enabled,
    );
    match RelayConfig::load(config_path) {
        Ok(config) => eprintln!("{}", status_line(controller.role(), &config)),
        Err(e) => eprintln!("{e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("start"), Some(UserCommand::Start));
        assert_eq!(parse_command("  STOP "), Some(UserCommand::Stop));
        assert_eq!(parse_command("auto off"), Some(UserCommand::AutoRestart(false)));
        assert_eq!(parse_command("auto on"), Some(UserCommand::AutoRestart(true)));
        assert_eq!(parse_command("role server"), Some(UserCommand::SetRole(Role::Server)));
        assert_eq!(parse_command("exit"), Some(UserCommand::Quit));
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_parse_unknown_commands() {
        assert_eq!(
            parse_command("auto maybe"),
            Some(UserCommand::Unknown("auto maybe".to_string()))
        );
        assert_eq!(
            parse_command("role bridge"),
            Some(UserCommand::Unknown("role bridge".to_string()))
        );
        assert_eq!(
            parse_command("start now"),
            Some(UserCommand::Unknown("start now".to_string()))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_during_other_work_is_kept() {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        // First poll installs the handler, as the run loop's first select does
        tokio::select! {
            biased;
            _ = &mut ctrl_c => panic!("no signal sent yet"),
            _ = tokio::task::yield_now() => {}
        }

        // The signal lands while the loop is busy elsewhere
        let status = tokio::process::Command::new("kill")
            .arg("-INT")
            .arg(std::process::id().to_string())
            .status()
            .await
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), &mut ctrl_c)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_apply_overrides_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.db")).unwrap();

        let options = RunOptions {
            role: Some(Role::Server),
            config: Some(PathBuf::from("relay.json")),
            auto_restart: Some(false),
            relay_bin: PathBuf::from("rproxy"),
            relay_args: vec![],
            idle: false,
        };
        let settings = apply_overrides(&store, &options).unwrap();

        assert_eq!(settings.role, Role::Server);
        assert!(!settings.auto_restart);
        assert_eq!(store.load().unwrap(), settings);
    }
}
