//! Configuration and settings commands

use std::path::PathBuf;

use relayctl_core::{
    describe, generate_verify_key, AppError, AppSettings, RelayConfig, Role, SettingsStore,
};

use crate::parse_role;

#[derive(clap::Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default configuration with a freshly generated verify key
    Init {
        path: PathBuf,
        /// Server address a client connects to
        #[arg(long)]
        server_addr: Option<String>,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check that a configuration is complete for a role
    Check {
        path: PathBuf,
        #[arg(short, long, value_parser = parse_role)]
        role: Option<Role>,
    },
    /// Print the status lines a session with this configuration announces
    Show {
        path: PathBuf,
        #[arg(short, long, value_parser = parse_role)]
        role: Option<Role>,
    },
    /// Print a new random verify key
    Key,
}

#[derive(clap::Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the stored settings
    Show,
    /// Change stored settings
    Set {
        #[arg(long)]
        auto_restart: Option<bool>,
        #[arg(short, long, value_parser = parse_role)]
        role: Option<Role>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn open_store(path: Option<PathBuf>) -> Result<SettingsStore, AppError> {
    match path {
        Some(path) => SettingsStore::open(path),
        None => SettingsStore::open_default(),
    }
}

/// Role from the command line, else the stored one
fn resolve_role(role: Option<Role>, settings_path: Option<PathBuf>) -> Result<Role, AppError> {
    match role {
        Some(role) => Ok(role),
        None => Ok(open_store(settings_path)?.load()?.role),
    }
}

pub fn config(
    command: ConfigCommand,
    settings_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), AppError> {
    match command {
        ConfigCommand::Init {
            path,
            server_addr,
            force,
        } => {
            if path.exists() && !force {
                return Err(AppError::Other(format!(
                    "{} already exists, use --force to replace it",
                    path.display()
                )));
            }
            let mut config = RelayConfig::default().with_random_key();
            if let Some(addr) = server_addr {
                config.client.svr_addr = addr;
            }
            config.save(&path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Check { path, role } => {
            let role = resolve_role(role, settings_path)?;
            RelayConfig::load(&path)?.validate(role)?;
            println!("{} is complete for {role}", path.display());
        }
        ConfigCommand::Show { path, role } => {
            let role = resolve_role(role, settings_path)?;
            let config = RelayConfig::load(&path)?;
            let lines = describe(role, &config);
            if json_output {
                println!("{}", serde_json::to_string(&lines)?);
            } else {
                for line in lines {
                    println!("{line}");
                }
            }
        }
        ConfigCommand::Key => println!("{}", generate_verify_key()),
    }
    Ok(())
}

pub fn settings(
    command: SettingsCommand,
    settings_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), AppError> {
    let store = open_store(settings_path)?;
    let settings = match command {
        SettingsCommand::Show => store.load()?,
        SettingsCommand::Set {
            auto_restart,
            role,
            config,
        } => {
            let mut settings = store.load()?;
            if let Some(enabled) = auto_restart {
                settings.auto_restart = enabled;
            }
            if let Some(role) = role {
                settings.role = role;
            }
            if let Some(path) = config {
                settings.config_path = Some(path);
            }
            store.save(&settings)?;
            settings
        }
    };
    print_settings(&settings, json_output)
}

fn print_settings(settings: &AppSettings, json_output: bool) -> Result<(), AppError> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(settings)?);
    } else {
        println!("role:         {}", settings.role);
        println!("auto restart: {}", settings.auto_restart);
        match &settings.config_path {
            Some(path) => println!("config:       {}", path.display()),
            None => println!("config:       (none)"),
        }
    }
    Ok(())
}
