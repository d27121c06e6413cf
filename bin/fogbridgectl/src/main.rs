//! ---
//! fb_section: "05-external-interfaces"
//! fb_subsection: "binary"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Operator CLI for inspecting the fogbridge cloud protocol."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use fogbridge_common::config::BridgeConfig;
use fogbridge_common::init_tracing;
use fogbridge_logging::{self as logging, fb_warn, LogPriority};

mod encode;
mod keys;
mod replay;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "fogbridge device-to-cloud protocol utility",
    long_about = None
)]
struct Cli {
    /// Bridge configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log priority: error, warn, info or debug.
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Print the binding keys and queue of a device")]
    Keys(keys::KeysArgs),
    #[command(subcommand, about = "Encode an outbound operation and print its envelope")]
    Encode(encode::EncodeCommand),
    #[command(about = "Replay inbound deliveries from an NDJSON file through a session")]
    Replay(replay::ReplayArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Default)]
pub struct Settings {
    pub config: Option<BridgeConfig>,
}

impl Settings {
    /// Explicit device id, else the configured one.
    pub fn device_id(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::to_owned)
            .or_else(|| self.config.as_ref().map(|c| c.device.id.clone()))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("no device id: pass --device or --config"))
    }

    /// User token from the configuration, if any.
    pub fn user_token(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|c| c.broker.user_token.as_deref())
    }
}

fn init(cli: &Cli) -> Result<Settings> {
    let Some(path) = &cli.config else {
        logging::init_with_priority(LogPriority::Warn).context("failed to install logging")?;
        if let Some(level) = &cli.log_level {
            if !logging::set_log_priority(level) {
                fb_warn!("ignoring unknown log level `{}`", level);
            }
        }
        return Ok(Settings::default());
    };

    let mut config = BridgeConfig::load(&[path])
        .with_context(|| format!("failed to load {}", path.display()))?;
    if let Some(level) = &cli.log_level {
        config.logging.priority = level
            .parse()
            .map_err(|err: String| anyhow!(err))
            .context("invalid --log-level")?;
    }
    init_tracing("fogbridgectl", &config.logging)?;
    Ok(Settings {
        config: Some(config),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = init(&cli)?;
    match cli.command {
        Commands::Keys(args) => keys::run(&settings, args)?,
        Commands::Encode(cmd) => encode::run(&settings, cmd)?,
        Commands::Replay(args) => replay::run(&settings, args)?,
    }
    Ok(())
}
