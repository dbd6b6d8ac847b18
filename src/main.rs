//! MQTT agent - Main Entry Point
//!
//! `config` validates a configuration file. `simulate` runs a scripted
//! session through the real command loop against the in-process loopback
//! engine, which answers every request the way a broker would.

use clap::{Parser, Subcommand};
use mqtt_agent::agent::{command_channel, command_loop, AgentContext, AgentHandle, PendingCommand};
use mqtt_agent::config::AgentConfig;
use mqtt_agent::error::{AgentError, AgentResult};
use mqtt_agent::observability::{init_default_logging, init_logging, LogFormat};
use mqtt_agent::testing::MockEngine;
use mqtt_agent::transport::mqtt::{ConnectArgs, PublishInfo, QoS, SubscribeArgs};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info, warn, Level};

/// Producer block time used by the simulated session
const BLOCK_TIME: Duration = Duration::from_millis(500);

/// Single-writer MQTT agent
#[derive(Parser)]
#[command(name = "mqtt-agent")]
#[command(about = "Queued MQTT commands executed by a single agent task")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Run a scripted session against the loopback engine
    Simulate {
        /// Number of messages to publish
        #[arg(long, default_value_t = 5)]
        messages: u32,

        /// QoS used for the subscription and every publish
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
        qos: u8,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_observability(cli.verbose);

    info!("Starting mqtt-agent v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Config { show } => handle_config_command(cli.config, show),
        Commands::Simulate { messages, qos } => match load_or_default(cli.config) {
            Ok(config) => run_simulation(config, messages, qos).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(e.exit_code());
    }

    info!("Application shutdown complete");
}

fn init_observability(verbose: u8) {
    if verbose == 0 || std::env::var("LOG_LEVEL").is_ok() {
        init_default_logging();
        return;
    }

    let level = if verbose == 1 { Level::DEBUG } else { Level::TRACE };
    let format = LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()));
    init_logging(level, format, false);
}

fn load_configuration(config_path: Option<PathBuf>) -> AgentResult<Option<AgentConfig>> {
    let path = match config_path {
        Some(path) => path,
        None => {
            let Some(path) = ["agent.toml", "config/agent.toml"]
                .into_iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
            else {
                return Ok(None);
            };
            path
        }
    };

    info!("Loading configuration from: {}", path.display());
    Ok(Some(AgentConfig::load_from_file(&path)?))
}

fn load_or_default(config_path: Option<PathBuf>) -> AgentResult<AgentConfig> {
    match load_configuration(config_path)? {
        Some(config) => Ok(config),
        None => {
            info!("No configuration file found, using defaults");
            Ok(AgentConfig::new("mqtt://localhost:1883"))
        }
    }
}

fn handle_config_command(config_path: Option<PathBuf>, show: bool) -> AgentResult<()> {
    let config = load_configuration(config_path)?.ok_or_else(|| {
        AgentError::invalid_input(
            "No configuration file found. Please provide one with -c/--config or create agent.toml",
        )
    })?;

    if show {
        println!("Current configuration:");
        println!("{}", config.to_toml_string()?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn qos_from_level(level: u8) -> AgentResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(AgentError::invalid_input(format!(
            "QoS must be 0, 1 or 2, got {other}"
        ))),
    }
}

/// Await a completion and turn its status into a CLI error
async fn settle(operation: &str, pending: PendingCommand) -> AgentResult<()> {
    let result = pending.await;
    match result.status {
        Ok(()) => {
            info!(
                operation,
                suback_codes = ?result.suback_codes,
                session_present = ?result.session_present,
                "Command completed"
            );
            Ok(())
        }
        Err(e) => {
            warn!(operation, error = %e, "Command failed");
            Err(e.into())
        }
    }
}

async fn run_simulation(config: AgentConfig, messages: u32, qos: u8) -> AgentResult<()> {
    let qos = qos_from_level(qos)?;
    let client_id = config.client_id();
    let topic = format!("mqtt-agent/{client_id}/echo");
    info!(%client_id, messages, ?qos, "Starting simulated session");

    let (sender, receiver) = command_channel(config.agent.command_queue_capacity);
    let mut ctx = AgentContext::from_config(MockEngine::loopback(), receiver, &config)
        .on_incoming_publish(|publish| {
            info!(
                topic = %publish.topic,
                payload = %String::from_utf8_lossy(&publish.payload),
                "Received message"
            );
        });
    let handle = AgentHandle::from_config(sender, &config).with_ack_slots(ctx.ack_slots());

    let agent = tokio::spawn(async move { command_loop::run(&mut ctx).await });

    let connect = ConnectArgs::new(config.connect_info(), config.connect_timeout());
    settle("connect", handle.connect(connect, BLOCK_TIME).await?).await?;

    let subscription = SubscribeArgs::single(topic.clone(), qos);
    settle("subscribe", handle.subscribe(subscription, BLOCK_TIME).await?).await?;

    for sequence in 1..=messages {
        let info = PublishInfo::new(topic.clone(), qos, format!("message {sequence}"));
        settle("publish", handle.publish(info, BLOCK_TIME).await?).await?;
    }

    settle("ping", handle.ping(BLOCK_TIME).await?).await?;
    settle("disconnect", handle.disconnect(BLOCK_TIME).await?).await?;

    match agent.await {
        Ok(status) => status.map_err(AgentError::from),
        Err(e) => Err(AgentError::internal_error(format!(
            "Command loop task failed: {e}"
        ))),
    }
}
