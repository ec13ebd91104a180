//! `callflow` command line
//!
//! Loads a configuration, then either prints the routing decision for a
//! destination or runs a whole call against a simulated channel.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use callflow_call_engine::{
    CallFlowConfig, CallFlowEngine, InboundCall, RouteDecision, SimulatedChannel,
};
use callflow_infra_common::logging::{log_welcome, parse_log_level, setup_logging, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "callflow", author, version, about = "Call routing and session-control engine", long_about = None)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML); CALLFLOW__* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the routing decision for a destination without executing it
    Route {
        destination: String,

        /// Dialplan context, the configured default when omitted
        #[arg(long)]
        context: Option<String>,

        /// Caller number, for rules with a caller condition
        #[arg(long)]
        caller: Option<String>,
    },

    /// Run a call against a simulated channel and print its report as JSON
    Simulate {
        destination: String,

        #[arg(long, default_value = "1000")]
        caller: String,

        #[arg(long)]
        context: Option<String>,

        /// DTMF the caller presses, in order
        #[arg(long)]
        digits: Option<String>,

        /// Bridge target that answers (repeatable)
        #[arg(long = "answer")]
        answering: Vec<String>,

        /// Prompt file the switch cannot find (repeatable)
        #[arg(long = "missing-file")]
        missing: Vec<String>,
    },
}

fn init_logging(cli: &Cli, config: &CallFlowConfig) -> Result<()> {
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let mut logging = LoggingConfig::new(parse_log_level(level)?, "callflow");
    if cli.json_logs || config.logging.json {
        logging = logging.with_json();
    }
    if config.logging.file_info {
        logging = logging.with_file_info();
    }
    setup_logging(logging)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CallFlowConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(&cli, &config).context("failed to initialise logging")?;
    log_welcome("callflow", env!("CARGO_PKG_VERSION"));

    let domain = config.general.domain.clone();
    let engine = Arc::new(
        CallFlowEngine::builder()
            .with_config(config)
            .build()
            .context("failed to build call flow engine")?,
    );

    match cli.command {
        Command::Route {
            destination,
            context,
            caller,
        } => {
            let context = context.unwrap_or_else(|| engine.config().general.default_context.clone());
            let decision = engine
                .dialplan()
                .route_call(&context, &destination, caller.as_deref())?;

            let output = match decision {
                RouteDecision::Rule(m) => json!({
                    "context": context,
                    "destination": destination,
                    "route": "rule",
                    "rule": m.rule.name,
                    "index": m.index,
                    "captures": m.captures,
                    "actions": m.rule.actions,
                }),
                RouteDecision::ExternalTrunk { target } => json!({
                    "context": context,
                    "destination": destination,
                    "route": "external-trunk",
                    "target": target,
                }),
                RouteDecision::Reject => json!({
                    "context": context,
                    "destination": destination,
                    "route": "reject",
                }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Simulate {
            destination,
            caller,
            context,
            digits,
            answering,
            missing,
        } => {
            let mut channel = SimulatedChannel::new();
            if let Some(digits) = digits.as_deref() {
                channel = channel.with_digits(digits);
            }
            for target in &answering {
                channel = channel.answering(target);
            }
            for file in &missing {
                channel = channel.missing_file(file);
            }

            let mut call = InboundCall::new(caller, destination, domain);
            if let Some(context) = context {
                call = call.with_context(context);
            }

            let report = engine
                .spawn_call(call, Arc::new(channel))
                .await
                .context("call task panicked")??;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
