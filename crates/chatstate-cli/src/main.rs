//! # chatstate CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatstate_cli::commands::run_commands;
use chatstate_cli::names::{run_check_name, CheckNameArgs};
use chatstate_cli::replay::{run_replay, ReplayArgs};
use chatstate_machine::MachineConfig;

/// Conversation state machine toolbox.
///
/// Replays recorded bot updates through a demo flow and validates state
/// names.
#[derive(Parser, Debug)]
#[command(name = "chatstate", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Bot username for `/command@username` matching. Defaults to
    /// `CHATSTATE_BOT_USERNAME`.
    #[arg(long, global = true)]
    bot_username: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run newline-delimited JSON updates through the demo flow.
    Replay(ReplayArgs),

    /// Check state names against the naming grammar.
    CheckName(CheckNameArgs),

    /// List the demo flow's bot commands per state.
    Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = match cli.bot_username {
        Some(name) => MachineConfig::with_bot_username(name),
        None => MachineConfig::from_env(),
    };
    tracing::debug!(?config, "chatstate CLI starting");

    let result = match cli.command {
        Commands::Replay(args) => run_replay(&args, config),
        Commands::CheckName(args) => run_check_name(&args),
        Commands::Commands => run_commands(config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
