//! # Replay Subcommand
//!
//! Feeds a newline-delimited JSON file of updates through the demo flow
//! (see [`crate::demo`]) and prints every reply and state change.
//!
//! ```bash
//! chatstate replay updates.ndjson
//! chatstate replay updates.ndjson --store postgres --database-url postgres://localhost/bot
//! ```

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use chatstate_core::Update;
use chatstate_machine::{ConversationMachine, MachineConfig, StorageDriver};
use chatstate_store::{MemoryStore, PgStore, PgStoreConfig, StoredState};

use crate::demo::{build_registry, Outbox};

/// Storage backend for a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Forget everything when the command exits.
    Memory,
    /// Persist to Postgres.
    Postgres,
}

/// Arguments for the replay subcommand.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// File with one JSON update per line. Blank lines are skipped.
    pub file: PathBuf,

    /// Where conversation state is kept.
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// Postgres connection string; defaults to `DATABASE_URL`.
    #[arg(long)]
    pub database_url: Option<String>,
}

/// Counters for a finished replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub updates: usize,
    pub transitions: usize,
    pub handler_failures: usize,
}

/// Execute the replay subcommand.
pub fn run_replay(args: &ReplayArgs, config: MachineConfig) -> Result<u8> {
    let file = std::fs::File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let input = BufReader::new(file);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let outbox = Outbox::new();
    let registry = build_registry(config, &outbox)?;

    let (summary, records) = match args.store {
        StoreKind::Memory => {
            let store = MemoryStore::new();
            let machine = ConversationMachine::new(registry, store.clone());
            let summary = replay(&machine, &outbox, input, &mut out)?;
            (summary, store.snapshot())
        }
        StoreKind::Postgres => {
            let config = match &args.database_url {
                Some(url) => PgStoreConfig::new(url.clone()),
                None => PgStoreConfig::from_env()?,
            };
            tracing::debug!(?config, "connecting to postgres");
            let store = PgStore::connect(&config)?;
            store.ensure_schema()?;
            let machine = ConversationMachine::new(registry, store);
            let summary = replay(&machine, &outbox, input, &mut out)?;
            let records = machine.driver().snapshot()?;
            (summary, records)
        }
    };

    writeln!(
        out,
        "\n{} updates, {} transitions, {} handler failures",
        summary.updates, summary.transitions, summary.handler_failures
    )?;
    writeln!(out, "stored conversations:")?;
    for (key, StoredState { state_name, state_data, .. }) in records {
        let data = state_data.map_or_else(|| "null".to_string(), |d| d.to_string());
        writeln!(out, "  {key}  {state_name}  {data}")?;
    }

    Ok(if summary.handler_failures == 0 { 0 } else { 2 })
}

/// Run every update in `input` through `machine`, writing a transcript to `out`.
///
/// Storage failures abort the replay; handler failures are reported and
/// counted.
pub fn replay<D: StorageDriver>(
    machine: &ConversationMachine<D>,
    outbox: &Outbox,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let update: Update =
            serde_json::from_str(&line).with_context(|| format!("line {line_no} is not a valid update"))?;
        let report = machine
            .process_update(&update)
            .with_context(|| format!("update {} (line {line_no}) failed", update.update_id))?;

        summary.updates += 1;
        if report.transitioned() {
            summary.transitions += 1;
            writeln!(
                out,
                "#{} {}  {} -> {}",
                update.update_id, report.key, report.loaded_state, report.saved_state
            )?;
        } else {
            writeln!(out, "#{} {}  {}", update.update_id, report.key, report.saved_state)?;
        }
        for reply in outbox.drain() {
            writeln!(out, "    > {}", reply.text)?;
        }
        for (phase, error) in [("current", &report.current_error), ("all", &report.all_error)] {
            if let Some(error) = error {
                summary.handler_failures += 1;
                writeln!(out, "    ! {phase}: {error}")?;
            }
        }
    }
    Ok(summary)
}
