//! # Commands Subcommand
//!
//! Prints the bot commands of the demo flow, per state, by attaching a
//! [`CommandCatalog`] to the registry.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;

use chatstate_machine::{CommandCatalog, MachineConfig};

use crate::demo::{build_registry, Outbox};

/// Execute the commands subcommand.
pub fn run_commands(config: MachineConfig) -> Result<u8> {
    let stdout = std::io::stdout();
    list_commands(config, &mut stdout.lock())?;
    Ok(0)
}

fn list_commands(config: MachineConfig, out: &mut impl Write) -> Result<()> {
    let registry = build_registry(config, &Outbox::new())?;
    let catalog = Arc::new(CommandCatalog::new());
    registry.attach(catalog.clone());

    for state in catalog.states() {
        let commands = catalog.commands_for(&state);
        if commands.is_empty() {
            continue;
        }
        let rendered: Vec<String> = commands.iter().map(|c| format!("/{c}")).collect();
        writeln!(out, "{state}: {}", rendered.join(" "))?;
    }
    Ok(())
}
