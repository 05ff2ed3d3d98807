//! # Check-Name Subcommand
//!
//! Validates candidate state names against the naming grammar.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use chatstate_core::assert_can_be_name;

/// Arguments for the check-name subcommand.
#[derive(Args, Debug)]
pub struct CheckNameArgs {
    /// Names to check.
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Accept the pseudostate names CURRENT and DEFAULT. ALL is always rejected.
    #[arg(long)]
    pub allow_reserved: bool,
}

/// Execute the check-name subcommand. Exits 1 if any name is invalid.
pub fn run_check_name(args: &CheckNameArgs) -> Result<u8> {
    let stdout = std::io::stdout();
    check_names(args, &mut stdout.lock())
}

fn check_names(args: &CheckNameArgs, out: &mut impl Write) -> Result<u8> {
    let mut code = 0;
    for name in &args.names {
        match assert_can_be_name(name, args.allow_reserved) {
            Ok(()) => writeln!(out, "{name}: ok")?,
            Err(e) => {
                writeln!(out, "{name}: {e}")?;
                code = 1;
            }
        }
    }
    Ok(code)
}
