//! # chatstate-cli: Command-Line Tool
//!
//! Provides the `chatstate` binary.
//!
//! ## Subcommands
//!
//! - `chatstate replay <file>`: run recorded updates through the demo
//!   conversation flow against an in-memory or Postgres store.
//! - `chatstate check-name <NAME>...`: validate state names.
//! - `chatstate commands`: list the demo flow's bot commands per state.
//!
//! ```bash
//! chatstate -v replay updates.ndjson
//! chatstate check-name ASK_NAME confirm
//! ```

pub mod commands;
pub mod demo;
pub mod names;
pub mod replay;
