//! # chatstate-machine: Conversation State Machine
//!
//! Every (chat, user) pair of a bot has exactly one active named state, and
//! inbound updates are routed only to that state's handlers plus the
//! always-on handlers of the ALL pseudostate.
//!
//! ## Architecture
//!
//! - **[`State`]**: a named handler set with one data slot, shared as
//!   `Arc<State>` and compared by identity.
//! - **[`StateRegistry`]**: name → state map plus the CURRENT, DEFAULT and
//!   ALL pseudostates. [`StateRegistry::set`] is the one place transitions
//!   happen.
//! - **[`ConversationMachine`]**: the load → set → dispatch → save
//!   lifecycle around each update, against a [`StorageDriver`].
//! - **[`DispatchSurface`]**: where handlers are published once the
//!   registry is attached ([`CommandCatalog`] collects bot commands).
//!
//! ## Example
//!
//! ```
//! use chatstate_machine::StateRegistry;
//!
//! let registry = StateRegistry::new("demo");
//! let ask_name = registry.register_state("ASK_NAME", None).unwrap();
//! registry.default_state().on_command("start", |ctx| {
//!     ctx.registry.set("ASK_NAME", None)?;
//!     Ok(())
//! });
//! ask_name.on_text(|ctx| {
//!     let name = ctx.args().to_string();
//!     ctx.state.set_data(Some(serde_json::json!({ "name": name })));
//!     Ok(())
//! });
//! assert_eq!(registry.current().name(), "DEFAULT");
//! ```

pub mod config;
pub mod driver;
pub mod handler;
pub mod machine;
pub mod registry;
pub mod state;
pub mod surface;
pub mod transition;

pub use config::MachineConfig;
pub use driver::{DataCodec, IdentityCodec, LoadedState, StorageDriver};
pub use handler::{Handler, HandlerContext, Route};
pub use machine::{ConversationMachine, DispatchReport, Phase};
pub use registry::{RegisterOptions, StateRegistry};
pub use state::State;
pub use surface::{CommandCatalog, DispatchSurface};
pub use transition::Target;
