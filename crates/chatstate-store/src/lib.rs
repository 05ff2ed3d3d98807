//! # chatstate-store: Storage Drivers
//!
//! Implementations of [`chatstate_machine::StorageDriver`]:
//!
//! - [`MemoryStore`]: process-local map, for tests, demos and bots that can
//!   afford to forget.
//! - [`PgStore`]: Postgres via `sqlx`, serializing writers through a lock
//!   row and retrying each save a bounded number of times.
//!
//! Both follow the same contract: loading an unseen conversation yields an
//! empty record, saving is an upsert, and an unknown chat or user is a
//! distinct, storable key component.

pub mod key;
pub mod memory;
pub mod postgres;
pub mod retry;

pub use key::{StoredKey, NULL_KEY};
pub use memory::{MemoryStore, StoredState};
pub use postgres::{PgStore, PgStoreConfig};
pub use retry::{retry_bounded, DEFAULT_MAX_ATTEMPTS};
