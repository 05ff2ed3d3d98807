//! # Postgres Storage Driver
//!
//! Persists one row per conversation in `chat_states`, keyed by the
//! normalized (chat, user) columns (see [`crate::key`]).
//!
//! ## Write protocol
//!
//! Every save is one transaction that:
//!
//! 1. locks the single row of `chat_state_upsert_lock` (`SELECT … FOR UPDATE`),
//!    so concurrent writers from other processes queue up;
//! 2. updates the conversation's row;
//! 3. inserts it when no row was updated.
//!
//! The whole transaction is retried up to `max_attempts` times. When every
//! attempt fails the caller gets [`StorageError::RetryExhausted`] with each
//! attempt's error.
//!
//! ## Runtime
//!
//! [`StorageDriver`] is synchronous. The store owns a current-thread Tokio
//! runtime and blocks on it for every query, so it must not be called from
//! inside another async runtime.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::runtime::Runtime;

use chatstate_core::{ConversationKey, StateData, StateName, StorageError};
use chatstate_machine::{LoadedState, StorageDriver};

use crate::key::StoredKey;
use crate::memory::StoredState;
use crate::retry::{retry_bounded, DEFAULT_MAX_ATTEMPTS};

/// Conversation state table.
pub const CREATE_STATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS chat_states (
    chat_key   TEXT        NOT NULL,
    user_key   TEXT        NOT NULL,
    state      TEXT        NOT NULL,
    data       JSONB       NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (chat_key, user_key)
)";

/// Single-row table serializing writers.
pub const CREATE_LOCK_TABLE: &str = "CREATE TABLE IF NOT EXISTS chat_state_upsert_lock (
    id INT PRIMARY KEY
)";

const SEED_LOCK_ROW: &str = "INSERT INTO chat_state_upsert_lock (id) VALUES (1) ON CONFLICT (id) DO NOTHING";

/// Environment variable with the connection string.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable with the pool size.
pub const MAX_CONNECTIONS_ENV: &str = "CHATSTATE_DB_MAX_CONNECTIONS";
/// Environment variable with the number of save attempts.
pub const SAVE_ATTEMPTS_ENV: &str = "CHATSTATE_SAVE_ATTEMPTS";

/// Connection and retry settings for [`PgStore`].
#[derive(Clone)]
pub struct PgStoreConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Pool size.
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub acquire_timeout_secs: u64,
    /// Attempts per save before giving up.
    pub max_attempts: u32,
}

impl std::fmt::Debug for PgStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStoreConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl PgStoreConfig {
    /// Settings for `database_url` with default pool and retry limits.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            acquire_timeout_secs: 5,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Read the settings from the environment.
    ///
    /// # Errors
    ///
    /// Fails if `DATABASE_URL` is unset or a numeric variable does not parse.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let url = lookup(DATABASE_URL_ENV)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| StorageError::Backend(format!("{DATABASE_URL_ENV} is not set")))?;
        let mut config = Self::new(url);
        if let Some(raw) = lookup(MAX_CONNECTIONS_ENV) {
            config.max_connections = parse_number(MAX_CONNECTIONS_ENV, &raw)?;
        }
        if let Some(raw) = lookup(SAVE_ATTEMPTS_ENV) {
            config.max_attempts = parse_number(SAVE_ATTEMPTS_ENV, &raw)?;
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, StorageError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| StorageError::Backend(format!("{name}={raw:?} is not a valid number: {e}")))
}

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[derive(sqlx::FromRow)]
struct StateRow {
    state: String,
    data: Option<serde_json::Value>,
}

#[derive(sqlx::FromRow)]
struct FullStateRow {
    chat_key: String,
    user_key: String,
    state: String,
    data: Option<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

impl FullStateRow {
    fn into_record(self) -> Result<(ConversationKey, StoredState), StorageError> {
        let key = StoredKey {
            chat: self.chat_key,
            user: self.user_key,
        }
        .to_key()?;
        Ok((
            key,
            StoredState {
                state_name: self.state,
                state_data: self.data,
                updated_at: self.updated_at,
            },
        ))
    }
}

/// Postgres-backed [`StorageDriver`].
pub struct PgStore {
    runtime: Runtime,
    pool: PgPool,
    max_attempts: u32,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("max_attempts", &self.max_attempts)
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl PgStore {
    /// Connect to Postgres.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the runtime cannot be started or
    /// the connection fails.
    pub fn connect(config: &PgStoreConfig) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(backend)?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
                    .connect(&config.database_url),
            )
            .map_err(backend)?;
        tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self {
            runtime,
            pool,
            max_attempts: config.max_attempts,
        })
    }

    /// Create the state and lock tables if they are missing, and seed the
    /// lock row. Safe to run on every start.
    pub fn ensure_schema(&self) -> Result<(), StorageError> {
        self.runtime
            .block_on(async {
                sqlx::query(CREATE_STATE_TABLE).execute(&self.pool).await?;
                sqlx::query(CREATE_LOCK_TABLE).execute(&self.pool).await?;
                sqlx::query(SEED_LOCK_ROW).execute(&self.pool).await?;
                Ok::<_, sqlx::Error>(())
            })
            .map_err(backend)?;
        tracing::info!("chat state schema ensured");
        Ok(())
    }

    /// Every stored conversation, ordered by key.
    pub fn snapshot(&self) -> Result<Vec<(ConversationKey, StoredState)>, StorageError> {
        let rows = self
            .runtime
            .block_on(
                sqlx::query_as::<_, FullStateRow>(
                    "SELECT chat_key, user_key, state, data, updated_at
                     FROM chat_states ORDER BY chat_key, user_key",
                )
                .fetch_all(&self.pool),
            )
            .map_err(backend)?;
        rows.into_iter().map(FullStateRow::into_record).collect()
    }

    fn save_once(&self, key: &StoredKey, state_name: &str, state_data: &StateData) -> Result<(), sqlx::Error> {
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;

            sqlx::query("SELECT id FROM chat_state_upsert_lock WHERE id = 1 FOR UPDATE")
                .fetch_optional(&mut *tx)
                .await?;

            let updated = sqlx::query(
                "UPDATE chat_states SET state = $3, data = $4, updated_at = now()
                 WHERE chat_key = $1 AND user_key = $2",
            )
            .bind(&key.chat)
            .bind(&key.user)
            .bind(state_name)
            .bind(state_data.clone())
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    "INSERT INTO chat_states (chat_key, user_key, state, data, updated_at)
                     VALUES ($1, $2, $3, $4, now())",
                )
                .bind(&key.chat)
                .bind(&key.user)
                .bind(state_name)
                .bind(state_data.clone())
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await
        })
    }
}

impl StorageDriver for PgStore {
    fn load(&self, key: &ConversationKey) -> Result<LoadedState, StorageError> {
        let stored = StoredKey::from_key(key);
        let row = self
            .runtime
            .block_on(
                sqlx::query_as::<_, StateRow>(
                    "SELECT state, data FROM chat_states WHERE chat_key = $1 AND user_key = $2",
                )
                .bind(&stored.chat)
                .bind(&stored.user)
                .fetch_optional(&self.pool),
            )
            .map_err(backend)?;
        tracing::debug!(key = %key, found = row.is_some(), "loaded from postgres");
        Ok(match row {
            Some(row) => LoadedState::new(row.state, row.data),
            None => LoadedState::empty(),
        })
    }

    fn save(&self, key: &ConversationKey, state_name: &StateName, state_data: StateData) -> Result<(), StorageError> {
        let stored = StoredKey::from_key(key);
        retry_bounded(self.max_attempts, |_| self.save_once(&stored, state_name.as_str(), &state_data))?;
        tracing::debug!(key = %key, state = %state_name, "saved to postgres");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn config_requires_database_url() {
        assert!(PgStoreConfig::from_lookup(lookup(&[])).is_err());
        assert!(PgStoreConfig::from_lookup(lookup(&[(DATABASE_URL_ENV, "  ")])).is_err());
    }

    #[test]
    fn config_defaults() {
        let config = PgStoreConfig::from_lookup(lookup(&[(DATABASE_URL_ENV, "postgres://localhost/bot")])).unwrap();
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.acquire_timeout_secs, 5);
    }

    #[test]
    fn config_overrides() {
        let config = PgStoreConfig::from_lookup(lookup(&[
            (DATABASE_URL_ENV, "postgres://localhost/bot"),
            (MAX_CONNECTIONS_ENV, "12"),
            (SAVE_ATTEMPTS_ENV, " 3 "),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn config_rejects_bad_numbers() {
        let err = PgStoreConfig::from_lookup(lookup(&[
            (DATABASE_URL_ENV, "postgres://localhost/bot"),
            (SAVE_ATTEMPTS_ENV, "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(SAVE_ATTEMPTS_ENV));
    }

    #[test]
    fn config_debug_redacts_url() {
        let config = PgStoreConfig::new("postgres://bot:hunter2@db/bot");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn schema_keeps_null_data_and_composite_key() {
        assert!(CREATE_STATE_TABLE.contains("data       JSONB       NULL"));
        assert!(CREATE_STATE_TABLE.contains("PRIMARY KEY (chat_key, user_key)"));
        assert!(SEED_LOCK_ROW.contains("ON CONFLICT"));
    }

    // ── Live database (scratch database named by DATABASE_URL) ──────────

    fn live_store(max_attempts: u32) -> PgStore {
        let mut config = PgStoreConfig::from_env().expect("DATABASE_URL must name a scratch database");
        config.max_attempts = max_attempts;
        let store = PgStore::connect(&config).unwrap();
        store.ensure_schema().unwrap();
        store
    }

    fn execute(store: &PgStore, sql: &str) {
        store.runtime.block_on(sqlx::query(sql).execute(&store.pool)).unwrap();
    }

    #[test]
    #[ignore] // Run with: DATABASE_URL=... cargo test -p chatstate-store live_ -- --ignored --test-threads=1
    fn live_save_upserts_and_loads_back() {
        let store = live_store(DEFAULT_MAX_ATTEMPTS);
        let key = ConversationKey::new(Some(-9001), None);
        let name = StateName::new("ASK_NAME").unwrap();

        store.save(&key, &name, Some(serde_json::json!({"step": 1}))).unwrap();
        store.save(&key, &name, None).unwrap();

        let loaded = store.load(&key).unwrap();
        assert_eq!(loaded.state_name.as_deref(), Some("ASK_NAME"));
        assert_eq!(loaded.state_data, None);
        let rows = store.snapshot().unwrap();
        assert_eq!(rows.iter().filter(|(k, _)| *k == key).count(), 1);
        execute(&store, "DELETE FROM chat_states WHERE chat_key = '-9001'");
    }

    #[test]
    #[ignore] // Run with: DATABASE_URL=... cargo test -p chatstate-store live_ -- --ignored --test-threads=1
    fn live_save_gives_up_after_configured_attempts() {
        let store = live_store(3);
        let key = ConversationKey::new(Some(-9002), Some(1));
        let name = StateName::new("ASK_NAME").unwrap();

        // Without the lock table every attempt fails.
        execute(&store, "DROP TABLE chat_state_upsert_lock");
        let err = store.save(&key, &name, None).unwrap_err();
        store.ensure_schema().unwrap();

        match err {
            StorageError::RetryExhausted { attempts, errors } => {
                assert_eq!(attempts, 3);
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().all(|e| e.contains("chat_state_upsert_lock")));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert_eq!(store.load(&key).unwrap(), LoadedState::empty());
    }
}
