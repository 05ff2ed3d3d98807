//! Bounded retry for storage writes.
//!
//! A write is retried as a whole unit, immediately, up to a fixed number of
//! attempts. Every attempt's error is kept so the final failure shows the
//! full history, not just the last symptom.

use chatstate_core::StorageError;

/// Attempts made by storage drivers unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Run `op` until it succeeds or `max_attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number. A `max_attempts` of zero is
/// treated as one.
///
/// # Errors
///
/// Returns [`StorageError::RetryExhausted`] with every attempt's error, in
/// order, when no attempt succeeds.
pub fn retry_bounded<T, E, F>(max_attempts: u32, mut op: F) -> Result<T, StorageError>
where
    F: FnMut(u32) -> Result<T, E>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut errors = Vec::new();
    for attempt in 1..=max_attempts {
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, max_attempts, "storage write succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(attempt, max_attempts, error = %e, "storage write attempt failed");
                metrics::counter!("chatstate_storage_retries_total").increment(1);
                errors.push(e.to_string());
            }
        }
    }
    Err(StorageError::RetryExhausted {
        attempts: max_attempts,
        errors,
    })
}
