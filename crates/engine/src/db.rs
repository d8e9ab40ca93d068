//! Shared Postgres pool type and the retry helper used by every row-level
//! write (§5 "Shared resources"): exponential backoff, base 100ms, capped at
//! 2s, up to 3 attempts. `create_session` is exempted — a caller that
//! retried session creation could double-submit an alert, so the operation
//! is marked non-retriable and callers pass `Retry::Never` for it.

use std::future::Future;
use std::time::Duration;

use tarsy_domain::error::{Error, Result};

pub type Pool = sqlx::PgPool;

const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Retry transient failures up to `MAX_ATTEMPTS` times with backoff.
    Transient,
    /// Run once; a failure is returned immediately (e.g. `create_session`).
    Never,
}

/// Run `op` under the configured retry policy. Only used for operations
/// whose failure mode is a transient DB error (connection reset, statement
/// timeout) — a caller that wants different retry semantics for business
/// errors (e.g. a unique-violation it wants to interpret, not retry) should
/// inspect and return `Ok` from within `op` instead of letting it bubble.
pub async fn with_retry<T, F, Fut>(policy: Retry, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let attempts = match policy {
        Retry::Never => 1,
        Retry::Transient => MAX_ATTEMPTS,
    };

    let mut backoff = BASE_BACKOFF;
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(operation = op_name, attempt, error = %e, "database operation failed");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    Err(Error::Other(format!(
        "{op_name} failed after {attempts} attempt(s): {}",
        last_err.expect("at least one attempt ran")
    )))
}
