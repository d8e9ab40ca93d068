use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event bus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventBusBackend {
    /// `LISTEN`/`NOTIFY`-backed delivery with a dedicated listener task.
    #[default]
    Notify,
    /// Short-interval polling of `get_events_after`, for databases without
    /// a notify channel.
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default)]
    pub backend: EventBusBackend,

    /// Poll interval when `backend = poll`.
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum backoff after a poll error, per §4.1.
    #[serde(default = "d_poll_error_backoff_ms")]
    pub poll_error_backoff_ms: u64,

    /// Max events fetched per catchup query (§4.8 step 2).
    #[serde(default = "d_catchup_batch_size")]
    pub catchup_batch_size: i64,

    /// SSE keepalive interval when no events are flowing (§4.8 step 4).
    #[serde(default = "d_keepalive_interval_s")]
    pub keepalive_interval_s: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            backend: EventBusBackend::default(),
            poll_interval_ms: d_poll_interval_ms(),
            poll_error_backoff_ms: d_poll_error_backoff_ms(),
            catchup_batch_size: d_catchup_batch_size(),
            keepalive_interval_s: d_keepalive_interval_s(),
        }
    }
}

fn d_poll_interval_ms() -> u64 {
    500
}
fn d_poll_error_backoff_ms() -> u64 {
    5_000
}
fn d_catchup_batch_size() -> i64 {
    100
}
fn d_keepalive_interval_s() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_is_notify() {
        assert_eq!(EventBusConfig::default().backend, EventBusBackend::Notify);
    }

    #[test]
    fn default_poll_interval_matches_spec() {
        assert_eq!(EventBusConfig::default().poll_interval_ms, 500);
    }

    #[test]
    fn default_error_backoff_is_at_least_5s() {
        assert!(EventBusConfig::default().poll_error_backoff_ms >= 5_000);
    }

    #[test]
    fn deserialize_poll_backend() {
        let cfg: EventBusConfig = toml::from_str("backend = \"poll\"\n").unwrap();
        assert_eq!(cfg.backend, EventBusBackend::Poll);
    }
}
