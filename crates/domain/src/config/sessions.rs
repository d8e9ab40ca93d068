use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session timing & claim policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Overall session deadline (§5 "Timeouts").
    #[serde(default = "d_session_timeout_s")]
    pub session_timeout_s: u64,

    /// A session whose `last_interaction_at_us` is older than this is
    /// considered orphaned by the startup sweep (§4.6).
    #[serde(default = "d_orphan_sweep_timeout_s")]
    pub orphan_sweep_timeout_s: u64,

    /// Backoff between claim retries for a losing claimer.
    #[serde(default = "d_claim_retry_backoff_ms")]
    pub claim_retry_backoff_ms: u64,

    /// Default `continue_on_failure` at the chain level; a stage spec may
    /// override this per §9.
    #[serde(default)]
    pub continue_on_failure_default: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_s: d_session_timeout_s(),
            orphan_sweep_timeout_s: d_orphan_sweep_timeout_s(),
            claim_retry_backoff_ms: d_claim_retry_backoff_ms(),
            continue_on_failure_default: false,
        }
    }
}

fn d_session_timeout_s() -> u64 {
    3_600
}
fn d_orphan_sweep_timeout_s() -> u64 {
    1_800
}
fn d_claim_retry_backoff_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_orphan_timeout_is_30_minutes() {
        assert_eq!(SessionConfig::default().orphan_sweep_timeout_s, 1_800);
    }

    #[test]
    fn default_does_not_continue_on_failure() {
        assert!(!SessionConfig::default().continue_on_failure_default);
    }
}
