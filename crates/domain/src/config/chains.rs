use crate::stage::ParallelType;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chains
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry of the ordered stage-spec list the orchestrator (C5) walks
/// for a chain (glossary: "Chain" — ordered list of stage specs forming
/// the pipeline for a session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,

    /// Single agent for `single`/`replica` stages; ignored (each child
    /// resolves its own agent) for `multi_agent` unless all children share
    /// one, in which case this is that shared agent name.
    pub agent: String,

    #[serde(default)]
    pub parallel_type: ParallelType,

    /// Child count for `multi_agent`/`replica`; `1` for `single`.
    #[serde(default = "d_one")]
    pub fan_out: u32,

    /// Per-stage override of the chain-level `continue_on_failure` default
    /// (§9 Open Questions — exposed at both levels, per-stage wins).
    #[serde(default)]
    pub continue_on_failure: Option<bool>,

    /// Wall-clock cap for this stage's controller, independent of the
    /// session-wide deadline (§4.4 step 4: `min(session_remaining,
    /// stage_cap)`).
    #[serde(default)]
    pub stage_timeout_s: Option<u64>,
}

fn d_one() -> u32 {
    1
}

impl StageSpec {
    pub fn effective_continue_on_failure(&self, chain_default: bool) -> bool {
        self.continue_on_failure.unwrap_or(chain_default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub alert_type: String,
    pub stages: Vec<StageSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChainsConfig {
    #[serde(default)]
    pub chains: Vec<ChainDefinition>,
}

impl ChainsConfig {
    pub fn for_alert_type(&self, alert_type: &str) -> Option<&ChainDefinition> {
        self.chains.iter().find(|c| c.alert_type == alert_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_spec_defaults_to_single_fan_out_one() {
        let spec = StageSpec {
            name: "triage".into(),
            agent: "kubernetes".into(),
            parallel_type: ParallelType::Single,
            fan_out: 1,
            continue_on_failure: None,
            stage_timeout_s: None,
        };
        assert_eq!(spec.fan_out, 1);
        assert!(!spec.effective_continue_on_failure(false));
        assert!(spec.effective_continue_on_failure(true));
    }

    #[test]
    fn per_stage_override_wins_over_chain_default() {
        let spec = StageSpec {
            name: "triage".into(),
            agent: "kubernetes".into(),
            parallel_type: ParallelType::Single,
            fan_out: 1,
            continue_on_failure: Some(true),
            stage_timeout_s: None,
        };
        assert!(spec.effective_continue_on_failure(false));
    }

    #[test]
    fn chains_config_lookup_by_alert_type() {
        let cfg = ChainsConfig {
            chains: vec![ChainDefinition {
                alert_type: "k8s".into(),
                stages: vec![],
            }],
        };
        assert!(cfg.for_alert_type("k8s").is_some());
        assert!(cfg.for_alert_type("aws").is_none());
    }
}
