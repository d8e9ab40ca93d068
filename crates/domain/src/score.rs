use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compiled-in hash of the current scoring-prompt template. Per §9's
/// resolution of the prompt-hash Open Question, this is computed over the
/// template bytes at build time; any edit, including whitespace,
/// invalidates historical scores. Set via `build.rs`/`TARSY_SCORING_PROMPT_HASH`
/// when present, otherwise falls back to a stable development placeholder.
pub const CURRENT_PROMPT_HASH: &str = match option_env!("TARSY_SCORING_PROMPT_HASH") {
    Some(hash) => hash,
    None => "dev-unversioned-prompt",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScoreStatus {
    /// §3 partial-unique invariant: at most one row per session whose
    /// status is in this set.
    pub fn counts_toward_uniqueness(self) -> bool {
        matches!(self, ScoreStatus::Pending | ScoreStatus::InProgress)
    }
}

/// Follow-up quality judgement over a completed session (§3 "Session
/// Score").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScore {
    pub score_id: Uuid,
    pub session_id: Uuid,
    pub status: ScoreStatus,
    pub overall_score: Option<f64>,
    pub rationale: Option<String>,
    pub prompt_hash: String,
    pub created_at_us: i64,
    pub completed_at_us: Option<i64>,
}

impl SessionScore {
    /// Testable property 6: `current_prompt_used` is true iff
    /// `prompt_hash == CURRENT_PROMPT_HASH`.
    pub fn current_prompt_used(&self) -> bool {
        self.prompt_hash == CURRENT_PROMPT_HASH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(prompt_hash: &str) -> SessionScore {
        SessionScore {
            score_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            status: ScoreStatus::Completed,
            overall_score: Some(0.9),
            rationale: Some("good".into()),
            prompt_hash: prompt_hash.into(),
            created_at_us: 0,
            completed_at_us: Some(1),
        }
    }

    #[test]
    fn current_prompt_used_true_when_hash_matches() {
        assert!(score(CURRENT_PROMPT_HASH).current_prompt_used());
    }

    #[test]
    fn current_prompt_used_false_when_hash_differs() {
        assert!(!score("stale-hash").current_prompt_used());
    }

    #[test]
    fn uniqueness_set_is_pending_and_in_progress_only() {
        assert!(ScoreStatus::Pending.counts_toward_uniqueness());
        assert!(ScoreStatus::InProgress.counts_toward_uniqueness());
        assert!(!ScoreStatus::Completed.counts_toward_uniqueness());
        assert!(!ScoreStatus::Failed.counts_toward_uniqueness());
    }
}
