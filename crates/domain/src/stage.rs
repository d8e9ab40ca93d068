use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tagged iteration strategy, replacing dynamic polymorphism over
/// controllers (§9 redesign note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStrategy {
    React,
    Synthesis,
    NativeThinking,
    ReactStage,
    SynthesisNativeThinking,
}

impl IterationStrategy {
    /// §4.3: only the ReAct controller needs MCP tool access.
    pub fn needs_mcp_tools(self) -> bool {
        matches!(self, IterationStrategy::React | IterationStrategy::ReactStage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParallelType {
    #[default]
    Single,
    MultiAgent,
    Replica,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Failed | StageStatus::Cancelled
        )
    }
}

/// One stage's execution record (glossary: "Stage" — a step of a chain
/// executed by one or many agents). Child-of relation via
/// `parent_stage_execution_id`; a parent's final status is derived from
/// its children per §4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub execution_id: Uuid,
    pub session_id: Uuid,
    pub stage_index: u32,
    pub stage_name: String,
    pub agent: String,
    pub iteration_strategy: IterationStrategy,
    pub status: StageStatus,
    pub started_at_us: Option<i64>,
    pub completed_at_us: Option<i64>,
    pub duration_ms: Option<i64>,
    pub parent_stage_execution_id: Option<Uuid>,
    pub parallel_index: u32,
    pub parallel_type: ParallelType,
    pub stage_output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StageExecution {
    pub fn new_pending(
        session_id: Uuid,
        stage_index: u32,
        stage_name: impl Into<String>,
        agent: impl Into<String>,
        iteration_strategy: IterationStrategy,
        parallel_type: ParallelType,
        parallel_index: u32,
        parent_stage_execution_id: Option<Uuid>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            session_id,
            stage_index,
            stage_name: stage_name.into(),
            agent: agent.into(),
            iteration_strategy,
            status: StageStatus::Pending,
            started_at_us: None,
            completed_at_us: None,
            duration_ms: None,
            parent_stage_execution_id,
            parallel_index,
            parallel_type,
            stage_output: None,
            error: None,
        }
    }
}

/// §4.5 parent-status derivation rule, applied after a fan-out join.
/// Precedence is cancelled > failed > completed, except that a failed
/// sibling alongside a completion (with no cancellation) only pulls the
/// parent to `Failed` when `continue_on_failure` is unset — see testable
/// property 5. `replica` stages additionally treat one success as
/// sufficient *unless every other child is cancelled*, in which case the
/// general precedence rule applies unchanged and cancellation wins (§9
/// Open Questions).
pub fn derive_parent_status(
    parallel_type: ParallelType,
    children: &[StageStatus],
    continue_on_failure: bool,
) -> StageStatus {
    debug_assert!(children.iter().all(|s| s.is_terminal()));

    let any_cancelled = children.iter().any(|s| *s == StageStatus::Cancelled);
    let any_completed = children.iter().any(|s| *s == StageStatus::Completed);
    let any_failed = children.iter().any(|s| *s == StageStatus::Failed);

    if parallel_type == ParallelType::Replica && any_completed {
        let all_others_cancelled = children
            .iter()
            .filter(|s| **s != StageStatus::Completed)
            .all(|s| *s == StageStatus::Cancelled);
        if !all_others_cancelled {
            return StageStatus::Completed;
        }
        // Every other child is cancelled: fall through to the general
        // precedence rule below, which returns `Cancelled`.
    }

    if any_cancelled {
        return StageStatus::Cancelled;
    }
    if any_failed {
        if any_completed {
            return if continue_on_failure {
                StageStatus::Completed
            } else {
                StageStatus::Failed
            };
        }
        return StageStatus::Failed;
    }
    StageStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn react_needs_mcp_tools() {
        assert!(IterationStrategy::React.needs_mcp_tools());
        assert!(!IterationStrategy::Synthesis.needs_mcp_tools());
        assert!(!IterationStrategy::NativeThinking.needs_mcp_tools());
    }

    #[test]
    fn all_completed_parent_completed() {
        let children = vec![StageStatus::Completed, StageStatus::Completed];
        assert_eq!(
            derive_parent_status(ParallelType::MultiAgent, &children, false),
            StageStatus::Completed
        );
    }

    #[test]
    fn one_cancelled_no_completion_parent_cancelled() {
        let children = vec![StageStatus::Cancelled, StageStatus::Failed];
        assert_eq!(
            derive_parent_status(ParallelType::MultiAgent, &children, false),
            StageStatus::Cancelled
        );
    }

    #[test]
    fn cancel_precedence_over_failed_and_completed() {
        // S2 scenario: one cancelled, one completed -> parent cancelled.
        let children = vec![StageStatus::Cancelled, StageStatus::Completed];
        assert_eq!(
            derive_parent_status(ParallelType::MultiAgent, &children, false),
            StageStatus::Cancelled
        );
    }

    #[test]
    fn failed_and_completed_with_no_cancellation_is_failed_by_default() {
        let children = vec![StageStatus::Failed, StageStatus::Completed];
        assert_eq!(
            derive_parent_status(ParallelType::MultiAgent, &children, false),
            StageStatus::Failed
        );
    }

    #[test]
    fn failed_and_completed_is_completed_when_continue_on_failure() {
        let children = vec![StageStatus::Failed, StageStatus::Completed];
        assert_eq!(
            derive_parent_status(ParallelType::MultiAgent, &children, true),
            StageStatus::Completed
        );
    }

    #[test]
    fn replica_one_success_is_cancelled_when_all_others_cancelled() {
        // §9: the replica exception does not apply when every remaining
        // child is cancelled — general precedence wins, so the parent is
        // `Cancelled`, not `Completed`.
        let children = vec![StageStatus::Completed, StageStatus::Cancelled, StageStatus::Cancelled];
        assert_eq!(
            derive_parent_status(ParallelType::Replica, &children, false),
            StageStatus::Cancelled
        );
    }

    #[test]
    fn replica_one_success_is_completed_when_others_failed() {
        // A non-cancelled failure among the others does not block the
        // "succeeds if any replica succeeds" exception.
        let children = vec![StageStatus::Completed, StageStatus::Failed];
        assert_eq!(
            derive_parent_status(ParallelType::Replica, &children, false),
            StageStatus::Completed
        );
    }

    #[test]
    fn replica_all_failed_is_failed() {
        let children = vec![StageStatus::Failed, StageStatus::Failed];
        assert_eq!(
            derive_parent_status(ParallelType::Replica, &children, false),
            StageStatus::Failed
        );
    }

    #[test]
    fn stage_status_terminal() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(StageStatus::Cancelled.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Active.is_terminal());
    }
}
