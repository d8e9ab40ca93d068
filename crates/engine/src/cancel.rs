//! Cancellation Tracker (C7, §4.7): a process-wide set of user-cancelled
//! session ids, plus the exact timeout message formatters required verbatim
//! by testable property 9 and scenario S3.
//!
//! This is deliberately simpler than a cascading per-turn cancel-token tree:
//! the tracker only distinguishes *why* a session or stage ended up
//! terminal (user request vs. deadline), not how to propagate a live
//! cancel signal — that's the executor's job, via the session's own
//! deadline and the stage-loop's periodic checks.

use std::collections::HashSet;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct CancellationTracker {
    user_cancelled: Mutex<HashSet<Uuid>>,
}

impl CancellationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: marking an already-cancelled session is a no-op
    /// (testable property 7).
    pub fn mark_cancelled(&self, session_id: Uuid) {
        self.user_cancelled.lock().insert(session_id);
    }

    pub fn is_user_cancel(&self, session_id: Uuid) -> bool {
        self.user_cancelled.lock().contains(&session_id)
    }

    /// Idempotent: clearing an absent entry is a no-op.
    pub fn clear(&self, session_id: Uuid) {
        self.user_cancelled.lock().remove(&session_id);
    }
}

/// The stage-timeout message template, with exactly one fractional digit on
/// durations and a bare integer second count for the session timeout:
/// `"{stage_name} stage timed out after {stage_duration_s:.1}s (started at
/// +{stage_start_offset_s:.1}s into session, session timeout: {timeout_seconds}s)"`.
pub fn format_stage_timeout(
    stage_name: &str,
    stage_duration_s: f64,
    stage_start_offset_s: f64,
    session_timeout_s: u64,
) -> String {
    format!(
        "{stage_name} stage timed out after {stage_duration_s:.1}s (started at +{stage_start_offset_s:.1}s into session, session timeout: {session_timeout_s}s)"
    )
}

/// The interaction-timeout template: `"{operation_name} timed out after
/// {duration_s:.1}s ({context})"`; `context` defaults to `"session timeout
/// reached"` when the caller supplies none.
pub fn format_interaction_timeout(operation_name: &str, duration_s: f64, context: Option<&str>) -> String {
    let context = context.unwrap_or("session timeout reached");
    format!("{operation_name} timed out after {duration_s:.1}s ({context})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_query_cancellation() {
        let tracker = CancellationTracker::new();
        let id = Uuid::new_v4();
        assert!(!tracker.is_user_cancel(id));
        tracker.mark_cancelled(id);
        assert!(tracker.is_user_cancel(id));
    }

    #[test]
    fn repeated_mark_is_idempotent() {
        let tracker = CancellationTracker::new();
        let id = Uuid::new_v4();
        tracker.mark_cancelled(id);
        tracker.mark_cancelled(id);
        assert!(tracker.is_user_cancel(id));
    }

    #[test]
    fn clear_removes_entry() {
        let tracker = CancellationTracker::new();
        let id = Uuid::new_v4();
        tracker.mark_cancelled(id);
        tracker.clear(id);
        assert!(!tracker.is_user_cancel(id));
    }

    #[test]
    fn clear_absent_entry_is_noop() {
        let tracker = CancellationTracker::new();
        tracker.clear(Uuid::new_v4());
    }

    #[test]
    fn stage_timeout_message_matches_s3_pattern() {
        let msg = format_stage_timeout("stageB", 700.0, 0.0, 600);
        assert_eq!(
            msg,
            "stageB stage timed out after 700.0s (started at +0.0s into session, session timeout: 600s)"
        );
        let re = regex::Regex::new(
            r"^.* stage timed out after \d+\.\ds \(started at \+\d+\.\ds into session, session timeout: 600s\)$",
        )
        .unwrap();
        assert!(re.is_match(&msg));
    }

    #[test]
    fn interaction_timeout_default_context() {
        let msg = format_interaction_timeout("llm call", 30.2, None);
        assert_eq!(msg, "llm call timed out after 30.2s (session timeout reached)");
    }

    #[test]
    fn interaction_timeout_custom_context() {
        let msg = format_interaction_timeout("mcp call", 5.0, Some("tool: get_pods"));
        assert_eq!(msg, "mcp call timed out after 5.0s (tool: get_pods)");
    }
}
