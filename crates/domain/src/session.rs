use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One alert's end-to-end processing unit (glossary: "Session").
///
/// Created in `Pending`. Only one pod may own a session concurrently; the
/// claim is an atomic `status = pending -> in_progress, pod_id = me` (§4.6).
/// Terminal states are `Completed | Failed | Cancelled`; `completed_at_us`
/// is set iff the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub alert_type: String,
    pub alert_payload: serde_json::Value,
    pub status: SessionStatus,
    pub started_at_us: i64,
    pub completed_at_us: Option<i64>,
    pub pod_id: Option<String>,
    pub last_interaction_at_us: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl Session {
    pub fn new(session_id: Uuid, alert_type: impl Into<String>, alert_payload: serde_json::Value, now_us: i64) -> Self {
        Self {
            session_id,
            alert_type: alert_type.into(),
            alert_payload,
            status: SessionStatus::Pending,
            started_at_us: now_us,
            completed_at_us: None,
            pod_id: None,
            last_interaction_at_us: now_us,
            error: None,
        }
    }

    /// Asserts the §3 invariant: `completed_at_us` iff `status` is terminal.
    pub fn invariant_holds(&self) -> bool {
        self.status.is_terminal() == self.completed_at_us.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_pending_and_not_terminal() {
        let s = Session::new(Uuid::new_v4(), "k8s", serde_json::json!({}), 1_000);
        assert_eq!(s.status, SessionStatus::Pending);
        assert!(!s.status.is_terminal());
        assert!(s.invariant_holds());
    }

    #[test]
    fn terminal_statuses_require_completed_at() {
        let mut s = Session::new(Uuid::new_v4(), "k8s", serde_json::json!({}), 1_000);
        s.status = SessionStatus::Completed;
        assert!(!s.invariant_holds());
        s.completed_at_us = Some(2_000);
        assert!(s.invariant_holds());
    }

    #[test]
    fn non_terminal_with_completed_at_violates_invariant() {
        let mut s = Session::new(Uuid::new_v4(), "k8s", serde_json::json!({}), 1_000);
        s.completed_at_us = Some(2_000);
        assert!(!s.invariant_holds());
    }
}
