use serde::{Deserialize, Serialize};

/// Global channel for session lifecycle transitions, per §6.
pub const CHANNEL_SESSIONS: &str = "sessions";

/// Per-session detail channel name (§6: `session:{session_id}`).
pub fn session_channel(session_id: &uuid::Uuid) -> String {
    format!("session:{session_id}")
}

/// An append-only record on a named channel (glossary: "Event"). `id` is
/// monotonic per-channel, assigned on insert; readers rely on gap-free,
/// strictly-increasing ids for replay (§3, testable property 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub channel: String,
    pub payload: serde_json::Value,
    pub inserted_at_us: i64,
}

/// Payload shapes published onto `sessions` and `session:{id}` (§4.4,
/// §4.5, §8 S1). Not an exhaustive protocol — `payload` on `Event` stays
/// an opaque JSON map on the wire; this enum is the producer-side
/// vocabulary used to build that payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum SessionEventPayload {
    #[serde(rename = "session_started")]
    SessionStarted { session_id: uuid::Uuid },
    #[serde(rename = "session_completed")]
    SessionCompleted { session_id: uuid::Uuid },
    #[serde(rename = "session_failed")]
    SessionFailed { session_id: uuid::Uuid, error: String },
    #[serde(rename = "session_cancelled")]
    SessionCancelled { session_id: uuid::Uuid },
    #[serde(rename = "stage_started")]
    StageStarted {
        session_id: uuid::Uuid,
        stage_execution_id: uuid::Uuid,
        stage_name: String,
    },
    #[serde(rename = "stage_completed")]
    StageCompleted {
        session_id: uuid::Uuid,
        stage_execution_id: uuid::Uuid,
        stage_name: String,
    },
    #[serde(rename = "stage_failed")]
    StageFailed {
        session_id: uuid::Uuid,
        stage_execution_id: uuid::Uuid,
        stage_name: String,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn session_channel_format() {
        let id = Uuid::nil();
        assert_eq!(session_channel(&id), format!("session:{id}"));
    }

    #[test]
    fn payload_serializes_with_tag() {
        let payload = SessionEventPayload::StageStarted {
            session_id: Uuid::nil(),
            stage_execution_id: Uuid::nil(),
            stage_name: "triage".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event_type"], "stage_started");
    }
}
