use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A session has at most one chat (§3). Created once; resolved against the
/// session's final stage output at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: Uuid,
    pub session_id: Uuid,
    pub created_at_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageRole {
    User,
    Assistant,
}

/// Append-only, insertion-ordered message within a chat (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUserMessage {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    pub role: ChatMessageRole,
    pub content: String,
    pub created_at_us: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_roles_roundtrip_json() {
        let msg = ChatUserMessage {
            message_id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            role: ChatMessageRole::User,
            content: "why did stageB fail?".into(),
            created_at_us: 0,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatUserMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, ChatMessageRole::User);
    }
}
