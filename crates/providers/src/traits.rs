//! The LLM provider contract (§6 "LLM provider (consumed)").
//!
//! Deliberately thin: Tarsy's iteration controllers never rely on
//! provider-native tool calling (the ReAct loop parses tool calls out of
//! plain text, §4.3), so this trait only needs one shape: `generate`, plus
//! a streaming variant for the dashboard's live-token display.

use tarsy_domain::capability::LlmCapabilities;
use tarsy_domain::config::NativeToolsOverride;
use tarsy_domain::error::Result;
use tarsy_domain::stream::{BoxStream, StreamEvent, Usage};
use tarsy_domain::tool::Message;
use uuid::Uuid;

/// Per-call options threaded through `generate`, matching §6's signature
/// `generate(conversation, options) → response`.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Provider id override; `None` uses the agent's configured provider.
    pub provider: Option<String>,
    /// Model id override; `None` uses the provider's default model.
    pub model: Option<String>,
    pub native_tools_override: Option<NativeToolsOverride>,
    /// `"high"` requests extended thinking (native-thinking controller, §4.3.3).
    pub thinking_level: Option<String>,
    /// Opaque bookkeeping forwarded to providers that report parallel-call
    /// context in their responses; never interpreted by the core.
    pub parallel_metadata: Option<serde_json::Value>,
    pub session_id: Uuid,
    pub stage_execution_id: Option<Uuid>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            provider: None,
            model: None,
            native_tools_override: None,
            thinking_level: None,
            parallel_metadata: None,
            session_id,
            stage_execution_id: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// A provider-agnostic generation response (§6).
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    /// Present only when the provider returns extended-thinking content
    /// (native-thinking controller, §4.3.3).
    pub thinking_content: Option<String>,
    /// Opaque provider metadata (e.g. grounding chunks) captured verbatim
    /// into the interaction's `response_metadata` (§4.3.3).
    pub response_metadata: Option<serde_json::Value>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Trait every LLM adapter must implement.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        conversation: &[Message],
        options: GenerateOptions,
    ) -> Result<GenerateResponse>;

    async fn generate_stream(
        &self,
        conversation: &[Message],
        options: GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    fn capabilities(&self) -> &LlmCapabilities;

    fn provider_id(&self) -> &str;
}
