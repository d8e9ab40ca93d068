use serde::{Deserialize, Serialize};

/// What an `LlmProvider` adapter can do, for routing/validation at the
/// registry layer. Tarsy's controllers never use native tool-calling (the
/// ReAct loop parses tool calls out of plain text, §4.3) so this is
/// deliberately thinner than a general-purpose provider capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_thinking: bool,
    pub supports_streaming: bool,
    pub supports_native_tools_override: bool,
    pub context_window_tokens: Option<u32>,
}

impl Default for LlmCapabilities {
    fn default() -> Self {
        Self {
            supports_thinking: false,
            supports_streaming: true,
            supports_native_tools_override: false,
            context_window_tokens: None,
        }
    }
}
