//! The Synthesis and Native-Thinking controllers (§4.3 variants 2 and 3):
//! one tool-less LLM call over the accumulated investigation, optionally
//! requesting extended thinking.
//!
//! §9's tagged-variant strategy names five values
//! (`react | synthesis | native_thinking | react_stage |
//! synthesis_native_thinking`) for what the original distinguished at the
//! controller-class level. `react_stage` shares `ReactController` with
//! `react` (both need MCP tools, §4.3's `needs_mcp_tools`). `native_thinking`
//! and `synthesis_native_thinking` both resolve to this controller with
//! `thinking = true` — the original's split between "thinking over one
//! stage's own context" and "thinking while synthesizing prior stages" isn't
//! distinguishable at the `StageContext` level this crate exposes (prior
//! outputs are simply empty for the former), so one struct covers both. See
//! DESIGN.md for this Open-Question resolution.

use async_trait::async_trait;
use uuid::Uuid;

use tarsy_domain::error::{Error, Result};
use tarsy_domain::taxonomy::AnalysisError;
use tarsy_domain::tool::Message;
use tarsy_providers::GenerateOptions;

use crate::cancel::format_interaction_timeout;
use crate::clock::now_us;
use crate::controllers::{build_initial_user_message, build_system_prompt, ControllerOutcome, IterationController, StageContext};

/// Tool-less single-call controller. `thinking = true` requests
/// `thinking_level = "high"` and captures any returned thinking content
/// (§4.3 variant 3).
pub struct SynthesisController {
    pub thinking: bool,
}

impl SynthesisController {
    pub fn new() -> Self {
        Self { thinking: false }
    }

    pub fn with_thinking() -> Self {
        Self { thinking: true }
    }
}

impl Default for SynthesisController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IterationController for SynthesisController {
    async fn execute(&self, ctx: &StageContext) -> Result<ControllerOutcome> {
        let conversation = vec![
            Message::system(build_system_prompt(&ctx.agent)),
            Message::user(build_initial_user_message(ctx)),
        ];

        let mut options = GenerateOptions::new(ctx.session_id);
        options.stage_execution_id = Some(ctx.stage_execution_id);
        options.provider = ctx.agent.llm_provider_name.clone();
        options.native_tools_override = ctx.native_tools_override.clone();
        if self.thinking {
            options.thinking_level = Some("high".to_string());
        }

        let start = now_us();
        let response = tokio::time::timeout(ctx.remaining(), ctx.provider.generate(&conversation, options)).await;
        let duration_ms = (now_us() - start) / 1_000;

        let response = match response {
            Ok(Ok(r)) => {
                ctx.interactions
                    .log_llm(build_llm_interaction(ctx, &conversation, &r, duration_ms, true, None))
                    .await;
                r
            }
            Ok(Err(e)) => {
                ctx.interactions
                    .log_llm(build_llm_interaction_err(ctx, &conversation, duration_ms, e.to_string()))
                    .await;
                return Err(e);
            }
            Err(_elapsed) => {
                let message = format_interaction_timeout("llm call", duration_ms as f64 / 1_000.0, None);
                ctx.interactions
                    .log_llm(build_llm_interaction_err(ctx, &conversation, duration_ms, message.clone()))
                    .await;
                return Err(Error::Timeout(message));
            }
        };

        if response.content.trim().is_empty() {
            let err = AnalysisError::new("LLM returned an empty analysis", false);
            return Err(Error::Analysis(err));
        }

        Ok(ControllerOutcome {
            analysis: response.content,
            thinking_content: response.thinking_content,
            hit_iteration_limit: false,
        })
    }
}

fn build_llm_interaction(
    ctx: &StageContext,
    conversation: &[Message],
    response: &tarsy_providers::GenerateResponse,
    duration_ms: i64,
    success: bool,
    error: Option<String>,
) -> tarsy_domain::interaction::LlmInteraction {
    let response_json = serde_json::json!({
        "content": response.content,
        "thinking_content": response.thinking_content,
        "response_metadata": response.response_metadata,
    });

    tarsy_domain::interaction::LlmInteraction {
        interaction_id: Uuid::new_v4(),
        session_id: ctx.session_id,
        stage_execution_id: Some(ctx.stage_execution_id),
        mcp_event_id: None,
        model_name: ctx
            .agent
            .llm_provider_name
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        request_json: serde_json::to_value(conversation).unwrap_or(serde_json::Value::Null),
        response_json: Some(response_json),
        token_usage: response
            .usage
            .as_ref()
            .and_then(|u| serde_json::to_value(u).ok()),
        tool_calls: None,
        tool_results: None,
        duration_ms,
        success,
        error,
        timestamp_us: now_us(),
    }
}

fn build_llm_interaction_err(
    ctx: &StageContext,
    conversation: &[Message],
    duration_ms: i64,
    error: String,
) -> tarsy_domain::interaction::LlmInteraction {
    tarsy_domain::interaction::LlmInteraction {
        interaction_id: Uuid::new_v4(),
        session_id: ctx.session_id,
        stage_execution_id: Some(ctx.stage_execution_id),
        mcp_event_id: None,
        model_name: ctx
            .agent
            .llm_provider_name
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        request_json: serde_json::to_value(conversation).unwrap_or(serde_json::Value::Null),
        response_json: None,
        token_usage: None,
        tool_calls: None,
        tool_results: None,
        duration_ms,
        success: false,
        error: Some(error),
        timestamp_us: now_us(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_controller_has_no_thinking() {
        let c = SynthesisController::new();
        assert!(!c.thinking);
    }

    #[test]
    fn with_thinking_sets_flag() {
        let c = SynthesisController::with_thinking();
        assert!(c.thinking);
    }
}
