//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API, including the Anthropic-specific
//! message structure where system messages go in a separate top-level
//! `system` field and optional extended-thinking blocks. Tarsy's controllers
//! never rely on provider-native tool calling (§4.3 parses tool calls out of
//! plain text), so this adapter carries no `tools`/`tool_use` wiring.

use crate::traits::{GenerateOptions, GenerateResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key_env};
use serde_json::Value;
use tarsy_domain::capability::LlmCapabilities;
use tarsy_domain::config::ProviderConfig;
use tarsy_domain::error::{Error, Result};
use tarsy_domain::stream::{BoxStream, StreamEvent, Usage};
use tarsy_domain::tool::{Message, MessageContent, Role};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4_096;
const THINKING_BUDGET_TOKENS: u32 = 8_000;

pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key_env(&cfg.api_key_env)?;
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "claude-sonnet-4-20250514".into());

        let capabilities = LlmCapabilities {
            supports_thinking: true,
            supports_streaming: true,
            supports_native_tools_override: false,
            context_window_tokens: Some(200_000),
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            capabilities,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(
        &self,
        conversation: &[Message],
        options: &GenerateOptions,
        stream: bool,
    ) -> Value {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut system_parts: Vec<String> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in conversation {
            match msg.role {
                Role::System => system_parts.push(msg.content.extract_all_text()),
                Role::User | Role::Tool => api_messages.push(serde_json::json!({
                    "role": "user",
                    "content": msg.content.extract_all_text(),
                })),
                Role::Assistant => api_messages.push(serde_json::json!({
                    "role": "assistant",
                    "content": msg.content.extract_all_text(),
                })),
            }
        }

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "stream": stream,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        if let Some(temp) = options.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if options.thinking_level.as_deref() == Some("high") {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": THINKING_BUDGET_TOKENS,
            });
        }

        body
    }
}

fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens")?.as_u64()? as u32;
    Some(Usage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

fn parse_anthropic_response(body: &Value) -> Result<GenerateResponse> {
    let content_arr = body
        .get("content")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut text_parts: Vec<String> = Vec::new();
    let mut thinking_parts: Vec<String> = Vec::new();

    for block in &content_arr {
        match block.get("type").and_then(|v| v.as_str()).unwrap_or("") {
            "text" => {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    text_parts.push(t.to_string());
                }
            }
            "thinking" => {
                if let Some(t) = block.get("thinking").and_then(|v| v.as_str()) {
                    thinking_parts.push(t.to_string());
                }
            }
            _ => {}
        }
    }

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let finish_reason = body
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let usage = body.get("usage").and_then(parse_anthropic_usage);

    Ok(GenerateResponse {
        content: text_parts.join(""),
        thinking_content: if thinking_parts.is_empty() {
            None
        } else {
            Some(thinking_parts.join(""))
        },
        response_metadata: None,
        usage,
        model,
        finish_reason,
    })
}

/// Assembles streamed SSE events into [`StreamEvent`]s; Anthropic splits
/// text across many `content_block_delta` events per response.
struct StreamState {
    usage: Option<Usage>,
    done_emitted: bool,
}

fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    match v.get("type").and_then(|v| v.as_str()).unwrap_or("") {
        "message_start" => {
            if let Some(msg) = v.get("message") {
                state.usage = msg.get("usage").and_then(parse_anthropic_usage);
            }
        }
        "content_block_delta" => {
            if let Some(text) = v
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|v| v.as_str())
            {
                if !text.is_empty() {
                    events.push(Ok(StreamEvent::Token {
                        text: text.to_string(),
                    }));
                }
            }
        }
        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
            {
                if let Some(ref mut u) = state.usage {
                    u.completion_tokens = output as u32;
                    u.total_tokens = u.prompt_tokens + u.completion_tokens;
                }
            }
            if let Some(stop_reason) = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
            {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage.clone(),
                    finish_reason: Some(stop_reason.to_string()),
                }));
            }
        }
        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage.clone(),
                    finish_reason: Some("end_turn".into()),
                }));
            }
        }
        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            events.push(Ok(StreamEvent::Error {
                message: msg.to_string(),
            }));
        }
        _ => {}
    }

    events
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(
        &self,
        conversation: &[Message],
        options: GenerateOptions,
    ) -> Result<GenerateResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(conversation, &options, false);

        tracing::debug!(
            provider = %self.id,
            session_id = %options.session_id,
            "anthropic generate request"
        );

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_anthropic_response(&resp_json)
    }

    async fn generate_stream(
        &self,
        conversation: &[Message],
        options: GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(conversation, &options, true);
        let provider_id = self.id.clone();

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: provider_id,
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        let mut state = StreamState {
            usage: None,
            done_emitted: false,
        };
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            parse_anthropic_sse(data, &mut state)
        }))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_system_and_usage_from_response() {
        let body = serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": "pods are crashlooping"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 120, "output_tokens": 40},
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.content, "pods are crashlooping");
        assert_eq!(resp.finish_reason.as_deref(), Some("end_turn"));
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, 160);
    }

    #[test]
    fn captures_thinking_content_separately_from_text() {
        let body = serde_json::json!({
            "model": "claude-3-opus-20240229",
            "content": [
                {"type": "thinking", "thinking": "checking recent deploys first"},
                {"type": "text", "text": "rollout caused the crash loop"},
            ],
            "stop_reason": "end_turn",
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.content, "rollout caused the crash loop");
        assert_eq!(
            resp.thinking_content.as_deref(),
            Some("checking recent deploys first")
        );
    }

    #[test]
    fn build_body_enables_thinking_only_at_high_level() {
        let provider = AnthropicProvider {
            id: "anthropic".into(),
            base_url: "https://api.anthropic.com".into(),
            api_key: "test".into(),
            default_model: "claude-sonnet-4-20250514".into(),
            capabilities: LlmCapabilities::default(),
            client: reqwest::Client::new(),
        };
        let mut options = GenerateOptions::new(uuid::Uuid::nil());
        options.thinking_level = Some("high".into());
        let body = provider.build_messages_body(&[Message::user("hi")], &options, false);
        assert_eq!(body["thinking"]["type"], "enabled");

        let options_default = GenerateOptions::new(uuid::Uuid::nil());
        let body_default =
            provider.build_messages_body(&[Message::user("hi")], &options_default, false);
        assert!(body_default.get("thinking").is_none());
    }
}
