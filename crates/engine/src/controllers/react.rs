//! The ReAct controller (§4.3 variant 1): multi-turn reasoning over MCP
//! tools, parsing tool-call instructions out of plain assistant text rather
//! than relying on provider-native tool calling (§9 redesign note: "strict
//! schema... validated at parse time; invalid calls become feedback, not
//! exceptions").

use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use tarsy_domain::error::Result;
use tarsy_domain::interaction::{McpCommunicationType, McpInteraction};
use tarsy_domain::taxonomy::{IterationLimitError, ToolExecutionError, ToolSelectionError};
use tarsy_domain::tool::Message;
use tarsy_providers::GenerateOptions;

use crate::cancel::format_interaction_timeout;
use crate::clock::now_us;
use crate::controllers::{build_initial_user_message, build_system_prompt, ControllerOutcome, IterationController, StageContext};

pub struct ReactController;

/// One parsed tool-call instruction, per the strict schema `{server, tool,
/// parameters, reason}` (§9). Arguments are kept as `Value`; the dedup key
/// is derived separately since `Value` doesn't implement `Hash`.
#[derive(Debug, Clone, Deserialize)]
struct ParsedToolCall {
    server: String,
    tool: String,
    parameters: Value,
    #[serde(default)]
    #[allow(dead_code)]
    reason: String,
}

impl ParsedToolCall {
    fn dedup_key(&self) -> String {
        format!("{}::{}::{}", self.server, self.tool, self.parameters)
    }
}

/// Extract the first balanced top-level JSON array substring from `text`,
/// tolerating surrounding prose (the model rarely replies with *only* the
/// array).
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_tool_calls(text: &str) -> std::result::Result<Vec<ParsedToolCall>, String> {
    let array_slice = extract_json_array(text).ok_or_else(|| "no JSON array found in response".to_string())?;
    serde_json::from_str::<Vec<ParsedToolCall>>(array_slice).map_err(|e| e.to_string())
}

fn tool_selection_feedback(error: &str, llm_response: &str) -> String {
    serde_json::json!({
        "tool_selection_error": {
            "error": error,
            "message": "Your response could not be parsed as a tool-call instruction.",
            "llm_response": llm_response,
            "required_format": {
                "description": "Respond with a JSON array of tool calls, or an empty array/plain text for a final answer.",
                "fields": ["server", "tool", "parameters", "reason"],
                "format": "[{\"server\": \"<mcp server>\", \"tool\": \"<tool name>\", \"parameters\": {}, \"reason\": \"<why>\"}]",
            }
        }
    })
    .to_string()
}

fn tool_execution_feedback(server: &str, tool: &str, error_type: &str, message: &str) -> String {
    serde_json::json!({
        "tool": tool,
        "server": server,
        "error": true,
        "error_type": error_type,
        "message": message,
    })
    .to_string()
}

#[async_trait]
impl IterationController for ReactController {
    async fn execute(&self, ctx: &StageContext) -> Result<ControllerOutcome> {
        let mut conversation = vec![
            Message::system(build_system_prompt(&ctx.agent)),
            Message::user(build_initial_user_message(ctx)),
        ];

        let max_iterations = ctx.agent.max_iterations;
        let mut last_text = String::new();

        for iteration in 0..max_iterations {
            if ctx.is_cancelled() || ctx.is_expired() {
                return Ok(ControllerOutcome {
                    analysis: last_text,
                    thinking_content: None,
                    hit_iteration_limit: false,
                });
            }

            let mut options = GenerateOptions::new(ctx.session_id);
            options.stage_execution_id = Some(ctx.stage_execution_id);
            options.provider = ctx.agent.llm_provider_name.clone();

            let llm_start = now_us();
            let response = tokio::time::timeout(ctx.remaining(), ctx.provider.generate(&conversation, options)).await;

            let duration_ms = (now_us() - llm_start) / 1_000;
            let response = match response {
                Ok(Ok(r)) => {
                    ctx.interactions
                        .log_llm(build_llm_interaction(ctx, &conversation, &r.content, duration_ms, true, None))
                        .await;
                    r
                }
                Ok(Err(e)) => {
                    ctx.interactions
                        .log_llm(build_llm_interaction(ctx, &conversation, "", duration_ms, false, Some(e.to_string())))
                        .await;
                    return Err(e);
                }
                Err(_elapsed) => {
                    let message = format_interaction_timeout(
                        "llm call",
                        duration_ms as f64 / 1_000.0,
                        Some(&format!("react iteration {iteration}")),
                    );
                    ctx.interactions
                        .log_llm(build_llm_interaction(ctx, &conversation, "", duration_ms, false, Some(message.clone())))
                        .await;
                    return Err(tarsy_domain::error::Error::Timeout(message));
                }
            };

            last_text = response.content.clone();

            let tool_calls = match parse_tool_calls(&response.content) {
                Ok(calls) => calls,
                Err(parse_err) => {
                    let err = ToolSelectionError::new(parse_err.clone(), true);
                    tracing::debug!(%parse_err, iteration, "react: tool-call parse failed, feeding back");
                    conversation.push(Message::assistant(&response.content));
                    conversation.push(Message::user(tool_selection_feedback(&err.to_string(), &response.content)));
                    continue;
                }
            };

            if tool_calls.is_empty() {
                return Ok(ControllerOutcome {
                    analysis: response.content,
                    thinking_content: response.thinking_content,
                    hit_iteration_limit: false,
                });
            }

            conversation.push(Message::assistant(&response.content));

            // Dedup identical (server, tool, parameters) calls within one
            // iteration before dispatch (§4.3 tie-break).
            let mut seen = HashSet::new();
            let deduped: Vec<ParsedToolCall> = tool_calls
                .into_iter()
                .filter(|c| seen.insert(c.dedup_key()))
                .collect();

            let futures = deduped.iter().map(|call| dispatch_tool_call(ctx, call));
            let results = join_all(futures).await;

            for (call, result_text) in deduped.iter().zip(results) {
                conversation.push(Message::tool_result(
                    format!("{}:{}", call.server, call.tool),
                    result_text,
                ));
            }
        }

        let err = IterationLimitError::new(
            format!("Reached maximum iterations: {max_iterations}/{max_iterations}"),
            true,
        );
        tracing::warn!(%err, session_id = %ctx.session_id, "react: iteration limit reached, synthesizing from accumulated context");

        Ok(ControllerOutcome {
            analysis: last_text,
            thinking_content: None,
            hit_iteration_limit: true,
        })
    }
}

async fn dispatch_tool_call(ctx: &StageContext, call: &ParsedToolCall) -> String {
    if !ctx.agent.mcp_servers.is_empty() && !ctx.agent.mcp_servers.iter().any(|s| s == &call.server) {
        return tool_execution_feedback(
            &call.server,
            &call.tool,
            "unauthorized_server",
            &format!("server '{}' is not in this agent's MCP whitelist", call.server),
        );
    }

    let start = now_us();
    let result = tokio::time::timeout(
        ctx.remaining(),
        ctx.mcp
            .call_tool(ctx.session_id, &call.server, &call.tool, call.parameters.clone()),
    )
    .await;
    let duration_ms = (now_us() - start) / 1_000;

    let result = match result {
        Ok(r) => r,
        Err(_elapsed) => {
            let message = format_interaction_timeout(
                "mcp call",
                duration_ms as f64 / 1_000.0,
                Some(&format!("tool: {}", call.tool)),
            );
            ctx.interactions
                .log_mcp_call(McpInteraction {
                    interaction_id: Uuid::new_v4(),
                    session_id: ctx.session_id,
                    stage_execution_id: Some(ctx.stage_execution_id),
                    server_name: call.server.clone(),
                    communication_type: McpCommunicationType::ToolCall,
                    tool_name: Some(call.tool.clone()),
                    tool_arguments: Some(call.parameters.clone()),
                    tool_result: None,
                    available_tools: None,
                    duration_ms,
                    success: false,
                    error: Some(message.clone()),
                    timestamp_us: start,
                })
                .await;
            return tool_execution_feedback(&call.server, &call.tool, "timeout", &message);
        }
    };

    match result {
        Ok(tool_result) => {
            let text = tool_result
                .content
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            ctx.interactions
                .log_mcp_call(McpInteraction {
                    interaction_id: Uuid::new_v4(),
                    session_id: ctx.session_id,
                    stage_execution_id: Some(ctx.stage_execution_id),
                    server_name: call.server.clone(),
                    communication_type: McpCommunicationType::ToolCall,
                    tool_name: Some(call.tool.clone()),
                    tool_arguments: Some(call.parameters.clone()),
                    tool_result: Some(serde_json::json!({ "content": text, "is_error": tool_result.is_error })),
                    available_tools: None,
                    duration_ms,
                    success: !tool_result.is_error,
                    error: None,
                    timestamp_us: start,
                })
                .await;

            if tool_result.is_error {
                tool_execution_feedback(&call.server, &call.tool, "tool_error", &text)
            } else {
                text
            }
        }
        Err(e) => {
            let err = ToolExecutionError::new(e.to_string(), true);
            ctx.interactions
                .log_mcp_call(McpInteraction {
                    interaction_id: Uuid::new_v4(),
                    session_id: ctx.session_id,
                    stage_execution_id: Some(ctx.stage_execution_id),
                    server_name: call.server.clone(),
                    communication_type: McpCommunicationType::ToolCall,
                    tool_name: Some(call.tool.clone()),
                    tool_arguments: Some(call.parameters.clone()),
                    tool_result: None,
                    available_tools: None,
                    duration_ms,
                    success: false,
                    error: Some(err.to_string()),
                    timestamp_us: start,
                })
                .await;

            tool_execution_feedback(&call.server, &call.tool, "transport_error", &err.to_string())
        }
    }
}

fn build_llm_interaction(
    ctx: &StageContext,
    conversation: &[Message],
    response_text: &str,
    duration_ms: i64,
    success: bool,
    error: Option<String>,
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
        request_json: serde_json::to_value(conversation).unwrap_or(Value::Null),
        response_json: Some(serde_json::json!({ "content": response_text })),
        token_usage: None,
        tool_calls: None,
        tool_results: None,
        duration_ms,
        success,
        error,
        timestamp_us: now_us(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_array_with_surrounding_prose() {
        let text = "Sure, here are the tools:\n[{\"server\":\"kubectl\",\"tool\":\"get_pods\",\"parameters\":{},\"reason\":\"check\"}]\nDone.";
        let array = extract_json_array(text).unwrap();
        let calls: Vec<ParsedToolCall> = serde_json::from_str(array).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "get_pods");
    }

    #[test]
    fn empty_array_means_final_answer() {
        let calls = parse_tool_calls("[]").unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_error_not_a_panic() {
        assert!(parse_tool_calls("not json at all").is_err());
    }

    #[test]
    fn dedup_key_distinguishes_by_arguments() {
        let a = ParsedToolCall {
            server: "kubectl".into(),
            tool: "get_pods".into(),
            parameters: serde_json::json!({"ns": "a"}),
            reason: String::new(),
        };
        let b = ParsedToolCall {
            server: "kubectl".into(),
            tool: "get_pods".into(),
            parameters: serde_json::json!({"ns": "b"}),
            reason: String::new(),
        };
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn identical_calls_dedup_to_one_key() {
        let a = ParsedToolCall {
            server: "kubectl".into(),
            tool: "get_pods".into(),
            parameters: serde_json::json!({"ns": "a"}),
            reason: "first".into(),
        };
        let b = ParsedToolCall {
            server: "kubectl".into(),
            tool: "get_pods".into(),
            parameters: serde_json::json!({"ns": "a"}),
            reason: "different reason text".into(),
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
