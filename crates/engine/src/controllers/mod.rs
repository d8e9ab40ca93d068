//! Iteration Controllers (C3, §4.3): the algorithms that drive one stage.
//!
//! Three variants share one trait, [`IterationController`], so the stage
//! executor (C4) never needs to match on [`IterationStrategy`] itself beyond
//! picking which controller to construct (§9 redesign note: tagged variants
//! instead of dynamic polymorphism over controllers).

pub mod react;
pub mod synthesis;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use tarsy_domain::config::{AgentDefinition, NativeToolsOverride};
use tarsy_domain::error::Result;
use tarsy_domain::stage::IterationStrategy;
use tarsy_mcp_client::McpManager;
use tarsy_providers::LlmProvider;

use crate::cancel::CancellationTracker;
use crate::interactions::InteractionLog;

/// Resolves a [`IterationStrategy`] to the controller that runs it (§9: the
/// tagged-variant replacement for dynamic polymorphism over controllers).
pub fn build_controller(strategy: IterationStrategy) -> Box<dyn IterationController> {
    match strategy {
        IterationStrategy::React | IterationStrategy::ReactStage => Box::new(react::ReactController),
        IterationStrategy::Synthesis => Box::new(synthesis::SynthesisController::new()),
        IterationStrategy::NativeThinking | IterationStrategy::SynthesisNativeThinking => {
            Box::new(synthesis::SynthesisController::with_thinking())
        }
    }
}

/// Everything one stage invocation needs to run its controller (§4.4 step
/// 3): the session and alert context, prior stages' outputs (read-only),
/// the resolved agent, and a handle back to the shared collaborators for
/// interaction tagging.
pub struct StageContext {
    pub session_id: Uuid,
    pub stage_execution_id: Uuid,
    pub alert_type: String,
    pub alert_payload: Value,
    /// `(stage_name, stage_output)` for every already-completed stage in
    /// this session, in chain order. Read-only: a controller must never
    /// mutate another stage's record.
    pub previous_stage_outputs: Vec<(String, Value)>,
    pub agent: AgentDefinition,
    pub native_tools_override: Option<NativeToolsOverride>,
    pub deadline: Instant,
    pub provider: Arc<dyn LlmProvider>,
    pub mcp: Arc<McpManager>,
    pub interactions: Arc<InteractionLog>,
    pub cancellation: Arc<CancellationTracker>,
}

impl StageContext {
    /// True if either the whole session or this specific stage execution
    /// (§4.5 per-child cancellation) was user-cancelled. The tracker is a
    /// plain `Uuid` set, so a per-child cancel and a session-wide one share
    /// the same `mark_cancelled` call with different keys.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_user_cancel(self.session_id) || self.cancellation.is_user_cancel(self.stage_execution_id)
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Result of running a controller to completion. `hit_iteration_limit`
/// lets the stage executor decide whether to annotate a completed stage
/// with a warning rather than failing it outright (§4.3: `IterationLimitError`
/// is recoverable — the stage still synthesizes an answer from whatever the
/// conversation accumulated).
pub struct ControllerOutcome {
    pub analysis: String,
    pub thinking_content: Option<String>,
    pub hit_iteration_limit: bool,
}

#[async_trait]
pub trait IterationController: Send + Sync {
    async fn execute(&self, ctx: &StageContext) -> Result<ControllerOutcome>;
}

/// Builds the system prompt from an agent's general + custom instructions
/// (§4.3 "Controllers consult an agent configuration").
pub fn build_system_prompt(agent: &AgentDefinition) -> String {
    match &agent.custom_instructions {
        Some(custom) if !custom.is_empty() => {
            format!("{}\n\n{}", agent.general_instructions, custom)
        }
        _ => agent.general_instructions.clone(),
    }
}

/// Renders the alert payload and any prior stage outputs into the initial
/// user message every controller starts from.
pub fn build_initial_user_message(ctx: &StageContext) -> String {
    let mut sections = vec![format!(
        "Alert type: {}\nAlert payload:\n{}",
        ctx.alert_type,
        serde_json::to_string_pretty(&ctx.alert_payload).unwrap_or_default()
    )];

    if !ctx.previous_stage_outputs.is_empty() {
        let mut prior = String::from("Prior stage findings:\n");
        for (name, output) in &ctx.previous_stage_outputs {
            prior.push_str(&format!(
                "--- {name} ---\n{}\n",
                serde_json::to_string_pretty(output).unwrap_or_default()
            ));
        }
        sections.push(prior);
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn react_and_react_stage_need_mcp_tools() {
        assert!(IterationStrategy::React.needs_mcp_tools());
        assert!(IterationStrategy::ReactStage.needs_mcp_tools());
    }

    #[test]
    fn build_controller_covers_every_strategy() {
        for strategy in [
            IterationStrategy::React,
            IterationStrategy::ReactStage,
            IterationStrategy::Synthesis,
            IterationStrategy::NativeThinking,
            IterationStrategy::SynthesisNativeThinking,
        ] {
            let _ = build_controller(strategy);
        }
    }
}
