//! Stage Executor (C4, §4.4): runs one stage execution end to end —
//! transition to active, build the controller and its context, run it
//! under a deadline, and record the terminal outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use tarsy_domain::config::{AgentDefinition, AgentsConfig};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::event::{session_channel, SessionEventPayload, CHANNEL_SESSIONS};
use tarsy_domain::stage::StageStatus;
use tarsy_domain::taxonomy::ConfigurationError;
use tarsy_mcp_client::McpManager;
use tarsy_providers::ProviderRegistry;

use crate::bus::EventBus;
use crate::cancel::{format_stage_timeout, CancellationTracker};
use crate::clock::now_us;
use crate::controllers::{build_controller, StageContext};
use crate::interactions::InteractionLog;
use crate::repo::{self, StageUpdate};
use crate::db::Pool;

pub struct StageExecutor {
    pool: Pool,
    agents: Arc<AgentsConfig>,
    providers: Arc<ProviderRegistry>,
    mcp: Arc<McpManager>,
    interactions: Arc<InteractionLog>,
    cancellation: Arc<CancellationTracker>,
    event_bus: Arc<dyn EventBus>,
}

/// Everything that varies between one chain's stages, collected by the
/// orchestrator before calling [`StageExecutor::run`].
pub struct StageRunInput {
    pub session_id: Uuid,
    pub execution_id: Uuid,
    pub stage_name: String,
    pub agent_name: String,
    pub alert_type: String,
    pub alert_payload: serde_json::Value,
    pub previous_stage_outputs: Vec<(String, serde_json::Value)>,
    /// Deadline inherited from the session (§4.4 step 4: `min(remaining
    /// session budget, controller-specific cap)` is computed here from
    /// this plus `stage_timeout_s`).
    pub session_deadline: Instant,
    pub session_timeout_s: u64,
    pub session_started_at: Instant,
    pub stage_timeout_s: Option<u64>,
}

impl StageExecutor {
    pub fn new(
        pool: Pool,
        agents: Arc<AgentsConfig>,
        providers: Arc<ProviderRegistry>,
        mcp: Arc<McpManager>,
        interactions: Arc<InteractionLog>,
        cancellation: Arc<CancellationTracker>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            pool,
            agents,
            providers,
            mcp,
            interactions,
            cancellation,
            event_bus,
        }
    }

    fn resolve_agent(&self, name: &str) -> Result<AgentDefinition> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(ConfigurationError::new(format!("unknown agent '{name}'"), false)))
    }

    async fn publish_session_event(&self, session_id: Uuid, payload: SessionEventPayload) {
        let value = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
        for channel in [CHANNEL_SESSIONS.to_string(), session_channel(&session_id)] {
            if let Err(e) = self.event_bus.publish(&channel, value.clone()).await {
                tracing::warn!(%session_id, %channel, error = %e, "failed to publish session event");
            }
        }
    }

    /// Runs one stage execution to completion (§4.4 steps 1-7). Returns
    /// the terminal [`StageStatus`]; the caller (orchestrator) uses it to
    /// decide whether to continue the chain.
    pub async fn run(&self, input: StageRunInput) -> Result<StageStatus> {
        let started_at_us = now_us();

        repo::update_stage_execution(
            &self.pool,
            input.execution_id,
            &StageUpdate {
                status: Some(StageStatus::Active),
                started_at_us: Some(started_at_us),
                ..Default::default()
            },
        )
        .await?;

        self.publish_session_event(
            input.session_id,
            SessionEventPayload::StageStarted {
                session_id: input.session_id,
                stage_execution_id: input.execution_id,
                stage_name: input.stage_name.clone(),
            },
        )
        .await;

        let agent = match self.resolve_agent(&input.agent_name) {
            Ok(a) => a,
            Err(e) => {
                return self.fail_stage(&input, started_at_us, e.to_string()).await;
            }
        };

        let provider = match self
            .providers
            .get(agent.llm_provider_name.as_deref().unwrap_or_default())
            .or_else(|| self.providers.get("default"))
        {
            Some(p) => p,
            None => {
                let msg = format!(
                    "no LLM provider available for agent '{}' (configured: {:?})",
                    agent.name, agent.llm_provider_name
                );
                return self.fail_stage(&input, started_at_us, msg).await;
            }
        };

        let stage_cap = input
            .stage_timeout_s
            .map(Duration::from_secs)
            .unwrap_or_else(|| input.session_deadline.saturating_duration_since(Instant::now()));
        let remaining_session = input.session_deadline.saturating_duration_since(Instant::now());
        let deadline = Instant::now() + stage_cap.min(remaining_session);

        let ctx = StageContext {
            session_id: input.session_id,
            stage_execution_id: input.execution_id,
            alert_type: input.alert_type.clone(),
            alert_payload: input.alert_payload.clone(),
            previous_stage_outputs: input.previous_stage_outputs.clone(),
            native_tools_override: agent.native_tools_override.clone(),
            deadline,
            provider,
            mcp: self.mcp.clone(),
            interactions: self.interactions.clone(),
            cancellation: self.cancellation.clone(),
            agent,
        };

        let controller = build_controller(ctx.agent.iteration_strategy);
        let remaining = ctx.remaining();

        let outcome = tokio::time::timeout(remaining, controller.execute(&ctx)).await;

        match outcome {
            Ok(Ok(result)) => {
                let completed_at_us = now_us();
                let duration_ms = (completed_at_us - started_at_us) / 1_000;
                let stage_output = serde_json::json!({
                    "analysis": result.analysis,
                    "thinking_content": result.thinking_content,
                    "hit_iteration_limit": result.hit_iteration_limit,
                });

                repo::update_stage_execution(
                    &self.pool,
                    input.execution_id,
                    &StageUpdate {
                        status: Some(StageStatus::Completed),
                        stage_output: Some(stage_output),
                        completed_at_us: Some(completed_at_us),
                        duration_ms: Some(duration_ms),
                        ..Default::default()
                    },
                )
                .await?;

                self.publish_session_event(
                    input.session_id,
                    SessionEventPayload::StageCompleted {
                        session_id: input.session_id,
                        stage_execution_id: input.execution_id,
                        stage_name: input.stage_name.clone(),
                    },
                )
                .await;

                Ok(StageStatus::Completed)
            }
            Ok(Err(e)) => self.fail_stage(&input, started_at_us, e.to_string()).await,
            Err(_elapsed) => {
                let stage_duration_s = (now_us() - started_at_us) as f64 / 1_000_000.0;
                let stage_start_offset_s = input.session_started_at.elapsed().as_secs_f64() - stage_duration_s;
                let message = format_stage_timeout(
                    &input.stage_name,
                    stage_duration_s,
                    stage_start_offset_s.max(0.0),
                    input.session_timeout_s,
                );
                self.fail_stage(&input, started_at_us, message).await
            }
        }
    }

    async fn fail_stage(&self, input: &StageRunInput, started_at_us: i64, error: String) -> Result<StageStatus> {
        let completed_at_us = now_us();
        let duration_ms = (completed_at_us - started_at_us) / 1_000;

        let status = if self.cancellation.is_user_cancel(input.session_id)
            || self.cancellation.is_user_cancel(input.execution_id)
        {
            StageStatus::Cancelled
        } else {
            StageStatus::Failed
        };

        repo::update_stage_execution(
            &self.pool,
            input.execution_id,
            &StageUpdate {
                status: Some(status),
                error: Some(error.clone()),
                completed_at_us: Some(completed_at_us),
                duration_ms: Some(duration_ms),
                ..Default::default()
            },
        )
        .await?;

        self.publish_session_event(
            input.session_id,
            SessionEventPayload::StageFailed {
                session_id: input.session_id,
                stage_execution_id: input.execution_id,
                stage_name: input.stage_name.clone(),
                error,
            },
        )
        .await;

        Ok(status)
    }
}
