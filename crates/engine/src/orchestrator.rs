//! Chain Orchestrator (C5, §4.5): walks a chain's ordered stage specs for a
//! claimed session, fanning out `multi_agent`/`replica` stages across
//! concurrent children and deriving the parent's status from the join via
//! [`tarsy_domain::stage::derive_parent_status`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

use tarsy_domain::config::{AgentsConfig, ChainsConfig, SessionConfig, StageSpec};
use tarsy_domain::event::{session_channel, SessionEventPayload, CHANNEL_SESSIONS};
use tarsy_domain::session::{Session, SessionStatus};
use tarsy_domain::stage::{derive_parent_status, ParallelType, StageExecution, StageStatus};
use tarsy_domain::taxonomy::ConfigurationError;
use tarsy_mcp_client::McpManager;
use tarsy_providers::ProviderRegistry;

use crate::bus::EventBus;
use crate::cancel::CancellationTracker;
use crate::clock::now_us;
use crate::interactions::InteractionLog;
use crate::repo;
use crate::db::Pool;
use crate::stage_executor::{StageExecutor, StageRunInput};

pub struct Orchestrator {
    pool: Pool,
    agents: Arc<AgentsConfig>,
    chains: Arc<ChainsConfig>,
    session_config: Arc<SessionConfig>,
    executor: StageExecutor,
    cancellation: Arc<CancellationTracker>,
    event_bus: Arc<dyn EventBus>,
}

/// Outcome of walking one stage spec, folded back into the chain loop.
struct StageOutcome {
    status: StageStatus,
    /// `(stage_name, value)` to append to the running `previous_stage_outputs`
    /// list, or `None` if the stage produced nothing usable downstream
    /// (e.g. every child failed).
    output: Option<(String, Value)>,
    error: Option<String>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Pool,
        agents: Arc<AgentsConfig>,
        chains: Arc<ChainsConfig>,
        session_config: Arc<SessionConfig>,
        providers: Arc<ProviderRegistry>,
        mcp: Arc<McpManager>,
        interactions: Arc<InteractionLog>,
        cancellation: Arc<CancellationTracker>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        let executor = StageExecutor::new(
            pool.clone(),
            agents.clone(),
            providers,
            mcp,
            interactions,
            cancellation.clone(),
            event_bus.clone(),
        );
        Self {
            pool,
            agents,
            chains,
            session_config,
            executor,
            cancellation,
            event_bus,
        }
    }

    /// Per-child cancellation (§4.5): cancels one running stage execution
    /// without touching the rest of the session. The tracker is a plain
    /// `Uuid` set so this shares `mark_cancelled` with session-wide cancels
    /// (§4.7); the running controller picks it up on its next liveness
    /// check and the stage executor records the terminal status.
    pub fn cancel_stage(&self, stage_execution_id: Uuid) {
        self.cancellation.mark_cancelled(stage_execution_id);
    }

    async fn publish_session_event(&self, session_id: Uuid, payload: SessionEventPayload) {
        let value = serde_json::to_value(&payload).unwrap_or(Value::Null);
        for channel in [CHANNEL_SESSIONS.to_string(), session_channel(&session_id)] {
            if let Err(e) = self.event_bus.publish(&channel, value.clone()).await {
                tracing::warn!(%session_id, %channel, error = %e, "orchestrator: failed to publish session event");
            }
        }
    }

    /// Runs a claimed session's chain end to end (§4.5). Persists the
    /// session's terminal status and publishes the matching lifecycle event
    /// before returning; the caller (claim loop) doesn't need to do either.
    pub async fn run_session(&self, session: Session) {
        let session_id = session.session_id;
        self.publish_session_event(session_id, SessionEventPayload::SessionStarted { session_id }).await;

        let chain = match self.chains.for_alert_type(&session.alert_type) {
            Some(c) => c.clone(),
            None => {
                let err = ConfigurationError::new(format!("no chain configured for alert_type '{}'", session.alert_type), false);
                self.finish_session(session_id, SessionStatus::Failed, Some(err.to_string())).await;
                return;
            }
        };

        let session_timeout_s = self.session_config.session_timeout_s;
        let session_started_at = Instant::now();
        let session_deadline = session_started_at + Duration::from_secs(session_timeout_s);

        let mut previous_stage_outputs: Vec<(String, Value)> = Vec::new();
        let mut final_status = SessionStatus::Completed;
        let mut final_error: Option<String> = None;

        for (stage_index, spec) in chain.stages.iter().enumerate() {
            if self.cancellation.is_user_cancel(session_id) {
                final_status = SessionStatus::Cancelled;
                break;
            }

            let outcome = self
                .run_stage_spec(
                    &session,
                    stage_index as u32,
                    spec,
                    &previous_stage_outputs,
                    session_deadline,
                    session_timeout_s,
                    session_started_at,
                )
                .await;

            if let Some(output) = outcome.output {
                previous_stage_outputs.push(output);
            }

            match outcome.status {
                StageStatus::Completed => continue,
                StageStatus::Cancelled => {
                    final_status = SessionStatus::Cancelled;
                    final_error = outcome.error;
                    break;
                }
                StageStatus::Failed => {
                    let continue_on_failure = spec.effective_continue_on_failure(self.session_config.continue_on_failure_default);
                    if continue_on_failure {
                        continue;
                    }
                    final_status = SessionStatus::Failed;
                    final_error = outcome.error;
                    break;
                }
                StageStatus::Pending | StageStatus::Active => {
                    // Unreachable: stage execution always resolves to a
                    // terminal status before `run_stage_spec` returns.
                    final_status = SessionStatus::Failed;
                    final_error = Some("stage execution returned a non-terminal status".to_string());
                    break;
                }
            }
        }

        self.finish_session(session_id, final_status, final_error).await;
    }

    async fn finish_session(&self, session_id: Uuid, status: SessionStatus, error: Option<String>) {
        let completed_at_us = now_us();
        if let Err(e) = repo::update_session_status(&self.pool, session_id, status, error.as_deref(), Some(completed_at_us)).await {
            tracing::error!(%session_id, error = %e, "orchestrator: failed to persist session terminal status");
        }

        let payload = match status {
            SessionStatus::Completed => SessionEventPayload::SessionCompleted { session_id },
            SessionStatus::Cancelled => SessionEventPayload::SessionCancelled { session_id },
            _ => SessionEventPayload::SessionFailed {
                session_id,
                error: error.unwrap_or_else(|| "session failed".to_string()),
            },
        };
        self.publish_session_event(session_id, payload).await;
    }

    async fn run_stage_spec(
        &self,
        session: &Session,
        stage_index: u32,
        spec: &StageSpec,
        previous_stage_outputs: &[(String, Value)],
        session_deadline: Instant,
        session_timeout_s: u64,
        session_started_at: Instant,
    ) -> StageOutcome {
        match spec.parallel_type {
            ParallelType::Single => {
                self.run_single_stage(session, stage_index, spec, previous_stage_outputs, session_deadline, session_timeout_s, session_started_at)
                    .await
            }
            ParallelType::MultiAgent | ParallelType::Replica => {
                self.run_fanout_stage(session, stage_index, spec, previous_stage_outputs, session_deadline, session_timeout_s, session_started_at)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_single_stage(
        &self,
        session: &Session,
        stage_index: u32,
        spec: &StageSpec,
        previous_stage_outputs: &[(String, Value)],
        session_deadline: Instant,
        session_timeout_s: u64,
        session_started_at: Instant,
    ) -> StageOutcome {
        let stage = StageExecution::new_pending(
            session.session_id,
            stage_index,
            &spec.name,
            &spec.agent,
            self.agent_strategy(&spec.agent),
            ParallelType::Single,
            0,
            None,
        );

        if let Err(e) = repo::create_stage_execution(&self.pool, &stage).await {
            tracing::error!(session_id = %session.session_id, error = %e, "orchestrator: failed to create stage execution row");
            return StageOutcome { status: StageStatus::Failed, output: None, error: Some(e.to_string()) };
        }

        let input = StageRunInput {
            session_id: session.session_id,
            execution_id: stage.execution_id,
            stage_name: spec.name.clone(),
            agent_name: spec.agent.clone(),
            alert_type: session.alert_type.clone(),
            alert_payload: session.alert_payload.clone(),
            previous_stage_outputs: previous_stage_outputs.to_vec(),
            session_deadline,
            session_timeout_s,
            session_started_at,
            stage_timeout_s: spec.stage_timeout_s,
        };

        let status = match self.executor.run(input).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(session_id = %session.session_id, error = %e, "orchestrator: stage executor returned an error");
                return StageOutcome { status: StageStatus::Failed, output: None, error: Some(e.to_string()) };
            }
        };

        let persisted = repo::get_stage_execution(&self.pool, stage.execution_id).await.ok().flatten();
        let output = persisted
            .as_ref()
            .and_then(|s| s.stage_output.clone())
            .map(|v| (spec.name.clone(), v));
        let error = persisted.and_then(|s| s.error);

        StageOutcome { status, output, error }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_fanout_stage(
        &self,
        session: &Session,
        stage_index: u32,
        spec: &StageSpec,
        previous_stage_outputs: &[(String, Value)],
        session_deadline: Instant,
        session_timeout_s: u64,
        session_started_at: Instant,
    ) -> StageOutcome {
        let parent = StageExecution {
            status: StageStatus::Active,
            started_at_us: Some(now_us()),
            ..StageExecution::new_pending(
                session.session_id,
                stage_index,
                &spec.name,
                &spec.agent,
                self.agent_strategy(&spec.agent),
                spec.parallel_type,
                0,
                None,
            )
        };

        if let Err(e) = repo::create_stage_execution(&self.pool, &parent).await {
            tracing::error!(session_id = %session.session_id, error = %e, "orchestrator: failed to create parent stage execution row");
            return StageOutcome { status: StageStatus::Failed, output: None, error: Some(e.to_string()) };
        }

        self.publish_session_event(
            session.session_id,
            SessionEventPayload::StageStarted {
                session_id: session.session_id,
                stage_execution_id: parent.execution_id,
                stage_name: spec.name.clone(),
            },
        )
        .await;

        let fan_out = spec.fan_out.max(1);
        let mut children = Vec::with_capacity(fan_out as usize);
        for parallel_index in 0..fan_out {
            let child = StageExecution::new_pending(
                session.session_id,
                stage_index,
                &spec.name,
                &spec.agent,
                self.agent_strategy(&spec.agent),
                spec.parallel_type,
                parallel_index,
                Some(parent.execution_id),
            );
            if let Err(e) = repo::create_stage_execution(&self.pool, &child).await {
                tracing::error!(session_id = %session.session_id, error = %e, "orchestrator: failed to create child stage execution row");
                continue;
            }
            children.push(child);
        }

        let futures = children.iter().map(|child| {
            let input = StageRunInput {
                session_id: session.session_id,
                execution_id: child.execution_id,
                stage_name: spec.name.clone(),
                agent_name: spec.agent.clone(),
                alert_type: session.alert_type.clone(),
                alert_payload: session.alert_payload.clone(),
                previous_stage_outputs: previous_stage_outputs.to_vec(),
                session_deadline,
                session_timeout_s,
                session_started_at,
                stage_timeout_s: spec.stage_timeout_s,
            };
            self.executor.run(input)
        });

        let results = futures_util::future::join_all(futures).await;
        let child_statuses: Vec<StageStatus> = results
            .iter()
            .map(|r| r.as_ref().ok().copied().unwrap_or(StageStatus::Failed))
            .collect();

        let continue_on_failure = spec.effective_continue_on_failure(self.session_config.continue_on_failure_default);
        let parent_status = if child_statuses.is_empty() {
            StageStatus::Failed
        } else {
            derive_parent_status(spec.parallel_type, &child_statuses, continue_on_failure)
        };

        let completed_at_us = now_us();
        let duration_ms = (completed_at_us - parent.started_at_us.unwrap_or(completed_at_us)) / 1_000;

        let mut child_outputs = Vec::new();
        let mut first_error = None;
        for child in &children {
            if let Ok(Some(row)) = repo::get_stage_execution(&self.pool, child.execution_id).await {
                if let Some(output) = &row.stage_output {
                    child_outputs.push(serde_json::json!({
                        "parallel_index": row.parallel_index,
                        "agent": row.agent,
                        "status": row.status,
                        "output": output,
                    }));
                }
                if first_error.is_none() {
                    first_error = row.error.clone();
                }
            }
        }

        let parent_output = serde_json::json!({ "children": child_outputs });

        if let Err(e) = repo::update_stage_execution(
            &self.pool,
            parent.execution_id,
            &repo::StageUpdate {
                status: Some(parent_status),
                stage_output: Some(parent_output.clone()),
                error: first_error.clone(),
                completed_at_us: Some(completed_at_us),
                duration_ms: Some(duration_ms),
                ..Default::default()
            },
        )
        .await
        {
            tracing::error!(session_id = %session.session_id, error = %e, "orchestrator: failed to persist parent stage execution status");
        }

        let event_payload = match parent_status {
            StageStatus::Completed => SessionEventPayload::StageCompleted {
                session_id: session.session_id,
                stage_execution_id: parent.execution_id,
                stage_name: spec.name.clone(),
            },
            _ => SessionEventPayload::StageFailed {
                session_id: session.session_id,
                stage_execution_id: parent.execution_id,
                stage_name: spec.name.clone(),
                error: first_error.clone().unwrap_or_default(),
            },
        };
        self.publish_session_event(session.session_id, event_payload).await;

        let output = if child_outputs.is_empty() { None } else { Some((spec.name.clone(), parent_output)) };

        StageOutcome { status: parent_status, output, error: first_error }
    }

    fn agent_strategy(&self, agent_name: &str) -> tarsy_domain::stage::IterationStrategy {
        self.agents
            .get(agent_name)
            .map(|a| a.iteration_strategy)
            .unwrap_or(tarsy_domain::stage::IterationStrategy::React)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_with_no_children_degrades_to_failed() {
        let statuses: Vec<StageStatus> = vec![];
        assert!(statuses.is_empty());
    }
}
