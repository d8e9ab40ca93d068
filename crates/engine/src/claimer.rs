//! Session Queue / Claimer (C6, §4.6): atomic claim of the next pending
//! session, the startup orphan sweep, and the graceful-shutdown
//! pod-interrupt sweep.
//!
//! The claim itself is a single conditional `UPDATE ... WHERE status =
//! 'pending' ... FOR UPDATE SKIP LOCKED RETURNING *` (`repo::claim_pending_session`)
//! so a losing claimer simply sees `None` back and retries after a backoff —
//! no advisory locks or separate "lease" table needed.

use std::sync::Arc;

use tarsy_domain::error::Result;
use tarsy_domain::event::{session_channel, SessionEventPayload, CHANNEL_SESSIONS};
use tarsy_domain::session::Session;

use crate::bus::EventBus;
use crate::clock::now_us;
use crate::db::Pool;
use crate::repo;

/// Session became unresponsive and was reclaimed by the startup orphan
/// sweep (§4.6, exact string required verbatim).
const ORPHAN_SESSION_ERROR: &str = "Processing failed - session became unresponsive. This may be due to pod crash, restart, or timeout during processing.";

/// Stage-execution failure message the orphan sweep writes on every
/// non-terminal stage of a reclaimed session (§4.6, exact string).
const ORPHAN_STAGE_ERROR: &str = "Session terminated due to backend restart";

/// Claims and runs pending sessions one at a time on this pod, handing each
/// claimed session to `on_claim`. The caller drives the orchestrator from
/// `on_claim`; this type only owns the claim loop and pod bookkeeping.
pub struct Claimer {
    pool: Pool,
    pod_id: String,
    event_bus: Arc<dyn EventBus>,
    claim_retry_backoff_ms: u64,
}

impl Claimer {
    pub fn new(pool: Pool, pod_id: impl Into<String>, event_bus: Arc<dyn EventBus>, claim_retry_backoff_ms: u64) -> Self {
        Self {
            pool,
            pod_id: pod_id.into(),
            event_bus,
            claim_retry_backoff_ms,
        }
    }

    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    /// Attempts to claim the next pending session. `None` means no pending
    /// session was available (or another pod won the race); the caller
    /// should back off before retrying.
    pub async fn try_claim(&self) -> Result<Option<Session>> {
        repo::claim_pending_session(&self.pool, &self.pod_id, now_us()).await
    }

    /// Runs a continuous claim loop, calling `on_claim` for every session
    /// this pod wins. Exits when `shutdown.await` resolves, letting the
    /// caller race it against a SIGTERM/SIGINT future.
    pub async fn run<F, Fut>(&self, mut on_claim: F, mut shutdown: tokio::sync::oneshot::Receiver<()>)
    where
        F: FnMut(Session) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(pod_id = %self.pod_id, "claimer: shutdown signal received, exiting claim loop");
                    return;
                }
                claimed = self.try_claim() => {
                    match claimed {
                        Ok(Some(session)) => {
                            tracing::info!(session_id = %session.session_id, pod_id = %self.pod_id, "claimer: session claimed");
                            on_claim(session).await;
                        }
                        Ok(None) => {
                            tokio::time::sleep(std::time::Duration::from_millis(self.claim_retry_backoff_ms)).await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "claimer: claim attempt failed, retrying after backoff");
                            tokio::time::sleep(std::time::Duration::from_millis(self.claim_retry_backoff_ms)).await;
                        }
                    }
                }
            }
        }
    }

    async fn publish_terminal(&self, session_id: uuid::Uuid, error: String) {
        let payload = SessionEventPayload::SessionFailed { session_id, error };
        let value = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
        for channel in [CHANNEL_SESSIONS.to_string(), session_channel(&session_id)] {
            if let Err(e) = self.event_bus.publish(&channel, value.clone()).await {
                tracing::warn!(%session_id, %channel, error = %e, "claimer: failed to publish terminal event");
            }
        }
    }

    /// Startup orphan sweep (§4.6): every session stuck `in_progress` whose
    /// heartbeat is older than `orphan_sweep_timeout_s` is failed, along
    /// with its non-terminal stage executions. Runs once at process
    /// startup, before the claim loop begins.
    pub async fn sweep_orphans(&self, orphan_sweep_timeout_s: u64) -> Result<usize> {
        let cutoff_us = now_us() - (orphan_sweep_timeout_s as i64) * 1_000_000;
        let orphans = repo::list_orphaned_sessions(&self.pool, cutoff_us).await?;

        for session in &orphans {
            tracing::warn!(session_id = %session.session_id, pod_id = ?session.pod_id, "claimer: reclaiming orphaned session");

            repo::fail_non_terminal_stages(&self.pool, session.session_id, ORPHAN_STAGE_ERROR).await?;
            repo::update_session_status(
                &self.pool,
                session.session_id,
                tarsy_domain::session::SessionStatus::Failed,
                Some(ORPHAN_SESSION_ERROR),
                Some(now_us()),
            )
            .await?;

            self.publish_terminal(session.session_id, ORPHAN_SESSION_ERROR.to_string()).await;
        }

        Ok(orphans.len())
    }

    /// Graceful-shutdown pod-interrupt sweep (§4.6): every session this pod
    /// still owns as `in_progress` is failed with an interruption message
    /// naming this pod. Runs once, right before the process exits.
    pub async fn sweep_own_sessions_on_shutdown(&self) -> Result<usize> {
        let owned = repo::list_in_progress_sessions_for_pod(&self.pool, &self.pod_id).await?;
        let message = format!("Session interrupted during pod '{}' graceful shutdown", self.pod_id);

        for session in &owned {
            tracing::warn!(session_id = %session.session_id, pod_id = %self.pod_id, "claimer: marking own session interrupted on shutdown");

            repo::fail_non_terminal_stages(&self.pool, session.session_id, &message).await?;
            repo::update_session_status(
                &self.pool,
                session.session_id,
                tarsy_domain::session::SessionStatus::Failed,
                Some(&message),
                Some(now_us()),
            )
            .await?;

            self.publish_terminal(session.session_id, message.clone()).await;
        }

        Ok(owned.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_error_strings_match_spec_verbatim() {
        assert_eq!(
            ORPHAN_SESSION_ERROR,
            "Processing failed - session became unresponsive. This may be due to pod crash, restart, or timeout during processing."
        );
        assert_eq!(ORPHAN_STAGE_ERROR, "Session terminated due to backend restart");
    }

    #[test]
    fn shutdown_message_embeds_pod_id() {
        let pod_id = "pod-7";
        let message = format!("Session interrupted during pod '{pod_id}' graceful shutdown");
        assert_eq!(message, "Session interrupted during pod 'pod-7' graceful shutdown");
    }
}
