//! Session Scoring (§6 `POST /sessions/{id}/scores`, `GET
//! /sessions/{id}/scores`).
//!
//! Scoring itself is a single synchronous LLM judgement over the
//! session's recorded stage outputs; the partial unique index on
//! `session_scores` (migrations/0001_init.sql) is what actually enforces
//! "at most one pending-or-in-progress score per session" (§3), so this
//! handler does not need its own locking.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use tarsy_domain::score::{ScoreStatus, SessionScore, CURRENT_PROMPT_HASH};
use tarsy_domain::tool::Message;
use tarsy_engine::clock::now_us;
use tarsy_engine::repo;
use tarsy_providers::traits::GenerateOptions;

use crate::api::error::{error_response, not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct CreateScoreBody {
    #[serde(default)]
    pub force_rescore: bool,
}

/// `POST /sessions/{id}/scores`: runs scoring inline and returns the
/// completed (or failed) score. `force_rescore` only affects whether a
/// fresh row is attempted when the most recent score already used the
/// current prompt — it never bypasses the uniqueness constraint, since a
/// genuinely in-flight score must still be allowed to finish on its own.
pub async fn create_score(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<CreateScoreBody>,
) -> impl IntoResponse {
    let force_rescore = body.force_rescore;

    let session = match repo::get_session(&state.pool, session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return not_found("session not found"),
        Err(e) => return error_response(&e),
    };

    if !force_rescore {
        let existing = match repo::list_session_scores(&state.pool, session_id).await {
            Ok(scores) => scores,
            Err(e) => return error_response(&e),
        };
        if let Some(latest) = existing.into_iter().next() {
            if latest.current_prompt_used() {
                return Json(serde_json::json!({ "score": latest })).into_response();
            }
        }
    }

    let score_id = Uuid::new_v4();
    let pending = SessionScore {
        score_id,
        session_id,
        status: ScoreStatus::InProgress,
        overall_score: None,
        rationale: None,
        prompt_hash: CURRENT_PROMPT_HASH.to_string(),
        created_at_us: now_us(),
        completed_at_us: None,
    };
    if let Err(e) = repo::create_session_score(&state.pool, &pending).await {
        return error_response(&e);
    }

    let stages = match repo::list_stage_executions(&state.pool, session_id).await {
        Ok(stages) => stages,
        Err(e) => {
            fail_score(&state, score_id).await;
            return error_response(&e);
        }
    };

    match run_scoring(&state, &session, &stages).await {
        Ok((overall_score, rationale)) => {
            if let Err(e) = repo::update_session_score(
                &state.pool,
                score_id,
                ScoreStatus::Completed,
                Some(overall_score),
                Some(&rationale),
                Some(now_us()),
            )
            .await
            {
                return error_response(&e);
            }

            let completed = SessionScore {
                status: ScoreStatus::Completed,
                overall_score: Some(overall_score),
                rationale: Some(rationale),
                completed_at_us: Some(now_us()),
                ..pending
            };
            Json(serde_json::json!({ "score": completed })).into_response()
        }
        Err(e) => {
            fail_score(&state, score_id).await;
            error_response(&e)
        }
    }
}

async fn fail_score(state: &AppState, score_id: Uuid) {
    let _ = repo::update_session_score(
        &state.pool,
        score_id,
        ScoreStatus::Failed,
        None,
        None,
        Some(now_us()),
    )
    .await;
}

async fn run_scoring(
    state: &AppState,
    session: &tarsy_domain::session::Session,
    stages: &[tarsy_domain::stage::StageExecution],
) -> tarsy_domain::error::Result<(f64, String)> {
    let provider_id = state
        .providers
        .list_providers()
        .into_iter()
        .next()
        .ok_or_else(|| {
            tarsy_domain::error::Error::Config("no LLM provider configured for scoring".to_string())
        })?;
    let provider = state.providers.get(&provider_id).ok_or_else(|| {
        tarsy_domain::error::Error::Config(format!("provider '{provider_id}' not found"))
    })?;

    let mut prompt = format!(
        "Judge the quality of this incident investigation for alert type '{}'. \
         Respond with a single line: a score between 0.0 and 1.0, a space, then a one-sentence rationale.\n\n",
        session.alert_type
    );
    for stage in stages {
        if let Some(output) = &stage.stage_output {
            prompt.push_str(&format!("## {}\n{}\n\n", stage.stage_name, output));
        }
    }

    let conversation = vec![Message::user(prompt)];
    let mut options = GenerateOptions::new(session.session_id);
    options.provider = Some(provider_id);

    let response = provider.generate(&conversation, options).await?;
    Ok(parse_score(&response.content))
}

/// Parses `"<score> <rationale>"`, falling back to the neutral 0.5 with
/// the raw text as rationale if the model didn't follow the format.
fn parse_score(content: &str) -> (f64, String) {
    let trimmed = content.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((score_str, rationale)) => match score_str.parse::<f64>() {
            Ok(score) => (score.clamp(0.0, 1.0), rationale.trim().to_string()),
            Err(_) => (0.5, trimmed.to_string()),
        },
        None => (0.5, trimmed.to_string()),
    }
}

/// `GET /sessions/{id}/scores`: newest first (§3 ordering), each entry
/// annotated with whether it used the currently-compiled prompt.
pub async fn list_scores(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    match repo::list_session_scores(&state.pool, session_id).await {
        Ok(scores) => {
            let payload: Vec<_> = scores
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "score": s,
                        "current_prompt_used": s.current_prompt_used(),
                    })
                })
                .collect();
            Json(serde_json::json!({ "scores": payload })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_score_well_formed() {
        let (score, rationale) = parse_score("0.8 Root cause was identified quickly.");
        assert_eq!(score, 0.8);
        assert_eq!(rationale, "Root cause was identified quickly.");
    }

    #[test]
    fn parse_score_clamps_out_of_range() {
        let (score, _) = parse_score("1.5 too high");
        assert_eq!(score, 1.0);
        let (score, _) = parse_score("-0.3 too low");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn parse_score_falls_back_on_malformed_input() {
        let (score, rationale) = parse_score("not a score at all");
        assert_eq!(score, 0.5);
        assert_eq!(rationale, "not a score at all");
    }
}
