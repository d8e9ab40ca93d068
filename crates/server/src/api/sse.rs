//! SSE Streamer (C8, §4.8): `GET /events/stream?channel=…&last_event_id=…`.
//!
//! Catchup is always served before live subscription so a reconnecting
//! client sees one contiguous, strictly-increasing id sequence (§4.8,
//! testable property 2).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use tarsy_domain::event::Event;
use tarsy_engine::EventBus;

use crate::api::error::error_response;
use crate::state::AppState;

const CATCHUP_LIMIT: i64 = 100;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub channel: String,
    #[serde(default)]
    pub last_event_id: i64,
}

fn format_event(event: &Event) -> String {
    format!("id: {}\ndata: {}\n\n", event.id, event.payload)
}

/// Unsubscribes on drop so a client disconnect mid-stream still releases
/// the subscriber slot (§4.8 step 5), not just the normal-completion path.
struct SubscriptionGuard {
    bus: Arc<dyn EventBus>,
    channel: String,
    subscriber_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.channel, self.subscriber_id);
    }
}

pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let channel = query.channel;

    let catchup = if query.last_event_id > 0 {
        match state
            .event_bus
            .get_events_after(&channel, query.last_event_id, CATCHUP_LIMIT)
            .await
        {
            Ok(events) => events,
            Err(e) => return error_response(&e),
        }
    } else {
        Vec::new()
    };

    let subscription = state.event_bus.subscribe(&channel);
    let guard = SubscriptionGuard {
        bus: state.event_bus.clone(),
        channel,
        subscriber_id: subscription.id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<String, Infallible>(": connected\n\n".to_string());

        for event in catchup {
            yield Ok(format_event(&event));
        }

        let mut receiver = subscription.receiver;
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                received = receiver.recv() => {
                    match received {
                        Some(event) => yield Ok(format_event(&event)),
                        None => break,
                    }
                }
                _ = keepalive.tick() => {
                    yield Ok::<String, Infallible>(": keepalive\n\n".to_string());
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap()
        .into_response()
}
