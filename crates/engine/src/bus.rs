//! Event Bus (C1, §4.1): a durable append-only event table plus channel
//! fan-out to in-process subscribers, in one of two interchangeable backends.
//!
//! Logical channels (`sessions`, `session:{id}`) are created and destroyed
//! freely, but Postgres `LISTEN`/`NOTIFY` wants a fixed channel name to
//! listen on. The notify backend multiplexes: every publish sends a single
//! `pg_notify` on one physical channel carrying `{channel, id}`, and the
//! listener task re-dispatches to whichever logical-channel subscribers this
//! process currently holds (typically none, if no SSE client on this pod
//! cares about that session). The polling backend needs no such trick — it
//! just re-polls every channel with a live subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::Row;
use tokio::sync::mpsc;

use tarsy_domain::config::{EventBusBackend, EventBusConfig};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::event::Event;

use crate::db::{with_retry, Pool, Retry};

/// The single physical Postgres channel every pod's notify listener binds
/// to, regardless of how many logical channels are active.
const PG_NOTIFY_CHANNEL: &str = "tarsy_events";

#[derive(Debug, Serialize, Deserialize)]
struct NotifyPayload<'a> {
    channel: &'a str,
    id: i64,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Persist a row on `channel` and notify subscribers after the write
    /// commits. Returns the assigned, per-channel-monotonic `id`.
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<i64>;

    /// Events with `id > after_id` on `channel`, oldest first, capped at
    /// `limit` (§4.8 step 2 uses this for SSE catchup).
    async fn get_events_after(&self, channel: &str, after_id: i64, limit: i64) -> Result<Vec<Event>>;

    /// Register interest in `channel`; events published after this call
    /// (and any missed during catchup, handled by the caller) arrive on the
    /// returned receiver in id order.
    fn subscribe(&self, channel: &str) -> Subscription;

    fn unsubscribe(&self, channel: &str, subscriber_id: u64);
}

pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::UnboundedReceiver<Event>,
}

type SubscriberMap = HashMap<String, HashMap<u64, mpsc::UnboundedSender<Event>>>;

pub struct PostgresEventBus {
    pool: Pool,
    subscribers: Mutex<SubscriberMap>,
    next_subscriber_id: AtomicU64,
}

impl PostgresEventBus {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Fan out one event to every live subscriber of its channel. A
    /// subscriber whose receiver has been dropped (the SSE handler
    /// returned) is pruned rather than retried.
    fn dispatch(&self, event: Event) {
        let mut subs = self.subscribers.lock();
        if let Some(channel_subs) = subs.get_mut(&event.channel) {
            channel_subs.retain(|_, tx| tx.send(event.clone()).is_ok());
        }
    }

    fn has_subscribers(&self, channel: &str) -> bool {
        self.subscribers
            .lock()
            .get(channel)
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }

    fn subscribed_channels(&self) -> Vec<String> {
        self.subscribers.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl EventBus for PostgresEventBus {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<i64> {
        let channel = channel.to_string();
        let row = with_retry(Retry::Transient, "event_bus.publish", || {
            let pool = self.pool.clone();
            let channel = channel.clone();
            let payload = payload.clone();
            async move {
                sqlx::query(
                    "INSERT INTO events (channel, payload, inserted_at_us) \
                     VALUES ($1, $2, (extract(epoch from now()) * 1000000)::bigint) \
                     RETURNING id, inserted_at_us",
                )
                .bind(&channel)
                .bind(&payload)
                .fetch_one(&pool)
                .await
            }
        })
        .await?;

        let id: i64 = row.try_get("id").map_err(|e| Error::Other(e.to_string()))?;
        let inserted_at_us: i64 = row
            .try_get("inserted_at_us")
            .map_err(|e| Error::Other(e.to_string()))?;

        let notify_payload = NotifyPayload { channel: &channel, id };
        let notify_json =
            serde_json::to_string(&notify_payload).map_err(Error::Json)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(PG_NOTIFY_CHANNEL)
            .bind(&notify_json)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                // A failed notify does not unpublish the row: catchup will
                // still surface it. Log and move on (§4.1 "Failure").
                tracing::warn!(error = %e, %channel, "pg_notify failed after publish committed");
                e
            })
            .ok();

        // Dispatch to local subscribers happens only via the backend's
        // round trip (the notify listener's re-dispatch, or the poller's
        // next tick) — never here. Both backends independently observe
        // every committed publish, so dispatching here too would deliver
        // each event to this pod's own subscribers twice.

        Ok(id)
    }

    async fn get_events_after(&self, channel: &str, after_id: i64, limit: i64) -> Result<Vec<Event>> {
        let channel = channel.to_string();
        with_retry(Retry::Transient, "event_bus.get_events_after", || {
            let pool = self.pool.clone();
            let channel = channel.clone();
            async move {
                sqlx::query_as::<_, EventRow>(
                    "SELECT id, channel, payload, inserted_at_us FROM events \
                     WHERE channel = $1 AND id > $2 ORDER BY id ASC LIMIT $3",
                )
                .bind(&channel)
                .bind(after_id)
                .bind(limit)
                .fetch_all(&pool)
                .await
            }
        })
        .await
        .map(|rows| rows.into_iter().map(Event::from).collect())
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .entry(channel.to_string())
            .or_default()
            .insert(id, tx);
        Subscription { id, receiver: rx }
    }

    fn unsubscribe(&self, channel: &str, subscriber_id: u64) {
        let mut subs = self.subscribers.lock();
        if let Some(channel_subs) = subs.get_mut(channel) {
            channel_subs.remove(&subscriber_id);
            if channel_subs.is_empty() {
                subs.remove(channel);
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    channel: String,
    payload: serde_json::Value,
    inserted_at_us: i64,
}

impl From<EventRow> for Event {
    fn from(r: EventRow) -> Self {
        Event {
            id: r.id,
            channel: r.channel,
            payload: r.payload,
            inserted_at_us: r.inserted_at_us,
        }
    }
}

/// Spawns the backend task matching `config.backend`. Returns a handle the
/// caller should abort on shutdown.
pub fn spawn_backend(bus: Arc<PostgresEventBus>, pool: Pool, config: EventBusConfig) -> tokio::task::JoinHandle<()> {
    match config.backend {
        EventBusBackend::Notify => tokio::spawn(run_notify_listener(bus, pool)),
        EventBusBackend::Poll => tokio::spawn(run_poller(bus, config)),
    }
}

/// Notify backend (§4.1 variant 1): a dedicated task holding a
/// `PgListener` on the one physical channel, re-dispatching each
/// notification to this process's local subscribers of the logical
/// channel named in the payload.
async fn run_notify_listener(bus: Arc<PostgresEventBus>, pool: Pool) {
    loop {
        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "event bus: failed to open LISTEN connection, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        if let Err(e) = listener.listen(PG_NOTIFY_CHANNEL).await {
            tracing::error!(error = %e, "event bus: LISTEN failed, retrying");
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            continue;
        }

        tracing::info!("event bus: notify listener connected");

        loop {
            match listener.recv().await {
                Ok(notification) => {
                    let payload: NotifyPayloadOwned = match serde_json::from_str(notification.payload()) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(error = %e, "event bus: malformed notify payload, dropping");
                            continue;
                        }
                    };
                    if !bus.has_subscribers(&payload.channel) {
                        continue;
                    }
                    match bus.get_events_after(&payload.channel, payload.id - 1, 1).await {
                        Ok(events) => {
                            for event in events {
                                bus.dispatch(event);
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "event bus: failed to fetch notified event"),
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "event bus: LISTEN connection lost, reconnecting");
                    break;
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct NotifyPayloadOwned {
    channel: String,
    id: i64,
}

/// Polling backend (§4.1 variant 2): periodically re-queries every channel
/// with a live subscriber, tracking a per-channel high-water mark. Backs off
/// on error per §4.1 ("sleep >= 5s").
async fn run_poller(bus: Arc<PostgresEventBus>, config: EventBusConfig) {
    let mut high_water: HashMap<String, i64> = HashMap::new();

    loop {
        let channels = bus.subscribed_channels();
        let mut had_error = false;

        for channel in channels {
            let after_id = *high_water.get(&channel).unwrap_or(&0);
            match bus
                .get_events_after(&channel, after_id, config.catchup_batch_size)
                .await
            {
                Ok(events) => {
                    if let Some(last) = events.last() {
                        high_water.insert(channel.clone(), last.id);
                    }
                    for event in events {
                        bus.dispatch(event);
                    }
                }
                Err(e) => {
                    had_error = true;
                    tracing::warn!(error = %e, %channel, "event bus: poll failed");
                }
            }
        }

        let sleep_ms = if had_error {
            config.poll_error_backoff_ms.max(5_000)
        } else {
            config.poll_interval_ms
        };
        tokio::time::sleep(std::time::Duration::from_millis(sleep_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_payload_roundtrips() {
        let p = NotifyPayload {
            channel: "session:abc",
            id: 42,
        };
        let json = serde_json::to_string(&p).unwrap();
        let back: NotifyPayloadOwned = serde_json::from_str(&json).unwrap();
        assert_eq!(back.channel, "session:abc");
        assert_eq!(back.id, 42);
    }
}
