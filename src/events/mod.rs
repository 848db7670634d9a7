//! In-process pub/sub for run progress (C11).
//!
//! Grounded in `crawl_events::bus::core::CrawlEventBus`'s broadcast-channel
//! design, but keyed per run-id rather than global: each run gets its own
//! bounded-queue subscriber set instead of every subscriber seeing every
//! run's events. Per §9's SSE design note, queues are bounded and a full
//! queue drops the event and counts it rather than blocking the publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

/// Per-subscriber queue depth. Deliberately small: consumers are expected to
/// drain an SSE stream promptly, and gaps are tolerated by design.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum IngestionEvent {
    PublicationDiscovered {
        publication_id: i64,
        title: String,
        pub_url: Option<String>,
        scholar_profile_id: i64,
        scholar_label: String,
        first_seen_at: DateTime<Utc>,
        new_publication_count: i64,
    },
    IdentifierUpdated {
        publication_id: i64,
        display_identifier: crate::db::models::DisplayIdentifier,
    },
}

struct RunChannel {
    subscribers: Vec<(u64, mpsc::Sender<IngestionEvent>)>,
    dropped_count: AtomicU64,
}

/// Shared event bus, cloned cheaply and threaded through the run engine and
/// enrichment pipeline.
#[derive(Clone, Default)]
pub struct EventBus {
    runs: Arc<DashMap<i64, RunChannel>>,
    next_subscriber_id: Arc<AtomicU64>,
}

/// Handle returned by [`EventBus::subscribe`]; dropping it unsubscribes.
pub struct Subscription {
    pub run_id: i64,
    pub receiver: mpsc::Receiver<IngestionEvent>,
    subscriber_id: u64,
    bus: EventBus,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.run_id, self.subscriber_id);
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for a single run-id. Multiple subscribers per
    /// run-id are allowed (e.g. several SSE clients watching the same run).
    pub fn subscribe(&self, run_id: i64) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.runs
            .entry(run_id)
            .or_insert_with(|| RunChannel {
                subscribers: Vec::new(),
                dropped_count: AtomicU64::new(0),
            })
            .subscribers
            .push((subscriber_id, tx));
        Subscription {
            run_id,
            receiver: rx,
            subscriber_id,
            bus: self.clone(),
        }
    }

    /// Remove one subscriber by id, identified directly rather than by
    /// checking sender liveness (the subscription's own receiver is still
    /// alive at this point — Rust drops a struct's own fields only after its
    /// `Drop::drop` body returns). Removes the run's map entry entirely once
    /// its last subscriber is gone.
    fn unsubscribe(&self, run_id: i64, subscriber_id: u64) {
        let Some(mut channel) = self.runs.get_mut(&run_id) else {
            return;
        };
        channel.subscribers.retain(|(id, _)| *id != subscriber_id);
        let is_empty = channel.subscribers.is_empty();
        drop(channel);
        if is_empty {
            self.runs.remove(&run_id);
        }
    }

    /// Publish an event to every live subscriber of `run_id`. Non-blocking:
    /// a subscriber whose queue is full is skipped and its drop is counted,
    /// never awaited on.
    pub fn publish(&self, run_id: i64, event: IngestionEvent) {
        let Some(channel) = self.runs.get(&run_id) else {
            return;
        };
        for (_, subscriber) in &channel.subscribers {
            if let Err(mpsc::error::TrySendError::Full(_)) = subscriber.try_send(event.clone()) {
                let dropped = channel.dropped_count.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(run_id, dropped, "event bus subscriber queue full, dropping event");
            }
        }
    }

    #[must_use]
    pub fn dropped_count(&self, run_id: i64) -> u64 {
        self.runs
            .get(&run_id)
            .map(|c| c.dropped_count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_published_events_to_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(1);
        bus.publish(
            1,
            IngestionEvent::PublicationDiscovered {
                publication_id: 1,
                title: "Title".into(),
                pub_url: None,
                scholar_profile_id: 1,
                scholar_label: "S1".into(),
                first_seen_at: Utc::now(),
                new_publication_count: 1,
            },
        );
        let event = sub.receiver.recv().await.expect("event delivered");
        matches!(event, IngestionEvent::PublicationDiscovered { .. });
    }

    #[tokio::test]
    async fn publish_to_unknown_run_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(
            999,
            IngestionEvent::PublicationDiscovered {
                publication_id: 1,
                title: "Title".into(),
                pub_url: None,
                scholar_profile_id: 1,
                scholar_label: "S1".into(),
                first_seen_at: Utc::now(),
                new_publication_count: 1,
            },
        );
    }

    #[tokio::test]
    async fn full_subscriber_queue_drops_and_counts() {
        let bus = EventBus::new();
        let sub = bus.subscribe(1);
        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY + 5 {
            bus.publish(
                1,
                IngestionEvent::PublicationDiscovered {
                    publication_id: 1,
                    title: "Title".into(),
                    pub_url: None,
                    scholar_profile_id: 1,
                    scholar_label: "S1".into(),
                    first_seen_at: Utc::now(),
                    new_publication_count: 1,
                },
            );
        }
        assert!(bus.dropped_count(1) > 0);
        drop(sub);
    }
}
