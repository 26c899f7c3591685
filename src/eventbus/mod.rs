// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Event Bus (C10): a typed, in-process publish/subscribe fan-out
//! with a bounded, drop-oldest queue per subscriber (§4.10).
//!
//! Deliberately not `tokio::sync::broadcast`: broadcast's lagged
//! receivers report a gap and must catch up or be dropped entirely,
//! whereas §4.10 requires a slow subscriber to silently lose its oldest
//! buffered events while the producer is never blocked. A small
//! hand-rolled ring per subscriber gives that guarantee directly.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{Mutex, Notify};

use crate::{
    decoder::DecodeOutcome,
    discovery::topology::{AvailabilityChange, PollResponse},
    security::AnomalyRecord,
};

/// Whether a sniffed frame was received off the bus or just written to it
/// (§4.8 "Emits a sniffer event after the first transmit").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// The four event topics the core publishes (§4.10). Both ingest and the
/// TX writer publish to `DecodedFrame` — `direction` distinguishes a
/// sniffed receive from a sniffed transmit.
#[derive(Debug, Clone)]
pub enum Event {
    DecodedFrame {
        can_id: u32,
        source: u8,
        direction: Direction,
        /// `true` when `source == controller_source_address`, i.e. this
        /// runtime originated the frame (§4.8 "origin=self").
        self_originated: bool,
        outcome: Arc<DecodeOutcome>,
    },
    Anomaly(Arc<AnomalyRecord>),
    DeviceAvailabilityChanged(AvailabilityChange),
    PollResponse(PollResponse),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::DecodedFrame { .. } => Topic::DecodedFrame,
            Self::Anomaly(_) => Topic::Anomaly,
            Self::DeviceAvailabilityChanged(_) => Topic::DeviceAvailabilityChanged,
            Self::PollResponse(_) => Topic::PollResponse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    DecodedFrame,
    Anomaly,
    DeviceAvailabilityChanged,
    PollResponse,
}

struct SubscriberQueue {
    topic: Topic,
    capacity: usize,
    buffer: Mutex<VecDeque<Event>>,
    notify: Notify,
    dropped: AtomicU64,
}

/// A handle a consumer polls (or awaits) for the next event on its
/// subscribed topic.
pub struct EventStream {
    queue: Arc<SubscriberQueue>,
}

impl EventStream {
    /// Awaits the next event, yielding immediately if one is already
    /// buffered.
    pub async fn recv(&self) -> Event {
        loop {
            {
                let mut buffer = self.queue.buffer.lock().await;
                if let Some(event) = buffer.pop_front() {
                    return event;
                }
            }
            self.queue.notify.notified().await;
        }
    }

    /// Count of events dropped because this subscriber fell behind
    /// (§4.10 "dropped-event counter").
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

/// The in-process fan-out. Cheap to clone (an `Arc` around subscriber
/// state); every component that needs to publish holds a clone.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Arc<SubscriberQueue>>>>,
}

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber for `topic` with a bounded,
    /// drop-oldest queue.
    pub async fn subscribe(&self, topic: Topic) -> EventStream {
        self.subscribe_with_capacity(topic, DEFAULT_SUBSCRIBER_CAPACITY).await
    }

    pub async fn subscribe_with_capacity(&self, topic: Topic, capacity: usize) -> EventStream {
        let queue = Arc::new(SubscriberQueue {
            topic,
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        self.subscribers.lock().await.push(queue.clone());
        EventStream { queue }
    }

    /// Publishes `event` to every subscriber of its topic. Never blocks
    /// on a slow subscriber — a full queue drops its oldest entry
    /// instead (§4.10, §5 back-pressure).
    pub async fn publish(&self, event: Event) {
        let topic = event.topic();
        let subscribers = self.subscribers.lock().await;
        for sub in subscribers.iter().filter(|s| s.topic == topic) {
            let mut buffer = sub.buffer.lock().await;
            if buffer.len() >= sub.capacity {
                buffer.pop_front();
                sub.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(event.clone());
            sub.notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let stream = bus.subscribe(Topic::Anomaly).await;
        let record = Arc::new(AnomalyRecord {
            timestamp: std::time::Instant::now(),
            kind: crate::security::AnomalyKind::MessageFlooding,
            source: 0x50,
            dgn: None,
            severity: crate::security::Severity::High,
            description: "test".to_string(),
            evidence: String::new(),
        });
        bus.publish(Event::Anomaly(record.clone())).await;
        bus.publish(Event::Anomaly(record)).await;

        let first = stream.recv().await;
        let second = stream.recv().await;
        assert!(matches!(first, Event::Anomaly(_)));
        assert!(matches!(second, Event::Anomaly(_)));
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_and_counts_it() {
        let bus = EventBus::new();
        let stream = bus.subscribe_with_capacity(Topic::Anomaly, 2).await;
        for i in 0..4u8 {
            let record = Arc::new(AnomalyRecord {
                timestamp: std::time::Instant::now(),
                kind: crate::security::AnomalyKind::MessageFlooding,
                source: i,
                dgn: None,
                severity: crate::security::Severity::Low,
                description: i.to_string(),
                evidence: String::new(),
            });
            bus.publish(Event::Anomaly(record)).await;
        }
        assert_eq!(stream.dropped_count(), 2);
        let Event::Anomaly(first) = stream.recv().await else {
            panic!("expected anomaly");
        };
        assert_eq!(first.source, 2);
    }

    #[tokio::test]
    async fn publish_never_blocks_without_a_subscriber() {
        let bus = EventBus::new();
        let record = Arc::new(AnomalyRecord {
            timestamp: std::time::Instant::now(),
            kind: crate::security::AnomalyKind::OversizedMessage,
            source: 1,
            dgn: None,
            severity: crate::security::Severity::Medium,
            description: String::new(),
            evidence: String::new(),
        });
        bus.publish(Event::Anomaly(record)).await;
    }
}
