// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Priority Scheduler (C7): DGN→class classification, bounded
//! per-class FIFOs, eviction policy, and batched drain (§4.7).

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Notify;

use crate::{
    decoder::DecodeOutcome,
    frame::{Dgn, dgn_priority},
};

/// Ordered by descending importance (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriorityClass {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    Background = 5,
}

pub const ALL_CLASSES: [PriorityClass; 5] = [
    PriorityClass::Critical,
    PriorityClass::High,
    PriorityClass::Normal,
    PriorityClass::Low,
    PriorityClass::Background,
];

/// DGN/PGN ranges with a dedicated classification, checked before the
/// priority-field fallback (§4.7).
const DIAGNOSTIC_PGN_RANGE: std::ops::RangeInclusive<u32> = 0x1FEC0..=0x1FECF;
const CONTROL_PGN_RANGE: std::ops::RangeInclusive<u32> = 0x1FEF0..=0x1FEF7;
const STATUS_PGN_RANGE: std::ops::RangeInclusive<u32> = 0x1FFB0..=0x1FFBF;

/// Classifies a DGN into a priority class: a hard-coded table of
/// well-known PGN ranges, falling back to the DGN's own 3-bit priority
/// field (§4.7).
pub fn classify(dgn: Dgn) -> PriorityClass {
    let pgn = crate::frame::dgn_pgn(dgn);
    if DIAGNOSTIC_PGN_RANGE.contains(&pgn) {
        return PriorityClass::Critical;
    }
    if CONTROL_PGN_RANGE.contains(&pgn) {
        return PriorityClass::High;
    }
    if STATUS_PGN_RANGE.contains(&pgn) {
        return PriorityClass::Normal;
    }
    match dgn_priority(dgn) {
        0..=2 => PriorityClass::Critical,
        3..=4 => PriorityClass::High,
        5 => PriorityClass::Normal,
        6 => PriorityClass::Low,
        _ => PriorityClass::Background,
    }
}

/// Per-class admission caps, messages/second (§4.7). Critical has no
/// practical ceiling — represented as `u32::MAX`.
fn admission_cap(class: PriorityClass) -> u32 {
    match class {
        PriorityClass::Critical => u32::MAX,
        PriorityClass::High => 200,
        PriorityClass::Normal => 100,
        PriorityClass::Low => 50,
        PriorityClass::Background => 10,
    }
}

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub dgn: Dgn,
    pub source: u8,
    pub can_id: u32,
    pub payload: Vec<u8>,
    /// Already decoded by the ingest task before admission (§5 "decoding,
    /// validation, security, and enqueue are synchronous") — the drain
    /// loop publishes this rather than decoding a second time, which
    /// would double-count an unknown DGN in the missing-DGN tracker.
    pub outcome: Arc<DecodeOutcome>,
    pub enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct ClassState {
    queue: VecDeque<QueuedMessage>,
    admission_window: VecDeque<Instant>,
}

/// Rolling metrics exposed for observability (§4.7).
#[derive(Debug, Clone, Default)]
pub struct SchedulerMetrics {
    pub processed: u64,
    pub dropped: u64,
    pub current_depth: usize,
    pub max_depth_seen: usize,
    pub per_class_depth: [usize; 5],
}

/// Bounded, class-partitioned FIFO with Critical-preempts-lowest
/// eviction (§4.7).
pub struct PriorityScheduler {
    max_queue_size: usize,
    classes: [ClassState; 5],
    metrics: SchedulerMetrics,
    processing_times: VecDeque<Duration>,
    /// Signalled on every successful enqueue so the async drain loop (§5
    /// "Scheduler drain: awaits a non-empty-queue signal") can block
    /// instead of polling an empty queue.
    notify: Arc<Notify>,
}

const PROCESSING_TIME_WINDOW: usize = 1000;

impl PriorityScheduler {
    pub fn new(max_queue_size: usize) -> Self {
        Self::with_notify(max_queue_size, Arc::new(Notify::new()))
    }

    /// As [`Self::new`], sharing a caller-owned [`Notify`] so the drain
    /// loop can be woken without reaching back into the scheduler itself.
    pub fn with_notify(max_queue_size: usize, notify: Arc<Notify>) -> Self {
        Self {
            max_queue_size,
            classes: std::array::from_fn(|_| ClassState::default()),
            metrics: SchedulerMetrics::default(),
            processing_times: VecDeque::with_capacity(PROCESSING_TIME_WINDOW),
            notify,
        }
    }

    pub fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn class_index(class: PriorityClass) -> usize {
        class as usize - 1
    }

    fn per_class_cap(&self) -> usize {
        (self.max_queue_size / ALL_CLASSES.len()).max(1)
    }

    /// Enqueues one message, applying classification, per-second
    /// admission caps, and the Critical-eviction policy (§4.7). Returns
    /// `true` if enqueued, `false` if dropped.
    pub fn enqueue(
        &mut self,
        dgn: Dgn,
        source: u8,
        can_id: u32,
        payload: Vec<u8>,
        outcome: Arc<DecodeOutcome>,
        now: Instant,
    ) -> bool {
        let class = classify(dgn);
        let idx = Self::class_index(class);

        {
            let state = &mut self.classes[idx];
            let one_second_ago = now - Duration::from_secs(1);
            while let Some(&front) = state.admission_window.front() {
                if front < one_second_ago {
                    state.admission_window.pop_front();
                } else {
                    break;
                }
            }
            let cap = admission_cap(class);
            if cap != u32::MAX && state.admission_window.len() as u32 >= cap {
                self.metrics.dropped += 1;
                return false;
            }
            state.admission_window.push_back(now);
        }

        let per_class_cap = self.per_class_cap();
        if self.classes[idx].queue.len() >= per_class_cap {
            if class == PriorityClass::Critical {
                if !self.evict_from_lowest_nonempty() {
                    self.metrics.dropped += 1;
                    return false;
                }
            } else {
                self.metrics.dropped += 1;
                return false;
            }
        }

        self.classes[idx].queue.push_back(QueuedMessage {
            dgn,
            source,
            can_id,
            payload,
            outcome,
            enqueued_at: now,
        });
        self.refresh_depth_metrics();
        self.notify.notify_one();
        true
    }

    /// Pops the oldest message from the lowest-priority non-empty
    /// non-Critical class. Returns `false` if every class but Critical is
    /// empty, so a full Critical queue has nothing left to evict and the
    /// enqueue that called this must fail instead (§4.7).
    fn evict_from_lowest_nonempty(&mut self) -> bool {
        for class in ALL_CLASSES[1..].iter().rev() {
            let idx = Self::class_index(*class);
            if self.classes[idx].queue.pop_front().is_some() {
                return true;
            }
        }
        false
    }

    /// Returns the oldest message from the highest-priority non-empty
    /// class.
    pub fn dequeue_next(&mut self) -> Option<QueuedMessage> {
        for class in ALL_CLASSES {
            let idx = Self::class_index(class);
            if let Some(msg) = self.classes[idx].queue.pop_front() {
                self.metrics.processed += 1;
                self.refresh_depth_metrics();
                return Some(msg);
            }
        }
        None
    }

    /// Drains up to `n` messages in priority order across classes.
    pub fn dequeue_batch(&mut self, n: usize) -> Vec<QueuedMessage> {
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            match self.dequeue_next() {
                Some(msg) => batch.push(msg),
                None => break,
            }
        }
        batch
    }

    pub fn record_processing_time(&mut self, duration: Duration) {
        if self.processing_times.len() >= PROCESSING_TIME_WINDOW {
            self.processing_times.pop_front();
        }
        self.processing_times.push_back(duration);
    }

    pub fn average_processing_time(&self) -> Option<Duration> {
        if self.processing_times.is_empty() {
            return None;
        }
        let total: Duration = self.processing_times.iter().sum();
        Some(total / self.processing_times.len() as u32)
    }

    fn refresh_depth_metrics(&mut self) {
        let mut total = 0;
        for (i, class) in self.classes.iter().enumerate() {
            self.metrics.per_class_depth[i] = class.queue.len();
            total += class.queue.len();
        }
        self.metrics.current_depth = total;
        self.metrics.max_depth_seen = self.metrics.max_depth_seen.max(total);
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }
}
