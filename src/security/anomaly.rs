// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-source statistics, anomaly detection, and trust scoring (§4.6).
//!
//! Owned exclusively by the security-monitor task (§5); no interior
//! mutability is needed here, every mutator takes `&mut self`.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

use crate::frame::Dgn;

const ANOMALY_RING_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    InvalidSourceRange,
    AddressHopping,
    MessageFlooding,
    DgnScanning,
    OversizedMessage,
    PotentialImpersonation,
    RateLimitViolation,
    UnauthorizedSource,
}

#[derive(Debug, Clone)]
pub struct AnomalyRecord {
    pub timestamp: Instant,
    pub kind: AnomalyKind,
    pub source: u8,
    pub dgn: Option<Dgn>,
    pub severity: Severity,
    pub description: String,
    pub evidence: String,
}

/// Per-source rolling statistics maintained across the process lifetime.
#[derive(Debug, Clone)]
pub struct SourceStats {
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub message_count: u64,
    pub dgns: HashSet<Dgn>,
    pub suspicious_count: u32,
    pub rate_violations: u32,
}

impl SourceStats {
    fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            message_count: 0,
            dgns: HashSet::new(),
            suspicious_count: 0,
            rate_violations: 0,
        }
    }
}

/// A single ingested frame as seen by anomaly detection: enough to
/// classify flooding, DGN scanning, and impersonation without holding a
/// full `CanFrame`.
#[derive(Debug, Clone, Copy)]
pub struct ObservedFrame {
    pub source: u8,
    pub dgn: Dgn,
    pub payload_len: usize,
    pub at: Instant,
}

/// Tracks per-source history and runs the anomaly-detection batch passes
/// described in §4.6.
#[derive(Debug)]
pub struct AnomalyDetector {
    local_controller: u8,
    stats: HashMap<u8, SourceStats>,
    ring: VecDeque<AnomalyRecord>,
    /// Recent frames kept only long enough to evaluate the sliding
    /// windows used by flooding/hopping/impersonation checks.
    recent: VecDeque<ObservedFrame>,
}

impl AnomalyDetector {
    pub fn new(local_controller: u8) -> Self {
        Self {
            local_controller,
            stats: HashMap::new(),
            ring: VecDeque::with_capacity(ANOMALY_RING_CAPACITY),
            recent: VecDeque::new(),
        }
    }

    fn push_anomaly(&mut self, record: AnomalyRecord) {
        if self.ring.len() >= ANOMALY_RING_CAPACITY {
            self.ring.pop_front();
        }
        if let Some(stats) = self.stats.get_mut(&record.source) {
            stats.suspicious_count += 1;
        }
        self.ring.push_back(record);
    }

    /// Updates per-source stats and runs the batch anomaly checks for one
    /// newly-ingested frame (§4.6). Returns any anomalies raised by this
    /// specific frame's admission.
    pub fn observe(&mut self, frame: ObservedFrame) {
        let stats = self
            .stats
            .entry(frame.source)
            .or_insert_with(|| SourceStats::new(frame.at));
        stats.last_seen = frame.at;
        stats.message_count += 1;
        stats.dgns.insert(frame.dgn);

        if frame.payload_len > crate::frame::MAX_PAYLOAD_LEN {
            self.push_anomaly(AnomalyRecord {
                timestamp: frame.at,
                kind: AnomalyKind::OversizedMessage,
                source: frame.source,
                dgn: Some(frame.dgn),
                severity: Severity::Medium,
                description: format!("oversized message: {} bytes", frame.payload_len),
                evidence: format!("payload_len={}", frame.payload_len),
            });
        }

        self.recent.push_back(frame);
        let one_second_ago = frame.at - Duration::from_secs(1);
        while let Some(&front) = self.recent.front() {
            if front.at < frame.at - Duration::from_secs(10) {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        self.check_flooding(frame.source, one_second_ago, frame.at);
        self.check_dgn_scanning(frame.source, one_second_ago, frame.at);
        self.check_address_hopping(frame.at);
        self.check_impersonation(frame);
    }

    fn check_flooding(&mut self, source: u8, window_start: Instant, now: Instant) {
        let count = self
            .recent
            .iter()
            .filter(|f| f.source == source && f.at >= window_start)
            .count();
        if count > 100 {
            self.push_anomaly(AnomalyRecord {
                timestamp: now,
                kind: AnomalyKind::MessageFlooding,
                source,
                dgn: None,
                severity: Severity::High,
                description: format!("{count} messages from source in 1s"),
                evidence: format!("count={count}"),
            });
        }
    }

    fn check_dgn_scanning(&mut self, source: u8, window_start: Instant, now: Instant) {
        let distinct: HashSet<Dgn> = self
            .recent
            .iter()
            .filter(|f| f.source == source && f.at >= window_start)
            .map(|f| f.dgn)
            .collect();
        if distinct.len() > 20 {
            self.push_anomaly(AnomalyRecord {
                timestamp: now,
                kind: AnomalyKind::DgnScanning,
                source,
                dgn: None,
                severity: Severity::Medium,
                description: format!("{} distinct DGNs from source in one batch", distinct.len()),
                evidence: format!("distinct_dgns={}", distinct.len()),
            });
        }
    }

    fn check_address_hopping(&mut self, now: Instant) {
        let window_start = now - Duration::from_secs(10);
        let distinct_sources: HashSet<u8> = self
            .recent
            .iter()
            .filter(|f| f.at >= window_start)
            .map(|f| f.source)
            .collect();
        if distinct_sources.len() > 20 {
            // Not attributable to a single source; recorded against the
            // most recently observed one.
            if let Some(&source) = self.recent.back().map(|f| &f.source) {
                self.push_anomaly(AnomalyRecord {
                    timestamp: now,
                    kind: AnomalyKind::AddressHopping,
                    source,
                    dgn: None,
                    severity: Severity::Medium,
                    description: format!("{} unique sources in the prior 10s", distinct_sources.len()),
                    evidence: format!("distinct_sources={}", distinct_sources.len()),
                });
            }
        }
    }

    fn check_impersonation(&mut self, frame: ObservedFrame) {
        let is_new_source = self
            .stats
            .get(&frame.source)
            .map(|s| s.message_count <= 1)
            .unwrap_or(true);
        if !is_new_source {
            return;
        }
        let sixty_seconds_ago = frame.at - Duration::from_secs(60);
        let overlap = self.recent.iter().any(|f| {
            f.source != frame.source && f.dgn == frame.dgn && f.at >= sixty_seconds_ago
        });
        if overlap {
            self.push_anomaly(AnomalyRecord {
                timestamp: frame.at,
                kind: AnomalyKind::PotentialImpersonation,
                source: frame.source,
                dgn: Some(frame.dgn),
                severity: Severity::High,
                description: "newly-seen source overlaps a DGN recently active from another source".to_string(),
                evidence: format!("dgn={:06X}", frame.dgn),
            });
        }
    }

    pub fn record_rate_limit_violation(&mut self, source: u8, now: Instant) {
        if let Some(stats) = self.stats.get_mut(&source) {
            stats.rate_violations += 1;
        }
        self.push_anomaly(AnomalyRecord {
            timestamp: now,
            kind: AnomalyKind::RateLimitViolation,
            source,
            dgn: None,
            severity: Severity::Low,
            description: "rate limit exceeded".to_string(),
            evidence: String::new(),
        });
    }

    /// Records an oversized payload rejected at the edge, before a
    /// `CanFrame` (whose `data` is fixed at `MAX_PAYLOAD_LEN` bytes) could
    /// even be constructed from it (§8 "oversized payload ... rejected at
    /// the edge").
    pub fn record_oversized_message(&mut self, source: u8, dgn: Dgn, payload_len: usize, now: Instant) {
        self.push_anomaly(AnomalyRecord {
            timestamp: now,
            kind: AnomalyKind::OversizedMessage,
            source,
            dgn: Some(dgn),
            severity: Severity::Medium,
            description: format!("oversized message: {payload_len} bytes"),
            evidence: format!("payload_len={payload_len}"),
        });
    }

    pub fn record_invalid_source(&mut self, source: u8, now: Instant) {
        self.push_anomaly(AnomalyRecord {
            timestamp: now,
            kind: AnomalyKind::InvalidSourceRange,
            source,
            dgn: None,
            severity: Severity::Low,
            description: "source address outside valid range".to_string(),
            evidence: String::new(),
        });
    }

    /// Trust criteria from §4.6: the local controller is always trusted;
    /// otherwise low suspicious/violation counts plus sufficient tenure.
    pub fn is_trusted(&self, source: u8, now: Instant) -> bool {
        if source == self.local_controller {
            return true;
        }
        let Some(stats) = self.stats.get(&source) else {
            return false;
        };
        stats.suspicious_count < 5
            && stats.rate_violations < 3
            && now.duration_since(stats.first_seen) >= Duration::from_secs(300)
    }

    pub fn stats_for(&self, source: u8) -> Option<&SourceStats> {
        self.stats.get(&source)
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.ring.iter()
    }

    /// Current ring length, used by callers as a watermark to fetch only
    /// the anomalies raised since their last check (§4.10 publication).
    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    /// Anomalies pushed since `mark` (a previous [`AnomalyDetector::ring_len`]).
    /// If the ring has dropped its oldest entries since `mark` was taken,
    /// this simply returns everything still present — no mark can go
    /// stale within one frame's processing.
    pub fn anomalies_since(&self, mark: usize) -> Vec<AnomalyRecord> {
        self.ring.iter().skip(mark).cloned().collect()
    }
}
