// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Security Monitor (C6): rate limiting, anomaly detection, and trust
//! scoring over ingested frames (§4.6).

/// Anomaly detection, per-source statistics, and trust scoring.
pub mod anomaly;
/// Sliding-window per-source/per-class rate limiting.
pub mod rate_limit;

use std::time::Instant;

pub use anomaly::{AnomalyKind, AnomalyRecord, ObservedFrame, Severity, SourceStats};
pub use rate_limit::MessageClass;

use crate::{frame::CanFrame, security::rate_limit::RateLimiter};

/// The combined admission + anomaly-detection facade the ingest task
/// calls once per frame.
pub struct SecurityMonitor {
    rate_limiter: RateLimiter,
    detector: anomaly::AnomalyDetector,
}

impl SecurityMonitor {
    pub fn new(window_seconds: f64, local_controller: u8) -> Self {
        Self {
            rate_limiter: RateLimiter::new(window_seconds),
            detector: anomaly::AnomalyDetector::new(local_controller),
        }
    }

    /// Admits or rejects `frame`, updating rate-limit state and running
    /// the anomaly-detection batch passes. Returns whether the frame was
    /// admitted alongside any anomalies this call raised, so a caller can
    /// publish them without re-scanning the whole ring (§4.6 "On
    /// rejection, rate_limit_violation is recorded").
    pub fn process(&mut self, frame: &CanFrame, now: Instant) -> (bool, Vec<AnomalyRecord>) {
        let pgn = frame.pgn();
        let source = frame.source_address();
        let mark = self.detector.ring_len();

        self.detector.observe(ObservedFrame {
            source,
            dgn: frame.dgn(),
            payload_len: frame.len as usize,
            at: now,
        });

        if !self.rate_limiter.admit(source, pgn, now) {
            self.detector.record_rate_limit_violation(source, now);
            return (false, self.detector.anomalies_since(mark));
        }
        (true, self.detector.anomalies_since(mark))
    }

    pub fn is_trusted(&self, source: u8, now: Instant) -> bool {
        self.detector.is_trusted(source, now)
    }

    pub fn stats_for(&self, source: u8) -> Option<&SourceStats> {
        self.detector.stats_for(source)
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.detector.anomalies()
    }

    pub fn record_invalid_source(&mut self, source: u8, now: Instant) -> AnomalyRecord {
        let mark = self.detector.ring_len();
        self.detector.record_invalid_source(source, now);
        self.detector
            .anomalies_since(mark)
            .into_iter()
            .next()
            .expect("record_invalid_source always pushes exactly one anomaly")
    }

    /// Rejects an oversized payload before a `CanFrame` is built from it.
    pub fn record_oversized_message(&mut self, source: u8, dgn: crate::frame::Dgn, payload_len: usize, now: Instant) -> AnomalyRecord {
        let mark = self.detector.ring_len();
        self.detector.record_oversized_message(source, dgn, payload_len, now);
        self.detector
            .anomalies_since(mark)
            .into_iter()
            .next()
            .expect("record_oversized_message always pushes exactly one anomaly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_frame_is_recorded_as_anomaly() {
        let mut monitor = SecurityMonitor::new(1.0, 0xF9);
        let now = Instant::now();
        let arb = crate::frame::ArbitrationId::for_pgn(0x1FEC0, 0x50, 6).to_raw();
        let frame = CanFrame::new(arb, &[0u8; 8]);
        for _ in 0..2 {
            assert!(monitor.process(&frame, now).0);
        }
        assert!(!monitor.process(&frame, now).0);
        assert!(
            monitor
                .anomalies()
                .any(|a| a.kind == AnomalyKind::RateLimitViolation)
        );
    }
}
