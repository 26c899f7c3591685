// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sliding-window, per-source-and-class rate limiting (§4.6).

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

/// Message classes the rate limiter distinguishes, by PGN range (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Control,
    Status,
    Diagnostic,
    Default,
}

impl MessageClass {
    /// Classifies a PGN into its rate-limit class by the ranges in §4.6.
    pub fn classify(pgn: u32) -> Self {
        if (0x1FEF0..=0x1FEF7).contains(&pgn) {
            Self::Control
        } else if (0x1FFB0..=0x1FFBF).contains(&pgn) {
            Self::Status
        } else if (0x1FEC0..=0x1FECF).contains(&pgn) {
            Self::Diagnostic
        } else {
            Self::Default
        }
    }

    /// `(rate per second, burst size)`.
    fn limits(self) -> (f64, usize) {
        match self {
            Self::Control => (10.0, 5),
            Self::Status => (50.0, 20),
            Self::Diagnostic => (5.0, 2),
            Self::Default => (20.0, 10),
        }
    }
}

/// A per-`(source, class)` sliding window of recent admission timestamps.
#[derive(Debug, Default)]
struct Window {
    timestamps: VecDeque<Instant>,
}

/// Sliding-window rate limiter keyed by `(source_address, MessageClass)`
/// (§4.6). `window_seconds` is the width of the sliding window (default
/// 1.0, from [`crate::cfg::config::SecurityConfig`]).
#[derive(Debug)]
pub struct RateLimiter {
    window_seconds: f64,
    windows: HashMap<(u8, MessageClass), Window>,
}

impl RateLimiter {
    pub fn new(window_seconds: f64) -> Self {
        Self {
            window_seconds,
            windows: HashMap::new(),
        }
    }

    /// Admits or rejects a message from `source` on `pgn` at `now`. A
    /// rejected admission does not get its timestamp recorded — it must
    /// not itself count toward the next window.
    pub fn admit(&mut self, source: u8, pgn: u32, now: Instant) -> bool {
        let class = MessageClass::classify(pgn);
        let (rate, burst) = class.limits();
        let window_width = Duration::from_secs_f64(self.window_seconds);

        let window = self.windows.entry((source, class)).or_default();
        while let Some(&front) = window.timestamps.front() {
            if now.duration_since(front) > window_width {
                window.timestamps.pop_front();
            } else {
                break;
            }
        }

        let rate_cap = (rate * self.window_seconds) as usize;
        let cap = burst.min(rate_cap.max(1));
        if window.timestamps.len() >= cap {
            return false;
        }
        window.timestamps.push_back(now);
        true
    }
}
