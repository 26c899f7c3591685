// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tracks DGNs observed on the bus that are absent from the loaded spec
//! catalogue, so operators can see what's missing without the ingest loop
//! ever failing on it (§3, §4.3).

use std::{
    collections::HashSet,
    time::{SystemTime, UNIX_EPOCH},
};

use dashmap::DashMap;

use crate::frame::{Dgn, dgn_pgn, dgn_priority};

/// One DGN's worth of "we saw this and don't know what it is" history.
#[derive(Debug, Clone)]
pub struct MissingDgnRecord {
    pub first_seen: u64,
    pub last_seen: u64,
    pub encounter_count: u64,
    pub can_ids: HashSet<u32>,
    pub contexts: HashSet<String>,
    pub pgn: u32,
    pub priority: u8,
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Process-lifetime record of unrecognised DGNs, keyed by the numeric DGN
/// (§3). Cleared only by explicit [`MissingDgnTracker::clear`].
#[derive(Debug, Default)]
pub struct MissingDgnTracker {
    records: DashMap<Dgn, MissingDgnRecord>,
}

impl MissingDgnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation of `dgn` on `can_id`, tagged with `context`
    /// (e.g. `"decode_error:<msg>"` for a decode failure, or an empty
    /// string for a plain unknown-DGN observation).
    pub fn record(&self, dgn: Dgn, can_id: u32, context: &str) {
        let now = now_unix_millis();
        self.records
            .entry(dgn)
            .and_modify(|rec| {
                rec.last_seen = now;
                rec.encounter_count += 1;
                rec.can_ids.insert(can_id);
                if !context.is_empty() {
                    rec.contexts.insert(context.to_string());
                }
            })
            .or_insert_with(|| {
                let mut contexts = HashSet::new();
                if !context.is_empty() {
                    contexts.insert(context.to_string());
                }
                MissingDgnRecord {
                    first_seen: now,
                    last_seen: now,
                    encounter_count: 1,
                    can_ids: HashSet::from([can_id]),
                    contexts,
                    pgn: dgn_pgn(dgn),
                    priority: dgn_priority(dgn),
                }
            });
    }

    /// A point-in-time snapshot of every missing DGN seen so far.
    pub fn snapshot(&self) -> Vec<(Dgn, MissingDgnRecord)> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn encounter_count(&self, dgn: Dgn) -> u64 {
        self.records.get(&dgn).map(|r| r.encounter_count).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}
