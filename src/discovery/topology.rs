// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Runtime device topology: one record per observed source address,
//! maintained as frames are ingested and polls are correlated (§3, §4.9).

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use crate::{frame::Dgn, spec::DeviceType};

const RESPONSE_TIME_RING_CAPACITY: usize = 10;
const OFFLINE_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Discovered,
    Online,
    Offline,
    Error,
}

/// A device as observed on the bus, distinct from the coach mapping's
/// config-time [`crate::spec::DeviceRecord`].
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub source_address: u8,
    pub protocol: String,
    pub device_type: Option<DeviceType>,
    pub manufacturer: Option<String>,
    pub product_id: Option<u32>,
    pub version: Option<String>,
    pub capabilities: std::collections::HashSet<String>,
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub response_count: u32,
    pub response_times: VecDeque<Duration>,
    pub status: DeviceStatus,
}

impl DeviceRecord {
    fn new(source_address: u8, protocol: &str, now: Instant) -> Self {
        Self {
            source_address,
            protocol: protocol.to_string(),
            device_type: None,
            manufacturer: None,
            product_id: None,
            version: None,
            capabilities: std::collections::HashSet::new(),
            first_seen: now,
            last_seen: now,
            response_count: 0,
            response_times: VecDeque::with_capacity(RESPONSE_TIME_RING_CAPACITY),
            status: DeviceStatus::Discovered,
        }
    }

    fn record_response_time(&mut self, rt: Duration) {
        if self.response_times.len() >= RESPONSE_TIME_RING_CAPACITY {
            self.response_times.pop_front();
        }
        self.response_times.push_back(rt);
        self.response_count += 1;
    }

    pub fn average_response_time(&self) -> Option<Duration> {
        if self.response_times.is_empty() {
            return None;
        }
        let total: Duration = self.response_times.iter().sum();
        Some(total / self.response_times.len() as u32)
    }
}

/// Emitted on the `device_availability_changed` topic.
#[derive(Debug, Clone)]
pub struct AvailabilityChange {
    pub source_address: u8,
    pub previous: Option<DeviceStatus>,
    pub current: DeviceStatus,
}

/// Emitted on the `poll_response` topic when an in-flight poll is
/// correlated against an ingress frame.
#[derive(Debug, Clone)]
pub struct PollResponse {
    pub source_address: u8,
    pub pgn: u32,
    pub response_time: Duration,
}

/// Point-in-time copy of the whole device table, for `network_topology()`
/// (§6).
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub devices: Vec<DeviceRecord>,
    pub active_polls: usize,
}

/// Point-in-time split of the device table by status, for
/// `device_availability()` (§6).
#[derive(Debug, Clone, Default)]
pub struct AvailabilitySnapshot {
    pub online: Vec<u8>,
    pub offline: Vec<u8>,
    pub discovered: Vec<u8>,
    pub error: Vec<u8>,
}

/// An outstanding PGN-Request awaiting correlation (§3 "Poll request").
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub target_pgn: u32,
    pub target_address: u8,
    pub instance: Option<u8>,
    pub protocol: String,
    pub sent_at: Instant,
    pub timeout: Duration,
    pub retry_count: u32,
    pub max_retries: u32,
}

pub fn poll_key(protocol: &str, source: u8, pgn: u32, instance: Option<u8>) -> String {
    match instance {
        Some(i) => format!("{protocol}_{source:02X}_{pgn:04X}_{i}"),
        None => format!("{protocol}_{source:02X}_{pgn:04X}"),
    }
}

/// Owned exclusively by the discovery task (§5): device index and
/// outstanding polls.
#[derive(Debug, Default)]
pub struct Topology {
    devices: HashMap<u8, DeviceRecord>,
    active_polls: HashMap<String, PollRequest>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device-record maintenance for a non-local ingress frame (§4.9).
    /// Returns an [`AvailabilityChange`] if `status` transitioned.
    pub fn observe_frame(
        &mut self,
        source: u8,
        protocol: &str,
        dgn: Dgn,
        inferred_type: Option<DeviceType>,
        now: Instant,
    ) -> Option<AvailabilityChange> {
        let existed = self.devices.contains_key(&source);
        let record = self
            .devices
            .entry(source)
            .or_insert_with(|| DeviceRecord::new(source, protocol, now));
        let previous = record.status;
        record.last_seen = now;
        record.status = DeviceStatus::Online;
        if record.device_type.is_none() {
            record.device_type = inferred_type;
        }
        let _ = dgn;

        if !existed || previous != DeviceStatus::Online {
            Some(AvailabilityChange {
                source_address: source,
                previous: existed.then_some(previous),
                current: DeviceStatus::Online,
            })
        } else {
            None
        }
    }

    pub fn register_poll(&mut self, key: String, request: PollRequest) {
        self.active_polls.insert(key, request);
    }

    /// Looks for an outstanding poll matching `(source, pgn)` and, on a
    /// match, records the round-trip and removes the entry (§4.9).
    pub fn correlate_response(&mut self, source: u8, pgn: u32, now: Instant) -> Option<PollResponse> {
        let key = self
            .active_polls
            .iter()
            .find(|(_, p)| p.target_address == source && p.target_pgn == pgn)
            .map(|(k, _)| k.clone())?;
        let request = self.active_polls.remove(&key)?;
        let response_time = now.duration_since(request.sent_at);
        if let Some(device) = self.devices.get_mut(&source) {
            device.record_response_time(response_time);
        }
        Some(PollResponse {
            source_address: source,
            pgn,
            response_time,
        })
    }

    /// Evicts (optionally for retry) any poll past its timeout.
    pub fn expire_polls(&mut self, now: Instant) -> Vec<(String, PollRequest)> {
        let expired_keys: Vec<String> = self
            .active_polls
            .iter()
            .filter(|(_, p)| now.duration_since(p.sent_at) >= p.timeout)
            .map(|(k, _)| k.clone())
            .collect();
        expired_keys
            .into_iter()
            .filter_map(|k| self.active_polls.remove(&k).map(|p| (k, p)))
            .collect()
    }

    /// Marks devices unseen for over 300s offline (§4.9 "availability
    /// poll"), returning the changes raised.
    pub fn sweep_offline(&mut self, now: Instant) -> Vec<AvailabilityChange> {
        let mut changes = Vec::new();
        for record in self.devices.values_mut() {
            if record.status != DeviceStatus::Offline && now.duration_since(record.last_seen) >= OFFLINE_AFTER {
                changes.push(AvailabilityChange {
                    source_address: record.source_address,
                    previous: Some(record.status),
                    current: DeviceStatus::Offline,
                });
                record.status = DeviceStatus::Offline;
            }
        }
        changes
    }

    pub fn device(&self, source: u8) -> Option<&DeviceRecord> {
        self.devices.get(&source)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn active_poll_count(&self) -> usize {
        self.active_polls.len()
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            devices: self.devices.values().cloned().collect(),
            active_polls: self.active_polls.len(),
        }
    }

    pub fn availability_snapshot(&self) -> AvailabilitySnapshot {
        let mut snapshot = AvailabilitySnapshot::default();
        for record in self.devices.values() {
            match record.status {
                DeviceStatus::Online => snapshot.online.push(record.source_address),
                DeviceStatus::Offline => snapshot.offline.push(record.source_address),
                DeviceStatus::Discovered => snapshot.discovered.push(record.source_address),
                DeviceStatus::Error => snapshot.error.push(record.source_address),
            }
        }
        snapshot
    }
}
