// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Discovery Engine (C9): active PGN-Request issuance, response
//! correlation, and topology/availability maintenance (§4.9).

pub mod poll;
pub mod profiles;
pub mod topology;

use std::time::{Duration, Instant};

use crate::frame::{CanFrame, Dgn, dgn_pgn};
pub use poll::{DEFAULT_DISCOVERY_INTERVAL, DEFAULT_MAX_RETRIES, DEFAULT_POLL_TIMEOUT, DEFAULT_POLLING_INTERVAL};
pub use topology::{
    AvailabilityChange, AvailabilitySnapshot, DeviceRecord, DeviceStatus, PollRequest, PollResponse, Topology,
    TopologySnapshot,
};

/// Which PGN implies which device type, used to seed a freshly-observed
/// record's `device_type` before the coach mapping resolves it properly.
fn infer_device_type_from_pgn(pgn: u32) -> Option<crate::spec::DeviceType> {
    match pgn {
        0x1FEDA => Some(crate::spec::DeviceType::Dimmer),
        0x1FEEB => Some(crate::spec::DeviceType::Tank),
        0x1FEE1 => Some(crate::spec::DeviceType::Temperature),
        0x1FED9 => Some(crate::spec::DeviceType::Lock),
        0x1FED8 => Some(crate::spec::DeviceType::Pump),
        0x1FED6 => Some(crate::spec::DeviceType::Fan),
        _ => None,
    }
}

/// Owns the topology and drives the active-discovery/polling cadence.
pub struct DiscoveryEngine {
    topology: Topology,
    protocols: Vec<String>,
    requester_source: u8,
    discovery_interval: Duration,
    polling_interval: Duration,
    poll_timeout: Duration,
    max_retries: u32,
    last_discovery: Option<Instant>,
    last_poll_sweep: Option<Instant>,
    discovery_active: bool,
}

impl DiscoveryEngine {
    pub fn new(requester_source: u8, protocols: Vec<String>) -> Self {
        Self {
            topology: Topology::new(),
            protocols,
            requester_source,
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            last_discovery: None,
            last_poll_sweep: None,
            discovery_active: false,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Feeds one ingress frame from a non-local source into topology
    /// maintenance and poll correlation (§4.9).
    pub fn ingest(&mut self, source: u8, dgn: Dgn, protocol: &str, now: Instant) -> (Option<AvailabilityChange>, Option<PollResponse>) {
        let pgn = dgn_pgn(dgn);
        let response = self.topology.correlate_response(source, pgn, now);
        let change = self.topology.observe_frame(source, protocol, dgn, infer_device_type_from_pgn(pgn), now);
        (change, response)
    }

    /// If the discovery interval has elapsed, returns the PGN-Request
    /// frames to broadcast for every configured protocol (§4.9).
    pub fn due_discovery_requests(&mut self, now: Instant) -> Vec<CanFrame> {
        let due = self
            .last_discovery
            .map(|t| now.duration_since(t) >= self.discovery_interval)
            .unwrap_or(true);
        if !due {
            return Vec::new();
        }
        self.last_discovery = Some(now);
        self.discovery_active = true;
        let mut frames = Vec::new();
        for protocol in &self.protocols {
            frames.extend(poll::build_discovery_requests(self.requester_source, protocol));
        }
        self.discovery_active = false;
        frames
    }

    /// Issues a targeted poll for one quiet device's status PGN (§4.9),
    /// registering the poll request and returning the frame to send.
    pub fn poll_device(&mut self, source: u8, pgn: u32, protocol: &str, instance: Option<u8>, now: Instant) -> CanFrame {
        let key = topology::poll_key(protocol, source, pgn, instance);
        self.topology.register_poll(
            key,
            PollRequest {
                target_pgn: pgn,
                target_address: source,
                instance,
                protocol: protocol.to_string(),
                sent_at: now,
                timeout: self.poll_timeout,
                retry_count: 0,
                max_retries: self.max_retries,
            },
        );
        crate::frame::build_pgn_request(self.requester_source, pgn, source, instance)
    }

    /// Scans every known device; for each one quiet for more than twice
    /// the polling interval, returns a targeted poll frame (§4.9).
    pub fn due_polls(&mut self, now: Instant) -> Vec<CanFrame> {
        let due = self
            .last_poll_sweep
            .map(|t| now.duration_since(t) >= self.polling_interval)
            .unwrap_or(true);
        if !due {
            return Vec::new();
        }
        self.last_poll_sweep = Some(now);

        let candidates: Vec<(u8, String, u32)> = self
            .topology
            .devices()
            .filter(|d| poll::is_due_for_poll(d.last_seen, now, self.polling_interval))
            .filter_map(|d| {
                d.device_type
                    .clone()
                    .and_then(poll::status_pgn_for_device_type)
                    .map(|pgn| (d.source_address, d.protocol.clone(), pgn))
            })
            .collect();

        candidates
            .into_iter()
            .map(|(source, protocol, pgn)| self.poll_device(source, pgn, &protocol, None, now))
            .collect()
    }

    /// Evicts timed-out polls, retrying (as a fresh frame) up to
    /// `max_retries` and otherwise abandoning them (§5 "Cancellation &
    /// timeouts").
    pub fn expire_polls(&mut self, now: Instant) -> Vec<CanFrame> {
        self.topology
            .expire_polls(now)
            .into_iter()
            .filter_map(|(key, request)| {
                if request.retry_count >= request.max_retries {
                    return None;
                }
                let frame = crate::frame::build_pgn_request(
                    self.requester_source,
                    request.target_pgn,
                    request.target_address,
                    request.instance,
                );
                self.topology.register_poll(
                    key,
                    PollRequest {
                        sent_at: now,
                        retry_count: request.retry_count + 1,
                        ..request
                    },
                );
                Some(frame)
            })
            .collect()
    }

    pub fn sweep_offline(&mut self, now: Instant) -> Vec<AvailabilityChange> {
        self.topology.sweep_offline(now)
    }

    pub fn network_map(&self, now: Instant) -> Vec<profiles::DeviceProfile> {
        profiles::network_map(&self.topology, now)
    }
}
