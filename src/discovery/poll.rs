// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Active discovery and polling cadence (§4.9): which PGNs get requested,
//! on what schedule, and the device-type → status-PGN table used to poll
//! stale devices.

use std::time::{Duration, Instant};

use crate::{
    frame::{BROADCAST_ADDRESS, CanFrame, build_pgn_request},
    spec::DeviceType,
};

/// Discovery PGNs queried per protocol on the active-discovery interval.
pub fn discovery_pgns(protocol: &str) -> &'static [u32] {
    match protocol {
        "rvc" => &[0x1FEF2, 0x1FEDA, 0x1FEEB, 0x1FEE1],
        "j1939" => &[0x1FEF2],
        _ => &[],
    }
}

/// Maps a device type to the status PGN polled when it has gone quiet
/// (§4.9).
pub fn status_pgn_for_device_type(device_type: DeviceType) -> Option<u32> {
    match device_type {
        DeviceType::Light | DeviceType::Dimmer => Some(0x1FEDA),
        DeviceType::Tank => Some(0x1FEEB),
        DeviceType::Temperature => Some(0x1FEE1),
        DeviceType::Lock => Some(0x1FED9),
        DeviceType::Pump => Some(0x1FED8),
        DeviceType::Fan => Some(0x1FED6),
        _ => None,
    }
}

pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Builds the broadcast PGN-Requests for one active-discovery scan over
/// `protocol` (§4.9 "For each configured protocol... send a PGN-Request").
pub fn build_discovery_requests(requester_source: u8, protocol: &str) -> Vec<CanFrame> {
    discovery_pgns(protocol)
        .iter()
        .map(|&pgn| build_pgn_request(requester_source, pgn, BROADCAST_ADDRESS, None))
        .collect()
}

/// A device is due for a targeted poll once it has been quiet for more
/// than twice the polling interval (§4.9).
pub fn is_due_for_poll(last_seen: Instant, now: Instant, polling_interval: Duration) -> bool {
    now.duration_since(last_seen) >= polling_interval * 2
}
