// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bulk discovery queries over the topology: device profiles, the
//! reliability score, and the wizard-style aggregates used by higher-level
//! consumers (§4.9 "Profiles and wizards").

use std::time::Instant;

use crate::discovery::topology::{DeviceRecord, DeviceStatus, Topology};

/// A single device's profile: detected state plus a computed reliability
/// score, as queried by `get_device_profile`/the setup wizard.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub source_address: u8,
    pub protocol: String,
    pub device_type: Option<crate::spec::DeviceType>,
    pub status: DeviceStatus,
    pub capabilities: Vec<String>,
    pub response_count: u32,
    pub reliability_score: f64,
    pub recommended_name: String,
}

/// `0.4×response_rate + 0.3×min(1, 5/avg_response_time_s) + 0.3×max(0, 1 − age_since_seen/3600)`
/// (§4.9).
pub fn reliability_score(device: &DeviceRecord, now: Instant) -> f64 {
    let response_rate = if device.response_count == 0 {
        0.0
    } else {
        // Responses observed vs. polls attempted aren't tracked per-device
        // here, so the ring's fill ratio stands in as the best available
        // proxy for how reliably this device answers polls.
        (device.response_times.len() as f64 / 10.0).min(1.0)
    };
    let avg_component = match device.average_response_time() {
        Some(avg) if avg.as_secs_f64() > 0.0 => (5.0 / avg.as_secs_f64()).min(1.0),
        Some(_) => 1.0,
        None => 0.0,
    };
    let age_seconds = now.duration_since(device.last_seen).as_secs_f64();
    let freshness = (1.0 - age_seconds / 3600.0).max(0.0);

    0.4 * response_rate + 0.3 * avg_component + 0.3 * freshness
}

fn recommended_name(device: &DeviceRecord) -> String {
    match device.device_type {
        Some(ref dt) => format!("{dt:?} @ {:#04X}", device.source_address),
        None => format!("Unknown device @ {:#04X}", device.source_address),
    }
}

pub fn device_profile(device: &DeviceRecord, now: Instant) -> DeviceProfile {
    DeviceProfile {
        source_address: device.source_address,
        protocol: device.protocol.clone(),
        device_type: device.device_type.clone(),
        status: device.status,
        capabilities: device.capabilities.iter().cloned().collect(),
        response_count: device.response_count,
        reliability_score: reliability_score(device, now),
        recommended_name: recommended_name(device),
    }
}

/// `auto_discovery_wizard`/network-map style aggregate: every known
/// device's profile, most reliable first.
pub fn network_map(topology: &Topology, now: Instant) -> Vec<DeviceProfile> {
    let mut profiles: Vec<DeviceProfile> = topology.devices().map(|d| device_profile(d, now)).collect();
    profiles.sort_by(|a, b| b.reliability_score.total_cmp(&a.reliability_score));
    profiles
}

/// `setup_device_wizard`: devices seen but not yet assigned a device type,
/// i.e. candidates that still need manual/coach-mapping classification.
pub fn unclassified_devices(topology: &Topology) -> Vec<u8> {
    topology
        .devices()
        .filter(|d| d.device_type.is_none())
        .map(|d| d.source_address)
        .collect()
}
