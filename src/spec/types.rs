// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed representations of spec-file and coach-mapping entries. The raw
//! `Raw*` structs mirror the on-disk JSON/YAML schema (§6); the plain
//! structs (`SpecEntry`, `Signal`, `DeviceRecord`) are what the rest of the
//! crate actually works with, built by [`super::spec_file`] and
//! [`super::coach_mapping`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Bit layout a signal's field is packed with. RV-C is little-endian
/// throughout but the spec schema allows declaring either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::LittleEndian
    }
}

/// Whether a signal's raw bit-field is interpreted as two's-complement
/// signed or as a plain unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Unsigned,
    Signed,
}

impl Default for ValueType {
    fn default() -> Self {
        Self::Unsigned
    }
}

/// One bit-field within a DGN's payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Signal {
    pub name: String,
    pub start_bit: usize,
    pub length: usize,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(rename = "enum", default)]
    pub enum_map: Option<HashMap<String, String>>,
    #[serde(default)]
    pub value_type: ValueType,
}

fn default_scale() -> f64 {
    1.0
}

/// A fully parsed, indexed specification entry for one DGN.
///
/// `length` is `None` for spec entries describing a multi-packet (BAM)
/// message; the decoder treats these as single-frame-best-effort (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct SpecEntry {
    pub pgn_hex: String,
    pub name: String,
    pub length: Option<u32>,
    pub priority_default: u8,
    pub signals: Vec<Signal>,
}

impl SpecEntry {
    /// The signal named `instance`, if the entry declares one (§4.3).
    pub fn instance_signal(&self) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == "instance")
    }
}

/// Device kinds the encoder has a dedicated strategy for (§4.4); anything
/// else falls back to the generic signal-walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Dimmer,
    Switch,
    Fan,
    Tank,
    Temperature,
    Lock,
    Pump,
    Hvac,
    Slide,
    Generator,
    #[serde(other)]
    Other,
}

/// A single device record out of the coach mapping (config-time, as
/// opposed to the runtime [`crate::discovery::topology::DeviceRecord`]).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceRecord {
    pub entity_id: String,
    pub friendly_name: String,
    pub device_type: DeviceType,
    #[serde(default)]
    pub capabilities: HashSet<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub configuration: Option<serde_yaml::Value>,
}

/// Coach identity, derived either from the mapping's `coach_info` section
/// or from its filename stem (§4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoachInfo {
    pub year: Option<u16>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
}
