// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hard-coded rule tables for signal-range, dependency, and
//! engineering-limit checks (§4.5), grounded in the original validator's
//! constant tables.

/// `(name_substring, min, max)`. Applied case-insensitively when a
/// decoded signal's name contains `name_substring` (§4.5 L1).
pub const RANGE_RULES: &[(&str, f64, f64)] = &[
    ("brightness", 0.0, 100.0),
    ("light_level", 0.0, 200.0),
    ("temperature", -40.0, 150.0),
    ("voltage", 0.0, 50.0),
    ("current", 0.0, 1000.0),
    ("pressure", 0.0, 1000.0),
    ("instance", 0.0, 253.0),
];

/// Signals named `state` must take one of these raw values.
pub const STATE_DOMAIN: &[u64] = &[0, 1, 2, 3];

/// Advisory (never fatal) engineering-safety ceilings, keyed by
/// name-substring, `(max, unit)` (§4.5 L3). Voltage additionally has a
/// floor, handled separately in [`super::check_engineering_limits`].
pub const ENGINEERING_MAX: &[(&str, f64, &str)] = &[
    ("voltage", 16.0, "V"),
    ("current", 200.0, "A"),
    ("temperature", 85.0, "\u{b0}C"),
    ("water_pressure", 60.0, "psi"),
    ("pressure", 150.0, "psi"),
    ("tank_level", 95.0, "%"),
];

pub const VOLTAGE_SAFE_MIN: f64 = 10.0;
pub const VOLTAGE_SAFE_MAX: f64 = 16.0;

/// Biconditional dependency rules (§4.5 L2, §8 boundary behaviours):
/// `(trigger_substring, dependency_substring, description)`. A signal
/// containing `trigger_substring` being > 0 must coincide exactly with a
/// signal containing `dependency_substring` being in the "on" (raw == 1)
/// state — a mismatch in *either* direction is a violation (e.g.
/// `brightness=0, state=on` and `brightness=50, state=off` both violate).
pub const BICONDITIONAL_DEPENDENCY_RULES: &[(&str, &str, &str)] = &[
    ("brightness", "state", "brightness>0 requires state == on"),
    ("fan_speed", "state", "fan_speed>0 requires state == on"),
];

/// One-directional dependency rules (§4.5 L2): trigger > 0 implies
/// dependency > 0; the converse is not checked.
pub const IMPLICATION_DEPENDENCY_RULES: &[(&str, &str, &str)] = &[(
    "current",
    "voltage",
    "current>0 requires voltage>0",
)];

/// Valid source-address range for ordinary devices (§4.5).
pub const VALID_SOURCE_RANGE: std::ops::RangeInclusive<u8> = 0x00..=0xF7;
