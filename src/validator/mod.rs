// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Validator (C5): range, dependency, engineering-limit, and
//! source-authorisation checks on decoded signals (§4.5).

/// Hard-coded rule tables.
pub mod rules;

use std::collections::HashMap;

use crate::{spec::Signal, validator::rules::*};

/// Output of a validation pass: `errors` are fatal for the frame,
/// `warnings` are advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn push_error(&mut self, msg: impl Into<String>) {
        self.ok = false;
        self.errors.push(msg.into());
    }

    fn push_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

fn physical_value(signal: &Signal, raw: u64) -> f64 {
    raw as f64 * signal.scale + signal.offset
}

/// Runs L1 (range/enum) and L2 (dependency) checks over one decoded
/// frame's signals.
pub fn validate_decoded(signals: &[Signal], raw_signals: &HashMap<String, u64>) -> ValidationResult {
    let mut result = ValidationResult::new();
    check_ranges_and_enums(signals, raw_signals, &mut result);
    check_dependencies(raw_signals, &mut result);
    check_engineering_limits(signals, raw_signals, &mut result);
    result
}

fn check_ranges_and_enums(
    signals: &[Signal],
    raw_signals: &HashMap<String, u64>,
    result: &mut ValidationResult,
) {
    for signal in signals {
        let Some(&raw) = raw_signals.get(&signal.name) else {
            continue;
        };

        if let Some(enum_map) = &signal.enum_map {
            if !enum_map.contains_key(&raw.to_string()) {
                result.push_warning(format!(
                    "signal {:?} value {raw} not in declared enum",
                    signal.name
                ));
            }
            continue;
        }

        let lower_name = signal.name.to_lowercase();
        for (substr, min, max) in RANGE_RULES {
            if lower_name.contains(substr) {
                let physical = physical_value(signal, raw);
                if physical < *min || physical > *max {
                    result.push_error(format!(
                        "signal {:?} = {physical} out of range [{min}, {max}]",
                        signal.name
                    ));
                }
            }
        }

        if lower_name.contains("state") && !STATE_DOMAIN.contains(&raw) {
            result.push_error(format!(
                "signal {:?} value {raw} not in state domain {STATE_DOMAIN:?}",
                signal.name
            ));
        }
    }
}

fn check_dependencies(raw_signals: &HashMap<String, u64>, result: &mut ValidationResult) {
    let has_matching = |substr: &str, pred: &dyn Fn(u64) -> bool| {
        raw_signals
            .iter()
            .any(|(name, &raw)| name.to_lowercase().contains(substr) && pred(raw))
    };

    for (trigger, dependency, description) in BICONDITIONAL_DEPENDENCY_RULES {
        let has_trigger_signal = raw_signals.keys().any(|n| n.to_lowercase().contains(trigger));
        let has_dependency_signal = raw_signals.keys().any(|n| n.to_lowercase().contains(dependency));
        if !has_trigger_signal || !has_dependency_signal {
            continue;
        }
        let trigger_active = has_matching(trigger, &|raw| raw > 0);
        let dependency_on = has_matching(dependency, &|raw| raw == 1);
        if trigger_active != dependency_on {
            result.push_error(description.to_string());
        }
    }

    for (trigger, dependency, description) in IMPLICATION_DEPENDENCY_RULES {
        let trigger_active = has_matching(trigger, &|raw| raw > 0);
        if !trigger_active {
            continue;
        }
        if !has_matching(dependency, &|raw| raw > 0) {
            result.push_error(description.to_string());
        }
    }
}

/// L3: advisory engineering-safety ceilings; never produces an error.
fn check_engineering_limits(
    signals: &[Signal],
    raw_signals: &HashMap<String, u64>,
    result: &mut ValidationResult,
) {
    for signal in signals {
        let Some(&raw) = raw_signals.get(&signal.name) else {
            continue;
        };
        let lower_name = signal.name.to_lowercase();
        let physical = physical_value(signal, raw);

        for (substr, max, unit) in ENGINEERING_MAX {
            if lower_name.contains(substr) && physical > *max {
                result.push_warning(format!(
                    "signal {:?} = {physical}{unit} exceeds engineering limit {max}{unit}",
                    signal.name
                ));
            }
        }
        if lower_name.contains("voltage") && (physical < VOLTAGE_SAFE_MIN || physical > VOLTAGE_SAFE_MAX) {
            result.push_warning(format!(
                "signal {:?} = {physical}V outside safe voltage band [{VOLTAGE_SAFE_MIN}, {VOLTAGE_SAFE_MAX}]",
                signal.name
            ));
        }
    }
}

/// Running counters over every frame validated so far (§4.15, ported from
/// the original `get_validation_stats`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorStats {
    pub frames_checked: u64,
    pub frames_with_errors: u64,
    pub total_errors: u64,
    pub total_warnings: u64,
}

/// Thin stateful wrapper around [`validate_decoded`] that accumulates
/// [`ValidatorStats`] across calls; the pure function remains usable on
/// its own for tests and one-off checks.
#[derive(Debug, Default)]
pub struct Validator {
    stats: ValidatorStats,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&mut self, signals: &[Signal], raw_signals: &HashMap<String, u64>) -> ValidationResult {
        let result = validate_decoded(signals, raw_signals);
        self.stats.frames_checked += 1;
        self.stats.total_errors += result.errors.len() as u64;
        self.stats.total_warnings += result.warnings.len() as u64;
        if !result.ok {
            self.stats.frames_with_errors += 1;
        }
        result
    }

    pub fn stats(&self) -> &ValidatorStats {
        &self.stats
    }
}

/// Outcome of checking whether a source address is within the permitted
/// range (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePermission {
    /// Recognised and within range.
    Valid,
    /// Within the valid range but not previously known — admitted, but
    /// callers should log a low-severity anomaly.
    ValidUnknown,
    /// Reserved/special address range (0xF8..0xFF).
    Reserved,
}

/// Validates `source` against the permitted address range (§4.5).
/// `known_sources` lets callers distinguish a never-seen-but-valid
/// source (admitted with a low-severity anomaly) from a recognised one.
pub fn validate_source_permissions(source: u8, known: bool) -> SourcePermission {
    if !VALID_SOURCE_RANGE.contains(&source) {
        return SourcePermission::Reserved;
    }
    if known {
        SourcePermission::Valid
    } else {
        SourcePermission::ValidUnknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ByteOrder, ValueType};

    fn signal(name: &str, scale: f64, offset: f64) -> Signal {
        Signal {
            name: name.to_string(),
            start_bit: 0,
            length: 16,
            byte_order: ByteOrder::LittleEndian,
            scale,
            offset,
            enum_map: None,
            value_type: ValueType::Unsigned,
        }
    }

    #[test]
    fn brightness_out_of_range_is_an_error() {
        let signals = vec![signal("brightness", 1.0, 0.0)];
        let raw = HashMap::from([("brightness".to_string(), 150u64)]);
        let result = validate_decoded(&signals, &raw);
        assert!(!result.ok);
        assert!(result.errors[0].contains("out of range"));
    }

    /// §8 boundary behaviour: `brightness=0, state=on` is a violation
    /// (the biconditional rule requires trigger and dependency to agree).
    #[test]
    fn brightness_zero_with_state_on_is_a_dependency_violation() {
        let signals = vec![signal("brightness", 1.0, 0.0), signal("state", 1.0, 0.0)];
        let raw = HashMap::from([
            ("brightness".to_string(), 0u64),
            ("state".to_string(), 1u64),
        ]);
        let result = validate_decoded(&signals, &raw);
        assert!(!result.ok);
        assert!(result.errors.iter().any(|e| e.contains("brightness>0 requires state == on")));
    }

    /// §8 boundary behaviour: `brightness=50, state=off` is a violation.
    #[test]
    fn brightness_nonzero_with_state_off_is_a_dependency_violation() {
        let signals = vec![signal("brightness", 1.0, 0.0), signal("state", 1.0, 0.0)];
        let raw = HashMap::from([
            ("brightness".to_string(), 50u64),
            ("state".to_string(), 0u64),
        ]);
        let result = validate_decoded(&signals, &raw);
        assert!(!result.ok);
    }

    #[test]
    fn brightness_on_state_on_agree_and_pass() {
        let signals = vec![signal("brightness", 1.0, 0.0), signal("state", 1.0, 0.0)];
        let raw = HashMap::from([
            ("brightness".to_string(), 50u64),
            ("state".to_string(), 1u64),
        ]);
        let result = validate_decoded(&signals, &raw);
        assert!(result.ok);
    }

    #[test]
    fn engineering_limits_are_warnings_not_errors() {
        let signals = vec![signal("temperature", 1.0, -40.0)];
        let raw = HashMap::from([("temperature".to_string(), 130u64)]); // physical = 90
        let result = validate_decoded(&signals, &raw);
        assert!(result.ok);
        assert!(result.warnings.iter().any(|w| w.contains("engineering limit")));
    }

    #[test]
    fn validator_accumulates_stats_across_calls() {
        let mut validator = Validator::new();
        let ok_signals = vec![signal("temperature", 1.0, -40.0)];
        let ok_raw = HashMap::from([("temperature".to_string(), 50u64)]);
        validator.validate(&ok_signals, &ok_raw);

        let bad_signals = vec![signal("brightness", 1.0, 0.0)];
        let bad_raw = HashMap::from([("brightness".to_string(), 150u64)]);
        validator.validate(&bad_signals, &bad_raw);

        assert_eq!(validator.stats().frames_checked, 2);
        assert_eq!(validator.stats().frames_with_errors, 1);
    }

    #[test]
    fn source_permission_classification() {
        assert_eq!(validate_source_permissions(0x50, true), SourcePermission::Valid);
        assert_eq!(
            validate_source_permissions(0x50, false),
            SourcePermission::ValidUnknown
        );
        assert_eq!(validate_source_permissions(0xFA, false), SourcePermission::Reserved);
    }
}
