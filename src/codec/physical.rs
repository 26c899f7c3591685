// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Conversion between a signal's raw bit-field integer and its physical
//! (scaled, possibly enum-symbolic) value.

use std::collections::HashMap;

use crate::spec::types::{Signal, ValueType};

/// The two parallel views a decoded signal produces: a human-readable
/// string (enum symbol if one maps, otherwise the formatted physical
/// number) and the raw integer straight off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub formatted: String,
    pub raw: u64,
}

/// Re-interprets `raw` as a signed value if the signal's `value_type` is
/// `Signed`, using two's complement over `signal.length` bits.
fn sign_extend(raw: u64, length: usize) -> i64 {
    if length == 0 || length >= 64 {
        return raw as i64;
    }
    let shift = 64 - length;
    ((raw << shift) as i64) >> shift
}

/// Applies scale/offset (and enum lookup, if present) to a raw bit-field
/// value, producing the two parallel decoded views described in the data
/// model: `decoded[name]` (string) and `raw[name]` (integer).
pub fn decode_value(signal: &Signal, raw: u64) -> DecodedValue {
    if let Some(enum_map) = &signal.enum_map {
        if let Some(symbol) = enum_map.get(&raw.to_string()) {
            return DecodedValue {
                formatted: symbol.clone(),
                raw,
            };
        }
    }
    let physical = match signal.value_type {
        ValueType::Signed => sign_extend(raw, signal.length) as f64 * signal.scale + signal.offset,
        ValueType::Unsigned => raw as f64 * signal.scale + signal.offset,
    };
    let formatted = if signal.scale.fract() == 0.0 && signal.offset.fract() == 0.0 {
        format!("{}", physical as i64)
    } else {
        format!("{physical}")
    };
    DecodedValue { formatted, raw }
}

/// Inverse of [`decode_value`] for the numeric (non-enum) path: computes
/// `raw = round((value - offset) / scale)`, clamped to `[0, 2^length - 1]`.
pub fn encode_value(signal: &Signal, value: f64) -> u64 {
    let raw = ((value - signal.offset) / signal.scale).round();
    let max = if signal.length >= 64 {
        u64::MAX
    } else {
        (1u64 << signal.length) - 1
    };
    if raw <= 0.0 {
        0
    } else if raw >= max as f64 {
        max
    } else {
        raw as u64
    }
}

/// Looks up the raw integer bound to an enum symbol, for encode paths that
/// receive a symbolic name instead of a number.
pub fn encode_enum_symbol(signal: &Signal, symbol: &str) -> Option<u64> {
    let enum_map = signal.enum_map.as_ref()?;
    enum_map
        .iter()
        .find(|(_, v)| v.as_str() == symbol)
        .and_then(|(k, _)| k.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(scale: f64, offset: f64, length: usize, value_type: ValueType) -> Signal {
        Signal {
            name: "test".to_string(),
            start_bit: 0,
            length,
            byte_order: crate::spec::types::ByteOrder::LittleEndian,
            scale,
            offset,
            enum_map: None,
            value_type,
        }
    }

    #[test]
    fn applies_scale_and_offset() {
        let sig = signal(0.1, -40.0, 16, ValueType::Unsigned);
        let decoded = decode_value(&sig, 1000);
        assert_eq!(decoded.formatted, "60");
        assert_eq!(decoded.raw, 1000);
    }

    #[test]
    fn encode_is_inverse_of_decode_for_integral_scale() {
        let sig = signal(1.0, 0.0, 8, ValueType::Unsigned);
        let raw = encode_value(&sig, 75.0);
        assert_eq!(raw, 75);
        assert_eq!(decode_value(&sig, raw).formatted, "75");
    }

    #[test]
    fn encode_clamps_to_bit_width() {
        let sig = signal(1.0, 0.0, 8, ValueType::Unsigned);
        assert_eq!(encode_value(&sig, 1000.0), 255);
        assert_eq!(encode_value(&sig, -10.0), 0);
    }

    #[test]
    fn signed_values_sign_extend() {
        let sig = signal(1.0, 0.0, 8, ValueType::Signed);
        let decoded = decode_value(&sig, 0xFF);
        assert_eq!(decoded.formatted, "-1");
    }

    #[test]
    fn enum_map_takes_priority_over_scaling() {
        let mut sig = signal(1.0, 0.0, 2, ValueType::Unsigned);
        sig.enum_map = Some(HashMap::from([
            ("0".to_string(), "off".to_string()),
            ("1".to_string(), "on".to_string()),
        ]));
        assert_eq!(decode_value(&sig, 1).formatted, "on");
        assert_eq!(encode_enum_symbol(&sig, "on"), Some(1));
    }
}
