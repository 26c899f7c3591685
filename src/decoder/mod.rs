// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Decoder (C3): turns `(dgn, payload)` into signals, never panics on
//! a short or unrecognised frame (§4.3).

/// Process-lifetime tracking of DGNs absent from the spec catalogue.
pub mod missing_dgn;

use std::collections::HashMap;

use crate::{
    codec::{decode_value, get_bits},
    frame::{CanFrame, Dgn},
    spec::{Catalogue, Signal},
};

pub use missing_dgn::{MissingDgnRecord, MissingDgnTracker};

/// The result of attempting to decode one frame against the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// `dgn` was found in the catalogue and decoded without error.
    Decoded {
        dgn: Dgn,
        /// Symbolic/formatted value per signal name.
        signals: HashMap<String, String>,
        /// Raw bit-field integer per signal name.
        raw_signals: HashMap<String, u64>,
        /// The `instance` signal's raw value, if the entry declares one.
        instance: Option<u64>,
    },
    /// `dgn` is not present in the catalogue's PGN index.
    UnknownDgn { dgn: Dgn },
    /// `dgn` is present but decoding a signal failed.
    DecodeError { dgn: Dgn, error: String },
}

impl DecodeOutcome {
    pub fn dgn(&self) -> Dgn {
        match self {
            Self::Decoded { dgn, .. } | Self::UnknownDgn { dgn } | Self::DecodeError { dgn, .. } => {
                *dgn
            },
        }
    }
}

/// Decodes a payload for a known [`crate::spec::SpecEntry`]'s signals,
/// returning the two parallel maps described in the data model.
fn decode_signals(signals: &[Signal], payload: &[u8]) -> (HashMap<String, String>, HashMap<String, u64>) {
    let mut formatted = HashMap::with_capacity(signals.len());
    let mut raw = HashMap::with_capacity(signals.len());
    for signal in signals {
        let raw_value = get_bits(payload, signal.start_bit, signal.length);
        let decoded = decode_value(signal, raw_value);
        formatted.insert(signal.name.clone(), decoded.formatted);
        raw.insert(signal.name.clone(), decoded.raw);
    }
    (formatted, raw)
}

/// Decodes a single DGN/payload pair against `catalogue`, recording any
/// unknown-DGN or decode-error observation into `missing`.
pub fn decode(
    catalogue: &Catalogue,
    missing: &MissingDgnTracker,
    dgn: Dgn,
    can_id: u32,
    payload: &[u8],
) -> DecodeOutcome {
    let Some(entry) = catalogue.lookup_by_dgn(dgn) else {
        missing.record(dgn, can_id, "");
        return DecodeOutcome::UnknownDgn { dgn };
    };

    // Single-frame entries must fit within 64 bits per signal (§3); a spec
    // entry violating this is a decode error, not a silent truncation.
    if entry.length.is_some() {
        if let Some(bad) = entry
            .signals
            .iter()
            .find(|s| s.start_bit + s.length > 64)
        {
            let error = format!(
                "signal {:?} exceeds single-frame width (start_bit={} length={})",
                bad.name, bad.start_bit, bad.length
            );
            missing.record(dgn, can_id, &format!("decode_error:{error}"));
            return DecodeOutcome::DecodeError { dgn, error };
        }
    }

    let (signals, raw_signals) = decode_signals(&entry.signals, payload);
    let instance = entry
        .instance_signal()
        .map(|sig| get_bits(payload, sig.start_bit, sig.length));

    DecodeOutcome::Decoded {
        dgn,
        signals,
        raw_signals,
        instance,
    }
}

/// Convenience wrapper decoding straight from a [`CanFrame`].
pub fn decode_frame(
    catalogue: &Catalogue,
    missing: &MissingDgnTracker,
    frame: &CanFrame,
) -> DecodeOutcome {
    decode(
        catalogue,
        missing,
        frame.dgn(),
        frame.can_id,
        frame.as_slice(),
    )
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write, path::PathBuf};

    use super::*;
    use crate::frame::make_dgn;

    fn write_temp(contents: &str, name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("rvc_decoder_test_{}_{name}", std::process::id()));
        let mut f = fs::File::create(&path).expect("create");
        f.write_all(contents.as_bytes()).expect("write");
        path
    }

    fn catalogue() -> (Catalogue, PathBuf, PathBuf) {
        let spec = r#"{
            "pgns": {
                "DC_DIMMER_STATUS_3": {
                    "pgn": "1FEDA", "signals": [
                        {"name": "instance", "start_bit": 0, "length": 8},
                        {"name": "group", "start_bit": 8, "length": 8}
                    ]
                }
            }
        }"#;
        let mapping = "\"1FEDA\":\n  \"25\":\n    - entity_id: x\n      friendly_name: X\n      device_type: light\n";
        let spec_path = write_temp(spec, "spec.json");
        let mapping_path = write_temp(mapping, "mapping.yaml");
        let cat = Catalogue::load(&spec_path, &mapping_path).expect("load");
        (cat, spec_path, mapping_path)
    }

    /// S1: decode(dgn=0x0019FEDA, payload) against instance@0..7, group@8..15.
    #[test]
    fn s1_decodes_known_dgn() {
        let (cat, spec_path, mapping_path) = catalogue();
        let missing = MissingDgnTracker::new();
        let dgn = make_dgn(6, 0x1FEDA);
        let payload = [0x19u8, 0x7C, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

        let outcome = decode(&cat, &missing, dgn, 0x18FEDA19, &payload);
        match outcome {
            DecodeOutcome::Decoded {
                raw_signals,
                signals,
                instance,
                ..
            } => {
                assert_eq!(raw_signals["instance"], 25);
                assert_eq!(raw_signals["group"], 124);
                assert_eq!(signals["instance"], "25");
                assert_eq!(signals["group"], "124");
                assert_eq!(instance, Some(25));
            },
            other => panic!("expected Decoded, got {other:?}"),
        }
        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }

    /// S2: unknown DGN is recorded and repeated observations increment.
    #[test]
    fn s2_unknown_dgn_is_tracked() {
        let (cat, spec_path, mapping_path) = catalogue();
        let missing = MissingDgnTracker::new();
        let dgn = 0xDEADBEEF & 0xFFFFFF;

        let outcome = decode(&cat, &missing, dgn, 0x1, &[]);
        assert!(matches!(outcome, DecodeOutcome::UnknownDgn { .. }));
        assert_eq!(missing.encounter_count(dgn), 1);

        let outcome2 = decode(&cat, &missing, dgn, 0x1, &[]);
        assert!(matches!(outcome2, DecodeOutcome::UnknownDgn { .. }));
        assert_eq!(missing.encounter_count(dgn), 2);

        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }

    #[test]
    fn oversized_signal_layout_is_a_decode_error() {
        let spec = r#"{
            "pgns": {
                "BROKEN": {
                    "pgn": "1FEEB", "length": 8, "signals": [
                        {"name": "huge", "start_bit": 60, "length": 16}
                    ]
                }
            }
        }"#;
        let mapping = "\"1FEEB\":\n  \"1\":\n    - entity_id: y\n      friendly_name: Y\n      device_type: tank\n";
        let spec_path = write_temp(spec, "broken_spec.json");
        let mapping_path = write_temp(mapping, "broken_mapping.yaml");
        let cat = Catalogue::load(&spec_path, &mapping_path).expect("load");
        let missing = MissingDgnTracker::new();
        let dgn = make_dgn(6, 0x1FEEB);

        let outcome = decode(&cat, &missing, dgn, 0x1, &[0u8; 8]);
        assert!(matches!(outcome, DecodeOutcome::DecodeError { .. }));
        assert_eq!(missing.encounter_count(dgn), 1);

        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }

    #[test]
    fn short_payload_decodes_missing_bits_as_zero() {
        let (cat, spec_path, mapping_path) = catalogue();
        let missing = MissingDgnTracker::new();
        let dgn = make_dgn(6, 0x1FEDA);

        let outcome = decode(&cat, &missing, dgn, 0x1, &[0x19]);
        match outcome {
            DecodeOutcome::Decoded { raw_signals, .. } => {
                assert_eq!(raw_signals["instance"], 25);
                assert_eq!(raw_signals["group"], 0);
            },
            other => panic!("expected Decoded, got {other:?}"),
        }
        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }
}
