// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Encoder (C4): turns `(entity_id, command)` into a CAN frame
//! conformant to the loaded spec (§4.4).

use thiserror::Error;

use crate::{
    codec::{encode_value, set_bits},
    frame::{ArbitrationId, CanFrame, DEFAULT_PRIORITY},
    spec::{Catalogue, DeviceType},
    utils::parse_hex_u32,
};

/// The "brightness up/down/toggle" magic values are folklore, not spec —
/// kept as named constants rather than literals scattered through the
/// device-type strategies below (Open Question (a), see DESIGN.md).
pub mod magic {
    pub const BRIGHTNESS_UP: u8 = 0xFC;
    pub const BRIGHTNESS_DOWN: u8 = 0xFD;
    pub const TOGGLE: u8 = 0xFE;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}

/// A tagged command the caller wants applied to an entity (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Set {
        state: SwitchState,
        brightness: Option<u8>,
    },
    Toggle,
    BrightnessUp,
    BrightnessDown,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unknown entity: {entity_id}")]
    UnknownEntity { entity_id: String },

    #[error("no command DGN reachable for status DGN {status_dgn}")]
    NoCommandDgn { status_dgn: String },

    #[error("invalid command for entity {entity_id}: {reason}")]
    InvalidCommand { entity_id: String, reason: String },
}

/// Result of [`validate`]: whether the command can be encoded for this
/// entity, and if not, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub reason: Option<String>,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validates that `command` can be encoded for `entity_id` without
/// actually encoding it (§4.4 "Validation precedes encoding").
pub fn validate(catalogue: &Catalogue, entity_id: &str, command: Command) -> ValidationOutcome {
    let Some((status_dgn_hex, instance)) = catalogue.entity_to_location(entity_id) else {
        return ValidationOutcome::fail(format!("unknown entity: {entity_id}"));
    };

    if catalogue.devices_for(status_dgn_hex, instance).is_empty() {
        return ValidationOutcome::fail("entity resolved to a location with no device record");
    }

    if let Command::Set {
        brightness: Some(b),
        ..
    } = command
    {
        if b > 100 {
            return ValidationOutcome::fail("Brightness must be between 0 and 100");
        }
    }

    if catalogue.command_dgn_for_status(status_dgn_hex).is_none() {
        return ValidationOutcome::fail(format!(
            "no command DGN reachable for status DGN {status_dgn_hex}"
        ));
    }

    ValidationOutcome::ok()
}

/// Encodes `command` for `entity_id` into a single extended CAN frame
/// (§4.4). Multi-frame emission is out of scope for the core.
pub fn encode(
    catalogue: &Catalogue,
    entity_id: &str,
    command: Command,
    controller_source_address: u8,
) -> Result<CanFrame, EncodeError> {
    let (status_dgn_hex, instance_str) =
        catalogue
            .entity_to_location(entity_id)
            .ok_or_else(|| EncodeError::UnknownEntity {
                entity_id: entity_id.to_string(),
            })?;

    let device = catalogue
        .devices_for(status_dgn_hex, instance_str)
        .first()
        .ok_or_else(|| EncodeError::UnknownEntity {
            entity_id: entity_id.to_string(),
        })?;

    let command_dgn_hex = catalogue.command_dgn_for_status(status_dgn_hex).ok_or_else(|| {
        EncodeError::NoCommandDgn {
            status_dgn: status_dgn_hex.to_string(),
        }
    })?;

    let command_pgn = parse_hex_u32(&command_dgn_hex).map_err(|e| EncodeError::InvalidCommand {
        entity_id: entity_id.to_string(),
        reason: format!("command DGN {command_dgn_hex} is not valid hex: {e}"),
    })?;

    let instance: u8 = instance_str.parse().map_err(|_| EncodeError::InvalidCommand {
        entity_id: entity_id.to_string(),
        reason: format!("instance {instance_str:?} is not a valid u8"),
    })?;

    let mut payload = [0u8; 8];
    payload[0] = instance;

    apply_command_strategy(&mut payload, device.device_type.clone(), command, entity_id)?;

    let priority = catalogue
        .lookup_by_pgn_hex(&command_dgn_hex)
        .map(|entry| entry.priority_default)
        .unwrap_or(DEFAULT_PRIORITY);

    let arb = ArbitrationId::for_pgn(command_pgn, controller_source_address, priority);
    Ok(CanFrame::new(arb.to_raw(), &payload))
}

/// Device-type-specific command-byte encoding (§4.4 step 4).
fn apply_command_strategy(
    payload: &mut [u8; 8],
    device_type: DeviceType,
    command: Command,
    entity_id: &str,
) -> Result<(), EncodeError> {
    match device_type {
        DeviceType::Light | DeviceType::Dimmer => match command {
            Command::Set {
                state: SwitchState::On,
                brightness,
            } => {
                let pct = brightness.unwrap_or(100).min(100);
                payload[1] = (pct as u16 * 2).min(200) as u8;
            },
            Command::Set {
                state: SwitchState::Off,
                ..
            } => payload[1] = 0,
            Command::Toggle => payload[1] = magic::TOGGLE,
            Command::BrightnessUp => payload[1] = magic::BRIGHTNESS_UP,
            Command::BrightnessDown => payload[1] = magic::BRIGHTNESS_DOWN,
        },
        DeviceType::Switch => match command {
            Command::Set {
                state: SwitchState::On,
                ..
            } => payload[1] = 1,
            Command::Set {
                state: SwitchState::Off,
                ..
            } => payload[1] = 0,
            Command::Toggle => payload[1] = magic::TOGGLE,
            Command::BrightnessUp | Command::BrightnessDown => {
                return Err(EncodeError::InvalidCommand {
                    entity_id: entity_id.to_string(),
                    reason: "switches do not support brightness commands".to_string(),
                });
            },
        },
        DeviceType::Fan => match command {
            Command::Set {
                state: SwitchState::On,
                brightness,
            } => payload[1] = brightness.unwrap_or(100).min(100),
            Command::Set {
                state: SwitchState::Off,
                ..
            } => payload[1] = 0,
            Command::Toggle => payload[1] = magic::TOGGLE,
            Command::BrightnessUp => payload[1] = magic::BRIGHTNESS_UP,
            Command::BrightnessDown => payload[1] = magic::BRIGHTNESS_DOWN,
        },
        _ => generic_signal_walk(payload, command),
    }
    Ok(())
}

/// Generic fallback for device types without a dedicated strategy: walk
/// well-known signal-name substrings (§4.4 step 4, "Other/unknown").
fn generic_signal_walk(payload: &mut [u8; 8], command: Command) {
    use crate::spec::{Signal, ValueType};

    let state_signal = Signal {
        name: "state".to_string(),
        start_bit: 8,
        length: 8,
        byte_order: crate::spec::ByteOrder::LittleEndian,
        scale: 1.0,
        offset: 0.0,
        enum_map: None,
        value_type: ValueType::Unsigned,
    };
    let level_signal = Signal {
        start_bit: 8,
        length: 8,
        ..state_signal.clone()
    };

    match command {
        Command::Set { state, brightness } => {
            let on = matches!(state, SwitchState::On);
            set_bits(payload, state_signal.start_bit, state_signal.length, on as u64);
            if let Some(level) = brightness {
                let raw = encode_value(&level_signal, level as f64);
                set_bits(payload, level_signal.start_bit, level_signal.length, raw);
            }
        },
        Command::Toggle => set_bits(payload, state_signal.start_bit, state_signal.length, magic::TOGGLE as u64),
        Command::BrightnessUp => {
            set_bits(payload, level_signal.start_bit, level_signal.length, magic::BRIGHTNESS_UP as u64)
        },
        Command::BrightnessDown => {
            set_bits(payload, level_signal.start_bit, level_signal.length, magic::BRIGHTNESS_DOWN as u64)
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write, path::PathBuf};

    use super::*;

    fn write_temp(contents: &str, name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("rvc_encoder_test_{}_{name}", std::process::id()));
        let mut f = fs::File::create(&path).expect("create");
        f.write_all(contents.as_bytes()).expect("write");
        path
    }

    fn catalogue() -> (Catalogue, PathBuf, PathBuf) {
        let spec = r#"{
            "pgns": {
                "DC_DIMMER_STATUS_3": {
                    "pgn": "1FEDA", "signals": [
                        {"name": "instance", "start_bit": 0, "length": 8}
                    ]
                },
                "DC_DIMMER_COMMAND_2": {
                    "pgn": "1FEDB", "signals": [
                        {"name": "instance", "start_bit": 0, "length": 8}
                    ]
                }
            }
        }"#;
        let mapping = r#"
dgn_pairs:
  "1FEDB": "1FEDA"
"1FEDA":
  "3":
    - entity_id: kitchen_light
      friendly_name: Kitchen Light
      device_type: light
"#;
        let spec_path = write_temp(spec, "spec.json");
        let mapping_path = write_temp(mapping, "mapping.yaml");
        let cat = Catalogue::load(&spec_path, &mapping_path).expect("load");
        (cat, spec_path, mapping_path)
    }

    /// S3: encode("kitchen_light", Set{On, brightness=75}).
    #[test]
    fn s3_encodes_light_on_with_brightness() {
        let (cat, spec_path, mapping_path) = catalogue();
        let frame = encode(
            &cat,
            "kitchen_light",
            Command::Set {
                state: SwitchState::On,
                brightness: Some(75),
            },
            0xF9,
        )
        .expect("encode");

        let expected_can_id = ArbitrationId::for_pgn(0x1FEDB, 0xF9, DEFAULT_PRIORITY).to_raw();
        assert_eq!(frame.can_id, expected_can_id);
        assert_eq!(frame.as_slice()[0], 3);
        assert_eq!(frame.as_slice()[1], 150);
        assert_eq!(&frame.as_slice()[2..], &[0, 0, 0, 0, 0, 0]);

        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }

    /// S4: validate("kitchen_light", Set{state=On, brightness=150}).
    #[test]
    fn s4_rejects_out_of_range_brightness() {
        let (cat, spec_path, mapping_path) = catalogue();
        let result = validate(
            &cat,
            "kitchen_light",
            Command::Set {
                state: SwitchState::On,
                brightness: Some(150),
            },
        );
        assert!(!result.ok);
        assert!(result.reason.unwrap().contains("Brightness must be between 0 and 100"));

        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let (cat, spec_path, mapping_path) = catalogue();
        let err = encode(&cat, "no_such_entity", Command::Toggle, 0xF9).unwrap_err();
        assert!(matches!(err, EncodeError::UnknownEntity { .. }));
        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }

    #[test]
    fn toggle_uses_magic_constant() {
        let (cat, spec_path, mapping_path) = catalogue();
        let frame = encode(&cat, "kitchen_light", Command::Toggle, 0xF9).expect("encode");
        assert_eq!(frame.as_slice()[1], magic::TOGGLE);
        let _ = fs::remove_file(&spec_path);
        let _ = fs::remove_file(&mapping_path);
    }
}
