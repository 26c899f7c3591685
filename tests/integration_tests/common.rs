// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io::Write, path::PathBuf};

use rvc_runtime::cfg::config::RuntimeConfig;

pub fn write_temp(contents: &str, name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("rvc_integration_test_{}_{name}", std::process::id()));
    let mut f = std::fs::File::create(&path).expect("create temp file");
    f.write_all(contents.as_bytes()).expect("write temp file");
    path
}

/// A kitchen-light dimmer wired up end to end: a status DGN with
/// `instance`/`brightness` signals, a paired command DGN, and the coach
/// mapping entry that ties `kitchen_light` to instance 3.
pub fn sample_spec_and_mapping() -> (PathBuf, PathBuf) {
    let spec = write_temp(
        r#"{
            "pgns": {
                "DC_DIMMER_STATUS_3": {
                    "pgn": "1FEDA", "signals": [
                        {"name": "instance", "start_bit": 0, "length": 8},
                        {"name": "brightness", "start_bit": 8, "length": 8}
                    ]
                },
                "DC_DIMMER_COMMAND_2": {
                    "pgn": "1FEDB", "signals": [
                        {"name": "instance", "start_bit": 0, "length": 8}
                    ]
                }
            }
        }"#,
        "spec",
    );
    let mapping = write_temp(
        r#"
dgn_pairs:
  "1FEDB": "1FEDA"
"1FEDA":
  "3":
    - entity_id: "kitchen_light"
      friendly_name: "Kitchen Light"
      device_type: dimmer
"#,
        "mapping",
    );
    (spec, mapping)
}

pub fn sample_config(spec_path: PathBuf, mapping_path: PathBuf) -> RuntimeConfig {
    RuntimeConfig {
        spec_path,
        coach_mapping_path: mapping_path,
        coach_model: None,
        can_bustype: "socketcan".to_string(),
        controller_source_address: 0xF9,
        interfaces: vec!["can0".to_string()],
        discovery: Default::default(),
        scheduler: Default::default(),
        security: Default::default(),
    }
}
