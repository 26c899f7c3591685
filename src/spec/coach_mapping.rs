// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Parsing and file-selection logic for the deployment-specific coach
//! mapping (§3, §4.1).

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_yaml::Value;

use crate::{
    spec::{
        error::CatalogueError,
        types::{CoachInfo, DeviceRecord},
    },
    utils::{normalize_coach_model, parse_hex_u32},
};

/// Top-level keys that are metadata, not `dgn_hex → instance → devices`
/// maps (§3).
pub const RESERVED_KEYS: &[&str] = &[
    "coach_info",
    "dgn_pairs",
    "templates",
    "global_defaults",
    "areas",
    "lighting_scenes",
    "lighting_groups",
    "validation_rules",
    "file_metadata",
    "can_interface_mapping",
];

/// The parsed result of loading one coach-mapping file.
#[derive(Debug, Default)]
pub struct CoachMapping {
    /// `dgn_hex → instance_id → devices`.
    pub devices: HashMap<String, HashMap<String, Vec<DeviceRecord>>>,
    /// `command_dgn_hex → status_dgn_hex`, directional as stored but
    /// queried bidirectionally (§4.1).
    pub dgn_pairs: HashMap<String, String>,
    pub coach_info: CoachInfo,
}

#[derive(Debug, Deserialize)]
struct RawCoachInfo {
    year: Option<u16>,
    make: Option<String>,
    model: Option<String>,
    trim: Option<String>,
}

/// Picks the coach-mapping file to load: an exact match for `coach_model`
/// (normalised) if given, otherwise the first `coach_mapping.default.*`
/// found in `dir`. `mapping_path` may itself already be a concrete file,
/// in which case it is used directly.
pub fn select_mapping_file(
    mapping_path: &Path,
    coach_model: Option<&str>,
) -> Result<PathBuf, CatalogueError> {
    if mapping_path.is_file() {
        return Ok(mapping_path.to_path_buf());
    }

    let dir = mapping_path;
    let read_dir = fs::read_dir(dir).map_err(|source| CatalogueError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut default_candidate = None;
    let wanted = coach_model.map(normalize_coach_model);

    for entry in read_dir.flatten() {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let normalized_stem = normalize_coach_model(stem);

        if let Some(wanted) = &wanted {
            if normalized_stem == *wanted
                || normalized_stem == format!("coach_mapping.{wanted}")
                || normalized_stem.ends_with(&format!(".{wanted}"))
            {
                return Ok(path);
            }
        }
        if normalized_stem.starts_with("coach_mapping.default")
            || normalized_stem == "coach_mapping"
        {
            default_candidate.get_or_insert(path);
        }
    }

    default_candidate.ok_or_else(|| CatalogueError::NoMappingFile {
        model: coach_model.map(str::to_string),
        dir: dir.display().to_string(),
    })
}

/// Parses a coach-mapping YAML document, separating reserved metadata
/// sections from the `dgn_hex → instance → devices` entries.
pub fn parse_coach_mapping(
    text: &str,
    file_stem: &str,
) -> Result<CoachMapping, CatalogueError> {
    let raw: HashMap<String, Value> =
        serde_yaml::from_str(text).map_err(CatalogueError::MappingParse)?;

    let mut mapping = CoachMapping::default();

    if let Some(dgn_pairs_value) = raw.get("dgn_pairs") {
        let pairs: HashMap<String, String> = serde_yaml::from_value(dgn_pairs_value.clone())
            .map_err(CatalogueError::MappingParse)?;
        mapping.dgn_pairs = pairs;
    }

    mapping.coach_info = match raw.get("coach_info") {
        Some(value) => {
            let raw_info: RawCoachInfo =
                serde_yaml::from_value(value.clone()).map_err(CatalogueError::MappingParse)?;
            CoachInfo {
                year: raw_info.year,
                make: raw_info.make,
                model: raw_info.model,
                trim: raw_info.trim,
            }
        },
        None => coach_info_from_filename(file_stem),
    };

    for (key, value) in &raw {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if parse_hex_u32(key).is_err() {
            continue;
        }
        let instances: HashMap<String, Vec<DeviceRecord>> =
            serde_yaml::from_value(value.clone()).map_err(CatalogueError::MappingParse)?;
        mapping.devices.insert(key.clone(), instances);
    }

    Ok(mapping)
}

/// Derives coach identity from a filename stem of the form
/// `[year][make][model][trim…]`, split on `_` (§4.1).
fn coach_info_from_filename(stem: &str) -> CoachInfo {
    let parts: Vec<&str> = stem.split('_').collect();
    let mut info = CoachInfo::default();
    let mut idx = 0;

    if let Some(first) = parts.first() {
        if first.len() == 4 && first.chars().all(|c| c.is_ascii_digit()) {
            info.year = first.parse().ok();
            idx = 1;
        }
    }
    if let Some(make) = parts.get(idx) {
        info.make = Some((*make).to_string());
        idx += 1;
    }
    if let Some(model) = parts.get(idx) {
        info.model = Some((*model).to_string());
        idx += 1;
    }
    if idx < parts.len() {
        info.trim = Some(parts[idx..].join("_"));
    }
    info
}

/// Collects the full set of `entity_id`s appearing in `devices`, returning
/// an error describing the first duplicate found (§3, §4.1 invariants).
pub fn collect_unique_entity_ids(
    devices: &HashMap<String, HashMap<String, Vec<DeviceRecord>>>,
) -> Result<HashSet<String>, CatalogueError> {
    let mut seen = HashSet::new();
    for (dgn_hex, instances) in devices {
        for (instance, records) in instances {
            for record in records {
                if !seen.insert(record.entity_id.clone()) {
                    return Err(CatalogueError::CoachMappingInvalid {
                        reason: format!(
                            "duplicate entity_id {:?} (seen again at {dgn_hex}/{instance})",
                            record.entity_id
                        ),
                    });
                }
            }
        }
    }
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reserved_and_device_sections() {
        let yaml = r#"
coach_info:
  year: 2021
  make: Entegra
  model: Aspire
  trim: 44R
dgn_pairs:
  "1FEDB": "1FEDA"
"1FEDA":
  "3":
    - entity_id: kitchen_light
      friendly_name: Kitchen Light
      device_type: light
      capabilities: ["dimming"]
"#;
        let mapping = parse_coach_mapping(yaml, "irrelevant").expect("parse");
        assert_eq!(mapping.coach_info.make.as_deref(), Some("Entegra"));
        assert_eq!(
            mapping.dgn_pairs.get("1FEDB").map(String::as_str),
            Some("1FEDA")
        );
        let devices = &mapping.devices["1FEDA"]["3"];
        assert_eq!(devices[0].entity_id, "kitchen_light");
    }

    #[test]
    fn derives_coach_info_from_filename_when_absent() {
        let info = coach_info_from_filename("2021_entegra_aspire_44r");
        assert_eq!(info.year, Some(2021));
        assert_eq!(info.make.as_deref(), Some("entegra"));
        assert_eq!(info.model.as_deref(), Some("aspire"));
        assert_eq!(info.trim.as_deref(), Some("44r"));
    }

    #[test]
    fn rejects_duplicate_entity_ids() {
        let mut devices = HashMap::new();
        let mut instances = HashMap::new();
        instances.insert("3".to_string(), vec![DeviceRecord {
            entity_id: "dup".to_string(),
            friendly_name: "A".to_string(),
            device_type: crate::spec::types::DeviceType::Light,
            capabilities: Default::default(),
            area: None,
            configuration: None,
        }]);
        devices.insert("1FEDA".to_string(), instances.clone());
        devices.insert("1FEEB".to_string(), {
            let mut other = HashMap::new();
            other.insert("4".to_string(), vec![DeviceRecord {
                entity_id: "dup".to_string(),
                friendly_name: "B".to_string(),
                device_type: crate::spec::types::DeviceType::Tank,
                capabilities: Default::default(),
                area: None,
                configuration: None,
            }]);
            other
        });
        assert!(collect_unique_entity_ids(&devices).is_err());
    }
}
