// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Spec Catalogue (C1): loads and indexes the DGN specification and
//! coach mapping once at start-up, then hands out immutable references
//! for the remainder of the process lifetime (§4.1).

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{
    frame::Dgn,
    spec::{
        coach_mapping::{self, CoachMapping},
        error::CatalogueError,
        spec_file,
        types::{CoachInfo, DeviceRecord, SpecEntry},
    },
    utils::parse_hex_u32,
};

/// Empty slice returned by [`Catalogue::devices_for`] when no device is
/// mapped to the given `(dgn_hex, instance)` — avoids allocating an empty
/// `Vec` per miss.
static NO_DEVICES: &[DeviceRecord] = &[];

/// Immutable, indexed view over a loaded spec file + coach mapping.
///
/// Built once via [`Catalogue::load`] and shared by `Arc` with every
/// component that needs to resolve a DGN, an entity, or a command/status
/// pairing. Never mutated after load (§5).
#[derive(Debug)]
pub struct Catalogue {
    by_dgn: HashMap<Dgn, SpecEntry>,
    /// `pgn_hex` (uppercase, no leading zeros) → dgn, for the secondary
    /// lookup path.
    pgn_hex_index: HashMap<String, Dgn>,
    devices: HashMap<String, HashMap<String, Vec<DeviceRecord>>>,
    entity_index: HashMap<String, (String, String)>,
    dgn_pairs: HashMap<String, String>,
    coach_info: CoachInfo,
}

impl Catalogue {
    /// Parses the spec file and the selected coach mapping, validates the
    /// cross-references in §4.1's invariants list, and builds all lookup
    /// indices.
    pub fn load(spec_path: &Path, mapping_path: &Path) -> Result<Self, CatalogueError> {
        Self::load_for_model(spec_path, mapping_path, None)
    }

    /// As [`Catalogue::load`], selecting the mapping file for a specific
    /// `coach_model` (normally sourced from `RVC_COACH_MODEL`).
    pub fn load_for_model(
        spec_path: &Path,
        mapping_path: &Path,
        coach_model: Option<&str>,
    ) -> Result<Self, CatalogueError> {
        let spec_text = fs::read_to_string(spec_path).map_err(|source| CatalogueError::Io {
            path: spec_path.display().to_string(),
            source,
        })?;
        let by_dgn = spec_file::parse_spec_file(&spec_text)?;

        let mapping_file = coach_mapping::select_mapping_file(mapping_path, coach_model)?;
        let mapping_text =
            fs::read_to_string(&mapping_file).map_err(|source| CatalogueError::Io {
                path: mapping_file.display().to_string(),
                source,
            })?;
        let stem = mapping_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let mapping: CoachMapping = coach_mapping::parse_coach_mapping(&mapping_text, stem)?;

        coach_mapping::collect_unique_entity_ids(&mapping.devices)?;

        let pgn_hex_index = by_dgn
            .iter()
            .map(|(&dgn, entry)| (normalize_pgn_hex(&entry.pgn_hex), dgn))
            .collect::<HashMap<_, _>>();

        validate_cross_references(&by_dgn, &pgn_hex_index, &mapping)?;

        let entity_index = build_entity_index(&mapping.devices);

        Ok(Self {
            by_dgn,
            pgn_hex_index,
            devices: mapping.devices,
            entity_index,
            dgn_pairs: mapping.dgn_pairs,
            coach_info: mapping.coach_info,
        })
    }

    pub fn lookup_by_dgn(&self, dgn: Dgn) -> Option<&SpecEntry> {
        self.by_dgn.get(&dgn)
    }

    pub fn lookup_by_pgn_hex(&self, pgn_hex: &str) -> Option<&SpecEntry> {
        let dgn = self.pgn_hex_index.get(&normalize_pgn_hex(pgn_hex))?;
        self.by_dgn.get(dgn)
    }

    pub fn devices_for(&self, dgn_hex: &str, instance: &str) -> &[DeviceRecord] {
        self.devices
            .get(&normalize_pgn_hex(dgn_hex))
            .and_then(|instances| instances.get(instance))
            .map(Vec::as_slice)
            .unwrap_or(NO_DEVICES)
    }

    pub fn entity_to_location(&self, entity_id: &str) -> Option<(&str, &str)> {
        self.entity_index
            .get(entity_id)
            .map(|(dgn_hex, instance)| (dgn_hex.as_str(), instance.as_str()))
    }

    /// Resolves a command DGN for a status DGN: consults `dgn_pairs` in
    /// both directions, falling back to the `status + 0x100` legacy
    /// heuristic (flagged at warning level when invoked — Open Question
    /// (b)).
    pub fn command_dgn_for_status(&self, status_dgn_hex: &str) -> Option<String> {
        let status_norm = normalize_pgn_hex(status_dgn_hex);

        if let Some(cmd) = self
            .dgn_pairs
            .iter()
            .find(|(_, status)| normalize_pgn_hex(status) == status_norm)
            .map(|(cmd, _)| cmd.clone())
        {
            return Some(cmd);
        }
        if let Some(cmd) = self.dgn_pairs.get(status_dgn_hex) {
            return Some(cmd.clone());
        }

        let status_pgn = parse_hex_u32(&status_norm).ok()?;
        let fallback_pgn = status_pgn + 0x100;
        let fallback_hex = format!("{fallback_pgn:X}");
        if self.pgn_hex_index.contains_key(&fallback_hex) {
            warn!(
                status_dgn = %status_dgn_hex,
                fallback_dgn = %fallback_hex,
                "no explicit dgn_pairs entry; using status+0x100 legacy heuristic"
            );
            return Some(fallback_hex);
        }
        None
    }

    pub fn coach_info(&self) -> &CoachInfo {
        &self.coach_info
    }

    /// All (dgn, entry) pairs — used by the discovery engine to build its
    /// device-type → status-PGN table and by missing-DGN reconciliation.
    pub fn entries(&self) -> impl Iterator<Item = (&Dgn, &SpecEntry)> {
        self.by_dgn.iter()
    }
}

fn normalize_pgn_hex(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    match parse_hex_u32(trimmed) {
        Ok(v) => format!("{v:X}"),
        Err(_) => trimmed.to_uppercase(),
    }
}

fn build_entity_index(
    devices: &HashMap<String, HashMap<String, Vec<DeviceRecord>>>,
) -> HashMap<String, (String, String)> {
    let mut index = HashMap::new();
    for (dgn_hex, instances) in devices {
        for (instance, records) in instances {
            for record in records {
                index.insert(record.entity_id.clone(), (dgn_hex.clone(), instance.clone()));
            }
        }
    }
    index
}

/// Checks the invariants from §4.1: every mapping DGN and every
/// `dgn_pairs` side must resolve in the PGN index.
fn validate_cross_references(
    by_dgn: &HashMap<Dgn, SpecEntry>,
    pgn_hex_index: &HashMap<String, Dgn>,
    mapping: &CoachMapping,
) -> Result<(), CatalogueError> {
    for dgn_hex in mapping.devices.keys() {
        if !pgn_hex_index.contains_key(&normalize_pgn_hex(dgn_hex)) {
            return Err(CatalogueError::CoachMappingInvalid {
                reason: format!("mapping references unknown DGN {dgn_hex} not present in spec"),
            });
        }
    }
    for (cmd, status) in &mapping.dgn_pairs {
        if !pgn_hex_index.contains_key(&normalize_pgn_hex(cmd)) {
            return Err(CatalogueError::CoachMappingInvalid {
                reason: format!("dgn_pairs command side {cmd} not present in spec"),
            });
        }
        if !pgn_hex_index.contains_key(&normalize_pgn_hex(status)) {
            return Err(CatalogueError::CoachMappingInvalid {
                reason: format!("dgn_pairs status side {status} not present in spec"),
            });
        }
    }
    let _ = by_dgn;
    Ok(())
}

/// Resolves a runtime-configured spec/mapping path pair into a loaded
/// catalogue, honouring `coach_model` precedence (env override already
/// applied by [`crate::cfg::config::RuntimeConfig`]).
pub fn load_from_config(
    spec_path: &Path,
    mapping_path: &Path,
    coach_model: Option<&str>,
) -> Result<Catalogue, CatalogueError> {
    Catalogue::load_for_model(spec_path, mapping_path, coach_model)
}
