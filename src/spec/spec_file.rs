// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Parsing of the RV-C DGN specification JSON file (§6).

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::{
    frame::make_dgn,
    spec::{
        error::CatalogueError,
        types::{Signal, SpecEntry},
    },
    utils::parse_hex_u32,
};

#[derive(Debug, Deserialize)]
struct RawSpecFile {
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    source: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    rvc_version: Option<String>,
    pgns: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawSpecEntry {
    pgn: String,
    #[serde(default)]
    #[allow(dead_code)]
    id: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    extended: Option<bool>,
    #[serde(default)]
    length: Option<u32>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    signals: Vec<Signal>,
}

/// Parses the spec JSON text into `dgn → SpecEntry`, keyed by the full
/// 24-bit DGN built from each entry's declared (or default) priority.
///
/// Malformed individual PGN entries are skipped with a warning, not
/// fatal (§4.1); a missing top-level `pgns` object is fatal.
pub fn parse_spec_file(text: &str) -> Result<HashMap<u32, SpecEntry>, CatalogueError> {
    let raw: RawSpecFile = serde_json::from_str(text)?;
    let mut entries = HashMap::with_capacity(raw.pgns.len());

    for (name, value) in raw.pgns {
        let entry: RawSpecEntry = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(e) => {
                warn!(pgn_name = %name, error = %e, "skipping malformed PGN spec entry");
                continue;
            },
        };
        let pgn = match parse_hex_u32(&entry.pgn) {
            Ok(p) => p,
            Err(e) => {
                warn!(pgn_name = %name, pgn_hex = %entry.pgn, error = %e, "skipping PGN entry with unparseable hex");
                continue;
            },
        };
        if entry.signals.iter().any(|s| s.name.is_empty()) {
            warn!(pgn_name = %name, "skipping PGN entry with a signal missing a name");
            continue;
        }

        let priority_default = entry
            .priority
            .as_deref()
            .and_then(|p| parse_hex_u32(p).ok())
            .map(|p| p as u8)
            .unwrap_or(crate::frame::DEFAULT_PRIORITY);

        let dgn = make_dgn(priority_default, pgn);
        entries.insert(dgn, SpecEntry {
            pgn_hex: entry.pgn,
            name,
            length: entry.length,
            priority_default,
            signals: entry.signals,
        });
    }

    if entries.is_empty() {
        return Err(CatalogueError::SpecInvalid {
            reason: "spec file contains no usable PGN entries".to_string(),
        });
    }

    Ok(entries)
}
