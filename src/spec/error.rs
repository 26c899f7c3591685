// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Fatal load-time errors for the specification file or the coach mapping.
/// Either halts initialisation — the catalogue is either fully usable or
/// does not exist.
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("spec file invalid: {reason}")]
    SpecInvalid { reason: String },

    #[error("coach mapping invalid: {reason}")]
    CoachMappingInvalid { reason: String },

    #[error("failed to parse spec JSON: {0}")]
    SpecParse(#[from] serde_json::Error),

    #[error("failed to parse coach mapping YAML: {0}")]
    MappingParse(#[source] serde_yaml::Error),

    #[error("no coach mapping file found for model {model:?} under {dir}")]
    NoMappingFile { model: Option<String>, dir: String },
}
