// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Wire protocols the discovery engine can poll for.
///
/// RV-C and J1939 share the PGN-Request mechanism (PGN 0xEA00) but use
/// different discovery-PGN catalogues; the protocol tag selects which
/// catalogue a discovery/poll cycle uses.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[serde(rename = "rvc", alias = "RVC", alias = "RV-C")]
    Rvc,
    #[serde(rename = "j1939", alias = "J1939")]
    J1939,
}
impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Rvc => "rvc",
            Protocol::J1939 => "j1939",
        })
    }
}
