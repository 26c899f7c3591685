// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Spec Catalogue (C1): DGN specification + coach mapping, loaded
//! once and shared immutably for the process lifetime (§4.1).

/// Coach-mapping YAML parsing and coach-variant file selection.
pub mod coach_mapping;
/// Fatal load-time error taxonomy.
pub mod error;
/// Spec JSON parsing.
pub mod spec_file;
/// Typed spec-entry/signal/device-record representations.
pub mod types;

mod catalogue;

pub use catalogue::{Catalogue, load_from_config};
pub use error::CatalogueError;
pub use types::{ByteOrder, CoachInfo, DeviceRecord, DeviceType, Signal, SpecEntry, ValueType};
