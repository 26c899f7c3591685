// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RV-C protocol runtime: decode, encode, validate, schedule, and route
//! frames between a physical CAN bus and higher-level consumers. See
//! [`runtime::Runtime`] for the typed entry surface.

/// Configuration, CLI, and logging (ambient stack).
pub mod cfg;
/// Bit-level signal codec shared by the decoder and encoder.
pub mod codec;
/// Turns a raw [`frame::CanFrame`] into typed signals against the catalogue.
pub mod decoder;
/// Active PGN-Request polling and device topology/availability tracking.
pub mod discovery;
/// Turns an entity command into a raw [`frame::CanFrame`].
pub mod encoder;
/// Component lifecycle and error types shared across the runtime.
pub mod error;
/// The bounded, drop-oldest, per-subscriber publish/subscribe bus.
pub mod eventbus;
/// Wire-level CAN frame and DGN/arbitration-identifier primitives.
pub mod frame;
/// Wires the components together behind the typed runtime surface.
pub mod runtime;
/// Priority-class admission and ordered drain of decoded frames.
pub mod scheduler;
/// Rate limiting, anomaly detection, and trust scoring.
pub mod security;
/// RV-C DGN specification catalogue and coach mapping.
pub mod spec;
/// TX queue and writer: the only task permitted to hold a bus handle open.
pub mod txqueue;
/// Miscellaneous helpers shared across modules.
pub mod utils;
/// Per-signal structural and range checks post-decode.
pub mod validator;
