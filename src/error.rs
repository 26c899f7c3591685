// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The ambient error/health types shared by every long-lived task wired
//! into [`crate::runtime::Runtime`] (§4.14, §7).
//!
//! Per §7's propagation policy, nothing downstream of load ever unwinds
//! past its own component: `ComponentError` is what a `Component::run`
//! loop returns when it cannot continue at all (e.g. an ingest socket
//! closing), not what gets raised for an individual bad frame.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("failed to open CAN interface {iface}: {cause}")]
    BusUnavailable { iface: String, cause: String },
    #[error("{component} failed to initialise: {reason}")]
    InitFailed { component: String, reason: String },
}

/// A coarse point-in-time health summary a component reports for
/// diagnostics; not a liveness probe in the HTTP sense (out of scope,
/// spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded,
    Failed,
}

/// The flat lifecycle every long-lived task in [`crate::runtime::Runtime`]
/// implements, replacing the deep `Feature`-wrapper inheritance spec.md §9
/// flags for redesign. `init` defaults to a no-op for components with
/// nothing to prepare beyond construction.
pub trait Component {
    fn init(&self) -> Result<(), ComponentError> {
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ComponentError>;

    async fn shutdown(&self) {}

    fn health(&self) -> Health;
}
