// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Trait abstraction over a physical CAN bus handle, so the writer (§4.8)
//! can be driven in tests without a real `socketcan` socket.

use thiserror::Error;

use crate::frame::CanFrame;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("interface {iface} unavailable: {cause}")]
    Unavailable { iface: String, cause: String },
}

/// A named CAN interface the writer can send frames on. Implementations
/// own the underlying socket/handle exclusively (§5).
pub trait CanBus: Send {
    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError>;
}

/// Opens (or lazily creates) a named interface's bus handle.
pub trait BusFactory: Send + Sync {
    fn open(&self, iface: &str) -> Result<Box<dyn CanBus>, BusError>;
}

/// A `socketcan`-backed factory. The actual socket type is supplied by
/// the `socketcan` crate at the call site that wires this trait up;
/// kept generic here so the writer has no direct dependency on it.
pub struct SocketCanFactory {
    pub bustype: String,
}

impl BusFactory for SocketCanFactory {
    fn open(&self, iface: &str) -> Result<Box<dyn CanBus>, BusError> {
        Err(BusError::Unavailable {
            iface: iface.to_string(),
            cause: format!(
                "no {} backend wired in this build; provide a BusFactory implementation",
                self.bustype
            ),
        })
    }
}

#[doc(hidden)]
/// An in-memory bus used by writer tests and integration tests: records
/// every frame sent instead of touching a kernel socket. Not behind
/// `#[cfg(test)]` so the `tests/` integration binary (compiled as a
/// separate crate) can reach it too.
pub mod test_support {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    pub struct RecordingBus {
        pub sent: Arc<Mutex<Vec<CanFrame>>>,
    }

    impl CanBus for RecordingBus {
        fn send(&mut self, frame: &CanFrame) -> Result<(), BusError> {
            self.sent.lock().expect("lock poisoned").push(*frame);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingBusFactory {
        pub bus: RecordingBus,
    }

    impl BusFactory for RecordingBusFactory {
        fn open(&self, _iface: &str) -> Result<Box<dyn CanBus>, BusError> {
            Ok(Box::new(self.bus.clone()))
        }
    }
}
