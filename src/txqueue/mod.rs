// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The TX Queue & Writer (C8): an unbounded FIFO of `(frame, interface)`
//! drained by a single writer task that owns every per-interface bus
//! handle exclusively (§4.8, §5).

pub mod bus;

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    decoder::{self, DecodeOutcome, MissingDgnTracker},
    eventbus::{Direction, Event, EventBus},
    frame::CanFrame,
    spec::Catalogue,
};
pub use bus::{BusError, BusFactory, CanBus};

/// RV-C command frames are transmitted twice, 50 ms apart (§4.8, §6).
const DUPLICATE_TRANSMIT_DELAY: Duration = Duration::from_millis(50);

/// One item in the TX FIFO: a frame and the named interface it should go
/// out on.
#[derive(Debug, Clone)]
pub struct TxItem {
    pub frame: CanFrame,
    pub interface: String,
}

/// The producer handle held by components that want to transmit (the
/// encoder's callers, the discovery engine). Cloning is cheap — it is
/// just a sender.
#[derive(Clone)]
pub struct TxQueue {
    sender: mpsc::UnboundedSender<TxItem>,
}

impl TxQueue {
    pub fn enqueue(&self, frame: CanFrame, interface: impl Into<String>) {
        // An unbounded channel only fails to send if the writer task has
        // already shut down; there is nothing useful to do with the item
        // at that point but drop it, which the `Err` arm already does.
        let _ = self.sender.send(TxItem {
            frame,
            interface: interface.into(),
        });
    }
}

/// Owns every per-interface bus handle and drains the FIFO (§4.8, §5
/// "Per-interface bus handles: owned exclusively by TX writer").
pub struct Writer {
    receiver: mpsc::UnboundedReceiver<TxItem>,
    factory: Box<dyn BusFactory>,
    handles: HashMap<String, Box<dyn CanBus>>,
    event_bus: EventBus,
    catalogue: Option<Arc<Catalogue>>,
    missing: Option<Arc<MissingDgnTracker>>,
    controller_source_address: u8,
}

/// Builds the paired producer/consumer halves of the TX queue.
pub fn channel(
    factory: Box<dyn BusFactory>,
    event_bus: EventBus,
    catalogue: Option<Arc<Catalogue>>,
    missing: Option<Arc<MissingDgnTracker>>,
    controller_source_address: u8,
) -> (TxQueue, Writer) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        TxQueue { sender },
        Writer {
            receiver,
            factory,
            handles: HashMap::new(),
            event_bus,
            catalogue,
            missing,
            controller_source_address,
        },
    )
}

impl Writer {
    /// Runs until `cancel` fires and the queue is drained of whatever was
    /// already in flight. Mid-duplicate-send cancellation still attempts
    /// the second transmit unless the bus handle itself is gone (§5
    /// "Cancellation & timeouts").
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = self.receiver.recv() => item,
            };
            let Some(item) = item else { break };
            self.process(item).await;
        }
    }

    async fn process(&mut self, item: TxItem) {
        if !self.handles.contains_key(&item.interface) {
            match self.factory.open(&item.interface) {
                Ok(bus) => {
                    self.handles.insert(item.interface.clone(), bus);
                },
                Err(err) => {
                    tracing::error!(interface = %item.interface, error = %err, "failed to open CAN interface for transmit");
                    return;
                },
            }
        }

        let Some(bus) = self.handles.get_mut(&item.interface) else {
            return;
        };

        if let Err(err) = bus.send(&item.frame) {
            tracing::error!(interface = %item.interface, error = %err, "first transmit failed");
            return;
        }
        self.emit_sniffer_event(&item.frame).await;

        tokio::time::sleep(DUPLICATE_TRANSMIT_DELAY).await;

        if let Err(err) = bus.send(&item.frame) {
            tracing::error!(interface = %item.interface, error = %err, "duplicate transmit failed");
        }
    }

    async fn emit_sniffer_event(&self, frame: &CanFrame) {
        let source = frame.source_address();
        let outcome = match (&self.catalogue, &self.missing) {
            (Some(catalogue), Some(missing)) => decoder::decode_frame(catalogue, missing, frame),
            _ => DecodeOutcome::UnknownDgn { dgn: frame.dgn() },
        };
        self.event_bus
            .publish(Event::DecodedFrame {
                can_id: frame.can_id,
                source,
                direction: Direction::Tx,
                self_originated: source == self.controller_source_address,
                outcome: Arc::new(outcome),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::{bus::test_support::RecordingBusFactory, *};
    use crate::{eventbus::Topic, frame::ArbitrationId};

    fn sample_frame(source: u8) -> CanFrame {
        let arb = ArbitrationId::for_pgn(0x1FEDA, source, 6);
        CanFrame::new(arb.to_raw(), &[1, 100, 0, 0, 0, 0, 0, 0])
    }

    #[tokio::test]
    async fn writer_sends_each_frame_twice_with_a_gap() {
        let factory = RecordingBusFactory::default();
        let bus = factory.bus.clone();
        let event_bus = EventBus::new();
        let (queue, writer) = channel(Box::new(factory), event_bus, None, None, 0xF9);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(writer.run(cancel.clone()));

        let frame = sample_frame(0xF9);
        queue.enqueue(frame, "can0");

        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        let _ = handle.await;

        let sent = bus.sent.lock().expect("lock poisoned");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].as_slice(), frame.as_slice());
        assert_eq!(sent[1].as_slice(), frame.as_slice());
    }

    #[tokio::test]
    async fn writer_publishes_a_self_originated_sniffer_event_after_first_send() {
        let factory = RecordingBusFactory::default();
        let event_bus = EventBus::new();
        let stream = event_bus.subscribe(Topic::DecodedFrame).await;
        let (queue, writer) = channel(Box::new(factory), event_bus, None, None, 0xF9);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(writer.run(cancel.clone()));

        queue.enqueue(sample_frame(0xF9), "can0");

        let event = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("event published");
        let Event::DecodedFrame {
            direction,
            self_originated,
            ..
        } = event
        else {
            panic!("expected a decoded-frame event");
        };
        assert_eq!(direction, Direction::Tx);
        assert!(self_originated);

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn open_failure_discards_the_item_without_panicking() {
        let factory = bus::SocketCanFactory {
            bustype: "socketcan".to_string(),
        };
        let event_bus = EventBus::new();
        let (queue, writer) = channel(Box::new(factory), event_bus, None, None, 0xF9);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(writer.run(cancel.clone()));

        queue.enqueue(sample_frame(0xF9), "can0");
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let _ = handle.await;
        let _ = Instant::now();
    }
}
