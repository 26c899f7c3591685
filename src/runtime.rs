// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Runtime (C13): wires C1–C10 together behind the §6 typed surface.
//!
//! `Runtime::load` does every fallible, fatal step (spec/catalogue load)
//! up front and propagates via `?`; everything after that point is
//! long-lived state shared by `Arc` across the tasks spawned from
//! [`Runtime::spawn_background_tasks`] (§5's "single cooperative task
//! executor with a small number of long-lived tasks").

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::RuntimeConfig,
    decoder::{self, DecodeOutcome, MissingDgnRecord, MissingDgnTracker},
    discovery::{AvailabilitySnapshot, DeviceRecord as TopologyDeviceRecord, DiscoveryEngine, TopologySnapshot},
    encoder::{self, Command, EncodeError},
    error::{Component, ComponentError, Health},
    eventbus::{Direction, Event, EventBus, EventStream, Topic},
    frame::CanFrame,
    scheduler::PriorityScheduler,
    security::SecurityMonitor,
    spec::Catalogue,
    txqueue::{self, TxQueue, Writer},
    validator::{SourcePermission, Validator, validate_source_permissions},
};

/// How many messages the scheduler drain loop pulls per wake-up before
/// re-checking for cancellation and pacing (§5).
const DRAIN_BATCH_SIZE: usize = 32;
/// §5 "after a batch, awaits a small (≈1 ms) pacing sleep".
const DRAIN_PACING: Duration = Duration::from_millis(1);

/// Shared, process-lifetime state behind the §6 typed surface. Cheap to
/// clone — every field is itself an `Arc` or a plain `Clone` handle.
#[derive(Clone)]
pub struct Runtime {
    catalogue: Arc<Catalogue>,
    controller_source_address: u8,
    default_interface: String,
    event_bus: EventBus,
    tx_queue: TxQueue,
    missing: Arc<MissingDgnTracker>,
    scheduler: Arc<Mutex<PriorityScheduler>>,
    scheduler_notify: Arc<Notify>,
    security: Arc<Mutex<SecurityMonitor>>,
    discovery: Arc<Mutex<DiscoveryEngine>>,
    validator: Arc<Mutex<Validator>>,
}

impl Runtime {
    /// Loads the catalogue and builds every component from `config`.
    /// Returns the `Runtime` handle plus the TX writer, which the caller
    /// spawns separately since [`Writer::run`] consumes `self` by value
    /// (§4.8 "owns every per-interface bus handle exclusively").
    pub fn load(
        config: RuntimeConfig,
        bus_factory: Box<dyn txqueue::BusFactory>,
    ) -> anyhow::Result<(Self, Writer)> {
        let catalogue = Arc::new(crate::spec::load_from_config(
            &config.spec_path,
            &config.coach_mapping_path,
            config.coach_model.as_deref(),
        )?);

        let event_bus = EventBus::new();
        let missing = Arc::new(MissingDgnTracker::new());
        let scheduler_notify = Arc::new(Notify::new());
        let scheduler = Arc::new(Mutex::new(PriorityScheduler::with_notify(
            config.scheduler.max_queue_size,
            scheduler_notify.clone(),
        )));
        let security = Arc::new(Mutex::new(SecurityMonitor::new(
            config.security.window_seconds,
            config.controller_source_address,
        )));
        let protocols = config.discovery.protocols.iter().map(ToString::to_string).collect();
        let discovery = Arc::new(Mutex::new(DiscoveryEngine::new(
            config.controller_source_address,
            protocols,
        )));
        let validator = Arc::new(Mutex::new(Validator::new()));

        let default_interface = config.interfaces.first().cloned().unwrap_or_else(|| "can0".to_string());

        let (tx_queue, writer) = txqueue::channel(
            bus_factory,
            event_bus.clone(),
            Some(catalogue.clone()),
            Some(missing.clone()),
            config.controller_source_address,
        );

        let runtime = Self {
            catalogue,
            controller_source_address: config.controller_source_address,
            default_interface,
            event_bus,
            tx_queue,
            missing,
            scheduler,
            scheduler_notify,
            security,
            discovery,
            validator,
        };
        Ok((runtime, writer))
    }

    /// Spawns the scheduler drain loop and the discovery loop — the two
    /// long-lived tasks this crate owns beyond the TX writer, which the
    /// caller spawns itself since it holds `Writer` by value (§5).
    pub fn spawn_background_tasks(&self, cancel: CancellationToken) {
        let drain = SchedulerDrain {
            scheduler: self.scheduler.clone(),
            notify: self.scheduler_notify.clone(),
            event_bus: self.event_bus.clone(),
            controller_source_address: self.controller_source_address,
        };
        let drain_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = drain.run(drain_cancel).await {
                tracing::error!(error = %err, "scheduler drain loop exited");
            }
        });

        let discovery_loop = DiscoveryLoop {
            discovery: self.discovery.clone(),
            events: self.event_bus.clone(),
            tx_queue: self.tx_queue.clone(),
            default_interface: self.default_interface.clone(),
        };
        tokio::spawn(async move {
            if let Err(err) = discovery_loop.run(cancel).await {
                tracing::error!(error = %err, "discovery loop exited");
            }
        });
    }

    /// Entry point for an external CAN reader: decode, validate, run
    /// security admission, then enqueue into the priority scheduler
    /// (§5 "ingest task: decoding, validation, security, and enqueue are
    /// synchronous"). `iface` is presently only used for TX/RX symmetry
    /// in logging — the decoder doesn't need to know which interface a
    /// frame arrived on.
    pub async fn ingest_frame(&self, iface: &str, can_id: u32, payload: &[u8]) {
        let now = Instant::now();

        if payload.len() > crate::frame::MAX_PAYLOAD_LEN {
            let arb = crate::frame::ArbitrationId::from_raw(can_id);
            let dgn = crate::frame::make_dgn(arb.priority, arb.pgn());
            let anomaly = self
                .security
                .lock()
                .await
                .record_oversized_message(arb.source_address, dgn, payload.len(), now);
            self.event_bus.publish(Event::Anomaly(Arc::new(anomaly))).await;
            return;
        }

        let frame = CanFrame::new(can_id, payload);
        let source = frame.source_address();

        let known = self
            .discovery
            .lock()
            .await
            .topology()
            .device(source)
            .is_some();
        if validate_source_permissions(source, known) == SourcePermission::Reserved {
            let anomaly = self.security.lock().await.record_invalid_source(source, now);
            self.event_bus.publish(Event::Anomaly(Arc::new(anomaly))).await;
            return;
        }

        let outcome = decoder::decode_frame(&self.catalogue, &self.missing, &frame);

        if let DecodeOutcome::Decoded {
            signals, raw_signals, ..
        } = &outcome
        {
            let entry = self.catalogue.lookup_by_dgn(frame.dgn());
            if let Some(entry) = entry {
                let result = self.validator.lock().await.validate(&entry.signals, raw_signals);
                if !result.ok {
                    tracing::warn!(iface, dgn = format!("{:06X}", frame.dgn()), errors = ?result.errors, "decoded frame failed validation");
                }
            }
            let _ = signals;
        }

        let (admitted, anomalies) = self.security.lock().await.process(&frame, now);
        for anomaly in anomalies {
            self.event_bus.publish(Event::Anomaly(Arc::new(anomaly))).await;
        }
        if !admitted {
            return;
        }

        let mut scheduler = self.scheduler.lock().await;
        scheduler.enqueue(frame.dgn(), source, can_id, frame.as_slice().to_vec(), Arc::new(outcome), now);
    }

    /// §6 `send_entity_command`.
    pub async fn send_entity_command(&self, entity_id: &str, command: Command) -> Result<(), EncodeError> {
        let frame = encoder::encode(&self.catalogue, entity_id, command, self.controller_source_address)?;
        self.tx_queue.enqueue(frame, self.default_interface.clone());
        Ok(())
    }

    /// §6 `poll_device`.
    pub async fn poll_device(&self, source_address: u8, pgn: u32, protocol: &str, instance: Option<u8>) -> bool {
        let now = Instant::now();
        let frame = self
            .discovery
            .lock()
            .await
            .poll_device(source_address, pgn, protocol, instance, now);
        self.tx_queue.enqueue(frame, self.default_interface.clone());
        true
    }

    /// §6 `discover_devices`.
    pub async fn discover_devices(&self, protocol: &str) -> HashMap<u8, TopologyDeviceRecord> {
        self.discovery
            .lock()
            .await
            .topology()
            .devices()
            .filter(|d| d.protocol == protocol)
            .map(|d| (d.source_address, d.clone()))
            .collect()
    }

    /// §6 `network_topology`.
    pub async fn network_topology(&self) -> TopologySnapshot {
        self.discovery.lock().await.topology().snapshot()
    }

    /// §6 `device_availability`.
    pub async fn device_availability(&self) -> AvailabilitySnapshot {
        self.discovery.lock().await.topology().availability_snapshot()
    }

    /// §6 `subscribe`.
    pub async fn subscribe(&self, topic: Topic) -> EventStream {
        self.event_bus.subscribe(topic).await
    }

    /// §6 `missing_dgns`.
    pub fn missing_dgns(&self) -> Vec<(crate::frame::Dgn, MissingDgnRecord)> {
        self.missing.snapshot()
    }

    /// §6 `clear_missing_dgns`.
    pub fn clear_missing_dgns(&self) {
        self.missing.clear();
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }
}

/// Drains the priority scheduler and republishes each message's
/// already-computed [`DecodeOutcome`] onto the event bus (§4.10). Does
/// not re-decode — that would double-count a missing DGN observed by
/// [`Runtime::ingest_frame`] via the ingest task's own decode call.
struct SchedulerDrain {
    scheduler: Arc<Mutex<PriorityScheduler>>,
    notify: Arc<Notify>,
    event_bus: EventBus,
    controller_source_address: u8,
}

impl Component for SchedulerDrain {
    async fn run(&self, cancel: CancellationToken) -> Result<(), ComponentError> {
        loop {
            let batch = {
                let mut scheduler = self.scheduler.lock().await;
                scheduler.dequeue_batch(DRAIN_BATCH_SIZE)
            };

            if batch.is_empty() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = self.notify.notified() => {},
                }
                continue;
            }

            for msg in batch {
                self.event_bus
                    .publish(Event::DecodedFrame {
                        can_id: msg.can_id,
                        source: msg.source,
                        direction: Direction::Rx,
                        self_originated: msg.source == self.controller_source_address,
                        outcome: msg.outcome,
                    })
                    .await;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(DRAIN_PACING) => {},
            }
        }
        Ok(())
    }

    fn health(&self) -> Health {
        Health::Healthy
    }
}

/// Periodically issues discovery/poll PGN requests, and consumes
/// `decoded_frame` events off the bus to maintain topology and correlate
/// poll responses (§4.9 "a parallel loop that both publishes PGN requests
/// via C8 and consumes responses via C10").
struct DiscoveryLoop {
    discovery: Arc<Mutex<DiscoveryEngine>>,
    events: EventBus,
    tx_queue: TxQueue,
    default_interface: String,
}

/// How often the discovery loop re-checks its periodic schedules between
/// decoded-frame events.
const DISCOVERY_TICK: Duration = Duration::from_secs(1);

impl Component for DiscoveryLoop {
    async fn run(&self, cancel: CancellationToken) -> Result<(), ComponentError> {
        let stream = self.events.subscribe(Topic::DecodedFrame).await;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = stream.recv() => {
                    if let Event::DecodedFrame { source, direction, outcome, .. } = event
                        && direction == Direction::Rx
                    {
                        self.handle_decoded(source, outcome.dgn()).await;
                    }
                },
                _ = tokio::time::sleep(DISCOVERY_TICK) => {
                    self.run_periodic_tasks().await;
                },
            }
        }
        Ok(())
    }

    fn health(&self) -> Health {
        Health::Healthy
    }
}

impl DiscoveryLoop {
    async fn handle_decoded(&self, source: u8, dgn: crate::frame::Dgn) {
        let now = Instant::now();
        let (change, response) = {
            let mut discovery = self.discovery.lock().await;
            let protocol = discovery
                .topology()
                .device(source)
                .map(|d| d.protocol.clone())
                .unwrap_or_else(|| "rvc".to_string());
            discovery.ingest(source, dgn, &protocol, now)
        };
        if let Some(change) = change {
            self.events.publish(Event::DeviceAvailabilityChanged(change)).await;
        }
        if let Some(response) = response {
            self.events.publish(Event::PollResponse(response)).await;
        }
    }

    async fn run_periodic_tasks(&self) {
        let now = Instant::now();
        let mut discovery = self.discovery.lock().await;

        for frame in discovery.due_discovery_requests(now) {
            self.tx_queue.enqueue(frame, self.default_interface.clone());
        }
        for frame in discovery.due_polls(now) {
            self.tx_queue.enqueue(frame, self.default_interface.clone());
        }
        for frame in discovery.expire_polls(now) {
            self.tx_queue.enqueue(frame, self.default_interface.clone());
        }
        let changes = discovery.sweep_offline(now);
        drop(discovery);
        for change in changes {
            self.events.publish(Event::DeviceAvailabilityChanged(change)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::txqueue::bus::test_support::RecordingBusFactory;

    fn write_temp(contents: &str, name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("rvc_runtime_test_{}_{name}", std::process::id()));
        let mut f = std::fs::File::create(&path).expect("create temp file");
        f.write_all(contents.as_bytes()).expect("write temp file");
        path
    }

    fn sample_config(spec_path: std::path::PathBuf, mapping_path: std::path::PathBuf) -> RuntimeConfig {
        RuntimeConfig {
            spec_path,
            coach_mapping_path: mapping_path,
            coach_model: None,
            can_bustype: "socketcan".to_string(),
            controller_source_address: 0xF9,
            interfaces: vec!["can0".to_string()],
            discovery: Default::default(),
            scheduler: Default::default(),
            security: Default::default(),
        }
    }

    fn sample_spec_and_mapping() -> (std::path::PathBuf, std::path::PathBuf) {
        let spec = write_temp(
            r#"{
                "pgns": {
                    "DC_DIMMER_STATUS_3": {
                        "pgn": "1FEDA", "signals": [
                            {"name": "instance", "start_bit": 0, "length": 8},
                            {"name": "brightness", "start_bit": 8, "length": 8}
                        ]
                    }
                }
            }"#,
            "spec",
        );
        let mapping = write_temp(
            r#"
"1FEDA":
  "1":
    - entity_id: "light.bedroom"
      friendly_name: "Bedroom Light"
      device_type: dimmer
"#,
            "mapping",
        );
        (spec, mapping)
    }

    #[tokio::test]
    async fn ingest_unknown_dgn_is_tracked_as_missing() {
        let (spec, mapping) = sample_spec_and_mapping();
        let config = sample_config(spec, mapping);
        let (runtime, _writer) = Runtime::load(config, Box::new(RecordingBusFactory::default())).expect("load runtime");

        let arb = crate::frame::ArbitrationId::for_pgn(0x1FFFF, 0x17, 6).to_raw();
        runtime.ingest_frame("can0", arb, &[0u8; 8]).await;

        let missing = runtime.missing_dgns();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].1.encounter_count, 1);

        runtime.clear_missing_dgns();
        assert!(runtime.missing_dgns().is_empty());
    }

    #[tokio::test]
    async fn ingest_from_reserved_source_raises_anomaly_without_scheduling() {
        let (spec, mapping) = sample_spec_and_mapping();
        let config = sample_config(spec, mapping);
        let (runtime, _writer) = Runtime::load(config, Box::new(RecordingBusFactory::default())).expect("load runtime");

        let stream = runtime.subscribe(Topic::Anomaly).await;
        let arb = crate::frame::ArbitrationId::for_pgn(0x1FEDA, 0xFA, 6).to_raw();
        runtime.ingest_frame("can0", arb, &[1, 50, 0, 0, 0, 0, 0, 0]).await;

        let event = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("anomaly published");
        assert!(matches!(event, Event::Anomaly(_)));
    }

    #[tokio::test]
    async fn ingest_oversized_payload_is_rejected_before_decoding() {
        let (spec, mapping) = sample_spec_and_mapping();
        let config = sample_config(spec, mapping);
        let (runtime, _writer) = Runtime::load(config, Box::new(RecordingBusFactory::default())).expect("load runtime");

        let stream = runtime.subscribe(Topic::Anomaly).await;
        let arb = crate::frame::ArbitrationId::for_pgn(0x1FEDA, 0x17, 6).to_raw();
        runtime.ingest_frame("can0", arb, &[0u8; 9]).await;

        let event = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("anomaly published");
        match event {
            Event::Anomaly(record) => {
                assert_eq!(record.kind, crate::security::AnomalyKind::OversizedMessage);
            }
            other => panic!("expected an anomaly event, got {other:?}"),
        }

        // Rejected before a CanFrame (and its fixed 8-byte payload) was ever
        // built, so nothing reached the decoder or the scheduler.
        assert!(runtime.missing_dgns().is_empty());
    }

    #[tokio::test]
    async fn send_entity_command_rejects_unknown_entity() {
        let (spec, mapping) = sample_spec_and_mapping();
        let config = sample_config(spec, mapping);
        let (runtime, _writer) = Runtime::load(config, Box::new(RecordingBusFactory::default())).expect("load runtime");

        let result = runtime
            .send_entity_command("light.nonexistent", Command::Toggle)
            .await;
        assert!(result.is_err());
    }
}
