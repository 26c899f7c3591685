// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S6 exercised through the full `Runtime`: a targeted poll is registered,
//! the scheduler drain loop republishes the matching ingested frame onto
//! the event bus, and the discovery loop (a pure C10 subscriber per
//! spec.md §4.9) correlates the response and updates the topology.

use rvc_runtime::{frame::ArbitrationId, runtime::Runtime, txqueue::bus::test_support::RecordingBusFactory};
use tokio_util::sync::CancellationToken;

use super::common::{sample_config, sample_spec_and_mapping};

#[tokio::test]
async fn poll_then_ingest_correlates_and_marks_device_online() {
    let (spec, mapping) = sample_spec_and_mapping();
    let config = sample_config(spec, mapping);
    let (runtime, writer) = Runtime::load(config, Box::new(RecordingBusFactory::default())).expect("load runtime");

    let cancel = CancellationToken::new();
    runtime.spawn_background_tasks(cancel.clone());
    let writer_handle = tokio::spawn(writer.run(cancel.clone()));

    assert!(runtime.poll_device(0x12, 0x1FEDA, "rvc", None).await);

    let arb = ArbitrationId::for_pgn(0x1FEDA, 0x12, 6).to_raw();
    runtime.ingest_frame("can0", arb, &[3, 80, 0, 0, 0, 0, 0, 0]).await;

    // Give the scheduler drain loop and the discovery loop's event-bus
    // consumer a chance to run; both are cooperative tasks woken by
    // Notify/channel readiness, not polling.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let topology = runtime.network_topology().await;
    assert_eq!(topology.active_polls, 0, "the poll correlated and was cleared");
    let device = topology
        .devices
        .iter()
        .find(|d| d.source_address == 0x12)
        .expect("device 0x12 observed");
    assert_eq!(device.response_count, 1);

    let availability = runtime.device_availability().await;
    assert!(availability.online.contains(&0x12));

    cancel.cancel();
    let _ = writer_handle.await;
}
