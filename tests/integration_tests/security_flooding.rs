// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S5 through the full ingest path: a burst from one source trips the
//! per-class rate limiter, and the resulting anomaly is published on the
//! event bus for any subscriber to observe (`Runtime::ingest_frame` never
//! blocks or panics on a flooding source).

use rvc_runtime::{
    eventbus::{Event, Topic},
    frame::ArbitrationId,
    runtime::Runtime,
    txqueue::bus::test_support::RecordingBusFactory,
};

use super::common::{sample_config, sample_spec_and_mapping};

#[tokio::test]
async fn flooding_source_is_published_as_an_anomaly() {
    let (spec, mapping) = sample_spec_and_mapping();
    let config = sample_config(spec, mapping);
    let (runtime, _writer) = Runtime::load(config, Box::new(RecordingBusFactory::default())).expect("load runtime");

    let stream = runtime.subscribe(Topic::Anomaly).await;

    for i in 0..150u32 {
        // Cycle the pgn through the reserved ISO diagnostic range so every
        // ingested frame still decodes as `UnknownDgn` rather than hitting
        // the one mapped dimmer DGN, while varying across 25 distinct PGNs.
        let pgn = 0x1FEC0 + (i % 25);
        let arb = ArbitrationId::for_pgn(pgn, 0x80, 6).to_raw();
        runtime.ingest_frame("can0", arb, &[0u8; 8]).await;
    }

    let mut kinds = Vec::new();
    for _ in 0..8 {
        let event = tokio::time::timeout(std::time::Duration::from_millis(500), stream.recv())
            .await
            .expect("anomaly published before timeout");
        if let Event::Anomaly(record) = event {
            kinds.push(record.kind);
        }
    }

    use rvc_runtime::security::AnomalyKind;
    assert!(
        kinds.contains(&AnomalyKind::RateLimitViolation),
        "diagnostic-class burst should trip the rate limiter well before 150 frames"
    );
}
