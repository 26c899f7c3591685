// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S3, wired all the way through the TX writer: `send_entity_command`
//! resolves the kitchen light, the writer opens the recording bus and
//! transmits the resulting frame twice, 50ms apart.

use rvc_runtime::{
    encoder::{Command, SwitchState},
    runtime::Runtime,
    txqueue::bus::test_support::RecordingBusFactory,
};
use tokio_util::sync::CancellationToken;

use super::common::{sample_config, sample_spec_and_mapping};

#[tokio::test]
async fn send_entity_command_reaches_the_bus_twice() {
    let (spec, mapping) = sample_spec_and_mapping();
    let config = sample_config(spec, mapping);
    let factory = RecordingBusFactory::default();
    let bus = factory.bus.clone();
    let (runtime, writer) = Runtime::load(config, Box::new(factory)).expect("load runtime");

    let cancel = CancellationToken::new();
    let writer_handle = tokio::spawn(writer.run(cancel.clone()));

    runtime
        .send_entity_command(
            "kitchen_light",
            Command::Set {
                state: SwitchState::On,
                brightness: Some(75),
            },
        )
        .await
        .expect("kitchen_light resolves to a known device");

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    cancel.cancel();
    let _ = writer_handle.await;

    let sent = bus.sent.lock().expect("lock poisoned");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].as_slice()[0], 3, "instance byte");
    assert_eq!(sent[0].as_slice()[1], 150, "brightness 75 * 2");
    assert_eq!(sent[0].as_slice(), sent[1].as_slice());
}
