// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use rvc_runtime::{
    cfg::{cli::resolve_config_path, config::RuntimeConfig, logger::init_logger},
    runtime::Runtime,
    txqueue::bus::SocketCanFactory,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logger("config/logger.yaml").context("failed to initialise logger")?;

    let config_path = resolve_config_path("config/runtime.yaml").context("failed to resolve runtime config path")?;
    let config = RuntimeConfig::load_from_file(&config_path).context("failed to load runtime config")?;

    let factory = Box::new(SocketCanFactory {
        bustype: config.can_bustype.clone(),
    });
    let (runtime, writer) = Runtime::load(config, factory).context("failed to initialise runtime")?;

    let cancel = CancellationToken::new();
    runtime.spawn_background_tasks(cancel.clone());
    let writer_handle = tokio::spawn(writer.run(cancel.clone()));

    info!("rvc-runtime started; send SIGINT to shut down");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    cancel.cancel();
    let _ = writer_handle.await;

    Ok(())
}
