//! `run` subcommand: serve the registry on an in-process bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use protobus_core::{
    Device, Item, LocalBus, LogLevel, NewDevice, ProtocolCallbacks, RegistryConfig, RootProto,
    SignalStream,
};

use crate::cli::RunArgs;
use crate::error::CliError;

/// Callbacks that only log. Stand-in for protocol business logic.
struct LoggingCallbacks;

#[async_trait]
impl ProtocolCallbacks for LoggingCallbacks {
    async fn add_device(&self, device: Arc<Device>) {
        info!(device_id = %device.id(), type_id = %device.type_id(), "callback: device added");
    }

    async fn remove_device(&self, device_id: String) {
        info!(%device_id, "callback: device removed");
    }

    async fn add_item(&self, item: Item) {
        debug!(device_id = %item.device_id, item_id = %item.item_id, "callback: item added");
    }

    async fn remove_item(&self, device_id: String, item_id: String) {
        debug!(%device_id, %item_id, "callback: item removed");
    }
}

pub async fn handle(
    args: RunArgs,
    mut registry: RegistryConfig,
    log_level: LogLevel,
) -> Result<(), CliError> {
    if let Some(name) = args.name {
        registry.protocol_name = name;
        registry.validate()?;
    }

    let bus = Arc::new(LocalBus::new());
    let root = RootProto::export(Some(bus.clone()), registry, Arc::new(log_level)).await?;

    let cancel = CancellationToken::new();
    let notifier = root
        .register_callbacks(Arc::new(LoggingCallbacks), cancel.clone())
        .await;
    let watcher = tokio::spawn(watch_signals(bus.subscribe(), cancel.clone()));

    println!("root {}", root.path());
    for id in &args.bridges {
        root.add_bridge(id).await;
        if let Some(bridge) = root.bridge(id).await {
            println!("bridge {}", bridge.protocol().path());
        }
    }
    for id in &args.devices {
        root.add_device(NewDevice::with_id(id.as_str())).await;
    }
    root.set_ready().await;
    info!(path = %root.path(), "registry ready");

    wait_for_shutdown(args.exit_after).await?;

    root.shutdown().await;
    cancel.cancel();
    // Both tasks exit on cancellation; a join error only means a panic
    // inside a callback, which has already been reported.
    let _ = notifier.await;
    let _ = watcher.await;
    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(exit_after: Option<u64>) -> Result<(), CliError> {
    match exit_after {
        Some(secs) => {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(secs)) => {
                    debug!(secs, "exit timer elapsed");
                }
                res = tokio::signal::ctrl_c() => res?,
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

async fn watch_signals(mut signals: SignalStream, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = signals.recv() => match next {
                Some(signal) => {
                    debug!(path = %signal.path, member = %signal.member(), args = ?signal.args, "signal");
                }
                None => break,
            },
        }
    }
}
