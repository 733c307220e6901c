//! Wires storage and both listeners together.

use tokio_util::sync::CancellationToken;

use ferry_rpc::{RpcServer, RpcServerConfig, StorageHandler};
use ferry_socket::{SocketServer, SocketServerConfig};
use ferry_storage::Storage;

use crate::config::Config;

/// Runs the daemon until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let storage = Storage::open(&config.storage_dir).await?;
    tracing::info!(root = %storage.root().display(), "storage ready");

    let cancel = CancellationToken::new();

    let socket = SocketServer::new(
        storage.clone(),
        SocketServerConfig {
            port: config.socket_port,
            chunk_size: config.chunk_size,
            mode: config.socket_dispatch(),
        },
        cancel.clone(),
    );
    let rpc = RpcServer::new(
        RpcServerConfig {
            port: config.rpc_port,
            mode: config.rpc_dispatch(),
        },
        StorageHandler::new(storage).with_chunk_size(config.chunk_size),
        cancel.clone(),
    );

    // Bind both before serving so a port conflict fails startup.
    let socket_listener = socket.bind().await?;
    let rpc_listener = rpc.bind().await?;

    let socket_task = tokio::spawn(async move { socket.serve(socket_listener).await });
    let rpc_task = tokio::spawn(async move { rpc.serve(rpc_listener).await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    tracing::info!("shutdown requested");
    cancel.cancel();

    let (socket_result, rpc_result) = tokio::join!(socket_task, rpc_task);
    socket_result?;
    rpc_result?;
    Ok(())
}
