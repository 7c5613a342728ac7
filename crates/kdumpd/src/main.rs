//! kdumpd - Kernel crash dump daemon
//!
//! Keeps the crash kernel reservation and the capture service in line with
//! the desired configuration, and serves status and crash dumps over RPC.

use anyhow::Result;
use kdumpd::settings::Settings;
use kdumpd::{rpc_server, ConfigStore, Engine};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.daemon.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("kdumpd v{} starting", kdump_common::VERSION);

    // Replaying the cache runs external tools
    let store = {
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || {
            let engine = Arc::new(Engine::from_settings(&settings));
            Arc::new(ConfigStore::open(engine, &settings.daemon.cache_file))
        })
        .await?
    };

    let listener = rpc_server::bind(&settings.daemon.socket_path).await?;
    info!("kdumpd ready");

    tokio::select! {
        res = rpc_server::serve(listener, store) => {
            if let Err(e) = res {
                error!("RPC server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gracefully");
        }
    }

    let _ = std::fs::remove_file(&settings.daemon.socket_path);
    Ok(())
}
