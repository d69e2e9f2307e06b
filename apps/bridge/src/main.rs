use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::serve;
use tokio::net::TcpListener;
use tracing::{info, warn};
use vab_bridge::{
    DirFileSource, HttpMessageSink, ReqwestOAuthClient, ReqwestRemoteAgent, SessionBridge,
    build_router,
};
use vab_core::{BridgeConfig, ConfigHandle, SharedConfig};
use vab_session::{MemoryKvStore, SharedKvStore};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    vab_telemetry::install("vab-bridge")?;

    let initial = BridgeConfig::from_env().context("loading bridge configuration")?;
    let bind = initial.bind.clone();
    // Per-request timeouts come from the live config so a reload applies to outbound calls.
    let client = reqwest::Client::builder().build()?;
    let config: SharedConfig = Arc::new(ConfigHandle::new(initial));

    let chat_api = std::env::var("VAB_CHAT_API_URL").context("VAB_CHAT_API_URL must be set")?;
    let bot_token =
        std::env::var("VAB_CHAT_BOT_TOKEN").context("VAB_CHAT_BOT_TOKEN must be set")?;
    let file_root = std::env::var("VAB_FILE_ROOT").unwrap_or_else(|_| "./files".into());

    let store = Arc::new(MemoryKvStore::new());
    spawn_purge(store.clone());
    let kv: SharedKvStore = store;

    let bridge = Arc::new(SessionBridge::new(
        config.clone(),
        kv,
        Arc::new(ReqwestRemoteAgent::new(client.clone(), config.clone())),
        Arc::new(ReqwestOAuthClient::new(client.clone(), config.clone())),
        Arc::new(HttpMessageSink::new(client, chat_api, bot_token)),
        Arc::new(DirFileSource::new(file_root)),
    ));
    spawn_reload(config);

    let listener = TcpListener::bind(&bind).await?;
    info!(addr = %bind, "virtual agent bridge listening");
    serve(listener, build_router(bridge))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

fn spawn_purge(store: Arc<MemoryKvStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired entries purged");
            }
        }
    });
}

/// Re-reads the environment on SIGHUP and swaps in the new configuration when it is valid.
#[cfg(unix)]
fn spawn_reload(config: SharedConfig) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "configuration reload disabled");
            return;
        }
    };
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            match BridgeConfig::from_env() {
                Ok(next) => {
                    config.replace(next);
                    info!("configuration reloaded");
                }
                Err(err) => warn!(error = %err, "configuration reload rejected"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload(_config: SharedConfig) {}
