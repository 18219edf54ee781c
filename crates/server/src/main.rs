//! swcache server entry point.
//!
//! Boots the cache engine from configuration, registers the configured
//! worker version and serves the MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use swcache_client::fetch::{FetchClient, FetchConfig, Network, resolve};
use swcache_client::{ATTENDANCE_SYNC_TAG, AttendanceSync, ManifestFeed, Registration, WorkerContext};
use swcache_core::{AppConfig, CacheStorage};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    config.validate()?;
    tracing::info!(app = %config.app_name, version = %config.version, origin = %config.origin, "starting swcache on stdio transport");

    let storage = CacheStorage::open(&config.db_path).await?;
    let fetch = FetchClient::new(FetchConfig::from_app_config(&config))?;
    let http = fetch.http().clone();
    let network: Arc<dyn Network> = Arc::new(fetch);

    let ctx = WorkerContext::new(storage, Arc::clone(&network));
    let attendance = Arc::new(AttendanceSync::from_config(&config, http)?);
    ctx.sync.bind(ATTENDANCE_SYNC_TAG, attendance.clone()).await;

    let registration = Arc::new(Registration::new(config.clone(), ctx));
    match registration.start().await {
        Ok(outcome) => tracing::info!(?outcome, "worker registered"),
        Err(e) => tracing::error!(error = %e, "worker registration failed, serving from network"),
    }

    if let Some(feed_url) = &config.update_feed_url {
        let url = resolve(&config.origin_url()?, feed_url)?;
        let feed = Arc::new(ManifestFeed::new(network, url));
        Arc::clone(&registration).spawn_update_checks(feed, config.update_interval());
        tracing::info!(feed = %feed_url, every_secs = config.update_interval_secs, "update checks scheduled");
    }

    let handler = handler::SwCacheServer::new(registration, attendance);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
