mod config;
mod store;
mod store_manager;
mod mdns;
mod api;

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use slp_query::{DnsReverseCache, SlpServices, SlptoolClient};
use crate::store::db::WatchDb;
use crate::store_manager::StoreHandle;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slp_queryd=info,slp_query=info"))
        )
        .init();

    tracing::info!("Starting slp-queryd");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/slp-query/slp-queryd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {} ({} watches)", config_path, config.watches.len());

    let db = WatchDb::open(&config.store.db_path)?;
    tracing::info!("Opened database at {:?}", config.store.db_path);

    let initial_records = db.get_all_records()?;
    let initial_hash = store::hash::compute_hash(&initial_records)?;
    tracing::info!("Initial store hash: {}", initial_hash);

    let (hash_tx, hash_rx) = watch::channel(initial_hash);
    let store_handle = StoreHandle::spawn(db, hash_tx);

    // One DNS cache for the life of the process, shared by every query
    let client = SlptoolClient::new().with_program(&config.slp.program);
    let services = Arc::new(
        SlpServices::new(client, Arc::new(DnsReverseCache::new()))
            .with_dns_failure_policy(config.slp.dns_failure_policy),
    );

    let api_port = config.api.listen
        .rsplit(':')
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8427);

    // Self-advertisement is optional
    let advertisement = match &config.advertise {
        Some(advertise) => {
            let mdns_daemon = ServiceDaemon::new()
                .context("Failed to create mDNS daemon")?;
            mdns_daemon
                .disable_interface(mdns_sd::IfKind::All)
                .context("Failed to disable default interfaces")?;
            mdns_daemon
                .enable_interface(advertise.interface.as_str())
                .with_context(|| format!("Failed to enable interface {}", advertise.interface))?;

            let service_info = mdns::advertise::register_daemon(
                &mdns_daemon,
                advertise,
                api_port,
                mdns::advertise::txt_properties(&config.watches, config.slp.dns_failure_policy),
            )?;
            Some((mdns_daemon, service_info))
        }
        None => None,
    };

    let cancel = CancellationToken::new();

    let watch_cancel = cancel.clone();
    let watch_services = services.clone();
    let watch_store = store_handle.clone();
    let watches = config.watches.clone();
    let store_config = config.store.clone();
    let watch_handle = tokio::spawn(async move {
        if let Err(e) = store_manager::run(watch_services, watch_store, watches, store_config, watch_cancel).await {
            tracing::error!("Watch loop error: {}", e);
        }
    });

    let app_state = api::routes::AppState {
        services,
        store: store_handle.clone(),
        hash_rx,
        watches: Arc::new(config.watches.clone()),
        poll_interval_secs: config.store.poll_interval_secs,
    };
    let app = api::routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(watch_handle, server_handle);

    if let Some((mdns_daemon, service_info)) = advertisement {
        if let Err(e) = mdns::advertise::unregister_daemon(&mdns_daemon, &service_info) {
            tracing::error!("Failed to unregister mDNS service: {}", e);
        }
        if let Err(e) = mdns_daemon.shutdown() {
            tracing::error!("Failed to shutdown mDNS daemon: {}", e);
        }
    }

    if let Err(e) = store_handle.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
