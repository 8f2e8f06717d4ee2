use anyhow::{Context, Result};
use intg_powerview::{api, config, discovery, driver::PowerviewDriver, store::HubStore, telemetry};
use config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

#[cfg(feature = "discovery")]
fn hub_discovery(cfg: &Config) -> Arc<dyn discovery::HubDiscovery> {
    Arc::new(discovery::mdns::MdnsHubDiscovery::new(
        cfg.discovery.service_types.clone(),
        cfg.discovery.timeout(),
    ))
}

#[cfg(not(feature = "discovery"))]
fn hub_discovery(_cfg: &Config) -> Arc<dyn discovery::HubDiscovery> {
    Arc::new(discovery::NoDiscovery)
}

#[cfg(feature = "discovery")]
fn advertise(
    cfg: &Config,
    metadata: &api::DriverMetadata,
    addr: SocketAddr,
) -> Option<discovery::mdns::DriverAdvertiser> {
    if cfg.disable_mdns_publish {
        info!("mDNS publishing disabled");
        return None;
    }
    discovery::mdns::DriverAdvertiser::register(
        &metadata.driver_id,
        metadata.display_name(),
        &metadata.version,
        &metadata.developer.name,
        addr.ip(),
        addr.port(),
    )
    .map_err(|e| warn!(error = %e, "could not publish driver via mDNS"))
    .ok()
}

#[cfg(not(feature = "discovery"))]
fn advertise(_cfg: &Config, _metadata: &api::DriverMetadata, _addr: SocketAddr) -> Option<()> {
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.log_level);

    let metadata = api::DriverMetadata::bundled()?.with_port(cfg.integration_http_port);
    let api = Arc::new(api::IntegrationApi::new(metadata.clone()));

    let (store_tx, store_rx) = mpsc::unbounded_channel();
    let store = HubStore::open(cfg.config_home.clone()).with_listener(store_tx);
    info!(path = %store.data_path().display(), "configuration directory");
    let store = Arc::new(Mutex::new(store));

    let driver = Arc::new(PowerviewDriver::new(
        api.clone(),
        cfg.hub.clone(),
        store,
        hub_discovery(&cfg),
    ));
    let store_listener = driver.clone().spawn_store_listener(store_rx);
    driver.start().await;

    let addr = cfg.socket_addr()?;
    let _advertiser = advertise(&cfg, &metadata, addr);
    let app = api::router(api, driver.clone());

    info!(%addr, version = %metadata.version, "starting PowerView integration driver");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    driver.shutdown().await;
    store_listener.abort();
    info!("shutdown complete");
    Ok(())
}
