mod common;

use common::{gen2_hub, hub_config, settings_for, GEN2_SERIAL};
use intg_powerview::api::{DeviceState, DriverMetadata, IntegrationApi, IntegrationHandler};
use intg_powerview::discovery::NoDiscovery;
use intg_powerview::driver::PowerviewDriver;
use intg_powerview::powerview::{ConnectionState, HubError, SmartHub};
use intg_powerview::store::HubStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use wiremock::MockServer;

async fn running_driver(
    server: &MockServer,
    dir: &TempDir,
) -> (Arc<PowerviewDriver>, Arc<SmartHub>) {
    let api = Arc::new(IntegrationApi::new(DriverMetadata::bundled().unwrap()));
    let store = Arc::new(Mutex::new(HubStore::open(dir.path())));
    let driver = Arc::new(PowerviewDriver::new(
        api,
        settings_for(server),
        store,
        Arc::new(NoDiscovery),
    ));
    driver.add_configured_hub(hub_config(GEN2_SERIAL)).await;
    let hub = driver.hub(GEN2_SERIAL).await.unwrap();
    wait_for_state(&hub, ConnectionState::Connected).await;
    (driver, hub)
}

async fn wait_for_state(hub: &SmartHub, state: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while hub.state().await != state {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub never reached {state}"));
}

#[tokio::test]
async fn standby_suspends_hubs_until_exit() {
    let server = gen2_hub().await;
    let dir = TempDir::new().unwrap();
    let (driver, hub) = running_driver(&server, &dir).await;

    driver.on_enter_standby().await;
    assert_eq!(hub.state().await, ConnectionState::Disconnected);
    assert!(matches!(
        hub.close_cover("11").await,
        Err(HubError::NotConnected)
    ));

    // poll and reconnect run every second while a watchdog is alive
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(hub.state().await, ConnectionState::Disconnected);

    driver.on_exit_standby().await;
    wait_for_state(&hub, ConnectionState::Connected).await;
    driver.shutdown().await;
}

#[tokio::test]
async fn remote_disconnect_suspends_and_connect_resumes() {
    let server = gen2_hub().await;
    let dir = TempDir::new().unwrap();
    let (driver, hub) = running_driver(&server, &dir).await;

    driver.on_disconnect().await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(hub.state().await, ConnectionState::Disconnected);

    driver.on_connect().await;
    assert_eq!(driver.api().device_state().await, DeviceState::Connected);
    wait_for_state(&hub, ConnectionState::Connected).await;
    assert_eq!(driver.hub_ids().await, vec![GEN2_SERIAL]);
    driver.shutdown().await;
}
