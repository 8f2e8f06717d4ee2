use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{
    CommandError, DeviceState, IntegrationApi, IntegrationHandler, SetupAction, SetupDriver,
    StatusCode,
};
use crate::config::HubSettings;
use crate::discovery::HubDiscovery;
use crate::domain::{
    button_attributes, cover_entity, device_from_entity_id, entity_from_entity_id,
    scene_button_entity, shade_attributes, type_from_entity_id, ButtonCommand, CoverCommand,
    Entity, EntityType,
};
use crate::powerview::{watchdog, ConnectionState, HubEvent, SmartHub};
use crate::setup::SetupFlow;
use crate::store::{HubConfig, HubStore, StoreEvent};

struct Watchdog {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A running hub with its background tasks
struct HubHandle {
    hub: Arc<SmartHub>,
    forwarder: JoinHandle<()>,
    watchdog: Option<Watchdog>,
}

impl HubHandle {
    fn resume(&mut self) {
        if self.watchdog.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let task = watchdog::spawn(self.hub.clone(), cancel.clone());
        self.watchdog = Some(Watchdog { cancel, task });
    }

    async fn suspend(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.cancel.cancel();
            // a connect attempt may still be in flight
            watchdog.task.abort();
            let _ = watchdog.task.await;
        }
        self.hub.disconnect().await;
    }

    async fn stop(mut self) {
        self.suspend().await;
        self.forwarder.abort();
    }
}

/// Integration driver for PowerView hubs
pub struct PowerviewDriver {
    api: Arc<IntegrationApi>,
    settings: HubSettings,
    store: Arc<Mutex<HubStore>>,
    setup: Mutex<SetupFlow>,
    hubs: RwLock<HashMap<String, HubHandle>>,
}

impl PowerviewDriver {
    pub fn new(
        api: Arc<IntegrationApi>,
        settings: HubSettings,
        store: Arc<Mutex<HubStore>>,
        discovery: Arc<dyn HubDiscovery>,
    ) -> Self {
        let setup = SetupFlow::new(store.clone(), discovery, settings.clone());
        Self {
            api,
            settings,
            store,
            setup: Mutex::new(setup),
            hubs: RwLock::new(HashMap::new()),
        }
    }

    pub fn api(&self) -> &Arc<IntegrationApi> {
        &self.api
    }

    /// Start every hub found in the configuration store
    pub async fn start(&self) {
        let configs: Vec<HubConfig> = self.store.lock().await.all().cloned().collect();
        info!(count = configs.len(), "starting configured hubs");
        for config in configs {
            self.add_configured_hub(config).await;
        }
    }

    pub async fn hub(&self, identifier: &str) -> Option<Arc<SmartHub>> {
        self.hubs
            .read()
            .await
            .get(identifier)
            .map(|h| h.hub.clone())
    }

    pub async fn hub_ids(&self) -> Vec<String> {
        self.hubs.read().await.keys().cloned().collect()
    }

    /// Create a hub, replacing any running hub with the same identifier, and connect it
    pub async fn add_configured_hub(&self, config: HubConfig) {
        let identifier = config.identifier.clone();
        let hub = Arc::new(SmartHub::new(config, self.settings.clone()));
        let events = hub.subscribe();
        let forwarder = tokio::spawn(forward_hub_events(self.api.clone(), hub.clone(), events));
        let mut handle = HubHandle {
            hub,
            forwarder,
            watchdog: None,
        };
        handle.resume();

        let previous = self.hubs.write().await.insert(identifier.clone(), handle);
        if let Some(previous) = previous {
            debug!(hub = %identifier, "replacing running hub");
            previous.stop().await;
        }
        info!(hub = %identifier, "hub added");
    }

    /// Stop a hub and drop its entities
    pub async fn remove_hub(&self, identifier: &str) {
        let handle = self.hubs.write().await.remove(identifier);
        if let Some(handle) = handle {
            handle.stop().await;
        }
        let removed = self.api.available_entities().remove_device(identifier).await;
        self.api.configured_entities().remove_device(identifier).await;
        info!(hub = identifier, entities = removed.len(), "hub removed");
    }

    pub async fn remove_all_hubs(&self) {
        let handles: Vec<HubHandle> = self.hubs.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop().await;
        }
        self.api.available_entities().clear().await;
        self.api.configured_entities().clear().await;
        info!("all hubs removed");
    }

    async fn resume_all(&self) {
        for handle in self.hubs.write().await.values_mut() {
            handle.resume();
        }
    }

    async fn suspend_all(&self) {
        for handle in self.hubs.write().await.values_mut() {
            handle.suspend().await;
        }
    }

    /// Stop all background tasks, keeping entities and configuration
    pub async fn shutdown(&self) {
        let handles: Vec<HubHandle> = self.hubs.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop().await;
        }
    }

    /// Apply configuration store changes until the store is dropped
    pub fn spawn_store_listener(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<StoreEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(?event, "configuration changed");
                match event {
                    StoreEvent::Added(config) | StoreEvent::Updated(config) => {
                        self.add_configured_hub(config).await
                    }
                    StoreEvent::Removed(config) => self.remove_hub(&config.identifier).await,
                    StoreEvent::Cleared => self.remove_all_hubs().await,
                }
            }
        })
    }

    /// Push the cached state of freshly subscribed entities
    async fn refresh_entity_state(&self, entity_id: &str) {
        let (Some(kind), Some(hub_id), Some(resource_id)) = (
            type_from_entity_id(entity_id),
            device_from_entity_id(entity_id),
            entity_from_entity_id(entity_id),
        ) else {
            warn!(entity_id, "malformed entity id");
            return;
        };
        let Some(hub) = self.hub(hub_id).await else {
            warn!(entity_id, "no hub for entity");
            return;
        };

        let attributes = match kind.parse::<EntityType>() {
            Ok(EntityType::Cover) => match hub.cover(resource_id).await {
                Some(shade) => shade_attributes(&shade),
                None => return,
            },
            Ok(EntityType::Button) => button_attributes(true),
            Err(_) => {
                warn!(entity_id, "unsupported entity type");
                return;
            }
        };
        self.api.update_attributes(entity_id, &attributes).await;
    }

    async fn run_command(
        &self,
        entity: &Entity,
        cmd_id: &str,
        params: Option<&Value>,
    ) -> Result<(), CommandError> {
        let (Some(hub_id), Some(resource_id)) = (entity.hub_id(), entity.resource_id()) else {
            return Err(CommandError::NotFound(entity.entity_id.clone()));
        };
        let hub = self
            .hub(hub_id)
            .await
            .ok_or_else(|| CommandError::NotFound(format!("hub {hub_id}")))?;

        match entity.entity_type {
            EntityType::Cover => match CoverCommand::parse(cmd_id, params)? {
                CoverCommand::Open => hub.open_cover(resource_id, None).await?,
                CoverCommand::Close => hub.close_cover(resource_id).await?,
                CoverCommand::Stop => hub.stop_cover(resource_id).await?,
                CoverCommand::Position(position) => {
                    hub.open_cover(resource_id, Some(position)).await?
                }
            },
            EntityType::Button => match ButtonCommand::parse(cmd_id)? {
                ButtonCommand::Push => hub.activate_scene(resource_id).await?,
            },
        }
        Ok(())
    }
}

/// Register all shades and scenes of a hub as available entities
async fn register_available_entities(api: &IntegrationApi, hub: &SmartHub) {
    let hub_id = hub.identifier();
    let mut entities: Vec<Entity> = hub
        .covers()
        .await
        .iter()
        .map(|shade| cover_entity(hub_id, shade))
        .collect();
    entities.extend(
        hub.scenes()
            .await
            .iter()
            .map(|scene| scene_button_entity(hub_id, scene)),
    );

    debug!(hub = hub_id, count = entities.len(), "registering available entities");
    for entity in entities {
        let entity_id = entity.entity_id.clone();
        let attributes = entity.attributes.clone();
        api.available_entities().add(entity).await;
        // refresh subscribed copies left over from a previous connection
        api.update_attributes(&entity_id, &attributes).await;
    }
}

async fn forward_hub_events(
    api: Arc<IntegrationApi>,
    hub: Arc<SmartHub>,
    mut events: broadcast::Receiver<HubEvent>,
) {
    loop {
        match events.recv().await {
            Ok(HubEvent::StateChanged { hub_id, state }) => {
                debug!(hub = %hub_id, %state, "hub state changed");
                if state == ConnectionState::Connected {
                    register_available_entities(&api, &hub).await;
                }
            }
            Ok(HubEvent::EntityUpdate {
                entity_id,
                attributes,
            }) => api.update_attributes(&entity_id, &attributes).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(hub = %hub.identifier(), skipped, "hub events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl IntegrationHandler for PowerviewDriver {
    async fn on_connect(&self) {
        self.resume_all().await;
        self.api.set_device_state(DeviceState::Connected).await;
    }

    async fn on_disconnect(&self) {
        self.suspend_all().await;
    }

    async fn on_enter_standby(&self) {
        self.suspend_all().await;
    }

    async fn on_exit_standby(&self) {
        self.resume_all().await;
    }

    async fn on_subscribe_entities(&self, entity_ids: &[String]) {
        for entity_id in entity_ids {
            self.refresh_entity_state(entity_id).await;
        }
    }

    async fn entity_command(
        &self,
        entity: &Entity,
        cmd_id: &str,
        params: Option<&Value>,
    ) -> StatusCode {
        info!(entity_id = %entity.entity_id, cmd_id, "entity command");
        match self.run_command(entity, cmd_id, params).await {
            Ok(()) => StatusCode::Ok,
            Err(e) => e.into_status(),
        }
    }

    async fn setup(&self, msg: SetupDriver) -> SetupAction {
        self.setup.lock().await.handle(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DriverMetadata;
    use crate::discovery::NoDiscovery;
    use crate::domain::{ShadeInfo, SceneInfo};
    use tempfile::TempDir;

    fn driver(dir: &TempDir) -> Arc<PowerviewDriver> {
        let meta = DriverMetadata::bundled().unwrap();
        let api = Arc::new(IntegrationApi::new(meta));
        let store = Arc::new(Mutex::new(HubStore::open(dir.path())));
        Arc::new(PowerviewDriver::new(
            api,
            HubSettings {
                request_timeout_secs: 1,
                ..Default::default()
            },
            store,
            Arc::new(NoDiscovery),
        ))
    }

    fn config(id: &str) -> HubConfig {
        HubConfig {
            identifier: id.to_string(),
            address: "192.0.2.1".to_string(),
            name: "Hub".to_string(),
            model: String::new(),
        }
    }

    #[tokio::test]
    async fn test_command_for_unknown_hub_is_not_found() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let entity = cover_entity(
            "missing",
            &ShadeInfo {
                id: "1".to_string(),
                name: "Shade".to_string(),
                shade_type: "1".to_string(),
                position: None,
            },
        );
        assert_eq!(
            driver.entity_command(&entity, "open", None).await,
            StatusCode::NotFound
        );
    }

    #[tokio::test]
    async fn test_remove_hub_drops_entities() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        driver.add_configured_hub(config("A")).await;
        let scene = SceneInfo {
            id: "3".to_string(),
            name: "Morning".to_string(),
        };
        driver.api().available_entities().add(scene_button_entity("A", &scene)).await;
        driver.api().configured_entities().add(scene_button_entity("A", &scene)).await;

        driver.remove_hub("A").await;
        assert!(driver.hub("A").await.is_none());
        assert!(driver.api().available_entities().all().await.is_empty());
        assert!(driver.api().configured_entities().all().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_replaces_existing_hub() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        driver.add_configured_hub(config("A")).await;
        let first = driver.hub("A").await.unwrap();
        driver.add_configured_hub(config("A")).await;
        let second = driver.hub("A").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(driver.hub_ids().await, vec!["A"]);
        driver.shutdown().await;
    }

    #[tokio::test]
    async fn test_store_events_drive_hubs() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = driver.clone().spawn_store_listener(rx);

        tx.send(StoreEvent::Added(config("A"))).unwrap();
        tx.send(StoreEvent::Added(config("B"))).unwrap();
        tx.send(StoreEvent::Removed(config("A"))).unwrap();
        drop(tx);
        listener.await.unwrap();
        assert_eq!(driver.hub_ids().await, vec!["B"]);

        let (tx, rx) = mpsc::unbounded_channel();
        let listener = driver.clone().spawn_store_listener(rx);
        tx.send(StoreEvent::Cleared).unwrap();
        drop(tx);
        listener.await.unwrap();
        assert!(driver.hub_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_sets_device_state() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        driver.on_connect().await;
        assert_eq!(driver.api().device_state().await, DeviceState::Connected);
    }
}
