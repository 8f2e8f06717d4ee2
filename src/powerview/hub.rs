use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{HubError, HubInfo, PowerviewClient};
use crate::config::HubSettings;
use crate::domain::{
    button_attributes, cover_attributes, create_entity_id, shade_attributes, CoverState,
    EntityType, SceneInfo, ShadeInfo,
};
use crate::store::HubConfig;

/// Hub connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Notifications published by a hub
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    StateChanged {
        hub_id: String,
        state: ConnectionState,
    },
    EntityUpdate {
        entity_id: String,
        attributes: Map<String, Value>,
    },
}

/// A configured PowerView hub with its cached shades and scenes
pub struct SmartHub {
    config: HubConfig,
    settings: HubSettings,
    client: RwLock<Option<PowerviewClient>>,
    state: RwLock<ConnectionState>,
    info: RwLock<Option<HubInfo>>,
    covers: RwLock<Vec<ShadeInfo>>,
    scenes: RwLock<Vec<SceneInfo>>,
    /// Hubs drop commands that overlap on the radio network
    radio_lock: Mutex<()>,
    events: broadcast::Sender<HubEvent>,
}

impl SmartHub {
    pub fn new(config: HubConfig, settings: HubSettings) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            config,
            settings,
            client: RwLock::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            info: RwLock::new(None),
            covers: RwLock::new(Vec::new()),
            scenes: RwLock::new(Vec::new()),
            radio_lock: Mutex::new(()),
            events,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn info(&self) -> Option<HubInfo> {
        self.info.read().await.clone()
    }

    pub async fn covers(&self) -> Vec<ShadeInfo> {
        self.covers.read().await.clone()
    }

    pub async fn scenes(&self) -> Vec<SceneInfo> {
        self.scenes.read().await.clone()
    }

    pub async fn cover(&self, id: &str) -> Option<ShadeInfo> {
        self.covers.read().await.iter().find(|c| c.id == id).cloned()
    }

    pub async fn scene(&self, id: &str) -> Option<SceneInfo> {
        self.scenes.read().await.iter().find(|s| s.id == id).cloned()
    }

    fn emit(&self, event: HubEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
        self.emit(HubEvent::StateChanged {
            hub_id: self.config.identifier.clone(),
            state,
        });
    }

    fn emit_entity(
        &self,
        entity_type: EntityType,
        resource_id: &str,
        attributes: Map<String, Value>,
    ) {
        self.emit(HubEvent::EntityUpdate {
            entity_id: create_entity_id(entity_type, &self.config.identifier, resource_id),
            attributes,
        });
    }

    async fn client(&self) -> Result<PowerviewClient, HubError> {
        self.client.read().await.clone().ok_or(HubError::NotConnected)
    }

    /// Build a fresh client, verify the firmware endpoint and load shades and scenes
    pub async fn connect(&self) -> Result<(), HubError> {
        self.set_state(ConnectionState::Connecting).await;

        match self.try_connect().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected).await;
                Ok(())
            }
            Err(e) => {
                warn!(
                    hub = %self.config.identifier,
                    address = %self.config.address,
                    error = %e,
                    "could not connect to hub"
                );
                *self.client.write().await = None;
                self.set_state(ConnectionState::Error).await;
                Err(e)
            }
        }
    }

    async fn try_connect(&self) -> Result<(), HubError> {
        let client = PowerviewClient::connect(
            &self.config.address,
            self.settings.port,
            self.settings.request_timeout(),
        )
        .await?;
        let info = client.hub_info().await?;
        info!(
            hub = %self.config.identifier,
            api = %client.version(),
            firmware = info.firmware.as_deref().unwrap_or("unknown"),
            "connected to PowerView hub"
        );
        *self.info.write().await = Some(info);
        *self.client.write().await = Some(client);

        self.refresh_covers().await?;
        self.refresh_scenes().await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        *self.client.write().await = None;
        self.set_state(ConnectionState::Disconnected).await;
        debug!(hub = %self.config.identifier, "disconnected");
    }

    /// Reload shades from the hub and publish their positions
    pub async fn refresh_covers(&self) -> Result<(), HubError> {
        let shades = self.client().await?.shades().await?;
        debug!(hub = %self.config.identifier, count = shades.len(), "refreshed shades");
        for shade in &shades {
            self.emit_entity(EntityType::Cover, &shade.id, shade_attributes(shade));
        }
        *self.covers.write().await = shades;
        Ok(())
    }

    pub async fn refresh_scenes(&self) -> Result<(), HubError> {
        let scenes = self.client().await?.scenes().await?;
        debug!(hub = %self.config.identifier, count = scenes.len(), "refreshed scenes");
        *self.scenes.write().await = scenes;
        Ok(())
    }

    async fn set_cached_position(&self, id: &str, position: Option<u8>) {
        if let Some(shade) = self.covers.write().await.iter_mut().find(|c| c.id == id) {
            shade.position = position;
        }
    }

    async fn require_cover(&self, id: &str) -> Result<ShadeInfo, HubError> {
        self.cover(id).await.ok_or_else(|| HubError::NotFound {
            kind: "shade",
            id: id.to_string(),
        })
    }

    /// Open a shade fully, or move it to `position` percent
    pub async fn open_cover(&self, id: &str, position: Option<u8>) -> Result<(), HubError> {
        self.move_cover(id, position.unwrap_or(100)).await
    }

    pub async fn close_cover(&self, id: &str) -> Result<(), HubError> {
        self.move_cover(id, 0).await
    }

    async fn move_cover(&self, id: &str, position: u8) -> Result<(), HubError> {
        self.require_cover(id).await?;
        let client = self.client().await?;
        {
            let _radio = self.radio_lock.lock().await;
            client.move_shade(id, position).await?;
        }
        info!(hub = %self.config.identifier, shade = id, position, "moved shade");
        self.set_cached_position(id, Some(position)).await;
        self.emit_entity(
            EntityType::Cover,
            id,
            cover_attributes(CoverState::from_position(position), Some(position)),
        );
        Ok(())
    }

    pub async fn stop_cover(&self, id: &str) -> Result<(), HubError> {
        self.require_cover(id).await?;
        let client = self.client().await?;
        {
            let _radio = self.radio_lock.lock().await;
            client.stop_shade(id).await?;
        }
        info!(hub = %self.config.identifier, shade = id, "stopped shade");

        match client.shade(id).await {
            Ok(shade) => {
                self.set_cached_position(id, shade.position).await;
                self.emit_entity(EntityType::Cover, id, shade_attributes(&shade));
            }
            Err(e) => warn!(
                hub = %self.config.identifier,
                shade = id,
                error = %e,
                "could not read position after stop"
            ),
        }
        Ok(())
    }

    pub async fn activate_scene(&self, id: &str) -> Result<(), HubError> {
        let scene = self.scene(id).await.ok_or_else(|| HubError::NotFound {
            kind: "scene",
            id: id.to_string(),
        })?;
        let client = self.client().await?;
        let _radio = self.radio_lock.lock().await;
        client.activate_scene(id).await?;
        info!(hub = %self.config.identifier, scene = %scene.name, "activated scene");
        Ok(())
    }

    /// Flag the hub and all of its entities as unreachable
    pub async fn mark_unavailable(&self) {
        self.set_state(ConnectionState::Error).await;
        for shade in self.covers().await {
            self.emit_entity(
                EntityType::Cover,
                &shade.id,
                cover_attributes(CoverState::Unavailable, None),
            );
        }
        for scene in self.scenes().await {
            self.emit_entity(EntityType::Button, &scene.id, button_attributes(false));
        }
    }
}
