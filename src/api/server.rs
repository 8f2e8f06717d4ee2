use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::entities::EntityRegistry;
use super::error::StatusCode;
use super::messages::{
    setup_progress, setup_started, DeviceState, EntityCommand, EntityState, EventCategory,
    Inbound, Outbound, RemoteEvent, SetupAction, SetupDriver, SubscribeEvents, API_VERSION,
};
use super::metadata::DriverMetadata;
use crate::domain::Entity;

/// Callbacks from the remote into the driver
#[async_trait]
pub trait IntegrationHandler: Send + Sync {
    async fn on_connect(&self) {}

    async fn on_disconnect(&self) {}

    async fn on_enter_standby(&self) {}

    async fn on_exit_standby(&self) {}

    async fn on_subscribe_entities(&self, _entity_ids: &[String]) {}

    async fn on_unsubscribe_entities(&self, _entity_ids: &[String]) {}

    /// Run a command on a configured entity
    async fn entity_command(
        &self,
        entity: &Entity,
        cmd_id: &str,
        params: Option<&Value>,
    ) -> StatusCode;

    async fn setup(&self, msg: SetupDriver) -> SetupAction;
}

/// Entity bookkeeping and event fan-out shared by all remote connections
pub struct IntegrationApi {
    metadata: DriverMetadata,
    available: EntityRegistry,
    configured: EntityRegistry,
    device_state: RwLock<DeviceState>,
    events: broadcast::Sender<Outbound>,
}

impl IntegrationApi {
    pub fn new(metadata: DriverMetadata) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            metadata,
            available: EntityRegistry::new(),
            configured: EntityRegistry::new(),
            device_state: RwLock::new(DeviceState::Disconnected),
            events,
        }
    }

    pub fn metadata(&self) -> &DriverMetadata {
        &self.metadata
    }

    pub fn available_entities(&self) -> &EntityRegistry {
        &self.available
    }

    pub fn configured_entities(&self) -> &EntityRegistry {
        &self.configured
    }

    /// Events broadcast to every connected remote
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: Outbound) {
        // no remote connected yet
        let _ = self.events.send(event);
    }

    pub async fn device_state(&self) -> DeviceState {
        *self.device_state.read().await
    }

    pub async fn set_device_state(&self, state: DeviceState) {
        *self.device_state.write().await = state;
        debug!(%state, "device state changed");
        self.broadcast(Outbound::event(
            "device_state",
            EventCategory::Device,
            json!({ "state": state }),
        ));
    }

    /// Merge new attributes into an entity and notify subscribed remotes
    pub async fn update_attributes(&self, entity_id: &str, attributes: &Map<String, Value>) {
        self.available.update_attributes(entity_id, attributes).await;
        if !self.configured.update_attributes(entity_id, attributes).await {
            return;
        }
        let Some(entity) = self.configured.get(entity_id).await else {
            return;
        };
        self.broadcast(Outbound::event(
            "entity_change",
            EventCategory::Entity,
            json!({
                "entity_id": entity_id,
                "entity_type": entity.entity_type,
                "attributes": attributes,
            }),
        ));
    }

    async fn entity_states(&self) -> Vec<EntityState> {
        self.configured
            .all()
            .await
            .into_iter()
            .map(|e| EntityState {
                entity_id: e.entity_id,
                entity_type: e.entity_type,
                attributes: e.attributes,
            })
            .collect()
    }

    async fn subscribe_entities(&self, entity_ids: &[String]) {
        for id in entity_ids {
            match self.available.get(id).await {
                Some(entity) => self.configured.add(entity).await,
                None => warn!(entity_id = %id, "cannot subscribe to unknown entity"),
            }
        }
    }

    async fn unsubscribe_entities(&self, entity_ids: &[String]) -> Vec<String> {
        let ids = if entity_ids.is_empty() {
            self.configured.ids().await
        } else {
            entity_ids.to_vec()
        };
        for id in &ids {
            self.configured.remove(id).await;
        }
        ids
    }

    /// Handle one request, queueing the direct replies on `replies` in order.
    ///
    /// Setup steps may block on discovery or hub probes, so they run in their
    /// own task after the acknowledgement and start event have been queued.
    pub async fn handle_request(
        &self,
        handler: &Arc<dyn IntegrationHandler>,
        req: Inbound,
        replies: &mpsc::UnboundedSender<Outbound>,
    ) {
        let id = req.id;
        debug!(req_id = id, msg = %req.msg, "request from remote");
        let reply = |msg: Outbound| {
            // connection already closed
            let _ = replies.send(msg);
        };
        match req.msg.as_str() {
            "get_driver_version" => reply(Outbound::response(
                id,
                StatusCode::Ok,
                "driver_version",
                json!({
                    "name": self.metadata.display_name(),
                    "version": { "api": API_VERSION, "driver": self.metadata.version },
                }),
            )),
            "get_driver_metadata" => {
                let data = serde_json::to_value(&self.metadata).unwrap_or(Value::Null);
                reply(Outbound::response(id, StatusCode::Ok, "driver_metadata", data))
            }
            "get_device_state" => reply(Outbound::event(
                "device_state",
                EventCategory::Device,
                json!({ "state": self.device_state().await }),
            )),
            "get_available_entities" => reply(Outbound::response(
                id,
                StatusCode::Ok,
                "available_entities",
                json!({ "available_entities": self.available.all().await }),
            )),
            "get_entity_states" => reply(Outbound::response(
                id,
                StatusCode::Ok,
                "entity_states",
                json!(self.entity_states().await),
            )),
            "subscribe_events" => {
                let sub: SubscribeEvents =
                    serde_json::from_value(req.msg_data).unwrap_or_default();
                self.subscribe_entities(&sub.entity_ids).await;
                handler.on_subscribe_entities(&sub.entity_ids).await;
                reply(Outbound::result(id, StatusCode::Ok))
            }
            "unsubscribe_events" => {
                let sub: SubscribeEvents =
                    serde_json::from_value(req.msg_data).unwrap_or_default();
                let removed = self.unsubscribe_entities(&sub.entity_ids).await;
                handler.on_unsubscribe_entities(&removed).await;
                reply(Outbound::result(id, StatusCode::Ok))
            }
            "entity_command" => {
                let cmd: EntityCommand = match serde_json::from_value(req.msg_data) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        warn!(error = %e, "invalid entity_command");
                        return reply(Outbound::result(id, StatusCode::BadRequest));
                    }
                };
                let Some(entity) = self.configured.get(&cmd.entity_id).await else {
                    warn!(entity_id = %cmd.entity_id, "command for unconfigured entity");
                    return reply(Outbound::result(id, StatusCode::NotFound));
                };
                let code = handler
                    .entity_command(&entity, &cmd.cmd_id, cmd.params.as_ref())
                    .await;
                reply(Outbound::result(id, code))
            }
            "setup_driver" => match SetupDriver::from_setup_request(req.msg_data) {
                Ok(msg) => {
                    reply(Outbound::result(id, StatusCode::Ok));
                    reply(Outbound::event(
                        "driver_setup_change",
                        EventCategory::Device,
                        setup_started(),
                    ));
                    spawn_setup(handler.clone(), msg, replies.clone());
                }
                Err(e) => {
                    warn!(error = %e, "invalid setup_driver request");
                    reply(Outbound::result(id, StatusCode::BadRequest))
                }
            },
            "set_driver_user_data" => match SetupDriver::from_user_data(req.msg_data) {
                Ok(msg) => {
                    reply(Outbound::result(id, StatusCode::Ok));
                    reply(Outbound::event(
                        "driver_setup_change",
                        EventCategory::Device,
                        setup_progress(),
                    ));
                    spawn_setup(handler.clone(), msg, replies.clone());
                }
                Err(e) => {
                    warn!(error = %e, "invalid set_driver_user_data request");
                    reply(Outbound::result(id, StatusCode::BadRequest))
                }
            },
            other => {
                warn!(msg = other, "unsupported request");
                reply(Outbound::result(id, StatusCode::BadRequest))
            }
        }
    }

    pub async fn handle_event(&self, handler: &Arc<dyn IntegrationHandler>, event: Inbound) {
        let Ok(kind) = event.msg.parse::<RemoteEvent>() else {
            debug!(msg = %event.msg, "ignoring unknown remote event");
            return;
        };
        info!(event = %kind, "remote event");
        match kind {
            RemoteEvent::Connect => handler.on_connect().await,
            RemoteEvent::Disconnect => handler.on_disconnect().await,
            RemoteEvent::EnterStandby => handler.on_enter_standby().await,
            RemoteEvent::ExitStandby => handler.on_exit_standby().await,
            RemoteEvent::AbortDriverSetup => {
                let error = event
                    .msg_data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                // waits for a running setup step, keep reading meanwhile
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.setup(SetupDriver::Abort { error }).await;
                });
            }
        }
    }
}

/// Run one setup step and queue its outcome
fn spawn_setup(
    handler: Arc<dyn IntegrationHandler>,
    msg: SetupDriver,
    replies: mpsc::UnboundedSender<Outbound>,
) {
    tokio::spawn(async move {
        let action = handler.setup(msg).await;
        let _ = replies.send(Outbound::event(
            "driver_setup_change",
            EventCategory::Device,
            action.to_event_data(),
        ));
    });
}

#[derive(Clone)]
struct WsState {
    api: Arc<IntegrationApi>,
    handler: Arc<dyn IntegrationHandler>,
}

/// WebSocket endpoint of the integration API, served on `/` and `/ws`
pub fn router(api: Arc<IntegrationApi>, handler: Arc<dyn IntegrationHandler>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(WsState { api, handler })
        .layer(TraceLayer::new_for_http())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    info!("remote connected");
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let mut events = state.api.subscribe();

    let writer = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                direct = rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
                event = events.recv() => match event {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "remote is lagging behind, events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "cannot serialize message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(Outbound::response(
        0,
        StatusCode::Ok,
        "authentication",
        json!({}),
    ));

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let msg: Inbound = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "invalid message from remote");
                continue;
            }
        };
        match msg.kind.as_str() {
            "req" => state.api.handle_request(&state.handler, msg, &tx).await,
            "event" => state.api.handle_event(&state.handler, msg).await,
            other => debug!(kind = other, "ignoring message"),
        }
    }

    drop(tx);
    writer.abort();
    info!("remote disconnected");
}
