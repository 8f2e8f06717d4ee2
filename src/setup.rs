use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::messages::{SetupAction, SetupDriver, SetupErrorKind};
use crate::config::HubSettings;
use crate::discovery::HubDiscovery;
use crate::domain::{localized, LocalizedText};
use crate::powerview::{HubError, HubInfo, PowerviewClient};
use crate::store::{HubConfig, HubStore};

/// Where the wizard expects the next user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Init,
    ConfigurationMode,
    Discover,
}

/// Setup and reconfiguration wizard
pub struct SetupFlow {
    step: SetupStep,
    store: Arc<Mutex<HubStore>>,
    discovery: Arc<dyn HubDiscovery>,
    settings: HubSettings,
}

fn dropdown(id: &str, label: LocalizedText, items: Vec<Value>) -> Value {
    let value = items
        .first()
        .and_then(|item| item.get("id"))
        .cloned()
        .unwrap_or(Value::String(String::new()));
    json!({
        "id": id,
        "label": label,
        "field": { "dropdown": { "value": value, "items": items } }
    })
}

fn item(id: &str, label: &str) -> Value {
    json!({ "id": id, "label": { "en": label } })
}

fn manual_entry() -> SetupAction {
    SetupAction::RequestUserInput {
        title: localized("Hunter Douglas Powerview Setup"),
        settings: vec![
            json!({
                "id": "info",
                "label": { "en": "Setup your Hunter Douglas Powerview Device" },
                "field": { "label": { "value": {
                    "en": "Please supply the IP address of your Hunter Douglas Powerview Device."
                } } }
            }),
            json!({
                "id": "ip",
                "label": { "en": "IP Address" },
                "field": { "text": { "value": "" } }
            }),
        ],
    }
}

fn probe_error_kind(error: &HubError) -> SetupErrorKind {
    if error.is_connect() {
        SetupErrorKind::ConnectionRefused
    } else if error.is_timeout() {
        SetupErrorKind::Timeout
    } else {
        SetupErrorKind::NotFound
    }
}

impl SetupFlow {
    pub fn new(
        store: Arc<Mutex<HubStore>>,
        discovery: Arc<dyn HubDiscovery>,
        settings: HubSettings,
    ) -> Self {
        Self {
            step: SetupStep::Init,
            store,
            discovery,
            settings,
        }
    }

    pub fn step(&self) -> SetupStep {
        self.step
    }

    pub async fn handle(&mut self, msg: SetupDriver) -> SetupAction {
        match msg {
            SetupDriver::Start { reconfigure, .. } => {
                self.step = SetupStep::Init;
                self.start(reconfigure).await
            }
            SetupDriver::UserData { input_values } => self.user_data(input_values).await,
            SetupDriver::Abort { error } => {
                info!(%error, "setup was aborted");
                self.step = SetupStep::Init;
                SetupAction::Error(SetupErrorKind::Other)
            }
            SetupDriver::Confirmation { .. } => {
                error!(step = ?self.step, "unexpected setup confirmation");
                SetupAction::Error(SetupErrorKind::Other)
            }
        }
    }

    async fn user_data(&mut self, input: HashMap<String, String>) -> SetupAction {
        debug!(step = ?self.step, ?input, "setup user data");
        match self.step {
            SetupStep::ConfigurationMode if input.contains_key("action") => {
                self.configuration_mode(&input).await
            }
            SetupStep::Discover => match input.get("ip").map(String::as_str) {
                Some("manual") => manual_entry(),
                Some(ip) => self.create(ip).await,
                None => {
                    error!(step = ?self.step, "no ip address in setup input");
                    SetupAction::Error(SetupErrorKind::Other)
                }
            },
            _ => {
                error!(step = ?self.step, "no user input was expected");
                SetupAction::Error(SetupErrorKind::Other)
            }
        }
    }

    async fn start(&mut self, reconfigure: bool) -> SetupAction {
        debug!(reconfigure, "starting driver setup");
        if !reconfigure {
            if let Err(e) = self.store.lock().await.clear() {
                error!(error = %e, "cannot clear hub configuration");
            }
            return self.discover().await;
        }

        self.step = SetupStep::ConfigurationMode;
        let mut hubs: Vec<Value> = self
            .store
            .lock()
            .await
            .all()
            .map(|h| item(&h.identifier, &h.name))
            .collect();

        let mut actions = vec![item("add", "Add a new Powerview Smart Hub")];
        if hubs.is_empty() {
            hubs.push(item("", "---"));
        } else {
            actions.push(item("update", "Update information for selected Powerview Smart Hub"));
            actions.push(item("remove", "Remove selected Powerview Smart Hub"));
            actions.push(json!({
                "id": "reset",
                "label": {
                    "en": "Reset configuration and reconfigure",
                    "de": "Konfiguration zurücksetzen und neu konfigurieren",
                    "fr": "Réinitialiser la configuration et reconfigurer"
                }
            }));
        }

        let mut title = localized("Configuration mode");
        title.insert("de".to_string(), "Konfigurations-Modus".to_string());
        SetupAction::RequestUserInput {
            title,
            settings: vec![
                dropdown(
                    "choice",
                    LocalizedText::from([
                        ("en".to_string(), "Configured Devices".to_string()),
                        ("de".to_string(), "Konfigurierte Geräte".to_string()),
                        ("fr".to_string(), "Appareils configurés".to_string()),
                    ]),
                    hubs,
                ),
                dropdown(
                    "action",
                    LocalizedText::from([
                        ("en".to_string(), "Action".to_string()),
                        ("de".to_string(), "Aktion".to_string()),
                        ("fr".to_string(), "Action".to_string()),
                    ]),
                    actions,
                ),
            ],
        }
    }

    async fn configuration_mode(&mut self, input: &HashMap<String, String>) -> SetupAction {
        let choice = input.get("choice").map(String::as_str).unwrap_or_default();
        match input.get("action").map(String::as_str).unwrap_or_default() {
            "add" => self.discover().await,
            "update" => {
                let Some(hub) = self.store.lock().await.get(choice) else {
                    warn!(hub = choice, "cannot update unknown hub");
                    return SetupAction::Error(SetupErrorKind::Other);
                };
                self.create(&hub.address).await
            }
            "remove" => match self.store.lock().await.remove(choice) {
                Ok(true) => SetupAction::Complete,
                Ok(false) => {
                    warn!(hub = choice, "could not remove hub from configuration");
                    SetupAction::Error(SetupErrorKind::Other)
                }
                Err(e) => {
                    error!(hub = choice, error = %e, "could not persist hub removal");
                    SetupAction::Error(SetupErrorKind::Other)
                }
            },
            "reset" => {
                if let Err(e) = self.store.lock().await.clear() {
                    error!(error = %e, "cannot clear hub configuration");
                }
                self.discover().await
            }
            other => {
                error!(action = other, "invalid configuration action");
                SetupAction::Error(SetupErrorKind::Other)
            }
        }
    }

    async fn discover(&mut self) -> SetupAction {
        self.step = SetupStep::Discover;
        let hubs = self.discovery.discover().await;
        if hubs.is_empty() {
            debug!("no PowerView hubs discovered, asking for manual entry");
            return manual_entry();
        }

        let mut items: Vec<Value> = hubs
            .iter()
            .map(|h| {
                let address = h.address.to_string();
                item(&address, &address)
            })
            .collect();
        items.push(item("manual", "Setup Manually"));

        SetupAction::RequestUserInput {
            title: localized("Discovered Powerview Devices"),
            settings: vec![dropdown("ip", localized("Discovered Smart Hubs:"), items)],
        }
    }

    /// Probe the hub at `ip` and store it
    async fn create(&mut self, ip: &str) -> SetupAction {
        let ip = ip.trim();
        if ip.is_empty() {
            info!("no ip address entered");
            return SetupAction::Error(SetupErrorKind::Other);
        }
        if ip.parse::<IpAddr>().is_err() {
            error!(ip, "the entered ip address is not valid");
            return SetupAction::Error(SetupErrorKind::NotFound);
        }
        info!(ip, "probing PowerView hub");

        let info = match self.probe(ip).await {
            Ok(info) => info,
            Err(e) => {
                error!(ip, error = %e, "unable to query the PowerView hub");
                return SetupAction::Error(probe_error_kind(&e));
            }
        };

        let hub = HubConfig {
            identifier: info.serial_number,
            address: ip.to_string(),
            name: info.name,
            model: info.model,
        };
        if let Err(e) = self.store.lock().await.add_or_update(hub) {
            error!(error = %e, "cannot store hub configuration");
            return SetupAction::Error(SetupErrorKind::Other);
        }
        info!("setup complete");
        SetupAction::Complete
    }

    async fn probe(&self, ip: &str) -> Result<HubInfo, HubError> {
        let client =
            PowerviewClient::connect(ip, self.settings.port, self.settings.request_timeout())
                .await?;
        let info = client.hub_info().await?;
        let shades = client.shades().await?;
        let scenes = client.scenes().await?;
        debug!(
            serial = %info.serial_number,
            shades = shades.len(),
            scenes = scenes.len(),
            "PowerView hub info"
        );
        Ok(info)
    }
}
