use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const CFG_FILENAME: &str = "config.json";

/// Persisted settings of one PowerView hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub serial number
    pub identifier: String,
    /// IP address of the hub
    pub address: String,
    pub name: String,
    pub model: String,
}

/// Lenient on-disk shape, accepts numeric identifiers and missing fields
#[derive(Debug, Deserialize)]
struct StoredHubConfig {
    identifier: Value,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl From<StoredHubConfig> for HubConfig {
    fn from(raw: StoredHubConfig) -> Self {
        let identifier = match raw.identifier {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            identifier,
            address: raw.address.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
            model: raw.model.unwrap_or_default(),
        }
    }
}

/// Change notifications for the running driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Added(HubConfig),
    Updated(HubConfig),
    Removed(HubConfig),
    Cleared,
}

/// Configured hubs, persisted as a JSON array in `config.json`
pub struct HubStore {
    data_path: PathBuf,
    cfg_file_path: PathBuf,
    hubs: Vec<HubConfig>,
    listener: Option<mpsc::UnboundedSender<StoreEvent>>,
}

impl HubStore {
    /// Open the store in `data_path`; a missing or unreadable file yields an empty store
    pub fn open(data_path: impl Into<PathBuf>) -> Self {
        let data_path = data_path.into();
        let cfg_file_path = data_path.join(CFG_FILENAME);
        let mut store = Self {
            data_path,
            cfg_file_path,
            hubs: Vec::new(),
            listener: None,
        };
        if let Err(e) = store.load() {
            error!(error = %e, "cannot load hub configuration");
        }
        store
    }

    pub fn with_listener(mut self, listener: mpsc::UnboundedSender<StoreEvent>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    fn notify(&self, event: StoreEvent) {
        if let Some(listener) = &self.listener {
            let _ = listener.send(event);
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &HubConfig> {
        self.hubs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.hubs.iter().any(|h| h.identifier == identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<HubConfig> {
        self.hubs.iter().find(|h| h.identifier == identifier).cloned()
    }

    /// Add a hub, or update it in place if the identifier is already known
    pub fn add_or_update(&mut self, config: HubConfig) -> Result<()> {
        if self.update(config.clone())? {
            return Ok(());
        }
        info!(hub = %config.identifier, address = %config.address, "adding hub");
        self.hubs.push(config.clone());
        self.store()?;
        self.notify(StoreEvent::Added(config));
        Ok(())
    }

    /// Returns false if the hub is not configured
    pub fn update(&mut self, config: HubConfig) -> Result<bool> {
        let Some(existing) = self
            .hubs
            .iter_mut()
            .find(|h| h.identifier == config.identifier)
        else {
            return Ok(false);
        };
        *existing = config.clone();
        self.store()?;
        debug!(hub = %config.identifier, "updated hub");
        self.notify(StoreEvent::Updated(config));
        Ok(true)
    }

    /// Returns false if the hub is not configured
    pub fn remove(&mut self, identifier: &str) -> Result<bool> {
        let Some(index) = self.hubs.iter().position(|h| h.identifier == identifier) else {
            return Ok(false);
        };
        let removed = self.hubs.remove(index);
        self.store()?;
        info!(hub = %identifier, "removed hub");
        self.notify(StoreEvent::Removed(removed));
        Ok(true)
    }

    /// Forget all hubs and delete the configuration file
    pub fn clear(&mut self) -> Result<()> {
        if self.cfg_file_path.exists() {
            std::fs::remove_file(&self.cfg_file_path).with_context(|| {
                format!("cannot delete {}", self.cfg_file_path.display())
            })?;
        }
        self.hubs.clear();
        self.notify(StoreEvent::Cleared);
        Ok(())
    }

    pub fn store(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_path)
            .with_context(|| format!("cannot create {}", self.data_path.display()))?;
        let json = serde_json::to_vec_pretty(&self.hubs)?;
        let tmp = self.cfg_file_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("cannot write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.cfg_file_path)
            .with_context(|| format!("cannot write {}", self.cfg_file_path.display()))?;
        Ok(())
    }

    pub fn load(&mut self) -> Result<()> {
        if !self.cfg_file_path.exists() {
            debug!(path = %self.cfg_file_path.display(), "no hub configuration yet");
            return Ok(());
        }
        let data = std::fs::read(&self.cfg_file_path)
            .with_context(|| format!("cannot open {}", self.cfg_file_path.display()))?;
        let raw: Vec<StoredHubConfig> =
            serde_json::from_slice(&data).context("empty or invalid config file")?;
        self.hubs = raw.into_iter().map(HubConfig::from).collect();
        Ok(())
    }
}
