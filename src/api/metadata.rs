use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::LocalizedText;

const BUNDLED_DRIVER_JSON: &str = include_str!("../../driver.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Developer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
}

/// Driver description returned by `get_driver_metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverMetadata {
    pub driver_id: String,
    pub version: String,
    pub name: LocalizedText,
    pub developer: Developer,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub release_date: Option<NaiveDate>,
    /// Remaining fields (icon, description, setup schema) passed through as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DriverMetadata {
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_DRIVER_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid driver metadata")
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// English display name, falling back to the driver id
    pub fn display_name(&self) -> &str {
        self.name
            .get("en")
            .or_else(|| self.name.values().next())
            .map(String::as_str)
            .unwrap_or(&self.driver_id)
    }
}
