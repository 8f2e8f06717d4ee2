use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Entity kinds exposed to the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
    Button,
    Cover,
}

/// Language code to text, e.g. `{"en": "Living room"}`
pub type LocalizedText = BTreeMap<String, String>;

pub fn localized(text: impl Into<String>) -> LocalizedText {
    BTreeMap::from([("en".to_string(), text.into())])
}

/// Entity definition as announced to the remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub features: Vec<String>,
    pub name: LocalizedText,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    /// Hub identifier encoded in the entity id
    pub fn hub_id(&self) -> Option<&str> {
        device_from_entity_id(&self.entity_id)
    }

    /// Hub-local resource id (shade or scene id)
    pub fn resource_id(&self) -> Option<&str> {
        entity_from_entity_id(&self.entity_id)
    }

    pub fn merge_attributes(&mut self, update: &Map<String, Value>) {
        for (key, value) in update {
            self.attributes.insert(key.clone(), value.clone());
        }
    }
}

/// Build `<type>.<hub>.<resource>`
pub fn create_entity_id(entity_type: EntityType, hub_id: &str, resource_id: &str) -> String {
    format!("{entity_type}.{hub_id}.{resource_id}")
}

fn split_entity_id(entity_id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = entity_id.splitn(3, '.');
    let kind = parts.next()?;
    let device = parts.next()?;
    let entity = parts.next()?;
    Some((kind, device, entity))
}

pub fn type_from_entity_id(entity_id: &str) -> Option<&str> {
    split_entity_id(entity_id).map(|(kind, _, _)| kind)
}

pub fn device_from_entity_id(entity_id: &str) -> Option<&str> {
    split_entity_id(entity_id).map(|(_, device, _)| device)
}

pub fn entity_from_entity_id(entity_id: &str) -> Option<&str> {
    split_entity_id(entity_id).map(|(_, _, entity)| entity)
}
