use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{create_entity_id, localized, Entity, EntityType};
use crate::api::error::CommandError;

/// Scene as reported by a hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonCommand {
    Push,
}

impl ButtonCommand {
    pub fn parse(cmd_id: &str) -> Result<Self, CommandError> {
        match cmd_id {
            "push" => Ok(ButtonCommand::Push),
            other => Err(CommandError::NotImplemented(format!("button command {other}"))),
        }
    }
}

pub fn button_attributes(available: bool) -> Map<String, Value> {
    let state = if available { "AVAILABLE" } else { "UNAVAILABLE" };
    let mut attrs = Map::new();
    attrs.insert("state".to_string(), Value::from(state));
    attrs
}

pub fn scene_button_entity(hub_id: &str, scene: &SceneInfo) -> Entity {
    Entity {
        entity_id: create_entity_id(EntityType::Button, hub_id, &scene.id),
        entity_type: EntityType::Button,
        features: vec!["press".to_string()],
        name: localized(scene.name.clone()),
        device_class: None,
        attributes: button_attributes(true),
    }
}
