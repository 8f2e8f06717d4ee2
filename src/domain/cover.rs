use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

use super::entity::{create_entity_id, localized, Entity, EntityType};
use crate::api::error::CommandError;

/// Positions at or above this percentage count as open
pub const OPEN_THRESHOLD: u8 = 5;

pub const ATTR_STATE: &str = "state";
pub const ATTR_POSITION: &str = "position";

/// Shade as reported by a hub, normalised across API generations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeInfo {
    pub id: String,
    pub name: String,
    pub shade_type: String,
    /// Primary rail position in percent, if the hub reported one
    pub position: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverState {
    Unavailable,
    Unknown,
    Opening,
    Open,
    Closing,
    Closed,
}

impl CoverState {
    pub fn from_position(position: u8) -> Self {
        if position >= OPEN_THRESHOLD {
            CoverState::Open
        } else {
            CoverState::Closed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CoverFeature {
    Open,
    Close,
    Stop,
    Position,
}

pub const COVER_FEATURES: [CoverFeature; 4] = [
    CoverFeature::Open,
    CoverFeature::Close,
    CoverFeature::Stop,
    CoverFeature::Position,
];

/// Command sent by the remote to a cover entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverCommand {
    Open,
    Close,
    Stop,
    Position(u8),
}

impl CoverCommand {
    pub fn parse(cmd_id: &str, params: Option<&Value>) -> Result<Self, CommandError> {
        match cmd_id {
            "open" => Ok(CoverCommand::Open),
            "close" => Ok(CoverCommand::Close),
            "stop" => Ok(CoverCommand::Stop),
            "position" => {
                let raw = params
                    .and_then(|p| p.get(ATTR_POSITION))
                    .ok_or_else(|| CommandError::BadRequest("missing position parameter".into()))?;
                let position = raw
                    .as_u64()
                    .filter(|p| *p <= 100)
                    .ok_or_else(|| CommandError::BadRequest(format!("invalid position: {raw}")))?;
                Ok(CoverCommand::Position(position as u8))
            }
            other => Err(CommandError::NotImplemented(format!("cover command {other}"))),
        }
    }
}

/// State and position attributes for a cover
pub fn cover_attributes(state: CoverState, position: Option<u8>) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert(ATTR_STATE.to_string(), Value::from(state.to_string()));
    if let Some(position) = position {
        attrs.insert(ATTR_POSITION.to_string(), Value::from(position));
    }
    attrs
}

pub fn shade_attributes(shade: &ShadeInfo) -> Map<String, Value> {
    match shade.position {
        Some(position) => cover_attributes(CoverState::from_position(position), Some(position)),
        None => cover_attributes(CoverState::Unknown, Some(0)),
    }
}

pub fn cover_entity(hub_id: &str, shade: &ShadeInfo) -> Entity {
    Entity {
        entity_id: create_entity_id(EntityType::Cover, hub_id, &shade.id),
        entity_type: EntityType::Cover,
        features: COVER_FEATURES.iter().map(|f| f.to_string()).collect(),
        name: localized(shade.name.clone()),
        device_class: Some("shade".to_string()),
        attributes: shade_attributes(shade),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn shade(position: Option<u8>) -> ShadeInfo {
        ShadeInfo {
            id: "101".to_string(),
            name: "Bedroom".to_string(),
            shade_type: "6".to_string(),
            position,
        }
    }

    #[rstest]
    #[case(0, CoverState::Closed)]
    #[case(4, CoverState::Closed)]
    #[case(5, CoverState::Open)]
    #[case(100, CoverState::Open)]
    fn test_state_from_position(#[case] position: u8, #[case] expected: CoverState) {
        assert_eq!(CoverState::from_position(position), expected);
    }

    #[test]
    fn test_parse_position_command() {
        let params = json!({"position": 42});
        assert_eq!(
            CoverCommand::parse("position", Some(&params)).unwrap(),
            CoverCommand::Position(42)
        );
    }

    #[test]
    fn test_parse_position_rejects_out_of_range() {
        let params = json!({"position": 101});
        let err = CoverCommand::parse("position", Some(&params)).unwrap_err();
        assert!(matches!(err, CommandError::BadRequest(_)));

        let err = CoverCommand::parse("position", None).unwrap_err();
        assert!(matches!(err, CommandError::BadRequest(_)));
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = CoverCommand::parse("tilt", None).unwrap_err();
        assert!(matches!(err, CommandError::NotImplemented(_)));
    }

    #[test]
    fn test_cover_entity_from_known_position() {
        let entity = cover_entity("HUB1", &shade(Some(60)));
        assert_eq!(entity.entity_id, "cover.HUB1.101");
        assert_eq!(entity.features, vec!["open", "close", "stop", "position"]);
        assert_eq!(entity.device_class.as_deref(), Some("shade"));
        assert_eq!(entity.attributes["state"], "OPEN");
        assert_eq!(entity.attributes["position"], 60);
    }

    #[test]
    fn test_cover_entity_without_position() {
        let entity = cover_entity("HUB1", &shade(None));
        assert_eq!(entity.attributes["state"], "UNKNOWN");
        assert_eq!(entity.attributes["position"], 0);
    }
}
