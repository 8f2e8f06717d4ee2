//! Wire formats of the PowerView hub HTTP API.
//!
//! Generation 1/2 hubs serve `/api/...` with base64 names and 16-bit
//! positions. Generation 3 gateways serve `/home/...` and `/gateway/...`
//! with plain names and fractional positions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::domain::{SceneInfo, ShadeInfo};

/// Full-open value of a Gen 1/2 `position1` field
pub const MAX_POSITION_V2: u32 = 65_535;

/// Hub identity as reported by its firmware endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubInfo {
    pub serial_number: String,
    pub name: String,
    pub model: String,
    pub firmware: Option<String>,
    pub mac_address: Option<String>,
}

/// Decode a base64 hub name, keeping the raw text if it is not valid base64
pub fn decode_name(raw: &str) -> String {
    STANDARD
        .decode(raw.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

pub fn encode_name(name: &str) -> String {
    STANDARD.encode(name.as_bytes())
}

pub fn percent_from_v2(raw: u32) -> u8 {
    let clamped = raw.min(MAX_POSITION_V2) as f64;
    (clamped * 100.0 / MAX_POSITION_V2 as f64).round() as u8
}

pub fn percent_to_v2(percent: u8) -> u32 {
    let percent = percent.min(100) as f64;
    (percent * MAX_POSITION_V2 as f64 / 100.0).round() as u32
}

pub fn percent_from_v3(primary: f64) -> u8 {
    (primary.clamp(0.0, 1.0) * 100.0).round() as u8
}

pub fn percent_to_v3(percent: u8) -> f64 {
    percent.min(100) as f64 / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorVersion {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub sub_revision: u32,
    #[serde(default)]
    pub build: u32,
}

impl ProcessorVersion {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.revision, self.sub_revision, self.build)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareV2 {
    #[serde(default)]
    pub main_processor: Option<ProcessorVersion>,
    #[serde(default)]
    pub radio: Option<ProcessorVersion>,
}

// ---------------------------------------------------------------------------
// Generation 1/2
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FwVersionResponse {
    #[serde(default)]
    pub firmware: FirmwareV2,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataResponse {
    pub user_data: UserDataV2,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataV2 {
    #[serde(default)]
    pub hub_name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub firmware: Option<FirmwareV2>,
}

impl UserDataV2 {
    pub fn into_hub_info(self, fw: FirmwareV2) -> HubInfo {
        let firmware = self.firmware.unwrap_or(fw);
        let main = firmware.main_processor;
        let model = main
            .as_ref()
            .and_then(|m| m.name.clone())
            .unwrap_or_else(|| "PowerView Hub".to_string());
        let serial = self
            .serial_number
            .clone()
            .or_else(|| self.mac_address.clone())
            .unwrap_or_default();
        HubInfo {
            name: self
                .hub_name
                .as_deref()
                .map(decode_name)
                .unwrap_or_else(|| model.clone()),
            serial_number: serial,
            model,
            firmware: main.map(|m| m.version_string()),
            mac_address: self.mac_address,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadesResponseV2 {
    #[serde(default)]
    pub shade_data: Vec<ShadeV2>,
}

#[derive(Debug, Deserialize)]
pub struct ShadeResponseV2 {
    pub shade: ShadeV2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShadeV2 {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub shade_type: Option<i64>,
    #[serde(default)]
    pub positions: Option<PositionsV2>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsV2 {
    #[serde(rename = "posKind1", default, skip_serializing_if = "Option::is_none")]
    pub pos_kind1: Option<u8>,
    #[serde(default)]
    pub position1: Option<u32>,
}

impl From<ShadeV2> for ShadeInfo {
    fn from(raw: ShadeV2) -> Self {
        // posKind1 == 1 is the primary (bottom) rail
        let position = raw
            .positions
            .filter(|p| p.pos_kind1.unwrap_or(1) == 1)
            .and_then(|p| p.position1)
            .map(percent_from_v2);
        ShadeInfo {
            id: raw.id.to_string(),
            name: raw
                .name
                .as_deref()
                .map(decode_name)
                .unwrap_or_else(|| format!("Shade {}", raw.id)),
            shade_type: raw
                .shade_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "shade".to_string()),
            position,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenesResponseV2 {
    #[serde(default)]
    pub scene_data: Vec<SceneV2>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneV2 {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<SceneV2> for SceneInfo {
    fn from(raw: SceneV2) -> Self {
        SceneInfo {
            id: raw.id.to_string(),
            name: raw
                .name
                .as_deref()
                .map(decode_name)
                .unwrap_or_else(|| format!("Scene {}", raw.id)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShadeCommandV2 {
    pub shade: ShadeCommandBodyV2,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ShadeCommandBodyV2 {
    Move { positions: PositionsV2 },
    Motion { motion: &'static str },
}

impl ShadeCommandV2 {
    pub fn move_to(percent: u8) -> Self {
        Self {
            shade: ShadeCommandBodyV2::Move {
                positions: PositionsV2 {
                    pos_kind1: Some(1),
                    position1: Some(percent_to_v2(percent)),
                },
            },
        }
    }

    pub fn stop() -> Self {
        Self {
            shade: ShadeCommandBodyV2::Motion { motion: "stop" },
        }
    }
}

// ---------------------------------------------------------------------------
// Generation 3
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GatewayResponseV3 {
    #[serde(default)]
    pub config: Option<GatewayConfigV3>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigV3 {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub firmware: Option<FirmwareV2>,
    #[serde(default)]
    pub network_status: Option<NetworkStatusV3>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatusV3 {
    #[serde(default)]
    pub primary_mac_address: Option<String>,
}

impl GatewayConfigV3 {
    pub fn into_hub_info(self) -> HubInfo {
        let main = self.firmware.and_then(|f| f.main_processor);
        let mac = self.network_status.and_then(|n| n.primary_mac_address);
        let model = main
            .as_ref()
            .and_then(|m| m.name.clone())
            .unwrap_or_else(|| "PowerView Gen 3 Gateway".to_string());
        HubInfo {
            serial_number: self
                .serial_number
                .or_else(|| mac.clone())
                .unwrap_or_default(),
            name: model.clone(),
            model,
            firmware: main.map(|m| m.version_string()),
            mac_address: mac,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadeV3 {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pt_name: Option<String>,
    #[serde(rename = "type", default)]
    pub shade_type: Option<i64>,
    #[serde(default)]
    pub positions: Option<PositionsV3>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsV3 {
    #[serde(default)]
    pub primary: Option<f64>,
}

fn name_v3(id: i64, pt_name: Option<String>, name: Option<String>, fallback: &str) -> String {
    pt_name
        .filter(|n| !n.is_empty())
        .or_else(|| name.as_deref().map(decode_name))
        .unwrap_or_else(|| format!("{fallback} {id}"))
}

impl From<ShadeV3> for ShadeInfo {
    fn from(raw: ShadeV3) -> Self {
        ShadeInfo {
            id: raw.id.to_string(),
            name: name_v3(raw.id, raw.pt_name, raw.name, "Shade"),
            shade_type: raw
                .shade_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "shade".to_string()),
            position: raw.positions.and_then(|p| p.primary).map(percent_from_v3),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneV3 {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pt_name: Option<String>,
}

impl From<SceneV3> for SceneInfo {
    fn from(raw: SceneV3) -> Self {
        SceneInfo {
            id: raw.id.to_string(),
            name: name_v3(raw.id, raw.pt_name, raw.name, "Scene"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MoveCommandV3 {
    pub positions: PositionsV3,
}

impl MoveCommandV3 {
    pub fn move_to(percent: u8) -> Self {
        Self {
            positions: PositionsV3 {
                primary: Some(percent_to_v3(percent)),
            },
        }
    }
}
