//! Integration API wire format

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use strum::{Display, EnumString};

use super::error::StatusCode;
use crate::domain::{EntityType, LocalizedText};

pub const API_VERSION: &str = "0.12.1";

/// Message received from the remote
#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
    pub kind: String,
    #[serde(default)]
    pub id: u64,
    pub msg: String,
    #[serde(default)]
    pub msg_data: Value,
}

/// Message sent to the remote
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outbound {
    Resp {
        req_id: u64,
        code: StatusCode,
        msg: String,
        msg_data: Value,
    },
    Event {
        msg: String,
        cat: EventCategory,
        msg_data: Value,
    },
}

impl Outbound {
    pub fn response(req_id: u64, code: StatusCode, msg: &str, msg_data: Value) -> Self {
        Outbound::Resp {
            req_id,
            code,
            msg: msg.to_string(),
            msg_data,
        }
    }

    pub fn result(req_id: u64, code: StatusCode) -> Self {
        Self::response(req_id, code, "result", Value::Object(Map::new()))
    }

    pub fn event(msg: &str, cat: EventCategory, msg_data: Value) -> Self {
        Outbound::Event {
            msg: msg.to_string(),
            cat,
            msg_data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Device,
    Entity,
}

/// Driver connection state reported to the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

/// Events the remote sends without expecting a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RemoteEvent {
    Connect,
    Disconnect,
    EnterStandby,
    ExitStandby,
    AbortDriverSetup,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeEvents {
    #[serde(default)]
    pub entity_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityCommand {
    pub entity_id: String,
    pub cmd_id: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub attributes: Map<String, Value>,
}

/// Setup message passed to the driver's setup handler
#[derive(Debug, Clone, PartialEq)]
pub enum SetupDriver {
    Start {
        reconfigure: bool,
        setup_data: Map<String, Value>,
    },
    UserData {
        input_values: HashMap<String, String>,
    },
    Confirmation {
        confirm: bool,
    },
    Abort {
        error: String,
    },
}

#[derive(Debug, Deserialize)]
struct DriverSetupRequest {
    #[serde(default)]
    reconfigure: bool,
    #[serde(default)]
    setup_data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct UserDataRequest {
    #[serde(default)]
    input_values: Option<Map<String, Value>>,
    #[serde(default)]
    confirm: Option<bool>,
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SetupDriver {
    pub fn from_setup_request(msg_data: Value) -> serde_json::Result<Self> {
        let req: DriverSetupRequest = serde_json::from_value(msg_data)?;
        Ok(SetupDriver::Start {
            reconfigure: req.reconfigure,
            setup_data: req.setup_data,
        })
    }

    pub fn from_user_data(msg_data: Value) -> serde_json::Result<Self> {
        let req: UserDataRequest = serde_json::from_value(msg_data)?;
        if let Some(values) = req.input_values {
            let input_values = values
                .into_iter()
                .map(|(k, v)| (k, value_to_string(v)))
                .collect();
            return Ok(SetupDriver::UserData { input_values });
        }
        Ok(SetupDriver::Confirmation {
            confirm: req.confirm.unwrap_or(false),
        })
    }
}

/// Setup error types understood by the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupErrorKind {
    None,
    NotFound,
    ConnectionRefused,
    AuthorizationError,
    Timeout,
    Other,
}

/// Result of one setup step
#[derive(Debug, Clone, PartialEq)]
pub enum SetupAction {
    RequestUserInput {
        title: LocalizedText,
        settings: Vec<Value>,
    },
    Complete,
    Error(SetupErrorKind),
}

impl SetupAction {
    /// `driver_setup_change` payload announcing this outcome
    pub fn to_event_data(&self) -> Value {
        match self {
            SetupAction::RequestUserInput { title, settings } => serde_json::json!({
                "event_type": "SETUP",
                "state": "WAIT_USER_ACTION",
                "require_user_action": {
                    "input": { "title": title, "settings": settings }
                }
            }),
            SetupAction::Complete => serde_json::json!({
                "event_type": "STOP",
                "state": "OK"
            }),
            SetupAction::Error(kind) => serde_json::json!({
                "event_type": "STOP",
                "state": "ERROR",
                "error": kind
            }),
        }
    }
}

pub fn setup_started() -> Value {
    serde_json::json!({ "event_type": "START", "state": "SETUP" })
}

pub fn setup_progress() -> Value {
    serde_json::json!({ "event_type": "SETUP", "state": "SETUP" })
}
