//! Hunter Douglas PowerView hub communication
//!
//! # Architecture
//! - `client`: stateless HTTP access to one hub, generation aware
//! - `hub`: connected hub with cached shades/scenes and event fan-out
//! - `watchdog`: polling and reconnect loop per hub

use thiserror::Error;

pub mod client;
pub mod hub;
pub mod models;
pub mod watchdog;

pub use client::{ApiVersion, PowerviewClient};
pub use hub::{ConnectionState, HubEvent, SmartHub};
pub use models::HubInfo;

/// Errors talking to a PowerView hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("hub returned HTTP {status} for {path}")]
    Status {
        status: reqwest::StatusCode,
        path: String,
    },

    #[error("unexpected hub response: {0}")]
    Decode(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("hub is not connected")]
    NotConnected,
}

impl HubError {
    pub fn is_connect(&self) -> bool {
        matches!(self, HubError::Request(e) if e.is_connect())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HubError::Request(e) if e.is_timeout())
    }
}
