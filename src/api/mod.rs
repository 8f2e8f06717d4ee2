//! Unfolded Circle integration API
//!
//! A remote connects over WebSocket and exchanges JSON requests,
//! responses and events with the driver.

pub mod entities;
pub mod error;
pub mod messages;
pub mod metadata;
pub mod server;

pub use entities::EntityRegistry;
pub use error::{CommandError, StatusCode};
pub use messages::{DeviceState, SetupAction, SetupDriver, SetupErrorKind};
pub use metadata::DriverMetadata;
pub use server::{router, IntegrationApi, IntegrationHandler};
