pub mod api;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod driver;
pub mod powerview;
pub mod setup;
pub mod store;
pub mod telemetry;
