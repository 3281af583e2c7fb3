//! aero sensor telemetry server.
//!
//! Wires the reading store, the ingest relay and the dashboard server
//! together from a TOML configuration.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, PersistenceConfig, StoreBackend};
pub use error::{AppError, AppResult};
