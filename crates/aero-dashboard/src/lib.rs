//! aero-dashboard - Ingest relay and live dashboard server.
//!
//! Devices push readings over a WebSocket; each reading is persisted and then
//! rebroadcast to every connected viewer, which keeps a bounded live window.
//!
//! # Architecture
//!
//! ```text
//!  device ──sensorData──▶ /ws ──▶ IngestRelay ──save──▶ ReadingStore
//!                                     │
//!                                     │ broadcast (after save succeeds)
//!                                     ▼
//!                     Viewer (LiveBuffer, one per connection)
//!                                     │
//!                                     ▼
//!                          newReading ──▶ browser chart
//!
//!  axum HTTP Server
//!   GET /            → Static HTML/JS
//!   GET /ws          → WebSocket upgrade
//!   GET /api/latest  → Last stored reading + VPD
//!   GET /metrics     → Prometheus
//!   GET /health      → Liveness
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use aero_dashboard::{DashboardConfig, DashboardServer, IngestRelay};
//!
//! let relay = IngestRelay::shared(store, config.broadcast_capacity);
//! let mut server = DashboardServer::new(relay, config);
//! let addr = server.start().await?;
//! tokio::signal::ctrl_c().await?;
//! server.shutdown().await?;
//! ```

mod config;
mod error;
mod relay;
mod server;
mod types;
mod viewer;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use relay::{IngestRelay, RelayOutcome};
pub use server::{create_router, AppState, DashboardServer};
pub use types::{ChannelMessage, LatestReading};
pub use viewer::Viewer;
