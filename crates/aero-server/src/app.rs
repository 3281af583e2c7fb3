//! Main application orchestration.
//!
//! Builds the reading store selected in config, the ingest relay on top of
//! it, and the dashboard server that exposes both.

use std::net::SocketAddr;
use std::sync::Arc;

use aero_dashboard::{DashboardServer, IngestRelay};
use aero_persistence::{DynReadingStore, JsonLinesStore, MemoryStore};
use tracing::{info, warn};

use crate::config::{AppConfig, StoreBackend};
use crate::error::AppResult;

/// Main application.
pub struct Application {
    config: AppConfig,
    server: DashboardServer,
}

impl Application {
    /// Create a new application. Nothing is bound until `start`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let store = open_store(&config)?;
        let relay = IngestRelay::shared(store, config.dashboard.broadcast_capacity);
        let server = DashboardServer::new(relay, config.dashboard.clone());

        Ok(Self { config, server })
    }

    /// Start the dashboard server. Calling it again is a no-op.
    pub async fn start(&mut self) -> AppResult<SocketAddr> {
        let addr = self.server.start().await?;
        Ok(addr)
    }

    /// Run until Ctrl-C, then shut down gracefully.
    pub async fn run(&mut self) -> AppResult<()> {
        let addr = self.start().await?;
        info!(
            %addr,
            store = ?self.config.persistence.backend,
            live_window = self.config.dashboard.live_window,
            "Dashboard ready"
        );

        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");

        self.shutdown().await
    }

    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.server.shutdown().await?;
        Ok(())
    }

    pub fn relay(&self) -> &Arc<IngestRelay> {
        self.server.relay()
    }
}

fn open_store(config: &AppConfig) -> AppResult<DynReadingStore> {
    let store: DynReadingStore = match config.persistence.backend {
        StoreBackend::Jsonl => {
            info!(data_dir = %config.persistence.data_dir, "Using JSON Lines store");
            Arc::new(JsonLinesStore::open(&config.persistence.data_dir)?)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, readings will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}
