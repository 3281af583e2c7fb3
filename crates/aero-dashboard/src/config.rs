//! Dashboard configuration.

use serde::{Deserialize, Serialize};

/// Dashboard server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to listen on (0 = pick a free port).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Broadcast channel capacity. A viewer further behind than this skips ahead.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Readings kept in each viewer's live window.
    #[serde(default = "default_live_window")]
    pub live_window: usize,
    /// Basic auth username (empty = disabled).
    #[serde(default)]
    pub username: String,
    /// Basic auth password (empty = disabled).
    #[serde(default)]
    pub password: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> usize {
    64
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_live_window() -> usize {
    aero_core::DEFAULT_LIVE_WINDOW
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_connections: default_max_connections(),
            broadcast_capacity: default_broadcast_capacity(),
            live_window: default_live_window(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl DashboardConfig {
    /// Check if basic auth is enabled.
    pub fn auth_enabled(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: DashboardConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.live_window, 50);
        assert!(!config.auth_enabled());
    }

    #[test]
    fn test_auth_needs_both_fields() {
        let mut config = DashboardConfig {
            username: "grower".to_string(),
            ..Default::default()
        };
        assert!(!config.auth_enabled());
        config.password = "secret".to_string();
        assert!(config.auth_enabled());
    }
}
