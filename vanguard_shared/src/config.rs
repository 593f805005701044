//! Configuration system.
//!
//! Loads game configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Frames whose delta exceeds this are discarded rather than simulated.
pub const MAX_FRAME_DELTA: f32 = 0.2;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Server listen address, e.g. `127.0.0.1:41000`.
    pub server_addr: String,
    /// Maximum connection slots.
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Fixed simulation rate in Hz.
    #[serde(default = "default_update_hz")]
    pub server_update_hz: u32,
    /// Game-state snapshot rate in Hz.
    #[serde(default = "default_snapshot_hz")]
    pub snapshot_hz: u32,
    /// Server password; empty accepts every auth response.
    #[serde(default)]
    pub password: String,
    /// Player name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_max_players() -> usize {
    16
}

fn default_update_hz() -> u32 {
    40
}

fn default_snapshot_hz() -> u32 {
    10
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:41000".to_string(),
            max_players: default_max_players(),
            server_update_hz: default_update_hz(),
            snapshot_hz: default_snapshot_hz(),
            password: String::new(),
            player_name: default_player_name(),
        }
    }
}

impl GameConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Seconds per simulation tick.
    pub fn update_dt(&self) -> f32 {
        1.0 / self.server_update_hz.max(1) as f32
    }

    /// Seconds per snapshot tick.
    pub fn snapshot_dt(&self) -> f32 {
        1.0 / self.snapshot_hz.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = GameConfig::from_json_str(r#"{"server_addr":"0.0.0.0:41000"}"#).unwrap();
        assert_eq!(cfg.max_players, 16);
        assert_eq!(cfg.server_update_hz, 40);
        assert_eq!(cfg.snapshot_hz, 10);
        assert!(cfg.password.is_empty());
    }

    #[test]
    fn tick_intervals() {
        let cfg = GameConfig::default();
        assert!((cfg.update_dt() - 0.025).abs() < 1e-6);
        assert!((cfg.snapshot_dt() - 0.1).abs() < 1e-6);
    }
}
