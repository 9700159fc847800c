//! Editor configuration
//!
//! Tunables for history depth and automatic layout spacing. Stored as JSON;
//! every field has a default so partial files are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

/// Default number of undo snapshots kept per session
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
/// Default horizontal distance between layout ranks
pub const DEFAULT_RANK_SPACING: f64 = 250.0;
/// Default vertical distance between steps in the same rank
pub const DEFAULT_NODE_SPACING: f64 = 120.0;

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_rank_spacing() -> f64 {
    DEFAULT_RANK_SPACING
}

fn default_node_spacing() -> f64 {
    DEFAULT_NODE_SPACING
}

/// Spacing used by the automatic layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    #[serde(default = "default_rank_spacing")]
    pub rank_spacing: f64,
    #[serde(default = "default_node_spacing")]
    pub node_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            rank_spacing: default_rank_spacing(),
            node_spacing: default_node_spacing(),
        }
    }
}

/// Configuration for an editor session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Maximum number of undo snapshots
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            layout: LayoutConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Load configuration from a JSON file, falling back to defaults if it does not exist
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await.map_err(ConfigError::Io)?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration as pretty JSON, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(ConfigError::Io)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).await.map_err(ConfigError::Io)?;

        log::info!("Editor configuration saved to {:?}", path);
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}
