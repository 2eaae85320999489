//! Model configuration, persisted as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::instance::update::{UpdateOp, UpdateOps};

/// Per-model configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Identifier of the root frame.
    #[serde(default = "default_root_identifier")]
    pub root_identifier: String,
    /// Label of the root frame.
    #[serde(default = "default_root_label")]
    pub root_label: String,
    /// Propagate every asserted-value change immediately. When false,
    /// clients drive updates with `InstanceGraph::update`.
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
    /// Update operations applied by auto-update.
    #[serde(default = "default_update_ops")]
    pub default_update_ops: Vec<UpdateOp>,
    /// Pass cap for a single propagation sweep.
    #[serde(default = "default_max_update_passes")]
    pub max_update_passes: usize,
    /// Validate frames on the rayon pool during the complete stage.
    #[serde(default = "default_parallel_validation")]
    pub parallel_validation: bool,
}

fn default_root_identifier() -> String {
    "ROOT".into()
}
fn default_root_label() -> String {
    "Root".into()
}
fn default_auto_update() -> bool {
    true
}
fn default_update_ops() -> Vec<UpdateOp> {
    UpdateOp::ALL.to_vec()
}
fn default_max_update_passes() -> usize {
    256
}
fn default_parallel_validation() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            root_identifier: default_root_identifier(),
            root_label: default_root_label(),
            auto_update: default_auto_update(),
            default_update_ops: default_update_ops(),
            max_update_passes: default_max_update_passes(),
            parallel_validation: default_parallel_validation(),
        }
    }
}

impl ModelConfig {
    /// Config with manual update mode.
    pub fn manual() -> Self {
        Self {
            auto_update: false,
            ..Default::default()
        }
    }

    /// The auto-update op set as a bitset.
    pub fn update_ops(&self) -> UpdateOps {
        self.default_update_ops.iter().copied().collect()
    }

    /// Parse a config from TOML text. `origin` names the source in errors.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Save the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
