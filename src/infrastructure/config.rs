use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::config::ReplugConfig;
use crate::domain::error::{ReplugError, ReplugResult};

/// Configuration manager
///
/// Layers the global file under a project file found by walking up the
/// directory tree; later layers replace earlier ones wholesale, and
/// serde defaults fill whatever neither file sets.
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> ReplugResult<Self> {
        let global_config_path = Self::global_config_path()?;
        let project_config_path = Self::find_project_config_path();

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Load configuration from files
    pub fn load_config(&self) -> ReplugResult<ReplugConfig> {
        let mut config = ReplugConfig::default();

        if self.global_config_path.exists() {
            config = self.load_config_from_path(&self.global_config_path)?;
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                config = self.load_config_from_path(project_path)?;
            }
        }

        Ok(config)
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> ReplugResult<ReplugConfig> {
        let content = fs::read_to_string(path).map_err(|e| ReplugError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| ReplugError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &ReplugConfig) -> ReplugResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| ReplugError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ReplugError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        fs::write(path, content).map_err(|e| ReplugError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Get global configuration path
    fn global_config_path() -> ReplugResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| ReplugError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("replug").join("config.toml"))
    }

    /// Find project configuration path by walking up the directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(".replug").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }
}
