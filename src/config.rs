//! Configuration persistence for jwai settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::drawing::RecordTypes;

const CONFIG_FILE: &str = ".jwai_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory shared with Jw_cad; every marker lives here
    pub work_dir: PathBuf,
    /// Watcher tick interval
    pub poll_interval_ms: u64,
    /// How long `jwai hook` waits for the assistant before giving up
    pub hook_timeout_secs: u64,
    /// Program (and arguments) that answers completion requests. Empty means
    /// the built-in offline responder.
    pub completion_command: Vec<String>,
    /// The `.jww` drawing the selection came from, for whole-drawing context
    pub drawing: Option<PathBuf>,
    pub record_types: RecordTypes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            poll_interval_ms: 1000,
            hook_timeout_secs: 600,
            completion_command: Vec::new(),
            drawing: None,
            record_types: RecordTypes::default(),
        }
    }
}

#[cfg(windows)]
fn default_work_dir() -> PathBuf {
    PathBuf::from(r"C:\JWW")
}

#[cfg(not(windows))]
fn default_work_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("jwai")
}

impl Config {
    /// `~/.jwai_config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE))
    }

    /// Load configuration from the default location, or return defaults
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("No home directory, using default configuration");
                Self::default()
            }
        }
    }

    /// Load configuration from `path`; a missing or broken file yields defaults
    pub fn load_from(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                log::warn!("Could not read {}: {}, using defaults", path.display(), err);
                return Self::default();
            }
        };
        match serde_json::from_str(&json) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Error loading config, using defaults: {}", err);
                Self::default()
            }
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) {
        let json = match serde_json::to_vec_pretty(self) {
            Ok(json) => json,
            Err(err) => {
                log::error!("Failed to serialize config: {}", err);
                return;
            }
        };
        if let Err(err) = crate::fsio::replace_contents(path, &json) {
            log::error!("Failed to save config to {}: {}", path.display(), err);
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) {
        match Self::default_path() {
            Some(path) => self.save_to(&path),
            None => log::error!("No home directory, config not saved"),
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(50))
    }

    pub fn hook_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.hook_timeout_secs)
    }
}
