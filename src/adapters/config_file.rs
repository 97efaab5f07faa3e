//! JSON configuration file adapter.
//!
//! Implements [`ConfigPort`] over a file on disk.  The document is parsed
//! and validated in one step; out-of-range values are rejected, never
//! clamped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            warn!("Config: cannot read {}: {e}", self.path.display());
            match e.kind() {
                ErrorKind::NotFound => ConfigError::NotFound,
                _ => ConfigError::IoError,
            }
        })?;
        let config = SystemConfig::from_json(&text)?;
        info!(
            "Config: loaded {} room(s) from {}",
            config.rooms.len(),
            self.path.display()
        );
        Ok(config)
    }
}
