//! Sync configuration file.
//!
//! ```json
//! {
//!   "engine": { "store_page_size": 500, "route_policy": "always" },
//!   "targets": [
//!     { "vendor": "aws", "account_id": "acc-1", "scope": { "region": "us-east-1" } }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::model::SyncRequest;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub targets: Vec<SyncRequest>,
}

impl SyncConfig {
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: SyncConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.store_page_size == 0 {
            return Err(ConfigError::Invalid(
                "engine.store_page_size must be positive".to_string(),
            ));
        }
        for (i, target) in self.targets.iter().enumerate() {
            target
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("targets[{}]: {}", i, e)))?;
        }
        Ok(())
    }
}
