//! Gateway configuration
//!
//! Read from a JSON file; every field is optional and falls back to the
//! value in [`GatewayConfig::default`].

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{DecodeOptions, FaultPolicy};
use crate::reader::virtual_tag::NTAG215_PAGES;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "JSONTAG_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// Name the virtual reader attaches with
    pub device_id: String,
    /// Page count of a newly created virtual tag
    pub tag_pages: usize,
    /// Directory for the tag image; None uses the store's default
    pub storage_dir: Option<PathBuf>,
    pub fault_policy: FaultPolicy,
    pub max_read_blocks: Option<usize>,
    /// Attach the virtual reader at startup
    pub attach_on_start: bool,
    /// Place a tag on the virtual reader at startup
    pub card_on_start: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            device_id: "virtual-ntag-reader".to_string(),
            tag_pages: NTAG215_PAGES,
            storage_dir: None,
            fault_policy: FaultPolicy::default(),
            max_read_blocks: None,
            attach_on_start: true,
            card_on_start: true,
        }
    }
}

impl GatewayConfig {
    /// Load from `path`, else from `$JSONTAG_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(p) => PathBuf::from(p),
                None => {
                    info!("No config file given, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Decode loop settings for reads
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            fault_policy: self.fault_policy,
            max_blocks: self.max_read_blocks,
        }
    }
}
