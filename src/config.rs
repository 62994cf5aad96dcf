//! Configuration System
//!
//! Layered configuration: built-in defaults, the user config file, an explicit file, then
//! `FLOWGATE__SECTION__KEY` environment variables. Validation reports every problem at once.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LoggingConfig;
use crate::source::Propagation;

mod loader;
mod sources;

pub use loader::ConfigLoader;
pub use sources::user_file::user_config_path;

/// Node mappings above this many encoded bytes are offloaded
pub const DEFAULT_MAX_INLINE_BYTES: usize = 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowgateConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub offload: OffloadConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workflow server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Namespace watched by the reflector cache; unset disables the cache
    #[serde(default)]
    pub namespace: Option<String>,

    /// Controller instance id stamped on and required of workflows
    #[serde(default)]
    pub instance_id: Option<String>,

    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,

    #[serde(default)]
    pub delete_propagation: Propagation,
}

fn default_resync_period_secs() -> u64 {
    20 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            instance_id: None,
            resync_period_secs: default_resync_period_secs(),
            delete_propagation: Propagation::default(),
        }
    }
}

impl ServerConfig {
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.resync_period_secs == 0 {
            return Err("resync_period_secs must be greater than zero".to_string());
        }
        if matches!(&self.namespace, Some(ns) if ns.trim().is_empty()) {
            return Err("namespace cannot be blank when set".to_string());
        }
        Ok(())
    }
}

/// Node status offloading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffloadConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: usize,

    /// Offload every non-empty node mapping regardless of size
    #[serde(default)]
    pub always_offload: bool,
}

fn default_max_inline_bytes() -> usize {
    DEFAULT_MAX_INLINE_BYTES
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_inline_bytes: default_max_inline_bytes(),
            always_offload: false,
        }
    }
}

impl OffloadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_inline_bytes == 0 {
            return Err("max_inline_bytes must be greater than zero".to_string());
        }
        if self.always_offload && !self.enabled {
            return Err("always_offload requires offload to be enabled".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Archive and offload records live in the state snapshot
    #[default]
    Memory,
    /// Archive and offload records live in a sled database
    Sled,
}

/// Where archive, offload and snapshot state is kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// sled database directory
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// JSON state snapshot used by the CLI
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.data_dir().join("flowgate"))
        .unwrap_or_else(|| PathBuf::from(".flowgate"))
}

fn default_store_path() -> PathBuf {
    data_dir().join("store")
}

fn default_state_file() -> PathBuf {
    data_dir().join("state.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_store_path(),
            state_file: default_state_file(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == StorageBackend::Sled && self.path.as_os_str().is_empty() {
            return Err("Store path cannot be empty with the sled backend".to_string());
        }
        if self.state_file.as_os_str().is_empty() {
            return Err("State file path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Server(String),
    Offload(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Server(msg) => write!(f, "Server: {}", msg),
            ValidationError::Offload(msg) => write!(f, "Offload: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl FlowgateConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if let Err(e) = self.server.validate() {
            errors.push(ValidationError::Server(e));
        }
        if let Err(e) = self.offload.validate() {
            errors.push(ValidationError::Offload(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = crate::logging::validate_config(&self.logging) {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
