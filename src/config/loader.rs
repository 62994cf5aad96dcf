//! Layered configuration loading

use config::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::sources::{environment, user_file};
use super::FlowgateConfig;
use crate::error::ApiError;

/// Loads `FlowgateConfig` from defaults, the user file, an explicit file and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_file: Option<PathBuf>,
    file: Option<PathBuf>,
    environment: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_file: user_file::user_config_path(),
            file: None,
            environment: true,
        }
    }

    /// Skip the per-user config file
    pub fn without_user_file(mut self) -> Self {
        self.user_file = None;
        self
    }

    /// An explicit file layered over the user file; it must exist
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn without_environment(mut self) -> Self {
        self.environment = false;
        self
    }

    /// Load and validate
    pub fn load(&self) -> Result<FlowgateConfig, ApiError> {
        let mut builder = Config::builder();
        builder = user_file::add_to_builder(builder, self.user_file.as_deref())?;
        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ApiError::ConfigError(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        if self.environment {
            builder = environment::add_to_builder(builder)?;
        }

        let config: FlowgateConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        debug!(
            offload = config.offload.enabled,
            backend = ?config.storage.backend,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load a single file with no other layers
    pub fn load_from_file(path: &Path) -> Result<FlowgateConfig, ApiError> {
        ConfigLoader::new()
            .without_user_file()
            .without_environment()
            .with_file(path)
            .load()
    }
}
