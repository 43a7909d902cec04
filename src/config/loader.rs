//! Configuration Loader
//!
//! Layers defaults, an optional TOML file and `TASKER_BATCH__*` environment
//! variables through the `config` crate, then validates the result.

use super::BatchConfig;
use crate::constants::env as env_vars;
use crate::error::Result;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_overrides: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Load using `TASKER_BATCH_CONFIG_PATH` (if set) and the process environment
    pub fn load() -> Result<BatchConfig> {
        let file = env::var(env_vars::CONFIG_PATH).ok().map(PathBuf::from);
        Self {
            file,
            env_overrides: None,
        }
        .build()
    }

    /// Load from an explicit file plus the process environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<BatchConfig> {
        Self {
            file: Some(path.as_ref().to_path_buf()),
            env_overrides: None,
        }
        .build()
    }

    /// Load with an explicit environment map instead of the process environment.
    /// Useful in tests that must not touch global state.
    pub fn load_with_env(
        path: Option<&Path>,
        environment: HashMap<String, String>,
    ) -> Result<BatchConfig> {
        Self {
            file: path.map(Path::to_path_buf),
            env_overrides: Some(environment),
        }
        .build()
    }

    /// Current deployment environment name
    pub fn detect_environment() -> String {
        env::var(env_vars::ENVIRONMENT)
            .or_else(|_| env::var(env_vars::APP_ENVIRONMENT))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn build(self) -> Result<BatchConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&BatchConfig::default())?);

        if let Some(path) = &self.file {
            debug!(path = %path.display(), "Loading batch configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_vars::CONFIG_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(self.env_overrides),
        );

        let config: BatchConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            config = %config.sanitized_for_logging(),
            "Configuration loaded successfully"
        );
        info!(
            environment = %Self::detect_environment(),
            chunk_size = config.partition.default_chunk_size,
            max_attempts = config.retry.max_attempts,
            concurrency = config.worker.concurrency,
            "⚙️ Batch configuration loaded"
        );

        Ok(config)
    }
}
