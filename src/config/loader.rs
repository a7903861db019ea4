//! Configuration Loader
//!
//! Environment-aware loading of [`DispatchConfig`]. Sources are layered, later
//! ones winning:
//!
//! 1. built-in defaults
//! 2. `<dir>/dispatch.toml`
//! 3. `<dir>/dispatch.<environment>.toml`
//! 4. `DISPATCH__*` environment variables (`DISPATCH__SIGNALING__SIGNAL_TIMEOUT_MS=500`)
//!
//! Missing files are skipped; the result is validated before it is returned.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use config::{Config, Environment, File};
use tracing::{debug, info, warn};

use super::DispatchConfig;
use crate::constants::{ENV_NAME_VAR, ENV_PREFIX, ENV_SEPARATOR};
use crate::error::{DispatchError, DispatchResult};

const BASE_FILE_STEM: &str = "dispatch";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: DispatchConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> DispatchResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> DispatchResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> DispatchResult<Arc<ConfigManager>> {
        Self::build(config_dir, environment, None)
    }

    /// Load a single configuration file, still honoring `DISPATCH__*` overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> DispatchResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DispatchError::ConfigLoad {
                message: format!("configuration file not found: {}", path.display()),
            });
        }

        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(Self::environment_source(None))
            .build()?
            .try_deserialize::<DispatchConfig>()?;
        config.validate()?;

        debug!("Configuration loaded from file: {}", path.display());

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }))
    }

    fn build(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_overrides: Option<HashMap<String, String>>,
    ) -> DispatchResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment, env_overrides)?;
        config.validate()?;

        info!(
            environment = environment,
            concurrency_limit = config.concurrency_limit,
            execution_mode = %config.execution_mode,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from `DISPATCH_ENV`, defaulting to development
    fn detect_environment() -> String {
        env::var(ENV_NAME_VAR)
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `./config`, or the crate's `config/` when running under cargo
    fn default_config_directory() -> PathBuf {
        let local = PathBuf::from("config");
        if local.is_dir() {
            return local;
        }

        if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
            let candidate = PathBuf::from(manifest_dir).join("config");
            if candidate.is_dir() {
                debug!("Found config directory: {}", candidate.display());
                return candidate;
            }
        }

        local
    }

    /// Candidate files in precedence order, lowest first
    fn config_files(config_directory: &Path, environment: &str) -> Vec<PathBuf> {
        vec![
            config_directory.join(format!("{BASE_FILE_STEM}.toml")),
            config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml")),
        ]
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        env_overrides: Option<HashMap<String, String>>,
    ) -> DispatchResult<DispatchConfig> {
        let mut builder = Config::builder();

        for path in Self::config_files(config_directory, environment) {
            if path.exists() {
                debug!("Merging configuration file: {}", path.display());
            }
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        let config = builder
            .add_source(Self::environment_source(env_overrides))
            .build()?
            .try_deserialize::<DispatchConfig>()?;

        Ok(config)
    }

    /// `DISPATCH__*` variables, or a fixed map in place of the process environment
    fn environment_source(overrides: Option<HashMap<String, String>>) -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(overrides)
    }
}

static GLOBAL_CONFIG: OnceLock<Arc<ConfigManager>> = OnceLock::new();

impl ConfigManager {
    /// Process-wide configuration; falls back to defaults when loading fails
    pub fn global() -> Arc<ConfigManager> {
        GLOBAL_CONFIG
            .get_or_init(|| {
                ConfigManager::load().unwrap_or_else(|e| {
                    warn!("Configuration loading failed, using defaults: {e}");
                    Arc::new(ConfigManager {
                        config: DispatchConfig::default(),
                        environment: Self::detect_environment(),
                        config_directory: Self::default_config_directory(),
                    })
                })
            })
            .clone()
    }
}
