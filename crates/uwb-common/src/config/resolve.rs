//! Configuration file discovery.
//!
//! Resolution order:
//! 1. Explicit path (callers pass it through from their own argument handling)
//! 2. `UWB_PIPELINE_CONFIG` environment variable (file path)
//! 3. `UWB_CONFIG_DIR` environment variable + `pipeline.toml`
//! 4. XDG config directory (`~/.config/uwb-pipeline/pipeline.toml`)
//! 5. System config (`/etc/uwb-pipeline/pipeline.toml`)
//! 6. Built-in defaults

use std::env;
use std::path::PathBuf;

use super::PipelineConfig;
use crate::error::{Error, Result};

const ENV_CONFIG_PATH: &str = "UWB_PIPELINE_CONFIG";
const ENV_CONFIG_DIR: &str = "UWB_CONFIG_DIR";
const CONFIG_FILENAME: &str = "pipeline.toml";
const APP_NAME: &str = "uwb-pipeline";

/// Where the configuration was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided by the caller.
    Explicit,
    /// Set via environment variable.
    Environment,
    /// Found in XDG config directory.
    XdgConfig,
    /// Found in /etc/uwb-pipeline/.
    SystemConfig,
    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit => write!(f, "explicit path"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A loaded configuration together with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    explicit: Option<PathBuf>,
    search_system: bool,
}

impl ConfigResolver {
    /// Resolver honoring an explicit path, then the standard search order.
    pub fn new(explicit: Option<PathBuf>) -> Self {
        ConfigResolver {
            explicit,
            search_system: true,
        }
    }

    /// Only consult the explicit path; otherwise use defaults.
    pub fn explicit_only(explicit: Option<PathBuf>) -> Self {
        ConfigResolver {
            explicit,
            search_system: false,
        }
    }

    /// Find the config file to load, if any.
    pub fn resolve_path(&self) -> Result<(Option<PathBuf>, ConfigSource)> {
        // 1. Explicit path: missing file is an error, not a fallthrough
        if let Some(ref path) = self.explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok((Some(path.clone()), ConfigSource::Explicit));
        }

        if !self.search_system {
            return Ok((None, ConfigSource::BuiltinDefault));
        }

        // 2. Environment variable (direct path)
        if let Ok(env_path) = env::var(ENV_CONFIG_PATH) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Ok((Some(path), ConfigSource::Environment));
            }
        }

        // 3. Environment variable (config dir)
        if let Ok(config_dir) = env::var(ENV_CONFIG_DIR) {
            let path = PathBuf::from(config_dir).join(CONFIG_FILENAME);
            if path.exists() {
                return Ok((Some(path), ConfigSource::Environment));
            }
        }

        // 4. XDG config directory
        if let Some(xdg_config) = dirs::config_dir() {
            let path = xdg_config.join(APP_NAME).join(CONFIG_FILENAME);
            if path.exists() {
                return Ok((Some(path), ConfigSource::XdgConfig));
            }
        }

        // 5. System config
        let system_path = PathBuf::from("/etc").join(APP_NAME).join(CONFIG_FILENAME);
        if system_path.exists() {
            return Ok((Some(system_path), ConfigSource::SystemConfig));
        }

        Ok((None, ConfigSource::BuiltinDefault))
    }

    /// Resolve and load the configuration.
    pub fn load(&self) -> Result<LoadedConfig> {
        let (path, source) = self.resolve_path()?;
        let config = match path {
            Some(ref p) => PipelineConfig::from_file(p)?,
            None => PipelineConfig::default(),
        };
        Ok(LoadedConfig {
            config,
            source,
            path,
        })
    }
}
