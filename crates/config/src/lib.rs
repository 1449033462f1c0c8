#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for sprig
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/sprig/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

pub mod constants;
pub mod core;
pub mod resources_semaphore;

pub use core::{ColorChoice, GeneralConfig, InstallConfig, PathConfig, ResolverConfig};

use serde::{Deserialize, Serialize};
use sprig_errors::{ConfigError, Error};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub resolver: ResolverConfig,
    pub install: InstallConfig,
    pub paths: PathConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("sprig").join(constants::CONFIG_FILE))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`Config`].
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if fs::try_exists(&config_path).await.unwrap_or(false) {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with process environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Merge overrides from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// See [`Config::merge_env`].
    pub fn merge_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), Error> {
        if let Some(jobs) = lookup("SPRIG_JOBS") {
            self.general.jobs = parse_number("SPRIG_JOBS", jobs)?;
        }

        if let Some(color) = lookup("SPRIG_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SPRIG_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        if let Some(root) = lookup("SPRIG_ROOT") {
            self.install.root = Some(PathBuf::from(root));
        }

        if let Some(recipes) = lookup("SPRIG_RECIPES") {
            self.paths.recipes = Some(PathBuf::from(recipes));
        }

        if let Some(parallel) = lookup("SPRIG_MAX_PARALLELISM") {
            self.install.max_parallelism = parse_number("SPRIG_MAX_PARALLELISM", parallel)?;
        }

        if let Some(timeout) = lookup("SPRIG_LOCK_TIMEOUT") {
            self.install.lock_timeout_secs = parse_number("SPRIG_LOCK_TIMEOUT", timeout)?;
        }

        Ok(())
    }

    /// Install root (with default)
    #[must_use]
    pub fn install_root(&self) -> PathBuf {
        self.install.root.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(
                || PathBuf::from(constants::FALLBACK_ROOT),
                |d| d.join("sprig"),
            )
        })
    }

    /// Recipe directory (with default)
    #[must_use]
    pub fn recipes_path(&self) -> PathBuf {
        self.paths
            .recipes
            .clone()
            .unwrap_or_else(|| self.install_root().join("recipes"))
    }

    /// Recipe index cache directory (with default)
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.paths.cache.clone().unwrap_or_else(|| {
            dirs::cache_dir().map_or_else(
                || self.install_root().join(constants::META_DIR).join("cache"),
                |d| d.join("sprig"),
            )
        })
    }

    /// Source mirror directory (with default)
    #[must_use]
    pub fn mirror_path(&self) -> PathBuf {
        self.paths
            .mirror
            .clone()
            .unwrap_or_else(|| self.install_root().join("mirror"))
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.install.lock_timeout_secs)
    }

    /// Concurrent builds to run
    #[must_use]
    pub fn max_parallelism(&self) -> usize {
        if self.install.max_parallelism > 0 {
            self.install.max_parallelism
        } else {
            (num_cpus::get() / 4).max(1)
        }
    }

    /// Parallel jobs per build
    #[must_use]
    pub fn build_jobs(&self) -> usize {
        calculate_build_jobs(self.general.jobs)
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}

/// Calculate build jobs based on CPU count
#[must_use]
pub fn calculate_build_jobs(config_value: usize) -> usize {
    if config_value > 0 {
        config_value // User override
    } else {
        // Use 75% of CPUs for builds, minimum 1
        let cpus = num_cpus::get();
        (cpus * 3 / 4).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SPRIG_JOBS", "8"),
            ("SPRIG_ROOT", "/tmp/sprig-root"),
            ("SPRIG_LOCK_TIMEOUT", "5"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .merge_env_from(|k| vars.get(k).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.general.jobs, 8);
        assert_eq!(config.build_jobs(), 8);
        assert_eq!(config.install_root(), PathBuf::from("/tmp/sprig-root"));
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.recipes_path(),
            PathBuf::from("/tmp/sprig-root/recipes")
        );
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config
            .merge_env_from(|k| (k == "SPRIG_MAX_PARALLELISM").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { ref field, .. }) if field == "SPRIG_MAX_PARALLELISM"
        ));
    }

    #[test]
    fn test_auto_detect_never_zero() {
        assert!(calculate_build_jobs(0) >= 1);
        assert!(Config::default().max_parallelism() >= 1);
    }
}
