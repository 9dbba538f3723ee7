//! User configuration, read from `~/.remap/config.toml`.

use anyhow::{Context, Result};
use remap_algo::Tolerances;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemapConfig {
    /// Check tolerances
    #[serde(default)]
    pub tolerances: Tolerances,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Run the checks concurrently on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
        }
    }
}

fn default_parallel() -> bool {
    true
}

impl RemapConfig {
    /// Configured level, if it names a valid tracing level.
    pub fn log_level(&self) -> Option<tracing::Level> {
        self.logging.level.parse().ok()
    }
}

/// Default config location, `~/.remap/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".remap").join("config.toml"))
}

/// Load the configuration.
///
/// An explicit path must exist. Without one, the default location is used
/// when present and built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<RemapConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(RemapConfig::default()),
        },
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: RemapConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config
        .tolerances
        .validate()
        .with_context(|| format!("invalid tolerances in {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_values() {
        let config = RemapConfig::default();
        assert_eq!(config.tolerances.consistency, 1e-8);
        assert_eq!(config.tolerances.conservation, 1e-8);
        assert_eq!(config.tolerances.monotonicity, 1e-12);
        assert_eq!(config.log_level(), Some(tracing::Level::INFO));
        assert!(config.validation.parallel);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[tolerances]\nconservation = 1e-6\n\n[validation]\nparallel = false\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.tolerances.conservation, 1e-6);
        assert_eq!(config.tolerances.consistency, 1e-8);
        assert_eq!(config.logging.level, "info");
        assert!(!config.validation.parallel);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn non_finite_or_negative_tolerance_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for line in ["consistency = nan", "conservation = -1e-6", "monotonicity = inf"] {
            std::fs::write(&path, format!("[tolerances]\n{line}\n")).unwrap();
            let err = load_config(Some(&path)).unwrap_err();
            assert!(format!("{err:#}").contains("invalid tolerances"), "{line}: {err:#}");
        }
    }

    #[test]
    fn invalid_level_is_ignored() {
        let mut config = RemapConfig::default();
        config.logging.level = "loud".to_string();
        assert_eq!(config.log_level(), None);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = RemapConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let restored: RemapConfig = toml::from_str(&text).unwrap();
        assert_eq!(restored, config);
    }
}
