//! Configuration file resolution and TOML loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PCMF_CONFIG`)
//! 3. Per-user config file (`<config_dir>/pcm-feeder/config.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing file never terminates startup unless it was named explicitly on
//! the command line; the loader logs a warning and falls back to defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PCMF_CONFIG";

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "pcm-feeder";

/// Logging section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level TOML config file
///
/// The `[feeder]` table is kept raw; the feeder crate deserializes and
/// validates it into its own settings type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub feeder: toml::Table,
}

impl TomlConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config file {}", path.display());
        Ok(config)
    }
}

/// Where a resolved config path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserConfig(PathBuf),
    Defaults,
}

/// Resolve the config file location without reading it
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file, only if it exists
    if let Some(path) = default_config_file() {
        if path.exists() {
            return ConfigSource::UserConfig(path);
        }
    }

    ConfigSource::Defaults
}

/// Load the config file following the resolution order
///
/// An explicit command-line path must exist. Any other missing file falls back
/// to defaults with a warning.
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        ConfigSource::CommandLine(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            TomlConfig::load(&path)
        }
        ConfigSource::Environment(path) | ConfigSource::UserConfig(path) => {
            if !path.exists() {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                return Ok(TomlConfig::default());
            }
            TomlConfig::load(&path)
        }
        ConfigSource::Defaults => {
            info!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Platform config file path (`~/.config/pcm-feeder/config.toml` on Linux)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.feeder.is_empty());
    }

    #[test]
    fn test_parse_logging_and_feeder_sections() {
        let config = TomlConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"

            [feeder]
            channels = 1
            buffer_kind = "fifo_queue"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.feeder.get("channels").and_then(|v| v.as_integer()), Some(1));
        assert_eq!(
            config.feeder.get("buffer_kind").and_then(|v| v.as_str()),
            Some("fifo_queue")
        );
    }

    #[test]
    fn test_parse_invalid_toml_is_error() {
        let result = TomlConfig::from_toml_str("[logging\nlevel = ");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_cli_arg_wins() {
        let source = resolve_config_path(Some(Path::new("/tmp/x.toml")), "PCMF_TEST_UNSET_VAR");
        assert_eq!(source, ConfigSource::CommandLine(PathBuf::from("/tmp/x.toml")));
    }
}
