//! Configuration for the command-line validator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (modelforge.toml)
//! - Environment variables (MODELFORGE_*)
//!
//! ## Example config file (modelforge.toml):
//! ```toml
//! [validator]
//! reference = "./published/PowerModel.json"
//!
//! [output]
//! format = "pretty"
//! include_checksum = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the validator CLI
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Validator settings
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Validator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidatorConfig {
    /// Reference schema record used for extension validation when
    /// `--reference` is not given on the command line
    #[serde(default)]
    pub reference: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format (pretty or compact)
    #[serde(default)]
    pub format: OutputFormat,

    /// Include the materialized schema checksum in validation reports
    #[serde(default = "default_true")]
    pub include_checksum: bool,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pretty,
            include_checksum: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["modelforge.toml", ".modelforge.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("MODELFORGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validator.reference.is_none());
        assert!(config.output.include_checksum);
    }

    #[test]
    fn test_serialize_config() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[validator]"));
        assert!(toml_str.contains("[output]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelforge.toml");
        std::fs::write(
            &path,
            "[validator]\nreference = \"published.json\"\n\n[output]\nformat = \"compact\"\n",
        )
        .unwrap();

        let config = EngineConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(
            config.validator.reference,
            Some(PathBuf::from("published.json"))
        );
        assert!(matches!(config.output.format, OutputFormat::Compact));
    }
}
