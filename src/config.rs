//! Configuration for schema filtering
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (filter.toml)
//! - Environment variables (SCHEMA_FILTER__*)
//!
//! ## Example config file (filter.toml):
//! ```toml
//! [filter]
//! serialize_dates_as_wire_values = true
//! max_depth = 16
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Options recognised by the filter engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Emit date leaves as epoch milliseconds instead of date values
    #[serde(default)]
    pub serialize_dates_as_wire_values: bool,

    /// Deepest sub-schema nesting accepted before the call fails
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    32
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            serialize_dates_as_wire_values: false,
            max_depth: default_max_depth(),
        }
    }
}

impl FilterOptions {
    /// Options with date wire serialization turned on
    pub fn wire() -> Self {
        Self {
            serialize_dates_as_wire_values: true,
            ..Self::default()
        }
    }
}

/// Environment variables override file settings as `SCHEMA_FILTER__<SECTION>__<KEY>`
const ENV_PREFIX: &str = "SCHEMA_FILTER";

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter engine options
    #[serde(default)]
    pub filter: FilterOptions,
}

impl FilterConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_layered(config_path, ENV_PREFIX)
    }

    fn load_layered(config_path: Option<&str>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["filter.toml", ".filter.toml", "config/filter.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        let project_dirs = directories::ProjectDirs::from("dev", "familiar", "schema-filter");
        if let Some(config_dir) = project_dirs {
            let xdg_config = config_dir.config_dir().join("filter.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
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
