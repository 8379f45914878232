use std::{collections::HashMap, fs::read_to_string, path::Path, str::FromStr};

use ballot_primitives::networks::Network;
use log::level_filters::LevelFilter;
use serde::Deserialize;

use crate::{
    config::serialization::{deserialize_string_option, deserialize_tags},
    error::ConfigError,
};

/// The TOML configuration file. Every section and every setting is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub updater: UpdaterSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl FromStr for ConfigFile {
    type Err = ConfigError;

    fn from_str(config: &str) -> Result<ConfigFile, ConfigError> {
        Ok(toml::from_str(config)?)
    }
}

impl ConfigFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ConfigFile, ConfigError> {
        read_to_string(path)?.parse()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct NetworkSettings {
    /// Network used when neither the location nor the settings store names one.
    #[serde(default, deserialize_with = "deserialize_string_option")]
    pub default: Option<Network>,
    /// Endpoint overrides by network name.
    #[serde(default)]
    pub endpoints: HashMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ConnectionSettings {
    pub retry_delay_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub liveness_interval_ms: Option<u64>,
    pub max_stalled_checks: Option<usize>,
    /// `0` retries forever.
    pub max_connect_rounds: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    /// Directory of the SQLite files. Without it, nothing is persisted.
    pub path: Option<String>,
    #[serde(default)]
    pub volatile: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct UpdaterSettings {
    pub connect_timeout_ms: Option<u64>,
    pub chain_query_timeout_ms: Option<u64>,
    pub submission_timeout_ms: Option<u64>,
    pub metadata_timeout_ms: Option<u64>,
    pub metadata_concurrency: Option<usize>,
    pub history_size: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    #[serde(default, deserialize_with = "deserialize_string_option")]
    pub level: Option<LevelFilter>,
    #[serde(default = "LogSettings::default_timestamps")]
    pub timestamps: bool,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: HashMap<String, LevelFilter>,
}

impl LogSettings {
    fn default_timestamps() -> bool {
        true
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: None,
            timestamps: true,
            tags: HashMap::new(),
        }
    }
}
