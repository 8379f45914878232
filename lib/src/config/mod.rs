use std::{collections::HashMap, path::PathBuf, time::Duration};

use ballot_database::Environment;
use ballot_network::ConnectionConfig;
use ballot_primitives::networks::Network;

use crate::{
    config::config_file::{ConfigFile, LogSettings},
    error::ConfigError,
};

pub mod config_file;
mod serialization;

/// Where the endpoints of a network come from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub default: Option<Network>,
    pub endpoints: HashMap<Network, Vec<String>>,
}

impl NetworkConfig {
    /// Configured endpoints of `network`, or its public ones.
    pub fn endpoints(&self, network: Network) -> Vec<String> {
        match self.endpoints.get(&network) {
            Some(endpoints) if !endpoints.is_empty() => endpoints.clone(),
            _ => network
                .default_endpoints()
                .iter()
                .map(|endpoint| endpoint.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DatabaseConfig {
    #[default]
    Volatile,
    Persistent(PathBuf),
}

impl DatabaseConfig {
    pub fn environment(&self) -> Environment {
        match self {
            DatabaseConfig::Volatile => Environment::volatile(),
            DatabaseConfig::Persistent(path) => Environment::persistent(path),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// How long `start` waits for the first transport before reporting.
    pub connect_timeout: Duration,
    /// Bound of a full chain state fetch.
    pub chain_query_timeout: Duration,
    /// Bound between two status updates of a submitted transaction.
    pub submission_timeout: Duration,
    pub metadata_timeout: Duration,
    /// Referendum metadata fetched concurrently at most.
    pub metadata_concurrency: usize,
    /// Number of dispatched actions kept in the history.
    pub history_size: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(8),
            chain_query_timeout: Duration::from_secs(30),
            submission_timeout: Duration::from_secs(60),
            metadata_timeout: Duration::from_secs(10),
            metadata_concurrency: 4,
            history_size: 256,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    pub connection: ConnectionConfig,
    pub database: DatabaseConfig,
    pub updater: UpdaterConfig,
    pub log: LogSettings,
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

impl ClientConfig {
    /// Applies the settings of a config file on top of the defaults.
    pub fn from_config_file(config_file: &ConfigFile) -> Result<Self, ConfigError> {
        let endpoints = config_file
            .network
            .endpoints
            .iter()
            .map(|(network, endpoints)| Ok((network.parse()?, endpoints.clone())))
            .collect::<Result<HashMap<Network, Vec<String>>, ConfigError>>()?;
        let network = NetworkConfig {
            default: config_file.network.default,
            endpoints,
        };

        let settings = &config_file.connection;
        let defaults = ConnectionConfig::default();
        let connection = ConnectionConfig {
            retry_delay: millis(settings.retry_delay_ms, defaults.retry_delay),
            request_timeout: millis(settings.request_timeout_ms, defaults.request_timeout),
            liveness_interval: millis(settings.liveness_interval_ms, defaults.liveness_interval),
            max_stalled_checks: settings
                .max_stalled_checks
                .unwrap_or(defaults.max_stalled_checks),
            max_connect_rounds: match settings.max_connect_rounds {
                Some(0) => None,
                Some(rounds) => Some(rounds),
                None => defaults.max_connect_rounds,
            },
        };

        let database = match &config_file.database {
            settings if settings.volatile => DatabaseConfig::Volatile,
            settings => settings
                .path
                .as_ref()
                .map(|path| DatabaseConfig::Persistent(PathBuf::from(path)))
                .unwrap_or_default(),
        };

        let settings = &config_file.updater;
        let defaults = UpdaterConfig::default();
        let updater = UpdaterConfig {
            connect_timeout: millis(settings.connect_timeout_ms, defaults.connect_timeout),
            chain_query_timeout: millis(
                settings.chain_query_timeout_ms,
                defaults.chain_query_timeout,
            ),
            submission_timeout: millis(settings.submission_timeout_ms, defaults.submission_timeout),
            metadata_timeout: millis(settings.metadata_timeout_ms, defaults.metadata_timeout),
            metadata_concurrency: settings
                .metadata_concurrency
                .unwrap_or(defaults.metadata_concurrency)
                .max(1),
            history_size: settings.history_size.unwrap_or(defaults.history_size),
        };

        Ok(ClientConfig {
            network,
            connection,
            database,
            updater,
            log: config_file.log.clone(),
        })
    }
}
