use std::{io, sync::Arc, time::Duration};

use ballot_database::DatabaseError;
use ballot_network::ConnectionError;
use ballot_primitives::networks::NetworkParseError;
use ballot_rpc_interface::RpcError;
use thiserror::Error;

use crate::location::LocationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config file parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Network(#[from] NetworkParseError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

/// Failure of an updater operation. The same failure is also added to the reports.
#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("No network has been selected yet")]
    NotRestored,

    #[error("Not connected to a node")]
    NotConnected,

    #[error("There are no votes to submit")]
    NoVotes,

    #[error("All selected tracks are delegated already")]
    AlreadyDelegated,

    #[error("None of the selected tracks is delegated")]
    NotDelegated,

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Storage error: {0}")]
    Database(#[source] Arc<DatabaseError>),
}

impl From<DatabaseError> for UpdaterError {
    fn from(error: DatabaseError) -> Self {
        UpdaterError::Database(Arc::new(error))
    }
}

impl From<Arc<DatabaseError>> for UpdaterError {
    fn from(error: Arc<DatabaseError>) -> Self {
        UpdaterError::Database(error)
    }
}

impl From<Arc<ConnectionError>> for UpdaterError {
    fn from(error: Arc<ConnectionError>) -> Self {
        UpdaterError::Connection(ConnectionError::clone(&error))
    }
}
