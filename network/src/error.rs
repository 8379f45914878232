use std::time::Duration;

use ballot_rpc_interface::RpcError;
use thiserror::Error;

use crate::endpoint::EndpointError;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}
