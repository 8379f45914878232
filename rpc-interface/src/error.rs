use thiserror::Error;

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("Could not connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("Query {query} failed: {reason}")]
    Query { query: &'static str, reason: String },

    #[error("Signing was rejected: {0}")]
    SigningRejected(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Metadata service error: {0}")]
    Metadata(String),
}
