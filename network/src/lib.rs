pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionEvent, ConnectionStats, ConnectionStatus};
pub use endpoint::{validate_endpoints, EndpointError, InvalidEndpoint};
pub use error::ConnectionError;
