pub mod chain;
pub mod error;
pub mod metadata;
pub mod signer;

pub use chain::{ChainClient, NodeProvider};
pub use error::{RpcError, RpcResult};
pub use metadata::MetadataService;
pub use signer::Signer;
