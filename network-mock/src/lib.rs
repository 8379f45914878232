mod hub;
mod metadata;
mod node;
mod signer;

pub use hub::MockHub;
pub use metadata::MockMetadataService;
pub use node::{MockClient, MockProvider};
pub use signer::MockSigner;
