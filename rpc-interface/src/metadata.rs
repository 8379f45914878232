use async_trait::async_trait;
use ballot_primitives::{
    delegate::Delegate,
    networks::Network,
    referendum::{ReferendumDetails, ReferendumIndex},
};

use crate::error::RpcResult;

/// Off-chain content about referenda and delegates. Strictly best-effort.
#[async_trait]
pub trait MetadataService: Send + Sync + 'static {
    async fn fetch_metadata(
        &self,
        network: Network,
        index: ReferendumIndex,
    ) -> RpcResult<ReferendumDetails>;

    async fn fetch_delegates(&self, network: Network) -> RpcResult<Vec<Delegate>>;
}
