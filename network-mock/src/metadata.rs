use std::sync::Arc;

use async_trait::async_trait;
use ballot_primitives::{
    delegate::Delegate,
    networks::Network,
    referendum::{ReferendumDetails, ReferendumIndex},
};
use ballot_rpc_interface::{MetadataService, RpcError, RpcResult};
use parking_lot::Mutex;

use crate::hub::MockHubInner;

#[derive(Clone, Debug)]
pub struct MockMetadataService {
    hub: Arc<Mutex<MockHubInner>>,
}

impl MockMetadataService {
    pub(crate) fn new(hub: Arc<Mutex<MockHubInner>>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl MetadataService for MockMetadataService {
    async fn fetch_metadata(
        &self,
        network: Network,
        index: ReferendumIndex,
    ) -> RpcResult<ReferendumDetails> {
        let mut hub = self.hub.lock();
        hub.metadata_requests.push((network, index));
        if hub.metadata_failing {
            return Err(RpcError::Metadata("service unavailable".to_owned()));
        }
        hub.metadata
            .get(&(network, index))
            .cloned()
            .ok_or_else(|| RpcError::Metadata(format!("no metadata for referendum {index}")))
    }

    async fn fetch_delegates(&self, network: Network) -> RpcResult<Vec<Delegate>> {
        let hub = self.hub.lock();
        if hub.metadata_failing {
            return Err(RpcError::Metadata("service unavailable".to_owned()));
        }
        Ok(hub.delegates.get(&network).cloned().unwrap_or_default())
    }
}
