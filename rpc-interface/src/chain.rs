use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use ballot_primitives::{
    chain::{ChainProperties, Rank, Votings},
    referendum::{Referendum, ReferendumIndex},
    track::{Track, TrackId},
    transaction::{SignedTransaction, TransactionStatus},
    AccountId, Balance, BlockNumber,
};
use futures::{future::BoxFuture, stream::BoxStream};

use crate::error::{RpcError, RpcResult};

/// Opens transport connections to a node.
#[async_trait]
pub trait NodeProvider: Send + Sync + 'static {
    /// Opens a connection to a single endpoint.
    async fn connect(&self, endpoint: &str) -> RpcResult<Arc<dyn ChainClient>>;
}

/// An open transport to one node endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    fn endpoint(&self) -> &str;

    async fn query_tracks(&self) -> RpcResult<BTreeMap<TrackId, Track>>;

    async fn query_referenda(&self) -> RpcResult<BTreeMap<ReferendumIndex, Referendum>>;

    async fn query_fellows(&self) -> RpcResult<BTreeMap<AccountId, Rank>>;

    async fn query_properties(&self) -> RpcResult<ChainProperties>;

    async fn query_account_votings(&self, address: &AccountId) -> RpcResult<Votings>;

    async fn query_balance(&self, address: &AccountId) -> RpcResult<Balance>;

    /// Stream of finalized block numbers. Ends when the transport closes.
    fn subscribe_new_blocks(&self) -> BoxStream<'static, BlockNumber>;

    /// Submits a signed transaction and follows its progress until a final status.
    async fn submit(
        &self,
        transaction: SignedTransaction,
    ) -> RpcResult<BoxStream<'static, TransactionStatus>>;

    /// Total number of bytes received on this transport.
    fn bytes_received(&self) -> u64;

    /// Resolves with the reason once the transport closed on its own.
    fn closed(&self) -> BoxFuture<'static, RpcError>;

    /// Closes the transport. Closing twice is a no-op.
    async fn close(&self);
}
