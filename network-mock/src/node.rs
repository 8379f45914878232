use std::{
    collections::BTreeMap,
    future::ready,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use ballot_primitives::{
    chain::{ChainProperties, Rank, Votings},
    referendum::{Referendum, ReferendumIndex},
    track::{Track, TrackId},
    transaction::{SignedTransaction, TransactionStatus},
    AccountId, Balance, BlockNumber,
};
use ballot_rpc_interface::{ChainClient, NodeProvider, RpcError, RpcResult};
use futures::{
    future::BoxFuture,
    stream::{self, BoxStream},
    FutureExt, StreamExt,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;

use crate::hub::MockHubInner;

/// Bytes a client "receives" per answered query.
const QUERY_BYTES: u64 = 64;

#[derive(Clone, Debug)]
pub struct MockProvider {
    hub: Arc<Mutex<MockHubInner>>,
}

impl MockProvider {
    pub(crate) fn new(hub: Arc<Mutex<MockHubInner>>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl NodeProvider for MockProvider {
    async fn connect(&self, endpoint: &str) -> RpcResult<Arc<dyn ChainClient>> {
        let mut hub = self.hub.lock();
        if hub.unreachable.contains(endpoint) {
            return Err(RpcError::Connect {
                endpoint: endpoint.to_owned(),
                reason: "unreachable".to_owned(),
            });
        }
        *hub.connects.entry(endpoint.to_owned()).or_default() += 1;

        let client = Arc::new(ClientInner {
            endpoint: endpoint.to_owned(),
            hub: Arc::clone(&self.hub),
            bytes: AtomicU64::new(0),
            stalled: AtomicBool::new(false),
            blocks: broadcast::channel(16).0,
            closed: watch::channel(None).0,
        });
        hub.clients.push(Arc::downgrade(&client));
        log::debug!(endpoint, "Mock client connected");

        Ok(Arc::new(MockClient { inner: client }))
    }
}

#[derive(Debug)]
pub(crate) struct ClientInner {
    endpoint: String,
    hub: Arc<Mutex<MockHubInner>>,
    pub bytes: AtomicU64,
    pub stalled: AtomicBool,
    pub blocks: broadcast::Sender<BlockNumber>,
    closed: watch::Sender<Option<RpcError>>,
}

impl ClientInner {
    pub fn is_closed(&self) -> bool {
        self.closed.borrow().is_some()
    }

    pub fn close_with(&self, reason: RpcError) {
        self.closed.send_if_modified(|closed| {
            if closed.is_some() {
                return false;
            }
            *closed = Some(reason);
            true
        });
    }
}

pub struct MockClient {
    inner: Arc<ClientInner>,
}

impl MockClient {
    fn closed_future(&self) -> BoxFuture<'static, RpcError> {
        let mut closed = self.inner.closed.subscribe();
        async move {
            let reason = match closed.wait_for(Option::is_some).await {
                Ok(reason) => reason.clone(),
                Err(_) => None,
            };
            reason.unwrap_or_else(|| RpcError::TransportClosed("client dropped".to_owned()))
        }
        .boxed()
    }

    async fn query<R>(
        &self,
        query: &'static str,
        f: impl FnOnce(&MockHubInner) -> R,
    ) -> RpcResult<R> {
        if self.inner.is_closed() {
            return Err(RpcError::TransportClosed(self.inner.endpoint.clone()));
        }
        let delay = self.inner.hub.lock().query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let hub = self.inner.hub.lock();
        if hub.failing_queries {
            return Err(RpcError::Query {
                query,
                reason: "mock failure".to_owned(),
            });
        }
        if !self.inner.stalled.load(Ordering::Acquire) {
            self.inner.bytes.fetch_add(QUERY_BYTES, Ordering::AcqRel);
        }
        Ok(f(&hub))
    }
}

#[async_trait]
impl ChainClient for MockClient {
    fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    async fn query_tracks(&self) -> RpcResult<BTreeMap<TrackId, Track>> {
        self.query("tracks", |hub| hub.chain.tracks.clone()).await
    }

    async fn query_referenda(&self) -> RpcResult<BTreeMap<ReferendumIndex, Referendum>> {
        self.query("referenda", |hub| hub.chain.referenda.clone())
            .await
    }

    async fn query_fellows(&self) -> RpcResult<BTreeMap<AccountId, Rank>> {
        self.query("fellows", |hub| hub.chain.fellows.clone()).await
    }

    async fn query_properties(&self) -> RpcResult<ChainProperties> {
        self.query("properties", |hub| hub.chain.properties.clone())
            .await
    }

    async fn query_account_votings(&self, address: &AccountId) -> RpcResult<Votings> {
        self.query("votings", |hub| {
            hub.votings.get(address).cloned().unwrap_or_default()
        })
        .await
    }

    async fn query_balance(&self, address: &AccountId) -> RpcResult<Balance> {
        self.query("balance", |hub| {
            hub.balances.get(address).copied().unwrap_or_default()
        })
        .await
    }

    fn subscribe_new_blocks(&self) -> BoxStream<'static, BlockNumber> {
        BroadcastStream::new(self.inner.blocks.subscribe())
            .filter_map(|block| ready(block.ok()))
            .take_until(self.closed_future())
            .boxed()
    }

    async fn submit(
        &self,
        transaction: SignedTransaction,
    ) -> RpcResult<BoxStream<'static, TransactionStatus>> {
        if self.inner.is_closed() {
            return Err(RpcError::TransportClosed(self.inner.endpoint.clone()));
        }
        let mut hub = self.inner.hub.lock();
        hub.submitted.push(transaction);
        let statuses = if hub.submission.is_empty() {
            let block = hub.block_number + 1;
            vec![
                TransactionStatus::Broadcast,
                TransactionStatus::InBlock(block),
                TransactionStatus::Finalized(block),
            ]
        } else {
            hub.submission.clone()
        };
        Ok(stream::iter(statuses).boxed())
    }

    fn bytes_received(&self) -> u64 {
        self.inner.bytes.load(Ordering::Acquire)
    }

    fn closed(&self) -> BoxFuture<'static, RpcError> {
        self.closed_future()
    }

    async fn close(&self) {
        log::debug!(endpoint = self.inner.endpoint, "Mock client closed");
        self.inner
            .close_with(RpcError::TransportClosed("closed by client".to_owned()));
    }
}
