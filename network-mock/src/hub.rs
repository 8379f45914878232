use std::{
    collections::{HashMap, HashSet},
    sync::{atomic::Ordering, Arc, Weak},
    time::Duration,
};

use ballot_primitives::{
    chain::{ChainState, Votings},
    delegate::Delegate,
    networks::Network,
    referendum::{Referendum, ReferendumDetails, ReferendumIndex},
    transaction::{SignedTransaction, TransactionStatus},
    AccountId, Balance, BlockNumber,
};
use ballot_rpc_interface::RpcError;
use parking_lot::Mutex;

use crate::{
    metadata::MockMetadataService,
    node::{ClientInner, MockProvider},
    signer::MockSigner,
};

/// Bytes a client "receives" per delivered block.
pub(crate) const BLOCK_BYTES: u64 = 256;

#[derive(Debug, Default)]
pub(crate) struct MockHubInner {
    pub chain: ChainState,
    pub balances: HashMap<AccountId, Balance>,
    pub votings: HashMap<AccountId, Votings>,
    pub block_number: BlockNumber,

    /// Clients handed out by providers of this hub.
    pub clients: Vec<Weak<ClientInner>>,
    pub unreachable: HashSet<String>,
    pub connects: HashMap<String, usize>,

    pub query_delay: Option<Duration>,
    pub failing_queries: bool,

    /// Statuses replayed for every submission. Empty means broadcast, in block, finalized.
    pub submission: Vec<TransactionStatus>,
    pub submitted: Vec<SignedTransaction>,

    pub metadata: HashMap<(Network, ReferendumIndex), ReferendumDetails>,
    pub delegates: HashMap<Network, Vec<Delegate>>,
    pub metadata_failing: bool,
    pub metadata_requests: Vec<(Network, ReferendumIndex)>,
}

impl MockHubInner {
    fn live_clients(&mut self) -> Vec<Arc<ClientInner>> {
        self.clients.retain(|client| client.strong_count() > 0);
        self.clients
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|client| !client.is_closed())
            .collect()
    }
}

/// Shared in-memory chain that mock providers connect to.
///
/// Tests drive the chain (new blocks, referendum changes, dropped or stalled
/// transports) through the hub while the code under test talks to it through the
/// collaborator traits.
#[derive(Clone, Debug, Default)]
pub struct MockHub {
    pub(crate) inner: Arc<Mutex<MockHubInner>>,
}

impl MockHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self) -> MockProvider {
        MockProvider::new(Arc::clone(&self.inner))
    }

    pub fn metadata_service(&self) -> MockMetadataService {
        MockMetadataService::new(Arc::clone(&self.inner))
    }

    pub fn signer(&self, account: AccountId) -> MockSigner {
        MockSigner::new(account)
    }

    pub fn set_chain_state(&self, chain: ChainState) {
        self.inner.lock().chain = chain;
    }

    pub fn set_referendum(&self, index: ReferendumIndex, referendum: Referendum) {
        self.inner.lock().chain.referenda.insert(index, referendum);
    }

    pub fn set_account(&self, address: AccountId, balance: Balance, votings: Votings) {
        let mut inner = self.inner.lock();
        inner.balances.insert(address.clone(), balance);
        inner.votings.insert(address, votings);
    }

    pub fn block_number(&self) -> BlockNumber {
        self.inner.lock().block_number
    }

    /// Finalizes a new block and announces it to all open, non-stalled clients.
    pub fn produce_block(&self) -> BlockNumber {
        let (number, clients) = {
            let mut inner = self.inner.lock();
            inner.block_number += 1;
            (inner.block_number, inner.live_clients())
        };
        log::debug!(number, clients = clients.len(), "Mock block");
        for client in clients {
            if client.stalled.load(Ordering::Acquire) {
                continue;
            }
            client.bytes.fetch_add(BLOCK_BYTES, Ordering::AcqRel);
            // Nobody subscribed yet is fine.
            let _ = client.blocks.send(number);
        }
        number
    }

    pub fn set_unreachable(&self, endpoint: &str, unreachable: bool) {
        let mut inner = self.inner.lock();
        if unreachable {
            inner.unreachable.insert(endpoint.to_owned());
        } else {
            inner.unreachable.remove(endpoint);
        }
    }

    /// Number of successful connections made to `endpoint`.
    pub fn connects(&self, endpoint: &str) -> usize {
        self.inner.lock().connects.get(endpoint).copied().unwrap_or(0)
    }

    pub fn open_clients(&self) -> usize {
        self.inner.lock().live_clients().len()
    }

    /// Closes every open transport from the node side.
    pub fn drop_connections(&self, reason: &str) {
        let clients = self.inner.lock().live_clients();
        for client in clients {
            client.close_with(RpcError::TransportClosed(reason.to_owned()));
        }
    }

    /// Keeps every open transport alive while it stops delivering any data.
    pub fn stall_connections(&self) {
        let clients = self.inner.lock().live_clients();
        for client in clients {
            client.stalled.store(true, Ordering::Release);
        }
    }

    pub fn set_query_delay(&self, delay: Option<Duration>) {
        self.inner.lock().query_delay = delay;
    }

    pub fn set_failing_queries(&self, failing: bool) {
        self.inner.lock().failing_queries = failing;
    }

    pub fn set_submission_statuses(&self, statuses: Vec<TransactionStatus>) {
        self.inner.lock().submission = statuses;
    }

    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.inner.lock().submitted.clone()
    }

    pub fn set_metadata(
        &self,
        network: Network,
        index: ReferendumIndex,
        details: ReferendumDetails,
    ) {
        self.inner.lock().metadata.insert((network, index), details);
    }

    pub fn set_delegates(&self, network: Network, delegates: Vec<Delegate>) {
        self.inner.lock().delegates.insert(network, delegates);
    }

    pub fn set_metadata_failing(&self, failing: bool) {
        self.inner.lock().metadata_failing = failing;
    }

    pub fn metadata_requests(&self) -> Vec<(Network, ReferendumIndex)> {
        self.inner.lock().metadata_requests.clone()
    }
}
