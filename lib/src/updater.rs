use std::{
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use ballot_database::{Database, DatabaseError, Environment, Schema};
use ballot_network::{Connection, ConnectionError, ConnectionEvent, ConnectionStatus};
use ballot_primitives::{
    chain::{AccountChainState, ChainState, Votings},
    delegate::Delegate,
    networks::Network,
    referendum::{ReferendumDetails, ReferendumIndex},
    track::TrackId,
    transaction::{Call, TransactionStatus, UnsignedTransaction},
    vote::{AccountVote, Conviction},
    AccountId, Balance, BlockNumber,
};
use ballot_rpc_interface::{MetadataService, NodeProvider, Signer};
use ballot_utils::ResourceCache;
use futures::{
    future::{self, BoxFuture},
    stream::{self, BoxStream},
    FutureExt, Stream, StreamExt,
};
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::{
    action::Action,
    config::ClientConfig,
    error::UpdaterError,
    location::{Location, NetworkTarget},
    reconcile::{extract_user_votes, vote_conflicts},
    reducer::reduce,
    state::{AppState, Connectivity, Indexes, Processing, Report, ReportKind, Votes},
};

const SETTINGS_DATABASE: &str = "ballot-settings";
const SETTINGS: &str = "settings";
const SETTING_NETWORK: &str = "network";
const SETTING_ADDRESS: &str = "address";

const VOTES: &str = "votes";
const DELEGATES: &str = "delegates";

const SETTINGS_SCHEMA: Schema = Schema {
    version: 1,
    collections: &[SETTINGS],
};

const NETWORK_SCHEMA: Schema = Schema {
    version: 1,
    collections: &[VOTES, DELEGATES],
};

fn database_name(network: Network) -> String {
    format!("ballot-{}", network.as_str().to_lowercase())
}

/// The collaborators the updater talks to.
#[derive(Clone)]
pub struct Services {
    pub provider: Arc<dyn NodeProvider>,
    pub metadata: Arc<dyn MetadataService>,
    pub storage: Environment,
}

/// Signals of the hosting environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvironmentEvent {
    Online,
    Offline,
    LocationChanged(Location),
    /// A failure nobody handled, surfaced as an error report.
    UnhandledRejection(String),
}

/// Connections are shared by everyone asking for the same endpoints of a network.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub network: Network,
    pub endpoints: Vec<String>,
}

impl From<&NetworkTarget> for ConnectionKey {
    fn from(target: &NetworkTarget) -> Self {
        Self {
            network: target.network,
            endpoints: target.endpoints.clone(),
        }
    }
}

/// A dispatched action, in dispatch order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub sequence: u64,
    pub action: Action,
}

struct Session {
    generation: u64,
    key: ConnectionKey,
}

struct Inner {
    config: ClientConfig,
    metadata: Arc<dyn MetadataService>,

    state: watch::Sender<AppState>,
    history: Mutex<VecDeque<HistoryEntry>>,
    sequence: AtomicU64,

    databases: ResourceCache<String, Database, DatabaseError>,
    connections: ResourceCache<ConnectionKey, Connection, ConnectionError>,

    /// Bumped whenever the network changes. Results of work started under an older
    /// generation are dropped.
    generation: AtomicU64,
    /// Bumped by every call to [`Updater::switch_network`], committed or not.
    switches: AtomicU64,
    session: Mutex<Option<Session>>,
    location: Mutex<Option<Location>>,

    /// Listener of the current connection. Replaced, never added to.
    subscription: Mutex<Option<JoinHandle<()>>>,
    environment: Mutex<Option<JoinHandle<()>>>,

    known_conflicts: Mutex<HashSet<ReferendumIndex>>,
    requested_metadata: Mutex<HashSet<(Network, ReferendumIndex)>>,
}

impl Inner {
    fn stop_listeners(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for slot in [&self.subscription, &self.environment] {
            if let Some(handle) = slot.lock().take() {
                handle.abort();
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for slot in [&mut self.subscription, &mut self.environment] {
            if let Some(handle) = slot.get_mut().take() {
                handle.abort();
            }
        }
    }
}

/// Cancels the listeners installed by [`Updater::start`].
pub struct StopHandle {
    inner: Weak<Inner>,
    stopped: AtomicBool,
}

impl StopHandle {
    /// Stops the block subscription and the environment listener. Safe to call more
    /// than once, and after the updater is gone.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            log::debug!("Stopping updater listeners");
            inner.stop_listeners();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Drives the application state.
///
/// The updater is the only component that talks to the node, the metadata service and
/// the stores, and the only one that dispatches actions. Consumers observe the state
/// through [`Updater::subscribe_state`].
///
/// Failures are both returned to the caller and added to the reports, nothing in here
/// panics on a failing collaborator.
#[derive(Clone)]
pub struct Updater {
    inner: Arc<Inner>,
}

impl Updater {
    pub fn new(config: ClientConfig, services: Services) -> Self {
        let Services {
            provider,
            metadata,
            storage,
        } = services;

        let databases = ResourceCache::new(move |name: String| {
            let storage = storage.clone();
            async move {
                let schema = if name == SETTINGS_DATABASE {
                    &SETTINGS_SCHEMA
                } else {
                    &NETWORK_SCHEMA
                };
                storage.open_database(&name, schema)
            }
            .boxed()
        });

        let connection_config = config.connection.clone();
        let connections = ResourceCache::new(move |key: ConnectionKey| {
            let provider = Arc::clone(&provider);
            let config = connection_config.clone();
            async move { Connection::new(&key.endpoints, provider, config) }.boxed()
        });

        Self {
            inner: Arc::new(Inner {
                config,
                metadata,
                state: watch::channel(AppState::default()).0,
                history: Mutex::new(VecDeque::new()),
                sequence: AtomicU64::new(0),
                databases,
                connections,
                generation: AtomicU64::new(0),
                switches: AtomicU64::new(0),
                session: Mutex::new(None),
                location: Mutex::new(None),
                subscription: Mutex::new(None),
                environment: Mutex::new(None),
                known_conflicts: Mutex::new(HashSet::new()),
                requested_metadata: Mutex::new(HashSet::new()),
            }),
        }
    }

    fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> AppState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AppState> {
        self.inner.state.subscribe()
    }

    /// The most recently dispatched actions, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.lock().iter().cloned().collect()
    }

    fn dispatch(&self, action: Action) {
        log::trace!(action = action.name(), "Dispatching");
        let history_size = self.inner.config.updater.history_size;
        self.inner.state.send_modify(|state| {
            if history_size > 0 {
                let mut history = self.inner.history.lock();
                if history.len() == history_size {
                    history.pop_front();
                }
                history.push_back(HistoryEntry {
                    sequence: self.inner.sequence.fetch_add(1, Ordering::SeqCst),
                    action: action.clone(),
                });
            }
            *state = reduce(state, action);
        });
    }

    fn report(&self, report: Report) {
        match report.kind {
            ReportKind::Warning => log::warn!(message = %report.message, "Reporting warning"),
            ReportKind::Error => log::error!(message = %report.message, "Reporting error"),
        }
        self.dispatch(Action::AddReport(report));
    }

    fn report_error<E: Into<UpdaterError>>(&self, context: &str, error: E) -> UpdaterError {
        let error = error.into();
        self.report(Report::error(format!("{context}: {error}")));
        error
    }

    pub fn remove_report(&self, index: usize) {
        self.dispatch(Action::RemoveReport(index));
    }

    pub fn set_indexes(&self, indexes: Indexes) {
        self.dispatch(Action::SetIndexes(indexes));
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    fn set_connectivity(&self, connectivity: Connectivity) {
        if *self.inner.state.borrow().connectivity() != connectivity {
            self.dispatch(Action::UpdateConnectivity(connectivity));
        }
    }

    fn is_offline(&self) -> bool {
        *self.inner.state.borrow().connectivity() == Connectivity::Offline
    }

    fn set_processing(&self, processing: Option<Processing>) {
        if self.inner.state.borrow().connected().is_some() {
            self.dispatch(Action::SetProcessing(processing));
        }
    }

    async fn settings(&self) -> Result<Arc<Database>, UpdaterError> {
        Ok(self
            .inner
            .databases
            .get_or_create(SETTINGS_DATABASE.to_owned())
            .await?)
    }

    async fn store(&self, network: Network) -> Result<Arc<Database>, UpdaterError> {
        Ok(self
            .inner
            .databases
            .get_or_create(database_name(network))
            .await?)
    }

    async fn persisted_network(&self) -> Option<Network> {
        let settings = match self.settings().await {
            Ok(settings) => settings,
            Err(error) => {
                log::warn!(%error, "Settings are not available");
                return None;
            }
        };
        settings
            .get(SETTINGS, SETTING_NETWORK)
            .unwrap_or_else(|error| {
                log::warn!(%error, "Could not read the last used network");
                None
            })
    }

    async fn persisted_address(&self) -> Option<AccountId> {
        let settings = self.settings().await.ok()?;
        settings
            .get(SETTINGS, SETTING_ADDRESS)
            .unwrap_or_else(|error| {
                log::warn!(%error, "Could not read the last connected address");
                None
            })
    }

    fn current_key(&self) -> Option<ConnectionKey> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|session| session.key.clone())
    }

    /// The connection of the current network, if it has been created.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.inner.connections.get(&self.current_key()?)
    }

    fn connected(&self) -> Result<Arc<Connection>, UpdaterError> {
        let connection = self.connection().ok_or(UpdaterError::NotConnected)?;
        match connection.status() {
            ConnectionStatus::Connected(_) => Ok(connection),
            _ => Err(UpdaterError::NotConnected),
        }
    }

    /// Selects the network from `location`, restores its store and connects to it.
    /// Listens to `environment` until the returned handle is stopped.
    pub async fn start<S>(&self, location: Location, environment: S) -> StopHandle
    where
        S: Stream<Item = EnvironmentEvent> + Send + 'static,
    {
        self.listen_environment(environment.boxed());
        // Failures are reported already.
        let _ = self.switch_network(location).await;
        StopHandle {
            inner: Arc::downgrade(&self.inner),
            stopped: AtomicBool::new(false),
        }
    }

    /// Stops all listeners and tears down every connection and store.
    pub async fn shutdown(&self) {
        self.inner.stop_listeners();
        self.inner.session.lock().take();
        let connections = self.inner.connections.evict_all().await;
        let databases = self.inner.databases.evict_all().await;
        log::info!(
            connections = connections.len(),
            databases = databases.len(),
            "Updater shut down"
        );
    }

    /// Switches to the network `location` points to.
    ///
    /// The connection of the previous network is torn down if the new one uses other
    /// endpoints. Anything still in flight for the previous network is dropped.
    pub async fn switch_network(&self, location: Location) -> Result<NetworkTarget, UpdaterError> {
        let request = self.inner.switches.fetch_add(1, Ordering::SeqCst) + 1;

        let persisted = self.persisted_network().await;
        let target = location
            .resolve(persisted, &self.inner.config.network)
            .map_err(|error| self.report_error("Invalid network selection", error))?;
        let network = target.network;
        log::info!(%network, endpoints = ?target.endpoints, "Selecting network");

        let (votes, custom_delegates) = self
            .restore(network)
            .await
            .map_err(|error| self.report_error("Could not restore saved data", error))?;
        if self.inner.switches.load(Ordering::SeqCst) != request {
            log::debug!(%network, "Network changed while restoring");
            return Ok(target);
        }

        // The previous network stays current until here.
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.location.lock() = Some(location);

        // Custom endpoints are only valid for the location that carried them.
        if network != Network::Local {
            if let Err(error) = self
                .settings()
                .await
                .and_then(|settings| Ok(settings.put(SETTINGS, SETTING_NETWORK, &network)?))
            {
                log::warn!(%error, "Could not remember network");
            }
        }
        if !self.is_current(generation) {
            return Ok(target);
        }

        self.inner.known_conflicts.lock().clear();
        self.inner.requested_metadata.lock().clear();
        self.dispatch(Action::SetRestored {
            network,
            votes,
            custom_delegates,
        });

        if self.inner.state.borrow().connected_address().is_none() {
            if let Some(address) = self.persisted_address().await {
                log::debug!(address = %address.short(), "Restoring connected address");
                self.dispatch(Action::SetConnectedAddress(Some(address)));
            }
        }

        self.fetch_delegates(network, generation).await;
        if !self.is_current(generation) {
            return Ok(target);
        }

        self.connect(&target, generation).await?;
        Ok(target)
    }

    async fn restore(&self, network: Network) -> Result<(Votes, Vec<Delegate>), UpdaterError> {
        let store = self.store(network).await?;

        let mut votes = Votes::new();
        for (key, vote) in store.get_all::<AccountVote>(VOTES)? {
            match key.parse::<ReferendumIndex>() {
                Ok(index) => {
                    votes.insert(index, vote);
                }
                Err(_) => log::warn!(%key, "Ignoring stored vote with invalid index"),
            }
        }
        let delegates = store
            .get_all::<Delegate>(DELEGATES)?
            .into_values()
            .collect();

        Ok((votes, delegates))
    }

    async fn fetch_delegates(&self, network: Network, generation: u64) {
        let timeout = self.inner.config.updater.metadata_timeout;
        let result =
            tokio::time::timeout(timeout, self.inner.metadata.fetch_delegates(network)).await;
        if !self.is_current(generation) {
            log::debug!(%network, "Dropping delegates of a previous network");
            return;
        }
        match result {
            Ok(Ok(delegates)) => {
                log::debug!(%network, count = delegates.len(), "Fetched delegates");
                self.dispatch(Action::SetDelegates(delegates));
            }
            Ok(Err(error)) => self.report(Report::warning(format!(
                "Could not load the list of delegates: {error}"
            ))),
            Err(_) => self.report(Report::warning(
                "Loading the list of delegates timed out".to_owned(),
            )),
        }
    }

    async fn connect(&self, target: &NetworkTarget, generation: u64) -> Result<(), UpdaterError> {
        let key = ConnectionKey::from(target);
        let previous = self.inner.session.lock().replace(Session {
            generation,
            key: key.clone(),
        });

        if let Some(previous) = previous.filter(|previous| previous.key != key) {
            // Silence the old listener before its connection goes down.
            if let Some(handle) = self.inner.subscription.lock().take() {
                handle.abort();
            }
            log::debug!(
                network = %previous.key.network,
                generation = previous.generation,
                "Evicting previous connection"
            );
            self.inner.connections.evict(&previous.key).await;
        }

        let connection = self
            .inner
            .connections
            .get_or_create(key.clone())
            .await
            .map_err(|error| self.report_error("Could not connect", error))?;
        if !self.is_current(generation) {
            log::debug!(network = %key.network, "Network changed while connecting");
            return Ok(());
        }

        self.listen(&connection, key, generation);
        match connection.status() {
            ConnectionStatus::Connected(_) => {
                self.set_connectivity(Connectivity::Connected(connection.endpoints().to_vec()))
            }
            _ if !self.is_offline() => self.set_connectivity(Connectivity::Online),
            _ => {}
        }

        if self.is_offline() {
            log::info!("Offline, not connecting");
            return Ok(());
        }

        connection.connect();
        let timeout = self.inner.config.updater.connect_timeout;
        match connection.wait_connected(timeout).await {
            Ok(endpoint) => {
                log::debug!(%endpoint, "Connection ready");
                Ok(())
            }
            Err(ConnectionError::Timeout(after)) => {
                self.report(Report::warning(format!(
                    "Connecting to {} is taking longer than {after:?}",
                    target.network
                )));
                Err(UpdaterError::Timeout {
                    what: "Connecting",
                    after,
                })
            }
            Err(error) => Err(self.report_error("Could not connect", error)),
        }
    }

    fn listen(&self, connection: &Connection, key: ConnectionKey, generation: u64) {
        let mut events = connection.subscribe_events();
        let endpoints = connection.endpoints().to_vec();
        let updater = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(updater) = Updater::upgrade(&updater) else {
                    break;
                };
                match event {
                    Ok(ConnectionEvent::Connected(endpoint)) => {
                        log::debug!(%endpoint, "Transport connected");
                        if !updater.is_offline() {
                            updater.set_connectivity(Connectivity::Connected(endpoints.clone()));
                        }
                    }
                    Ok(ConnectionEvent::Disconnected { endpoint, reason }) => {
                        log::debug!(%endpoint, %reason, "Transport disconnected");
                        if !updater.is_offline() {
                            updater.set_connectivity(Connectivity::Online);
                        }
                    }
                    Ok(ConnectionEvent::Block(block)) => {
                        updater.handle_block(&key, generation, &endpoints, block).await;
                    }
                    Ok(ConnectionEvent::Closed(reason)) => {
                        updater.report(Report::error(format!(
                            "Lost the connection to {}: {reason}",
                            key.network
                        )));
                        break;
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        log::warn!(skipped, "Connection listener lagged behind");
                    }
                }
            }
        });

        if let Some(previous) = self.inner.subscription.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn handle_block(
        &self,
        key: &ConnectionKey,
        generation: u64,
        endpoints: &[String],
        block: BlockNumber,
    ) {
        if !self.is_current(generation) {
            log::debug!(block, "Ignoring block of a previous network");
            return;
        }
        if !self.is_offline() {
            self.set_connectivity(Connectivity::Following(endpoints.to_vec()));
        }

        let Some(connection) = self.inner.connections.get(key) else {
            return;
        };

        let timeout = self.inner.config.updater.chain_query_timeout;
        let chain = match with_timeout(
            timeout,
            "Fetching the chain state",
            fetch_chain(&connection),
        )
        .await
        {
            Ok(chain) => chain,
            Err(error) => {
                if self.is_current(generation) {
                    self.report(Report::warning(format!(
                        "Could not update to block #{block}: {error}"
                    )));
                }
                return;
            }
        };
        if !self.is_current(generation) {
            log::debug!(block, "Discarding chain state of a previous network");
            return;
        }
        log::debug!(block, referenda = chain.referenda.len(), "Chain state updated");
        self.dispatch(Action::UpdateChainDetails {
            block,
            chain: Arc::new(chain),
        });

        let address = self.inner.state.borrow().connected_address().cloned();
        if let Some(address) = address {
            self.refresh_account(&connection, generation, address).await;
        }

        self.fetch_new_metadata(key.network, generation);
    }

    async fn refresh_account(&self, connection: &Connection, generation: u64, address: AccountId) {
        let timeout = self.inner.config.updater.chain_query_timeout;
        let details = match with_timeout(
            timeout,
            "Fetching the account state",
            fetch_account(connection, &address),
        )
        .await
        {
            Ok(details) => details,
            Err(error) => {
                if self.is_current(generation) {
                    self.report(Report::warning(format!(
                        "Could not load the state of {}: {error}",
                        address.short()
                    )));
                }
                return;
            }
        };
        if !self.is_current(generation) {
            log::debug!(
                address = %address.short(),
                "Discarding account state of a previous network"
            );
            return;
        }
        self.dispatch(Action::UpdateChainAccountDetails {
            address,
            details: Arc::new(details),
        });
        self.warn_about_conflicts();
    }

    /// Warns once per referendum about local votes the chain disagrees with.
    fn warn_about_conflicts(&self) {
        let conflicts = {
            let state = self.inner.state.borrow();
            let Some(connected) = state.connected() else {
                return;
            };
            let (Some(address), Some(account)) =
                (connected.connected_address.as_ref(), connected.account.as_ref())
            else {
                return;
            };
            let on_chain = extract_user_votes(address, &account.all_votings, &connected.ongoing());
            let conflicts = vote_conflicts(&connected.votes, &on_chain);
            let mut known = self.inner.known_conflicts.lock();
            let new: Vec<ReferendumIndex> = conflicts
                .into_iter()
                .filter(|index| known.insert(*index))
                .collect();
            new
        };

        for index in conflicts {
            self.report(Report::warning(format!(
                "Your vote on referendum #{index} differs from the one recorded on chain, \
                 the on-chain vote is used"
            )));
        }
    }

    /// Fetches the details of ongoing referenda that haven't been asked for yet.
    fn fetch_new_metadata(&self, network: Network, generation: u64) {
        let indexes: Vec<ReferendumIndex> = {
            let state = self.inner.state.borrow();
            let Some(connected) = state.connected() else {
                return;
            };
            let mut requested = self.inner.requested_metadata.lock();
            let missing: Vec<ReferendumIndex> = connected
                .ongoing()
                .into_keys()
                .filter(|index| !connected.details.contains_key(index))
                .filter(|index| requested.insert((network, *index)))
                .collect();
            missing
        };
        if indexes.is_empty() {
            return;
        }

        log::debug!(%network, ?indexes, "Fetching referendum details");
        let metadata = Arc::clone(&self.inner.metadata);
        let timeout = self.inner.config.updater.metadata_timeout;
        let concurrency = self.inner.config.updater.metadata_concurrency.max(1);
        let updater = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut fetches = stream::iter(indexes)
                .map(|index| {
                    let metadata = Arc::clone(&metadata);
                    async move {
                        let result = match tokio::time::timeout(
                            timeout,
                            metadata.fetch_metadata(network, index),
                        )
                        .await
                        {
                            Ok(Ok(details)) => Ok(details),
                            Ok(Err(error)) => Err(error.to_string()),
                            Err(_) => Err(format!("timed out after {timeout:?}")),
                        };
                        (index, result)
                    }
                })
                .buffer_unordered(concurrency);

            let mut failed = BTreeSet::new();
            while let Some((index, result)) = fetches.next().await {
                let Some(updater) = Updater::upgrade(&updater) else {
                    return;
                };
                if !updater.is_current(generation) {
                    log::debug!(index, "Dropping details of a previous network");
                    continue;
                }
                match result {
                    Ok(details) => updater.store_details(index, details),
                    Err(error) => {
                        log::debug!(index, %error, "Could not fetch referendum details");
                        failed.insert(index);
                    }
                }
            }

            if failed.is_empty() {
                return;
            }
            if let Some(updater) = Updater::upgrade(&updater).filter(|u| u.is_current(generation)) {
                let indexes: Vec<String> = failed.iter().map(|index| format!("#{index}")).collect();
                updater.report(Report::warning(format!(
                    "Could not load the details of referenda {}",
                    indexes.join(", ")
                )));
            }
        });
    }

    fn store_details(&self, index: ReferendumIndex, details: ReferendumDetails) {
        self.dispatch(Action::StoreReferendumDetails(BTreeMap::from([(
            index, details,
        )])));
    }

    /// Reacts to a signal of the hosting environment.
    pub async fn handle_environment_event(&self, event: EnvironmentEvent) {
        match event {
            EnvironmentEvent::Offline => {
                log::info!("Went offline");
                self.set_connectivity(Connectivity::Offline);
                if let Some(connection) = self.connection() {
                    connection.disconnect().await;
                }
            }
            EnvironmentEvent::Online => {
                log::info!("Back online");
                self.set_connectivity(Connectivity::Online);
                match self.connection() {
                    Some(connection) => connection.connect(),
                    None => {
                        // The connection gave up while offline, start over.
                        let location = self.inner.location.lock().clone();
                        if let Some(location) = location {
                            let _ = self.switch_network(location).await;
                        }
                    }
                }
            }
            EnvironmentEvent::LocationChanged(location) => {
                if self.inner.location.lock().as_ref() == Some(&location) {
                    return;
                }
                // Failures are reported already.
                let _ = self.switch_network(location).await;
            }
            EnvironmentEvent::UnhandledRejection(message) => {
                self.report(Report::error(message));
            }
        }
    }

    fn listen_environment(&self, mut events: BoxStream<'static, EnvironmentEvent>) {
        let updater = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(updater) = Updater::upgrade(&updater) else {
                    break;
                };
                updater.handle_environment_event(event).await;
            }
        });
        if let Some(previous) = self.inner.environment.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Records a vote locally. The vote shows up in the state right away, even if
    /// saving it fails.
    pub async fn cast_vote(
        &self,
        index: ReferendumIndex,
        vote: AccountVote,
    ) -> Result<(), UpdaterError> {
        self.dispatch(Action::CastVote {
            index,
            vote: vote.clone(),
        });
        let network = self.state().network().ok_or(UpdaterError::NotRestored)?;
        self.store(network)
            .await
            .and_then(|store| Ok(store.put(VOTES, &index.to_string(), &vote)?))
            .map_err(|error| self.report_error("Could not save vote", error))
    }

    pub async fn remove_vote(&self, index: ReferendumIndex) -> Result<(), UpdaterError> {
        self.dispatch(Action::RemoveVote(index));
        let network = self.state().network().ok_or(UpdaterError::NotRestored)?;
        self.store(network)
            .await
            .and_then(|store| Ok(store.delete(VOTES, &index.to_string())?))
            .map_err(|error| self.report_error("Could not remove vote", error))
    }

    /// Submits `votes` in a single batch and waits until it is finalized.
    ///
    /// Local votes are cleared only once the batch is finalized. Returns the block it
    /// was finalized in.
    pub async fn sign_and_send_votes(
        &self,
        signer: &dyn Signer,
        votes: Votes,
    ) -> Result<BlockNumber, UpdaterError> {
        let connection = self
            .connected()
            .map_err(|error| self.report_error("Cannot submit votes", error))?;
        let network = self
            .state()
            .network()
            .ok_or(UpdaterError::NotRestored)
            .map_err(|error| self.report_error("Cannot submit votes", error))?;
        if votes.is_empty() {
            return Err(self.report_error("Cannot submit votes", UpdaterError::NoVotes));
        }

        let count = votes.len();
        let call = Call::batch(
            votes
                .into_iter()
                .map(|(index, vote)| Call::Vote { index, vote })
                .collect(),
        );
        let transaction = UnsignedTransaction { network, call };

        self.set_processing(Some(
            Processing::new("Signing")
                .with_message(format!("Waiting for the signature of {count} votes")),
        ));
        let signed = match signer.sign(transaction).await {
            Ok(signed) => signed,
            Err(error) => return Err(self.submission_failed(error.into())),
        };

        self.set_processing(Some(Processing::new("Submitting")));
        let mut statuses = match connection
            .request(|client| async move { client.submit(signed).await })
            .await
        {
            Ok(statuses) => statuses,
            Err(error) => return Err(self.submission_failed(error.into())),
        };

        let timeout = self.inner.config.updater.submission_timeout;
        loop {
            let status = match tokio::time::timeout(timeout, statuses.next()).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    return Err(self.submission_failed(UpdaterError::Transaction(
                        "status updates ended before finalization".to_owned(),
                    )))
                }
                Err(_) => {
                    return Err(self.submission_failed(UpdaterError::Timeout {
                        what: "Submission",
                        after: timeout,
                    }))
                }
            };
            log::debug!(?status, "Submission status");

            match status {
                TransactionStatus::Broadcast => self.set_processing(Some(
                    Processing::new("Broadcasting").with_message("Sent to the network"),
                )),
                TransactionStatus::InBlock(block) => self.set_processing(Some(
                    Processing::new("In block").with_message(format!(
                        "Included in block #{block}, waiting for finalization"
                    )),
                )),
                TransactionStatus::Finalized(block) => {
                    log::info!(block, count, "Votes finalized");
                    if let Err(error) = self
                        .store(network)
                        .await
                        .and_then(|store| Ok(store.clear(VOTES)?))
                    {
                        self.report_error("Could not clear submitted votes", error);
                    }
                    if self.state().network() == Some(network) {
                        self.dispatch(Action::ClearVotes);
                    }
                    self.set_processing(None);
                    return Ok(block);
                }
                TransactionStatus::Invalid(reason) | TransactionStatus::Dropped(reason) => {
                    return Err(self.submission_failed(UpdaterError::Transaction(reason)));
                }
            }
        }
    }

    fn submission_failed(&self, error: UpdaterError) -> UpdaterError {
        self.set_processing(None);
        self.report_error("Submitting votes failed", error)
    }

    /// Builds the transaction delegating `tracks` to `target`. Tracks delegated already
    /// are left out.
    pub fn delegate(
        &self,
        target: AccountId,
        tracks: &[TrackId],
        balance: Balance,
        conviction: Conviction,
    ) -> Result<UnsignedTransaction, UpdaterError> {
        self.connected()
            .map_err(|error| self.report_error("Cannot delegate", error))?;
        let state = self.state();
        let Some(connected) = state.connected() else {
            return Err(self.report_error("Cannot delegate", UpdaterError::NotConnected));
        };

        let delegated = connected.delegations();
        let calls: Vec<Call> = tracks
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|track| !delegated.contains_key(track))
            .map(|track| Call::Delegate {
                track,
                to: target.clone(),
                conviction,
                balance,
            })
            .collect();
        if calls.is_empty() {
            return Err(self.report_error("Cannot delegate", UpdaterError::AlreadyDelegated));
        }

        Ok(UnsignedTransaction {
            network: connected.network,
            call: Call::batch(calls),
        })
    }

    /// Builds the transaction removing the delegations of `tracks`.
    pub fn undelegate(&self, tracks: &[TrackId]) -> Result<UnsignedTransaction, UpdaterError> {
        self.connected()
            .map_err(|error| self.report_error("Cannot undelegate", error))?;
        let state = self.state();
        let Some(connected) = state.connected() else {
            return Err(self.report_error("Cannot undelegate", UpdaterError::NotConnected));
        };

        let mut tracks: BTreeSet<TrackId> = tracks.iter().copied().collect();
        // Without account details every requested track is taken as delegated.
        if connected.account.is_some() {
            let delegated = connected.delegations();
            tracks.retain(|track| delegated.contains_key(track));
        }
        if tracks.is_empty() {
            return Err(self.report_error("Cannot undelegate", UpdaterError::NotDelegated));
        }

        Ok(UnsignedTransaction {
            network: connected.network,
            call: Call::batch(
                tracks
                    .into_iter()
                    .map(|track| Call::Undelegate { track })
                    .collect(),
            ),
        })
    }

    /// Sets the account the state is personalised for, and remembers it.
    pub async fn set_connected_address(
        &self,
        address: Option<AccountId>,
    ) -> Result<(), UpdaterError> {
        self.dispatch(Action::SetConnectedAddress(address.clone()));
        self.inner.known_conflicts.lock().clear();

        let persisted = self.settings().await.and_then(|settings| {
            Ok(match &address {
                Some(address) => settings.put(SETTINGS, SETTING_ADDRESS, address)?,
                None => settings.delete(SETTINGS, SETTING_ADDRESS)?,
            })
        });
        if let Err(error) = persisted {
            self.report(Report::warning(format!("Could not remember account: {error}")));
        }

        if let Some(address) = address {
            if self.state().connected().is_some() {
                if let Ok(connection) = self.connected() {
                    self.refresh_account(&connection, self.current_generation(), address)
                        .await;
                }
            }
        }
        Ok(())
    }

    pub async fn add_custom_delegate(&self, delegate: Delegate) -> Result<(), UpdaterError> {
        self.dispatch(Action::AddCustomDelegate(delegate.clone()));
        let network = self.state().network().ok_or(UpdaterError::NotRestored)?;
        self.store(network)
            .await
            .and_then(|store| Ok(store.put(DELEGATES, delegate.address.as_str(), &delegate)?))
            .map_err(|error| self.report_error("Could not save delegate", error))
    }

    pub async fn remove_custom_delegate(&self, address: AccountId) -> Result<(), UpdaterError> {
        self.dispatch(Action::RemoveCustomDelegate(address.clone()));
        let network = self.state().network().ok_or(UpdaterError::NotRestored)?;
        self.store(network)
            .await
            .and_then(|store| Ok(store.delete(DELEGATES, address.as_str())?))
            .map_err(|error| self.report_error("Could not remove delegate", error))
    }
}

async fn with_timeout<T, F>(
    timeout: Duration,
    what: &'static str,
    future: F,
) -> Result<T, UpdaterError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(UpdaterError::Timeout {
            what,
            after: timeout,
        }),
    }
}

async fn fetch_chain(connection: &Connection) -> Result<ChainState, ConnectionError> {
    let (tracks, referenda, fellows, properties) = future::try_join4(
        connection.request(|client| async move { client.query_tracks().await }),
        connection.request(|client| async move { client.query_referenda().await }),
        connection.request(|client| async move { client.query_fellows().await }),
        connection.request(|client| async move { client.query_properties().await }),
    )
    .await?;
    Ok(ChainState {
        tracks,
        referenda,
        fellows,
        properties,
    })
}

fn votings_of(
    connection: &Connection,
    address: AccountId,
) -> BoxFuture<'_, Result<(AccountId, Votings), ConnectionError>> {
    async move {
        let votings = connection
            .request(|client| {
                let address = address.clone();
                async move { client.query_account_votings(&address).await }
            })
            .await?;
        Ok((address, votings))
    }
    .boxed()
}

/// Balance and votings of `address`, plus the votings of everyone it delegates to.
async fn fetch_account(
    connection: &Connection,
    address: &AccountId,
) -> Result<AccountChainState, ConnectionError> {
    let (balance, (_, votings)) = future::try_join(
        connection.request(|client| {
            let address = address.clone();
            async move { client.query_balance(&address).await }
        }),
        votings_of(connection, address.clone()),
    )
    .await?;

    let targets: BTreeSet<AccountId> = votings
        .values()
        .filter_map(|voting| voting.delegating())
        .map(|delegating| delegating.target.clone())
        .filter(|target| target != address)
        .collect();
    let mut all_votings: BTreeMap<AccountId, Votings> =
        future::try_join_all(targets.into_iter().map(|target| votings_of(connection, target)))
            .await?
            .into_iter()
            .collect();
    all_votings.insert(address.clone(), votings);

    Ok(AccountChainState {
        balance,
        all_votings,
    })
}
