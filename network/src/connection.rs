use std::{
    future::{ready, Future},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use ballot_primitives::BlockNumber;
use ballot_rpc_interface::{ChainClient, NodeProvider, RpcResult};
use ballot_utils::Resource;
use futures::{future::BoxFuture, stream::BoxStream, FutureExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tokio_stream::wrappers::BroadcastStream;

use crate::{config::ConnectionConfig, endpoint::validate_endpoints, error::ConnectionError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not started, or stopped through [`Connection::disconnect`].
    Disconnected,
    Connecting,
    Connected(String),
    /// Terminal: torn down, or gave up after too many failed rounds.
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(String),
    Disconnected { endpoint: String, reason: String },
    Block(BlockNumber),
    /// The connection gave up and will not reconnect on its own.
    Closed(String),
}

/// Diagnostics of the connection, mainly fed by the liveness check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub endpoint: Option<String>,
    /// Bytes received on the current transport at the last liveness check.
    pub bytes_received: u64,
    /// Consecutive liveness checks without new data.
    pub stalled_checks: usize,
    pub blocks: u64,
    pub connects: usize,
    pub failed_attempts: usize,
    pub stalls: usize,
}

struct Shared {
    endpoints: Vec<String>,
    provider: Arc<dyn NodeProvider>,
    config: ConnectionConfig,
    /// Index of the next endpoint to dial, modulo the number of endpoints.
    next_endpoint: AtomicUsize,
    client: RwLock<Option<Arc<dyn ChainClient>>>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    stats: Mutex<ConnectionStats>,
}

struct Inner {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.abort();
        }
    }
}

/// A self-healing connection to one of several equivalent node endpoints.
///
/// Once started, a supervisor task keeps the connection up: failed attempts rotate to
/// the next endpoint after `retry_delay`, and a transport that stops receiving data
/// is dropped and replaced. New blocks are forwarded from whichever transport is
/// current, so block subscriptions survive reconnects.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub fn new<S: AsRef<str>>(
        endpoints: &[S],
        provider: Arc<dyn NodeProvider>,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        let endpoints = validate_endpoints(endpoints)?;
        let shared = Shared {
            endpoints,
            provider,
            config,
            next_endpoint: AtomicUsize::new(0),
            client: RwLock::new(None),
            status: watch::channel(ConnectionStatus::Disconnected).0,
            events: broadcast::channel(64).0,
            stats: Mutex::new(ConnectionStats::default()),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                shared: Arc::new(shared),
                supervisor: Mutex::new(None),
            }),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.inner.shared.endpoints
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.shared.config
    }

    pub fn current_endpoint(&self) -> Option<String> {
        self.inner
            .shared
            .client
            .read()
            .as_ref()
            .map(|client| client.endpoint().to_owned())
    }

    /// The current transport.
    pub fn client(&self) -> Result<Arc<dyn ChainClient>, ConnectionError> {
        self.inner
            .shared
            .client
            .read()
            .clone()
            .ok_or(ConnectionError::NotConnected)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.shared.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.shared.status.subscribe()
    }

    pub fn subscribe_events(&self) -> BroadcastStream<ConnectionEvent> {
        BroadcastStream::new(self.inner.shared.events.subscribe())
    }

    /// Finalized block numbers, across reconnects. This is the only way chain
    /// progress is observed.
    pub fn subscribe_new_blocks(&self) -> BoxStream<'static, BlockNumber> {
        self.subscribe_events()
            .filter_map(|event| {
                ready(match event {
                    Ok(ConnectionEvent::Block(number)) => Some(number),
                    _ => None,
                })
            })
            .boxed()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.inner.shared.stats.lock().clone()
    }

    /// Starts the supervisor unless it is running already.
    pub fn connect(&self) {
        if self.status() == ConnectionStatus::Closed {
            log::warn!("Connection is closed, not reconnecting");
            return;
        }
        let mut supervisor = self.inner.supervisor.lock();
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        log::debug!(endpoints = ?self.inner.shared.endpoints, "Starting connection supervisor");
        let shared = Arc::clone(&self.inner.shared);
        *supervisor = Some(tokio::spawn(shared.supervise()));
    }

    /// Waits until a transport is open.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<String, ConnectionError> {
        let mut status = self.subscribe_status();
        let outcome = match tokio::time::timeout(
            timeout,
            status.wait_for(|status| {
                matches!(
                    status,
                    ConnectionStatus::Connected(_) | ConnectionStatus::Closed
                )
            }),
        )
        .await
        {
            Err(_) => Err(ConnectionError::Timeout(timeout)),
            Ok(Err(_)) => Err(ConnectionError::Closed("status channel closed".to_owned())),
            Ok(Ok(status)) => match &*status {
                ConnectionStatus::Connected(endpoint) => Ok(endpoint.clone()),
                _ => Err(ConnectionError::Closed("gave up connecting".to_owned())),
            },
        };
        outcome
    }

    /// Runs `request` against the current transport, bounded by the request timeout.
    pub async fn request<T, F, Fut>(&self, request: F) -> Result<T, ConnectionError>
    where
        F: FnOnce(Arc<dyn ChainClient>) -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        let client = self.client()?;
        let timeout = self.inner.shared.config.request_timeout;
        match tokio::time::timeout(timeout, request(client)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        }
    }

    /// Stops the supervisor and closes the current transport. [`Connection::connect`]
    /// resumes with the next endpoint.
    pub async fn disconnect(&self) {
        let supervisor = self.inner.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        let shared = &self.inner.shared;
        let client = shared.client.write().take();
        if let Some(client) = client {
            let endpoint = client.endpoint().to_owned();
            client.close().await;
            log::info!(%endpoint, "Disconnected");
            shared.emit(ConnectionEvent::Disconnected {
                endpoint,
                reason: "disconnected".to_owned(),
            });
        }
        shared.stats.lock().endpoint = None;
        shared.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Closed {
                return false;
            }
            *status = ConnectionStatus::Disconnected;
            true
        });
    }

    /// Disconnects for good.
    pub async fn close(&self) {
        self.disconnect().await;
        self.inner.shared.set_status(ConnectionStatus::Closed);
    }
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    fn emit(&self, event: ConnectionEvent) {
        // Having no subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn supervise(self: Arc<Self>) {
        let mut failures = 0;
        let mut failed_rounds = 0;
        loop {
            let index = self.next_endpoint.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
            let endpoint = &self.endpoints[index];
            self.set_status(ConnectionStatus::Connecting);

            match self.open(endpoint).await {
                Ok(client) => {
                    failures = 0;
                    failed_rounds = 0;
                    let reason = self.run_session(client).await;
                    log::warn!(%endpoint, %reason, "Connection lost");
                    self.emit(ConnectionEvent::Disconnected {
                        endpoint: endpoint.clone(),
                        reason,
                    });
                }
                Err(error) => {
                    log::warn!(%endpoint, %error, "Failed to connect");
                    self.stats.lock().failed_attempts += 1;
                    failures += 1;
                    if failures == self.endpoints.len() {
                        failures = 0;
                        failed_rounds += 1;
                        if self
                            .config
                            .max_connect_rounds
                            .is_some_and(|max| failed_rounds >= max)
                        {
                            let reason =
                                format!("no endpoint reachable after {failed_rounds} rounds");
                            log::error!(%reason, "Giving up");
                            self.set_status(ConnectionStatus::Closed);
                            self.emit(ConnectionEvent::Closed(reason));
                            return;
                        }
                    }
                }
            }

            self.set_status(ConnectionStatus::Connecting);
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    async fn open(&self, endpoint: &str) -> Result<Arc<dyn ChainClient>, ConnectionError> {
        log::debug!(%endpoint, "Connecting");
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.provider.connect(endpoint)).await {
            Ok(client) => Ok(client?),
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        }
    }

    /// Serves one transport until it fails. Returns why it was dropped.
    async fn run_session(&self, client: Arc<dyn ChainClient>) -> String {
        let endpoint = client.endpoint().to_owned();
        *self.client.write() = Some(Arc::clone(&client));
        {
            let mut stats = self.stats.lock();
            stats.endpoint = Some(endpoint.clone());
            stats.connects += 1;
            stats.stalled_checks = 0;
            stats.bytes_received = client.bytes_received();
        }
        log::info!(%endpoint, "Connected");
        self.set_status(ConnectionStatus::Connected(endpoint.clone()));
        self.emit(ConnectionEvent::Connected(endpoint.clone()));

        let mut blocks = client.subscribe_new_blocks();
        let mut closed = client.closed();
        let period = self.config.liveness_interval;
        let mut liveness = interval_at(Instant::now() + period, period);
        let mut last_bytes = client.bytes_received();
        let mut stalled_checks = 0;

        let reason = loop {
            tokio::select! {
                biased;

                error = &mut closed => break error.to_string(),
                block = blocks.next() => match block {
                    Some(number) => {
                        log::trace!(%endpoint, number, "New block");
                        self.stats.lock().blocks += 1;
                        self.emit(ConnectionEvent::Block(number));
                    }
                    None => break "block subscription ended".to_owned(),
                },
                _ = liveness.tick() => {
                    let bytes = client.bytes_received();
                    if bytes == last_bytes {
                        stalled_checks += 1;
                        log::debug!(%endpoint, stalled_checks, "No data since last liveness check");
                    } else {
                        stalled_checks = 0;
                        last_bytes = bytes;
                    }
                    {
                        let mut stats = self.stats.lock();
                        stats.bytes_received = bytes;
                        stats.stalled_checks = stalled_checks;
                    }
                    if stalled_checks > self.config.max_stalled_checks {
                        self.stats.lock().stalls += 1;
                        break format!("no data received for {stalled_checks} liveness checks");
                    }
                }
            }
        };

        *self.client.write() = None;
        self.stats.lock().endpoint = None;
        client.close().await;
        reason
    }
}

impl Resource for Connection {
    fn teardown(&self) -> Option<BoxFuture<'_, ()>> {
        Some(self.close().boxed())
    }

    fn eviction_signal(&self) -> Option<BoxFuture<'static, ()>> {
        let mut status = self.subscribe_status();
        Some(
            async move {
                let _ = status
                    .wait_for(|status| *status == ConnectionStatus::Closed)
                    .await;
            }
            .boxed(),
        )
    }
}
