use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::spawn;

/// Optional capabilities of a cached resource.
///
/// Both capabilities are declared by returning `Some`; the cache never infers them.
pub trait Resource: Send + Sync + 'static {
    /// Tears the resource down. Awaited by the cache when the resource is evicted.
    fn teardown(&self) -> Option<BoxFuture<'_, ()>> {
        None
    }

    /// Resolves once the resource wants to be purged from the cache, e.g. because
    /// it closed itself. The cache then evicts it without outside help.
    fn eviction_signal(&self) -> Option<BoxFuture<'static, ()>> {
        None
    }
}

type Construction<T, E> = Shared<BoxFuture<'static, Result<Arc<T>, Arc<E>>>>;

type Factory<K, T, E> = dyn Fn(K) -> BoxFuture<'static, Result<T, E>> + Send + Sync;

enum Entry<T, E> {
    Pending { id: u64, construction: Construction<T, E> },
    Ready { id: u64, value: Arc<T> },
}

impl<T, E> Entry<T, E> {
    fn id(&self) -> u64 {
        match self {
            Entry::Pending { id, .. } | Entry::Ready { id, .. } => *id,
        }
    }
}

struct Inner<K, T, E> {
    factory: Box<Factory<K, T, E>>,
    entries: Mutex<HashMap<K, Entry<T, E>>>,
    next_id: AtomicU64,
}

/// A keyed cache of asynchronously constructed singletons.
///
/// At most one instance is constructed per key: concurrent requests for a key that is
/// still being constructed wait on the same in-flight construction. A failed
/// construction is not registered, so the next request retries.
pub struct ResourceCache<K, T, E> {
    inner: Arc<Inner<K, T, E>>,
}

impl<K, T, E> Clone for ResourceCache<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T, E> ResourceCache<K, T, E>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    T: Resource,
    E: Send + Sync + 'static,
{
    /// Creates a cache around `factory`.
    ///
    /// The factory is called with the entry lock held and must only build the future,
    /// all actual work has to happen when the future is polled.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(K) -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(factory),
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub async fn get_or_create(&self, key: K) -> Result<Arc<T>, Arc<E>> {
        let (id, construction) = {
            let mut entries = self.inner.entries.lock();
            match entries.get(&key) {
                Some(Entry::Ready { value, .. }) => return Ok(Arc::clone(value)),
                Some(Entry::Pending { id, construction }) => (*id, construction.clone()),
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    log::debug!(?key, id, "Constructing resource");
                    let construction = (self.inner.factory)(key.clone())
                        .map(|result| result.map(Arc::new).map_err(Arc::new))
                        .boxed()
                        .shared();
                    entries.insert(
                        key.clone(),
                        Entry::Pending {
                            id,
                            construction: construction.clone(),
                        },
                    );
                    (id, construction)
                }
            }
        };

        let result = construction.await;

        // Whoever observes the result first promotes (or drops) the pending entry.
        let promoted = {
            let mut entries = self.inner.entries.lock();
            let is_current = matches!(
                entries.get(&key),
                Some(Entry::Pending { id: pending, .. }) if *pending == id
            );
            match &result {
                Ok(value) if is_current => {
                    entries.insert(
                        key.clone(),
                        Entry::Ready {
                            id,
                            value: Arc::clone(value),
                        },
                    );
                    Some(Arc::clone(value))
                }
                Err(_) if is_current => {
                    log::debug!(?key, id, "Resource construction failed");
                    entries.remove(&key);
                    None
                }
                _ => None,
            }
        };

        if let Some(value) = promoted {
            self.watch_eviction(key, id, &value);
        }

        result
    }

    /// Returns the instance for `key` if it is constructed already.
    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        match self.inner.entries.lock().get(key) {
            Some(Entry::Ready { value, .. }) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `key` from the cache and tears the instance down.
    ///
    /// An instance that is still being constructed is awaited first. Returns `None`
    /// if there was no entry or its construction failed.
    pub async fn evict(&self, key: &K) -> Option<Arc<T>> {
        let entry = self.inner.entries.lock().remove(key)?;
        Self::teardown_entry(key, entry).await
    }

    /// Evicts every key concurrently.
    pub async fn evict_all(&self) -> Vec<Arc<T>> {
        let entries: Vec<(K, Entry<T, E>)> = self.inner.entries.lock().drain().collect();
        join_all(
            entries
                .into_iter()
                .map(|(key, entry)| async move { Self::teardown_entry(&key, entry).await }),
        )
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    async fn teardown_entry(key: &K, entry: Entry<T, E>) -> Option<Arc<T>> {
        let value = match entry {
            Entry::Ready { value, .. } => value,
            Entry::Pending { construction, .. } => construction.await.ok()?,
        };
        if let Some(teardown) = value.teardown() {
            log::debug!(?key, "Tearing down evicted resource");
            teardown.await;
        }
        Some(value)
    }

    /// Evicts `key` only if it still maps to the instance with the given `id`.
    async fn evict_instance(inner: &Inner<K, T, E>, key: &K, id: u64) -> Option<Arc<T>> {
        let entry = {
            let mut entries = inner.entries.lock();
            if entries.get(key).map(Entry::id) != Some(id) {
                return None;
            }
            entries.remove(key)?
        };
        Self::teardown_entry(key, entry).await
    }

    fn watch_eviction(&self, key: K, id: u64, value: &Arc<T>) {
        let Some(signal) = value.eviction_signal() else {
            return;
        };
        let inner: Weak<Inner<K, T, E>> = Arc::downgrade(&self.inner);
        spawn(async move {
            signal.await;
            if let Some(inner) = inner.upgrade() {
                if Self::evict_instance(&inner, &key, id).await.is_some() {
                    log::debug!(?key, id, "Resource evicted itself");
                }
            }
        });
    }
}
