use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use ballot_test_log::test;
use ballot_utils::{Resource, ResourceCache};
use futures::{future::BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
#[error("factory failed")]
struct FactoryError;

struct Handle {
    key: String,
    teardowns: Arc<AtomicUsize>,
    closed: watch::Receiver<bool>,
}

impl Resource for Handle {
    fn teardown(&self) -> Option<BoxFuture<'_, ()>> {
        let teardowns = Arc::clone(&self.teardowns);
        Some(
            async move {
                teardowns.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        )
    }

    fn eviction_signal(&self) -> Option<BoxFuture<'static, ()>> {
        let mut closed = self.closed.clone();
        Some(
            async move {
                let _ = closed.wait_for(|closed| *closed).await;
            }
            .boxed(),
        )
    }
}

/// Bare resource without any capability.
struct Plain;

impl Resource for Plain {}

struct Fixture {
    constructions: Arc<AtomicUsize>,
    teardowns: Arc<AtomicUsize>,
    close: watch::Sender<bool>,
    cache: ResourceCache<String, Handle, FactoryError>,
}

fn fixture(delay: Duration) -> Fixture {
    let constructions = Arc::new(AtomicUsize::new(0));
    let teardowns = Arc::new(AtomicUsize::new(0));
    let (close, closed) = watch::channel(false);

    let constructions1 = Arc::clone(&constructions);
    let teardowns1 = Arc::clone(&teardowns);
    let cache = ResourceCache::new(move |key: String| {
        constructions1.fetch_add(1, Ordering::SeqCst);
        let teardowns = Arc::clone(&teardowns1);
        let closed = closed.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok(Handle {
                key,
                teardowns,
                closed,
            })
        }
        .boxed()
    });

    Fixture {
        constructions,
        teardowns,
        close,
        cache,
    }
}

#[test(tokio::test(start_paused = true))]
async fn concurrent_requests_construct_once() {
    let fixture = fixture(Duration::from_millis(50));

    let first = fixture.cache.get_or_create("k".to_owned());
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fixture.cache.get_or_create("k".to_owned()).await
    };
    let (first, second) = tokio::join!(first, second);

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(fixture.constructions.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.key, "k");
}

#[test(tokio::test(start_paused = true))]
async fn distinct_keys_get_distinct_instances() {
    let fixture = fixture(Duration::from_millis(5));

    let a = fixture.cache.get_or_create("a".to_owned()).await.unwrap();
    let b = fixture.cache.get_or_create("b".to_owned()).await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(fixture.constructions.load(Ordering::SeqCst), 2);
    assert_eq!(fixture.cache.len(), 2);
}

#[test(tokio::test(start_paused = true))]
async fn evict_then_recreate_builds_fresh_instance() {
    let fixture = fixture(Duration::from_millis(5));

    let first = fixture.cache.get_or_create("k".to_owned()).await.unwrap();
    let evicted = fixture.cache.evict(&"k".to_owned()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &evicted));
    assert_eq!(fixture.teardowns.load(Ordering::SeqCst), 1);
    assert!(fixture.cache.get(&"k".to_owned()).is_none());

    let second = fixture.cache.get_or_create("k".to_owned()).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(fixture.constructions.load(Ordering::SeqCst), 2);

    // Evicting a missing key is a no-op and tears nothing down.
    assert!(fixture.cache.evict(&"missing".to_owned()).await.is_none());
    assert_eq!(fixture.teardowns.load(Ordering::SeqCst), 1);
}

#[test(tokio::test(start_paused = true))]
async fn evicting_pending_construction_tears_it_down() {
    let fixture = fixture(Duration::from_millis(50));

    let cache = fixture.cache.clone();
    let pending = tokio::spawn(async move { cache.get_or_create("k".to_owned()).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(fixture.cache.contains(&"k".to_owned()));

    assert!(fixture.cache.evict(&"k".to_owned()).await.is_some());
    assert_eq!(fixture.teardowns.load(Ordering::SeqCst), 1);
    assert!(pending.await.unwrap().is_ok());
    assert!(!fixture.cache.contains(&"k".to_owned()));
}

#[test(tokio::test(start_paused = true))]
async fn evict_all_tears_down_every_instance() {
    let fixture = fixture(Duration::from_millis(5));

    for key in ["a", "b", "c"] {
        fixture.cache.get_or_create(key.to_owned()).await.unwrap();
    }
    let evicted = fixture.cache.evict_all().await;

    assert_eq!(evicted.len(), 3);
    assert_eq!(fixture.teardowns.load(Ordering::SeqCst), 3);
    assert!(fixture.cache.is_empty());
}

#[test(tokio::test(start_paused = true))]
async fn resources_can_evict_themselves() {
    let fixture = fixture(Duration::from_millis(5));

    fixture.cache.get_or_create("k".to_owned()).await.unwrap();
    fixture.close.send(true).unwrap();

    // Let the eviction watcher run.
    for _ in 0..10 {
        tokio::task::yield_now().await;
        if !fixture.cache.contains(&"k".to_owned()) {
            break;
        }
    }
    assert!(!fixture.cache.contains(&"k".to_owned()));
    assert_eq!(fixture.teardowns.load(Ordering::SeqCst), 1);
}

#[test(tokio::test)]
async fn failed_construction_is_not_registered() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts1 = Arc::clone(&attempts);
    let cache: ResourceCache<u8, Plain, FactoryError> = ResourceCache::new(move |_key| {
        let attempt = attempts1.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(FactoryError)
            } else {
                Ok(Plain)
            }
        }
        .boxed()
    });

    assert!(cache.get_or_create(1).await.is_err());
    assert!(!cache.contains(&1));

    assert!(cache.get_or_create(1).await.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    // No teardown capability: eviction still hands the instance back.
    assert!(cache.evict(&1).await.is_some());
}
