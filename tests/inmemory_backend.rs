mod common;

use cache_bridge::backend::{InMemoryBackend, InMemoryConfig};
use cache_bridge::{CacheBackend, Expiry};
use std::time::Duration;

fn new_cache() -> InMemoryBackend {
    InMemoryBackend::with_config(InMemoryConfig {
        default_ttl: Some(Duration::from_secs(3600)),
        cleanup_interval: None,
    })
}

#[tokio::test]
async fn test_inmemory_typical_get_set() {
    common::typical_get_set(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_struct_round_trip() {
    common::struct_round_trip(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_expiration() {
    common::expiration(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_empty_cache() {
    common::empty_cache(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_replace() {
    common::replace(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_add() {
    common::add(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_set_fields() {
    common::set_fields(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_get_multi() {
    common::get_multi(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_keys() {
    common::keys(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_delete() {
    common::delete(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_flush() {
    common::flush(&new_cache(), "t").await;
}

#[tokio::test]
async fn test_inmemory_concurrent_add() {
    common::concurrent_add(&new_cache(), "t", 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inmemory_concurrent_add_across_threads() {
    let cache = new_cache();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.add("race", &i, Expiry::Default).await })
        })
        .collect();

    let mut stored = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(()) => stored += 1,
            Err(e) => assert!(e.is_not_stored(), "unexpected error: {}", e),
        }
    }
    assert_eq!(stored, 1);
}
