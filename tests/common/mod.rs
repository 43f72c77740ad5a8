//! Behaviour every backend must share.
//!
//! Each check takes a key namespace so runs against a shared server do not
//! see each other's keys.

#![allow(dead_code)]

use cache_bridge::{CacheBackend, Error, Expiry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const SHORT_TTL: Duration = Duration::from_millis(50);
pub const SLEEP_MARGIN: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foo {
    pub bar: String,
}

pub fn key(ns: &str, name: &str) -> String {
    format!("{}:{}", ns, name)
}

pub async fn typical_get_set<B: CacheBackend>(cache: &B, ns: &str) {
    let k = key(ns, "value");
    cache
        .set(&k, "foo", Expiry::After(Duration::from_secs(30)))
        .await
        .expect("Error setting a value");

    let value: String = cache.get(&k).await.expect("Error getting a value");
    assert_eq!(value, "foo");
}

pub async fn struct_round_trip<B: CacheBackend>(cache: &B, ns: &str) {
    let k = key(ns, "foo");
    let foo = Foo {
        bar: "baz".to_string(),
    };
    cache.set(&k, &foo, Expiry::Default).await.expect("set");
    assert_eq!(cache.get::<Foo>(&k).await.expect("get"), foo);

    // Stored shape does not fit the requested type.
    assert!(matches!(
        cache.get::<u64>(&k).await,
        Err(Error::DeserializationError(_))
    ));
}

pub async fn expiration<B: CacheBackend>(cache: &B, ns: &str) {
    let k = key(ns, "int");

    cache.set(&k, &10, SHORT_TTL.into()).await.expect("Set failed");
    tokio::time::sleep(SHORT_TTL + SLEEP_MARGIN).await;
    assert_eq!(cache.get::<i32>(&k).await, Err(Error::CacheMiss));

    cache
        .set(&k, &10, Duration::from_secs(3600).into())
        .await
        .expect("Set failed");
    tokio::time::sleep(SLEEP_MARGIN).await;
    assert_eq!(cache.get::<i32>(&k).await, Ok(10));

    cache.set(&k, &11, Expiry::Never).await.expect("Set failed");
    tokio::time::sleep(SLEEP_MARGIN).await;
    assert_eq!(cache.get::<i32>(&k).await, Ok(11));

    // Too long for any store to express: kept without expiry.
    cache
        .set(&k, &12, Expiry::After(Duration::MAX))
        .await
        .expect("Set with overlong TTL failed");
    assert_eq!(cache.get::<i32>(&k).await, Ok(12));
}

pub async fn empty_cache<B: CacheBackend>(cache: &B, ns: &str) {
    let k = key(ns, "notexist");
    assert_eq!(cache.get::<i32>(&k).await, Err(Error::CacheMiss));
    // Deleting an absent key is not an error on any backend.
    cache.delete(&k).await.expect("delete of absent key");
}

pub async fn replace<B: CacheBackend>(cache: &B, ns: &str) {
    let absent = key(ns, "notexist");
    assert_eq!(
        cache.replace(&absent, &1, Expiry::Never).await,
        Err(Error::NotStored)
    );
    assert_eq!(cache.get::<i32>(&absent).await, Err(Error::CacheMiss));

    let k = key(ns, "int");
    cache
        .set(&k, &1, Duration::from_millis(300).into())
        .await
        .expect("set");
    cache
        .replace(&k, &2, Duration::from_millis(300).into())
        .await
        .expect("replace of live entry");
    assert_eq!(cache.get::<i32>(&k).await, Ok(2));

    // Expired entries cannot be replaced.
    tokio::time::sleep(Duration::from_millis(300) + SLEEP_MARGIN).await;
    assert_eq!(
        cache.replace(&k, &3, Duration::from_secs(1).into()).await,
        Err(Error::NotStored)
    );
    assert_eq!(cache.get::<i32>(&k).await, Err(Error::CacheMiss));
}

pub async fn add<B: CacheBackend>(cache: &B, ns: &str) {
    let k = key(ns, "int");
    cache
        .add(&k, &1, Duration::from_millis(300).into())
        .await
        .expect("add to empty cache");
    assert_eq!(
        cache.add(&k, &2, Duration::from_millis(300).into()).await,
        Err(Error::NotStored)
    );
    assert_eq!(cache.get::<i32>(&k).await, Ok(1));

    tokio::time::sleep(Duration::from_millis(300) + SLEEP_MARGIN).await;
    cache
        .add(&k, &3, Duration::from_secs(5).into())
        .await
        .expect("add after expiry");
    assert_eq!(cache.get::<i32>(&k).await, Ok(3));
}

pub async fn set_fields<B: CacheBackend>(cache: &B, ns: &str) {
    let k = key(ns, "hash");
    cache
        .set(&k, &json!({"field": "foo", "b": 2}), Expiry::Default)
        .await
        .expect("set");
    cache
        .set_fields(&k, &json!({"field2": 2, "b": 3}), Expiry::Default)
        .await
        .expect("set_fields");

    let merged: Value = cache.get(&k).await.expect("get");
    assert_eq!(merged, json!({"field": "foo", "field2": 2, "b": 3}));

    let scalar = key(ns, "scalar");
    cache.set(&scalar, &2, Expiry::Default).await.expect("set");
    assert!(matches!(
        cache
            .set_fields(&scalar, &json!({"field2": 2}), Expiry::Default)
            .await,
        Err(Error::TypeMismatch(_))
    ));
    assert_eq!(cache.get::<i32>(&scalar).await, Ok(2));

    assert_eq!(
        cache
            .set_fields(&key(ns, "absent"), &json!({"a": 1}), Expiry::Default)
            .await,
        Err(Error::NotStored)
    );
}

pub async fn get_multi<B: CacheBackend>(cache: &B, ns: &str) {
    let (s, n, f, missing) = (
        key(ns, "str"),
        key(ns, "num"),
        key(ns, "foo"),
        key(ns, "missing"),
    );
    cache.set(&s, "foo", Expiry::Default).await.expect("set");
    cache.set(&n, &42, Expiry::Default).await.expect("set");
    cache
        .set(
            &f,
            &Foo {
                bar: "baz".to_string(),
            },
            Expiry::Default,
        )
        .await
        .expect("set");

    let getter = cache
        .get_multi(&[s.as_str(), n.as_str(), f.as_str(), missing.as_str()])
        .await
        .expect("get_multi");

    assert_eq!(getter.get::<String>(&s).expect("str"), "foo");
    assert_eq!(getter.get::<i32>(&n).expect("num"), 42);
    assert_eq!(getter.get::<Foo>(&f).expect("foo").bar, "baz");
    assert_eq!(getter.get::<i32>(&missing), Err(Error::CacheMiss));
    assert_eq!(getter.len(), 3);

    // The result is a snapshot.
    cache.delete(&n).await.expect("delete");
    assert_eq!(getter.get::<i32>(&n).expect("num"), 42);

    assert!(cache.get_multi(&[]).await.expect("empty").is_empty());
}

pub async fn keys<B: CacheBackend>(cache: &B, ns: &str) {
    let expected = vec![key(ns, "foo"), key(ns, "num"), key(ns, "str")];
    for k in &expected {
        cache.set(k, &1, Expiry::Default).await.expect("set");
    }

    let prefix = format!("{}:", ns);
    let mut listed: Vec<String> = cache
        .keys()
        .await
        .expect("keys")
        .into_iter()
        .filter(|k| k.starts_with(&prefix))
        .collect();
    listed.sort();
    assert_eq!(listed, expected);
}

pub async fn delete<B: CacheBackend>(cache: &B, ns: &str) {
    let k = key(ns, "doomed");
    cache.set(&k, &1, Expiry::Default).await.expect("set");
    cache.delete(&k).await.expect("delete");
    assert_eq!(cache.get::<i32>(&k).await, Err(Error::CacheMiss));
    cache.delete(&k).await.expect("second delete");
}

pub async fn flush<B: CacheBackend>(cache: &B, ns: &str) {
    cache.set(&key(ns, "a"), &1, Expiry::Default).await.expect("set");
    cache.set(&key(ns, "b"), &2, Expiry::Never).await.expect("set");

    cache.flush().await.expect("flush");

    assert!(cache.keys().await.expect("keys").is_empty());
    assert_eq!(cache.get::<i32>(&key(ns, "a")).await, Err(Error::CacheMiss));
}

/// `n` concurrent adds of one absent key: exactly one wins.
pub async fn concurrent_add<B: CacheBackend>(cache: &B, ns: &str, n: usize) {
    let k = key(ns, "contended");
    let k = k.as_str();

    let results = futures::future::join_all(
        (0..n).map(|i| async move { cache.add(k, &i, Expiry::Default).await }),
    )
    .await;

    let winners: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_ok())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(winners.len(), 1, "results: {:?}", results);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| *r == Err(Error::NotStored)));

    assert_eq!(cache.get::<usize>(&k).await, Ok(winners[0]));
}
