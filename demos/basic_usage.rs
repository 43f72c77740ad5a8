//! Basic usage of the cache contract against any backend.
//!
//! Runs against the in-memory backend; with `--features redis` and
//! `REDIS_HOST` set (e.g. `localhost:6379`) it runs against Redis as well.

use cache_bridge::{backend::InMemoryBackend, error::Result, CacheBackend, Error, Expiry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Example value: Employment
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Employment {
    id: String,
    employer_name: String,
    salary: f64,
}

async fn walkthrough<B: CacheBackend>(cache: &B) -> Result<()> {
    cache.flush().await?;

    // 1. Plain set / get
    println!("1. Set and get:");
    let emp = Employment {
        id: "emp_001".to_string(),
        employer_name: "Acme Corp".to_string(),
        salary: 75000.0,
    };
    cache
        .set("employment:emp_001", &emp, Expiry::After(Duration::from_secs(60)))
        .await?;
    let loaded: Employment = cache.get("employment:emp_001").await?;
    println!(
        "   ✓ Loaded {} from {} (${:.2})\n",
        loaded.id, loaded.employer_name, loaded.salary
    );

    // 2. Add only stores once
    println!("2. Add (store only if absent):");
    cache.add("lock:report", &"worker-1", Expiry::Default).await?;
    match cache.add("lock:report", &"worker-2", Expiry::Default).await {
        Err(Error::NotStored) => println!("   ✓ Second add rejected (NotStored)\n"),
        other => println!("   ✗ Unexpected result: {:?}\n", other),
    }

    // 3. Replace only touches existing keys
    println!("3. Replace (store only if present):");
    match cache.replace("employment:emp_999", &emp, Expiry::Default).await {
        Err(Error::NotStored) => println!("   ✓ Replace of absent key rejected (NotStored)\n"),
        other => println!("   ✗ Unexpected result: {:?}\n", other),
    }

    // 4. Partial update
    println!("4. Set fields (partial update):");
    cache
        .set_fields("employment:emp_001", &json!({"salary": 80000.0}), Expiry::Never)
        .await?;
    let loaded: Employment = cache.get("employment:emp_001").await?;
    println!("   ✓ Salary is now ${:.2}\n", loaded.salary);

    // 5. Batched read
    println!("5. Get multi:");
    let getter = cache
        .get_multi(&["employment:emp_001", "employment:emp_002"])
        .await?;
    println!(
        "   ✓ emp_001 hit: {}, emp_002 miss: {}\n",
        getter.get::<Employment>("employment:emp_001").is_ok(),
        getter
            .get::<Employment>("employment:emp_002")
            .is_err_and(|e| e.is_miss())
    );

    // 6. Keys and delete
    println!("6. Keys and delete:");
    println!("   ✓ Live keys: {:?}", cache.keys().await?);
    cache.delete("lock:report").await?;
    cache.delete("lock:report").await?;
    println!("   ✓ Deleted lock:report (twice, second is a no-op)\n");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Cache Bridge - Basic Example (in-memory) ===\n");
    walkthrough(&InMemoryBackend::new()).await?;

    #[cfg(feature = "redis")]
    if let Ok(host) = std::env::var("REDIS_HOST") {
        use cache_bridge::backend::{RedisBackend, RedisConfig};

        println!("=== Cache Bridge - Basic Example (redis at {}) ===\n", host);
        let backend = RedisBackend::new(RedisConfig::default().with_host(host).with_db(15))?;
        walkthrough(&backend).await?;
    }

    println!("=== Example Complete ===\n");
    Ok(())
}
