// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic gateway usage example.
//!
//! Demonstrates:
//! 1. Building a gateway over the in-memory reference backend
//! 2. Writing and reading values through the budgeted, cached pipeline
//! 3. Watching the cache short-circuit repeat reads
//! 4. Exhausting a budget window and recovering
//! 5. Displaying the performance snapshot and exported metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use serde_json::json;

use datastore_gateway::{
    GatewayConfig, GatewayError, InMemoryStore, OpClass, StoreGateway, StoreKey,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures everything the gateway exports)
    let recorder = DebuggingRecorder::new();
    let snapshotter: Snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║          datastore-gateway: Basic Usage Example               ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and build the gateway
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring gateway (budget: 5 reads / 6s window)...");

    let config = GatewayConfig {
        budget_per_window: 5,
        read_window_secs: 6,
        cache_ttl_secs: 300,
        ..Default::default()
    };
    let gateway = StoreGateway::new(config, Arc::new(InMemoryStore::new()));

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Write a handful of player records
    // ─────────────────────────────────────────────────────────────────────────
    println!("✍️  Writing 5 player records...");

    for i in 1..=5 {
        let key = StoreKey::unscoped("PlayerData", format!("player_{i}"))?;
        let version = gateway
            .set(&key, json!({"name": format!("Player {i}"), "level": i * 10}))
            .await?;
        println!("   player_{i} written at version {version}");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Read them back - first read fetches, repeats hit the cache
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading player_1 three times...");

    let key = StoreKey::unscoped("PlayerData", "player_1")?;
    for pass in 1..=3 {
        let value = gateway.get(&key).await?.expect("player_1 should exist");
        println!(
            "   pass {pass}: level={} (read budget remaining: {})",
            value["level"],
            gateway.budget_remaining(OpClass::Read)
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Burn through the read budget on distinct keys
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔥 Exhausting the read window on uncached keys...");

    for i in 2..=6 {
        let key = StoreKey::unscoped("PlayerData", format!("player_{i}"))?;
        match gateway.get(&key).await {
            Ok(_) => println!(
                "   player_{i}: ok (remaining: {})",
                gateway.budget_remaining(OpClass::Read)
            ),
            Err(GatewayError::BudgetExceeded { retry_after, .. }) => {
                println!("   player_{i}: budget exhausted, resets in {retry_after:?}");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    // Cached keys still serve while the window is exhausted
    let cached = gateway.get(&key).await?.expect("cache should still serve");
    println!("   player_1 from cache while exhausted: level={}", cached["level"]);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Performance snapshot + exported metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Performance snapshot:");

    let snapshot = gateway.metrics_summary();
    println!("   operations (60s):  {}", snapshot.ops.sample_count);
    println!("   success rate:      {:.1}%", snapshot.ops.success_rate * 100.0);
    println!("   p95 latency:       {:?}", snapshot.ops.p95);
    println!("   cache hit rate:    {:.1}%", snapshot.cache_hit_rate * 100.0);
    println!(
        "   cache occupancy:   {} entries / {} bytes",
        snapshot.cache_entries, snapshot.cache_bytes
    );
    println!(
        "   budget remaining:  read={} write={} delete={} list={}",
        snapshot.budget_remaining.read,
        snapshot.budget_remaining.write,
        snapshot.budget_remaining.delete,
        snapshot.budget_remaining.list
    );

    let exported = snapshotter.snapshot().into_vec();
    println!("\n📈 Exported metric series: {}", exported.len());
    for (key, _, _, _) in exported.iter().take(8) {
        println!("   {}", key.key().name());
    }

    // Let the budget window roll once, to show recovery
    println!("\n⏳ Waiting for the read window to reset...");
    tokio::time::sleep(Duration::from_secs(6)).await;
    println!(
        "   read budget after reset: {}",
        gateway.budget_remaining(OpClass::Read)
    );

    println!("\n✅ Done");
    Ok(())
}
