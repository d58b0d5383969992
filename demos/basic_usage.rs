// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic cache-persist usage example.
//!
//! Demonstrates:
//! 1. A cache persisted into a JSON file
//! 2. Burst writes collapsing into one flush
//! 3. Restoring the state in a fresh cache
//! 4. An offline queue replaying records on reconnect
//! 5. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::{json, Value};

use cache_persist::offline::{ManualNetwork, OfflineFirst, OfflineHandler, OfflineRecord, Publish};
use cache_persist::{Cache, CacheConfig, CacheOptions, DataCache, JsonFileStorage, OfflineError, OfflineOptions};

/// Pretends to call a remote API.
struct PrintApi;

#[async_trait]
impl OfflineHandler<Value> for PrintApi {
    async fn execute(&self, record: &OfflineRecord<Value>) -> Result<Value, OfflineError> {
        println!("   → executing {} {}", record.id, record.request.payload);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(json!({"status": 201}))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           cache-persist: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    let dir = std::env::temp_dir().join("cache-persist-demo");
    let path = dir.join("todos.json");
    let _ = std::fs::remove_file(&path);

    let options = || {
        CacheOptions::new(CacheConfig {
            prefix: Some("todos".into()),
            throttle_ms: 100,
            max_wait_ms: 300,
            ..Default::default()
        })
        .with_storage(Arc::new(JsonFileStorage::new(&path)))
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Write a burst
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Writing 5 todos (one burst)...");
    let cache = Cache::new(options());
    cache.restore().await?;

    let _sub = cache.subscribe(Arc::new(|state: &DataCache, message: Option<&str>| {
        println!("   👀 observer: {} entries ({})", state.len(), message.unwrap_or("-"));
    }));

    for i in 1..=5 {
        cache.set(&format!("todo{}", i), json!({"title": format!("task {}", i), "done": false}));
    }
    cache.set("todo3", json!({"title": "task 3", "done": true}));
    cache.remove("todo5");
    cache.notify(None, Some("burst applied"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("   ✓ Flushed in the background to {}\n", path.display());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Restore into a fresh cache
    // ─────────────────────────────────────────────────────────────────────────
    println!("🔄 Restoring into a fresh cache...");
    let reopened = Cache::new(options());
    reopened.restore().await?;
    for key in reopened.get_all_keys() {
        println!("   ├─ {} = {}", key, reopened.get(&key).unwrap_or(Value::Null));
    }
    println!("   └─ state: {}\n", reopened.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Offline queue
    // ─────────────────────────────────────────────────────────────────────────
    println!("📡 Queueing mutations while offline...");
    let network = Arc::new(ManualNetwork::new(false));
    let queue = OfflineFirst::new(PrintApi, OfflineOptions::default().with_network(network.clone()));
    queue.hydrate().await?;

    queue.publish(Publish::new(json!({"op": "add", "title": "buy milk"}))).await?;
    queue.publish(Publish::new(json!({"op": "rename", "title": "buy oat milk"})).serial(true)).await?;
    println!("   ├─ pending: {}", queue.get_list_mutation()?.len());

    network.set_online(true);
    while !queue.get_list_mutation()?.is_empty() || queue.is_processing() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("   └─ pending after reconnect: {}\n", queue.get_list_mutation()?.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("📊 Metrics:");
    dump_metrics(&snapshotter);

    let _ = std::fs::remove_file(&path);
    println!("\n✅ Done");
    Ok(())
}

/// Dump all captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => format!("{}", v),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.4}", samples.len(), sum)
                }
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   ├─ {}", line);
    }
}
