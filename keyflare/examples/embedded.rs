// Copyright 2025 KeyFlare (https://github.com/keyflare)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Embedded engine walkthrough: skewed traffic, hot key detection, a local
//! cache round trip, and the resulting top-K with trends.
//!
//! Run with `cargo run --example embedded`, then browse
//! http://localhost:9121/hot-keys while it is running.

use std::time::Duration;

use keyflare::{
    Collector, Context, DetectorConfig, Directive, MetricsOptions, Options, Policy, PolicyConfig,
    Request, Trend,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> keyflare::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyflare=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    keyflare::init(Options {
        detector: DetectorConfig {
            top_k: 10,
            hot_threshold: 100,
            ..Default::default()
        },
        policy: PolicyConfig {
            whitelist_patterns: vec!["user:.*".to_string()],
            ..Default::default()
        },
        metrics: MetricsOptions {
            collection_interval: Duration::from_secs(1),
            ..Default::default()
        },
        enable_metrics: true,
    })?;
    keyflare::start()?;

    let engine = keyflare::instance()?;
    let detector = engine.detector();
    let collector = engine.collector();

    // Skewed workload: a handful of keys take most of the traffic.
    for round in 0..500u64 {
        detector.increment("user:celebrity", 1);
        collector.record_key_access("get");
        if round % 2 == 0 {
            detector.increment("user:trending", 1);
        }
        detector.increment(&format!("user:longtail-{}", round % 50), 1);
    }

    let key = "user:celebrity";
    println!("{key} hot: {}", detector.is_hot(key));

    if let Some(policy) = engine.policy_manager().get_policy(key) {
        let applied = policy.apply(Context {
            key: key.to_string(),
            request: Request::Set {
                value: b"profile-blob".to_vec(),
                ttl: None,
            },
        });
        collector.record_policy_application("local-cache", applied.is_ok());

        match policy.apply(Context {
            key: key.to_string(),
            request: Request::Get,
        })? {
            Directive::CacheHit {
                value,
                should_refresh,
                ..
            } => println!(
                "served {} bytes locally (refresh: {should_refresh})",
                value.len()
            ),
            other => println!("unexpected directive: {other:?}"),
        }
    }

    // Let the collector take a couple of snapshots, then read the trends.
    std::thread::sleep(Duration::from_secs(3));
    if let Some(snapshot) = engine.history().latest() {
        println!("top keys at {}:", snapshot.timestamp);
        for (rank, kc) in snapshot.keys.iter().take(5).enumerate() {
            let trend = snapshot
                .key_meta
                .get(&kc.key)
                .map(|meta| Trend::derive(kc.count, meta.prev_count))
                .unwrap_or(Trend::New);
            println!("  #{} {} count={} trend={trend:?}", rank + 1, kc.key, kc.count);
        }
    }

    keyflare::shutdown()
}
