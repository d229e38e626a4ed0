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

//! End-to-end lifecycle of the process-wide engine. The singleton is shared
//! process state, so the whole sequence runs in a single test.

use std::time::Duration;

use keyflare::{
    Context, DetectorConfig, Directive, KeyflareError, MetricsOptions, Options, Policy,
    PolicyConfig, Request,
};

fn test_options() -> Options {
    Options {
        detector: DetectorConfig {
            top_k: 10,
            hot_threshold: 5,
            ..Default::default()
        },
        policy: PolicyConfig {
            whitelist_keys: vec!["hot:item".to_string()],
            ..Default::default()
        },
        metrics: MetricsOptions {
            collection_interval: Duration::from_millis(50),
            hot_key_history_size: 5,
            ..Default::default()
        },
        // No metrics server in tests: nothing binds a port.
        enable_metrics: false,
    }
}

#[test]
fn engine_lifecycle() {
    // Everything fails before init.
    assert!(matches!(
        keyflare::start(),
        Err(KeyflareError::NotInitialized)
    ));
    assert!(matches!(
        keyflare::stop(),
        Err(KeyflareError::NotInitialized)
    ));
    assert!(matches!(
        keyflare::shutdown(),
        Err(KeyflareError::NotInitialized)
    ));
    assert!(matches!(
        keyflare::instance(),
        Err(KeyflareError::NotInitialized)
    ));

    keyflare::init(test_options()).unwrap();
    assert!(matches!(
        keyflare::init(test_options()),
        Err(KeyflareError::AlreadyInitialized)
    ));

    // Initialized but not yet running.
    assert!(matches!(
        keyflare::instance(),
        Err(KeyflareError::NotRunning)
    ));

    keyflare::start().unwrap();
    assert!(matches!(
        keyflare::start(),
        Err(KeyflareError::AlreadyRunning)
    ));

    let engine = keyflare::instance().unwrap();

    // Detection: the threshold is 5, so twenty hits are hot and one is not.
    for _ in 0..20 {
        engine.detector().increment("hot:item", 1);
    }
    engine.detector().increment("cold:item", 1);
    assert!(engine.detector().is_hot("hot:item"));
    assert!(!engine.detector().is_hot("cold:item"));

    // Mitigation: only the allow-listed key receives a policy.
    assert!(engine.policy_manager().get_policy("cold:item").is_none());
    let policy = engine.policy_manager().get_policy("hot:item").unwrap();

    let set = policy
        .apply(Context {
            key: "hot:item".to_string(),
            request: Request::Set {
                value: b"cached".to_vec(),
                ttl: None,
            },
        })
        .unwrap();
    assert!(matches!(set, Directive::CacheSet { .. }));

    match policy
        .apply(Context {
            key: "hot:item".to_string(),
            request: Request::Get,
        })
        .unwrap()
    {
        Directive::CacheHit { value, .. } => assert_eq!(value, b"cached"),
        other => panic!("expected CacheHit, got {other:?}"),
    }

    // The collection ticker feeds history even with metrics disabled.
    std::thread::sleep(Duration::from_millis(200));
    let history = engine.history();
    assert!(!history.is_empty());
    let snapshot = history.latest().unwrap();
    assert!(snapshot.keys.iter().any(|kc| kc.key == "hot:item"));

    keyflare::stop().unwrap();
    assert!(matches!(keyflare::stop(), Err(KeyflareError::NotRunning)));
    assert!(matches!(
        keyflare::instance(),
        Err(KeyflareError::NotRunning)
    ));

    // Stop keeps the instance around; it can be started again.
    keyflare::start().unwrap();
    assert!(keyflare::instance().is_ok());

    keyflare::shutdown().unwrap();
    assert!(matches!(
        keyflare::instance(),
        Err(KeyflareError::NotInitialized)
    ));

    // A fresh init after shutdown works.
    keyflare::init(test_options()).unwrap();
    keyflare::shutdown().unwrap();
}
