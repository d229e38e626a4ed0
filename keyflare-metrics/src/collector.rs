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

//! Prometheus metric families for hot key observability.
//!
//! Exposed metrics (default namespace `keyflare`):
//! - `<ns>_key_access_total{operation}` — counter of key accesses
//! - `<ns>_policy_application_total{policy, success}` — counter of
//!   mitigations applied
//! - `<ns>_hot_keys{key}` — gauge of current hot key counts, reset on every
//!   collection tick and capped at the configured label limit
//! - `<ns>_top_k_keys_count` — gauge of the top-K list size

use prometheus::{GaugeVec, IntCounterVec, IntGauge, Opts, Registry};

use keyflare_core::KeyCount;

pub const DEFAULT_NAMESPACE: &str = "keyflare";
pub const DEFAULT_HOT_KEY_METRIC_LIMIT: usize = 10;

/// Sink for engine and wrapper instrumentation.
pub trait Collector: Send + Sync {
    /// Records one key access for the given operation (`get`, `set`, ...).
    fn record_key_access(&self, operation: &str);

    /// Records a policy application and whether it succeeded.
    fn record_policy_application(&self, policy: &str, success: bool);

    /// Replaces the exported hot key gauges with the given top-K list.
    fn update_hot_keys(&self, hot_keys: &[KeyCount]);
}

/// Collector backed by a dedicated Prometheus registry.
pub struct PrometheusCollector {
    registry: Registry,
    key_access_total: IntCounterVec,
    policy_application_total: IntCounterVec,
    hot_keys: GaugeVec,
    top_k_keys_count: IntGauge,
    hot_key_metric_limit: usize,
}

impl PrometheusCollector {
    /// Creates the metric families and registers them in a fresh registry.
    ///
    /// Registration cannot collide in a registry created here, so failures
    /// are treated as fatal, matching `MustRegister` semantics.
    pub fn new(namespace: &str, hot_key_metric_limit: usize) -> Self {
        let namespace = if namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            namespace
        };
        let hot_key_metric_limit = if hot_key_metric_limit == 0 {
            DEFAULT_HOT_KEY_METRIC_LIMIT
        } else {
            hot_key_metric_limit
        };

        let registry = Registry::new();

        let key_access_total = IntCounterVec::new(
            Opts::new("key_access_total", "Total number of key accesses")
                .namespace(namespace.to_string()),
            &["operation"],
        )
        .expect("key_access_total metric");
        let policy_application_total = IntCounterVec::new(
            Opts::new(
                "policy_application_total",
                "Total number of policy applications",
            )
            .namespace(namespace.to_string()),
            &["policy", "success"],
        )
        .expect("policy_application_total metric");
        let hot_keys = GaugeVec::new(
            Opts::new("hot_keys", "Currently detected hot keys and their counts")
                .namespace(namespace.to_string()),
            &["key"],
        )
        .expect("hot_keys metric");
        let top_k_keys_count = IntGauge::with_opts(
            Opts::new("top_k_keys_count", "Number of keys in the top K list")
                .namespace(namespace.to_string()),
        )
        .expect("top_k_keys_count metric");

        registry
            .register(Box::new(key_access_total.clone()))
            .expect("register key_access_total");
        registry
            .register(Box::new(policy_application_total.clone()))
            .expect("register policy_application_total");
        registry
            .register(Box::new(hot_keys.clone()))
            .expect("register hot_keys");
        registry
            .register(Box::new(top_k_keys_count.clone()))
            .expect("register top_k_keys_count");

        Self {
            registry,
            key_access_total,
            policy_application_total,
            hot_keys,
            top_k_keys_count,
            hot_key_metric_limit,
        }
    }

    /// The registry backing the `/metrics` exposition.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Collector for PrometheusCollector {
    fn record_key_access(&self, operation: &str) {
        self.key_access_total.with_label_values(&[operation]).inc();
    }

    fn record_policy_application(&self, policy: &str, success: bool) {
        let success = if success { "true" } else { "false" };
        self.policy_application_total
            .with_label_values(&[policy, success])
            .inc();
    }

    fn update_hot_keys(&self, hot_keys: &[KeyCount]) {
        // Stale keys must not linger between ticks.
        self.hot_keys.reset();

        for kc in hot_keys.iter().take(self.hot_key_metric_limit) {
            self.hot_keys
                .with_label_values(&[&kc.key])
                .set(kc.count as f64);
        }
        self.top_k_keys_count.set(hot_keys.len() as i64);
    }
}

/// Collector that discards everything; installed when metrics are disabled.
pub struct NoopCollector;

impl Collector for NoopCollector {
    fn record_key_access(&self, _operation: &str) {}
    fn record_policy_application(&self, _policy: &str, _success: bool) {}
    fn update_hot_keys(&self, _hot_keys: &[KeyCount]) {}
}
