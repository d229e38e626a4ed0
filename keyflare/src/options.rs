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

//! Engine configuration. All fields are optional in spirit: out-of-range or
//! empty values fall back to the documented defaults during normalization.

use std::time::Duration;

use keyflare_core::history::DEFAULT_HISTORY_SIZE;
use keyflare_core::{DetectorConfig, PolicyConfig};
use keyflare_metrics::collector::DEFAULT_HOT_KEY_METRIC_LIMIT;
use keyflare_metrics::{DEFAULT_LISTEN_ADDR, DEFAULT_NAMESPACE};

pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(15);

/// Metrics and history configuration.
#[derive(Debug, Clone)]
pub struct MetricsOptions {
    /// Namespace prefix for exported metric names.
    pub namespace: String,

    /// Listen address of the metrics server; `:port` binds all interfaces.
    pub server_address: String,

    /// How often the detector's top-K is collected into history and gauges.
    pub collection_interval: Duration,

    /// Maximum number of `hot_keys` gauge labels exposed per tick.
    pub hot_key_metric_limit: usize,

    /// Number of historical snapshots kept for the hot-keys API.
    pub hot_key_history_size: usize,

    /// Whether to mount the `/hot-keys` JSON endpoint.
    pub enable_api: bool,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            server_address: DEFAULT_LISTEN_ADDR.to_string(),
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            hot_key_metric_limit: DEFAULT_HOT_KEY_METRIC_LIMIT,
            hot_key_history_size: DEFAULT_HISTORY_SIZE,
            enable_api: true,
        }
    }
}

impl MetricsOptions {
    fn normalized(mut self) -> Self {
        if self.namespace.is_empty() {
            self.namespace = DEFAULT_NAMESPACE.to_string();
        }
        if self.server_address.is_empty() {
            self.server_address = DEFAULT_LISTEN_ADDR.to_string();
        }
        if self.collection_interval.is_zero() {
            self.collection_interval = DEFAULT_COLLECTION_INTERVAL;
        }
        if self.hot_key_metric_limit == 0 {
            self.hot_key_metric_limit = DEFAULT_HOT_KEY_METRIC_LIMIT;
        }
        if self.hot_key_history_size == 0 {
            self.hot_key_history_size = DEFAULT_HISTORY_SIZE;
        }
        self
    }
}

/// Top-level engine options.
#[derive(Debug, Clone)]
pub struct Options {
    pub detector: DetectorConfig,
    pub policy: PolicyConfig,
    pub metrics: MetricsOptions,

    /// When false, a no-op collector is installed and no metrics server is
    /// started. The collection ticker still runs so history stays useful.
    pub enable_metrics: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            policy: PolicyConfig::default(),
            metrics: MetricsOptions::default(),
            enable_metrics: true,
        }
    }
}

impl Options {
    pub(crate) fn normalized(mut self) -> Self {
        self.detector = self.detector.normalized();
        self.metrics = self.metrics.normalized();
        self
    }
}
