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

//! KeyFlare: client-side hot key detection and mitigation.
//!
//! KeyFlare embeds in the process talking to a sharded key-value store. On
//! every request the client wrapper feeds the detector, asks whether the
//! key is hot, and — for admitted hot keys — applies a mitigation policy:
//! transparent local caching with refresh-ahead, or key splitting across
//! shard replicas. A background ticker snapshots the top-K into history,
//! served as Prometheus gauges and a JSON trends API.
//!
//! ```rust,no_run
//! use keyflare::{Context, Directive, Options, Policy, Request};
//!
//! fn main() -> keyflare::Result<()> {
//!     keyflare::init(Options::default())?;
//!     keyflare::start()?;
//!
//!     let engine = keyflare::instance()?;
//!     engine.detector().increment("user:42", 1);
//!     if engine.detector().is_hot("user:42") {
//!         if let Some(policy) = engine.policy_manager().get_policy("user:42") {
//!             match policy.apply(Context {
//!                 key: "user:42".to_string(),
//!                 request: Request::Get,
//!             })? {
//!                 Directive::CacheHit { value, .. } => { /* serve locally */ }
//!                 Directive::CacheMiss { .. } => { /* read backend, then cache */ }
//!                 _ => {}
//!             }
//!         }
//!     }
//!
//!     keyflare::shutdown()
//! }
//! ```
//!
//! Mitigation is best-effort by contract: on any policy error the wrapper
//! must still complete the underlying store operation.

mod engine;
mod options;

pub use engine::{init, instance, shutdown, start, stop, Engine};
pub use options::{MetricsOptions, Options, DEFAULT_COLLECTION_INTERVAL};

pub use keyflare_core::{
    Context, Detector, DetectorConfig, Directive, KeyCount, KeySplittingParams, KeyflareError,
    LocalCacheParams, Policy, PolicyConfig, PolicyManager, PolicyParams, PolicyType, Request,
    Result, Snapshot, SnapshotHistory, TimeSeriesPoint, Trend,
};
pub use keyflare_metrics::{Collector, NoopCollector, PrometheusCollector};
