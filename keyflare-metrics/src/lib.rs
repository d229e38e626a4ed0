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

//! KeyFlare metrics: Prometheus export and the hot-keys HTTP API.
//!
//! [`PrometheusCollector`] maintains the counter/gauge families scraped at
//! `/metrics`; [`server`] hosts the axum surface (`/`, `/metrics`,
//! `/hot-keys`). When metrics are disabled the engine installs
//! [`NoopCollector`] and starts no server.

pub mod collector;
pub mod server;

pub use collector::{Collector, NoopCollector, PrometheusCollector, DEFAULT_NAMESPACE};
pub use server::{
    parse_listen_addr, router, serve, AppState, HotKeyInfo, HotKeysResponse,
    DEFAULT_HOT_KEYS_LIMIT, DEFAULT_LISTEN_ADDR, DEFAULT_TIMESERIES_POINTS,
};
