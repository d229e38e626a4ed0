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

//! Mitigation policies and admission control.
//!
//! A single active policy (local cache or key splitting) is gated behind an
//! allow-list of exact keys and a set of compiled regex patterns: only
//! admitted keys receive a policy handle. The policy consumes a request
//! [`Context`] and produces a [`Directive`] the client wrapper executes;
//! there is no shared method set on directives, wrappers pattern-match.

mod key_splitting;
mod local_cache;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;

use crate::error::{KeyflareError, Result};

pub use key_splitting::{KeySplittingParams, KeySplittingPolicy, DEFAULT_SHARDS};
pub use local_cache::{
    CacheStats, LocalCacheParams, LocalCachePolicy, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_JITTER,
    DEFAULT_CACHE_REFRESH_AHEAD, DEFAULT_CACHE_TTL,
};

/// The mitigation strategy applied to admitted hot keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyType {
    /// Transparent local caching with TTL, jitter, and refresh-ahead.
    LocalCache,
    /// Replication of a hot key across shard suffixes.
    KeySplitting,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::LocalCache => "local-cache",
            PolicyType::KeySplitting => "key-splitting",
        }
    }

    fn expected_params(&self) -> &'static str {
        match self {
            PolicyType::LocalCache => "LocalCacheParams",
            PolicyType::KeySplitting => "KeySplittingParams",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = KeyflareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local-cache" => Ok(PolicyType::LocalCache),
            "key-splitting" => Ok(PolicyType::KeySplitting),
            other => Err(KeyflareError::UnsupportedPolicyType(other.to_string())),
        }
    }
}

/// Policy-specific parameters, tagged so a mismatch against the declared
/// [`PolicyType`] is caught at construction rather than at apply time.
#[derive(Debug, Clone)]
pub enum PolicyParams {
    LocalCache(LocalCacheParams),
    KeySplitting(KeySplittingParams),
}

impl PolicyParams {
    fn kind(&self) -> &'static str {
        match self {
            PolicyParams::LocalCache(_) => "LocalCacheParams",
            PolicyParams::KeySplitting(_) => "KeySplittingParams",
        }
    }
}

/// Configuration for the policy manager.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub policy_type: PolicyType,
    pub params: PolicyParams,
    pub whitelist_keys: Vec<String>,
    pub whitelist_patterns: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policy_type: PolicyType::LocalCache,
            params: PolicyParams::LocalCache(LocalCacheParams::default()),
            whitelist_keys: Vec::new(),
            whitelist_patterns: Vec::new(),
        }
    }
}

/// The store operation a wrapper is about to perform on a key.
#[derive(Debug, Clone)]
pub enum Request {
    Get,
    Set {
        value: Vec<u8>,
        /// Optional TTL override in seconds; bypasses jitter when present.
        ttl: Option<f64>,
    },
    /// Counted for detection but not mitigated by any policy.
    Delete,
}

/// Runtime context for a policy application.
#[derive(Debug, Clone)]
pub struct Context {
    pub key: String,
    pub request: Request,
}

/// Instruction returned from [`Policy::apply`] for the wrapper to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Serve `value` locally; `should_refresh` asks for an async refresh.
    CacheHit {
        key: String,
        value: Vec<u8>,
        should_refresh: bool,
    },
    /// Fall through to the backend, then cache the result.
    CacheMiss { key: String },
    /// The value was cached locally with the given effective TTL (seconds).
    CacheSet { key: String, ttl: f64 },
    /// Read from `rand_shard_key`, falling back to the original key.
    KeySplittingGet {
        original_key: String,
        shard_keys: Vec<String>,
        rand_shard_key: String,
    },
    /// Write the value to the original key and replicate to all shards.
    KeySplittingSet {
        original_key: String,
        shard_keys: Vec<String>,
        value: Vec<u8>,
        ttl: Option<f64>,
    },
}

/// A mitigation policy. Applications are synchronous and cheap; they run on
/// the client's hot path.
pub trait Policy: Send + Sync {
    fn apply(&self, ctx: Context) -> Result<Directive>;

    /// Stable name used as the `policy` metric label.
    fn name(&self) -> &'static str;
}

struct AdmissionState {
    whitelist: HashSet<String>,
    patterns: Vec<(String, Regex)>,
}

/// Admission-gated dispatcher for the single active policy.
pub struct PolicyManager {
    policy: Arc<dyn Policy>,
    state: RwLock<AdmissionState>,
}

impl std::fmt::Debug for PolicyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyManager")
            .field("policy", &self.policy.name())
            .finish()
    }
}

impl PolicyManager {
    /// Builds the configured policy and seeds the allow-list.
    ///
    /// Fails with `InvalidParameters` when the parameter variant does not
    /// match the declared policy type, and with `InvalidPattern` when any
    /// initial pattern does not compile (same discipline as
    /// [`register_pattern`](Self::register_pattern)).
    pub fn new(config: PolicyConfig) -> Result<Self> {
        let policy: Arc<dyn Policy> = match (config.policy_type, config.params) {
            (PolicyType::LocalCache, PolicyParams::LocalCache(params)) => {
                Arc::new(LocalCachePolicy::new(params))
            }
            (PolicyType::KeySplitting, PolicyParams::KeySplitting(params)) => {
                Arc::new(KeySplittingPolicy::new(params))
            }
            (policy_type, params) => {
                return Err(KeyflareError::InvalidParameters {
                    expected: policy_type.expected_params(),
                    got: params.kind(),
                })
            }
        };

        tracing::debug!(policy = policy.name(), "policy manager initialized");

        let manager = Self {
            policy,
            state: RwLock::new(AdmissionState {
                whitelist: config.whitelist_keys.into_iter().collect(),
                patterns: Vec::new(),
            }),
        };

        for pattern in &config.whitelist_patterns {
            manager.register_pattern(pattern)?;
        }

        Ok(manager)
    }

    /// Returns the active policy iff `key` is allow-listed or matches any
    /// registered pattern.
    pub fn get_policy(&self, key: &str) -> Option<Arc<dyn Policy>> {
        let state = self.state.read();

        if state.whitelist.contains(key) {
            return Some(Arc::clone(&self.policy));
        }
        if state.patterns.iter().any(|(_, regex)| regex.is_match(key)) {
            return Some(Arc::clone(&self.policy));
        }
        None
    }

    /// Compiles and registers an admission pattern. Registering the same
    /// pattern source twice keeps a single compiled instance.
    pub fn register_pattern(&self, pattern: &str) -> Result<()> {
        let compiled = Regex::new(pattern).map_err(|source| KeyflareError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut state = self.state.write();
        if !state.patterns.iter().any(|(source, _)| source == pattern) {
            state.patterns.push((pattern.to_string(), compiled));
        }
        Ok(())
    }

    pub fn add_whitelist_key(&self, key: &str) {
        self.state.write().whitelist.insert(key.to_string());
    }

    pub fn remove_whitelist_key(&self, key: &str) {
        self.state.write().whitelist.remove(key);
    }

    /// Name of the active policy, for metric labels.
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }
}
