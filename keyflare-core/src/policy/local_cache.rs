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

//! Local cache policy: transparent in-process caching for hot keys.
//!
//! Entries live for a jittered TTL so a burst of hot keys does not expire in
//! lockstep, and carry a refresh-ahead mark: a hit past the mark is still
//! served but signals the wrapper to refresh asynchronously. The cache is
//! bounded; inserting a new key at capacity evicts the entry closest to
//! expiration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use crate::error::{KeyflareError, Result};
use crate::policy::{Context, Directive, Policy, Request};

pub const DEFAULT_CACHE_TTL: f64 = 60.0;
pub const DEFAULT_CACHE_JITTER: f64 = 0.2;
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_CACHE_REFRESH_AHEAD: f64 = 0.8;

/// Parameters for the local cache policy.
#[derive(Debug, Clone)]
pub struct LocalCacheParams {
    /// Base time-to-live for cached values, in seconds.
    pub ttl: f64,

    /// Randomness factor applied to the TTL, in [0, 1).
    pub jitter: f64,

    /// Maximum number of cached entries.
    pub capacity: usize,

    /// Fraction of the TTL after which a hit requests a refresh, in (0, 1].
    pub refresh_ahead: f64,
}

impl Default for LocalCacheParams {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            jitter: DEFAULT_CACHE_JITTER,
            capacity: DEFAULT_CACHE_CAPACITY,
            refresh_ahead: DEFAULT_CACHE_REFRESH_AHEAD,
        }
    }
}

impl LocalCacheParams {
    fn normalized(mut self) -> Self {
        if !(self.ttl > 0.0) {
            self.ttl = DEFAULT_CACHE_TTL;
        }
        if !(0.0..1.0).contains(&self.jitter) {
            self.jitter = DEFAULT_CACHE_JITTER;
        }
        if self.capacity == 0 {
            self.capacity = DEFAULT_CACHE_CAPACITY;
        }
        if !(self.refresh_ahead > 0.0 && self.refresh_ahead <= 1.0) {
            self.refresh_ahead = DEFAULT_CACHE_REFRESH_AHEAD;
        }
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
    refresh_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    fn should_refresh(&self, now: Instant) -> bool {
        now > self.refresh_at
    }
}

/// Cache occupancy counters, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    /// Entries past expiration that have not been touched (and removed) yet.
    pub expired: usize,
}

/// Bounded TTL cache with refresh-ahead signaling.
pub struct LocalCachePolicy {
    params: LocalCacheParams,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl LocalCachePolicy {
    pub fn new(params: LocalCacheParams) -> Self {
        Self {
            params: params.normalized(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn handle_get(&self, key: &str) -> Directive {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            None => Directive::CacheMiss {
                key: key.to_string(),
            },
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Directive::CacheMiss {
                    key: key.to_string(),
                }
            }
            Some(entry) => Directive::CacheHit {
                key: key.to_string(),
                value: entry.value.clone(),
                should_refresh: entry.should_refresh(now),
            },
        }
    }

    fn handle_set(&self, key: &str, value: Vec<u8>, ttl_override: Option<f64>) -> Directive {
        let mut entries = self.entries.lock();

        if !entries.contains_key(key) && entries.len() >= self.params.capacity {
            evict_earliest_expiry(&mut entries);
        }

        // An explicit override is used verbatim; otherwise the base TTL is
        // spread by a uniform draw in [-jitter, +jitter].
        let effective_ttl = ttl_override.unwrap_or_else(|| self.ttl_with_jitter()).max(0.0);
        let now = Instant::now();

        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + Duration::from_secs_f64(effective_ttl),
                refresh_at: now
                    + Duration::from_secs_f64(effective_ttl * self.params.refresh_ahead),
            },
        );

        Directive::CacheSet {
            key: key.to_string(),
            ttl: effective_ttl,
        }
    }

    fn ttl_with_jitter(&self) -> f64 {
        if self.params.jitter <= 0.0 {
            return self.params.ttl;
        }
        let unit: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        self.params.ttl * (1.0 + unit * self.params.jitter)
    }

    /// Current occupancy, counting entries already past expiration.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock();

        CacheStats {
            size: entries.len(),
            capacity: self.params.capacity,
            expired: entries.values().filter(|e| e.is_expired(now)).count(),
        }
    }
}

impl Policy for LocalCachePolicy {
    fn apply(&self, ctx: Context) -> Result<Directive> {
        match ctx.request {
            Request::Get => Ok(self.handle_get(&ctx.key)),
            Request::Set { value, ttl } => Ok(self.handle_set(&ctx.key, value, ttl)),
            Request::Delete => Err(KeyflareError::UnsupportedOperation("delete")),
        }
    }

    fn name(&self) -> &'static str {
        "local-cache"
    }
}

fn evict_earliest_expiry(entries: &mut HashMap<String, CacheEntry>) {
    let victim = entries
        .iter()
        .min_by_key(|(_, entry)| entry.expires_at)
        .map(|(key, _)| key.clone());

    if let Some(key) = victim {
        tracing::debug!(key, "evicting cache entry closest to expiration");
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(ttl: f64, jitter: f64, capacity: usize, refresh_ahead: f64) -> LocalCachePolicy {
        LocalCachePolicy::new(LocalCacheParams {
            ttl,
            jitter,
            capacity,
            refresh_ahead,
        })
    }

    fn get(policy: &LocalCachePolicy, key: &str) -> Directive {
        policy
            .apply(Context {
                key: key.to_string(),
                request: Request::Get,
            })
            .unwrap()
    }

    fn set(policy: &LocalCachePolicy, key: &str, value: &[u8], ttl: Option<f64>) -> Directive {
        policy
            .apply(Context {
                key: key.to_string(),
                request: Request::Set {
                    value: value.to_vec(),
                    ttl,
                },
            })
            .unwrap()
    }

    #[test]
    fn get_on_unknown_key_is_a_miss() {
        let policy = policy(60.0, 0.1, 100, 0.8);
        assert_eq!(
            get(&policy, "non-existent-key"),
            Directive::CacheMiss {
                key: "non-existent-key".to_string()
            }
        );
    }

    #[test]
    fn set_then_get_returns_the_value() {
        let policy = policy(60.0, 0.0, 100, 0.8);

        match set(&policy, "k", b"v", None) {
            Directive::CacheSet { key, ttl } => {
                assert_eq!(key, "k");
                assert_eq!(ttl, 60.0);
            }
            other => panic!("expected CacheSet, got {other:?}"),
        }

        match get(&policy, "k") {
            Directive::CacheHit {
                key,
                value,
                should_refresh,
            } => {
                assert_eq!(key, "k");
                assert_eq!(value, b"v");
                assert!(!should_refresh);
            }
            other => panic!("expected CacheHit, got {other:?}"),
        }
    }

    #[test]
    fn expired_entries_turn_into_misses() {
        let policy = policy(0.1, 0.0, 100, 0.8);

        set(&policy, "k", b"v", None);
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(
            get(&policy, "k"),
            Directive::CacheMiss {
                key: "k".to_string()
            }
        );
        // The expired entry was removed on the way out.
        assert_eq!(policy.stats().size, 0);
    }

    #[test]
    fn refresh_ahead_flags_aging_hits() {
        let policy = policy(1.0, 0.0, 100, 0.5);

        set(&policy, "k", b"v", None);
        std::thread::sleep(Duration::from_millis(600));

        match get(&policy, "k") {
            Directive::CacheHit {
                value,
                should_refresh,
                ..
            } => {
                assert_eq!(value, b"v");
                assert!(should_refresh);
            }
            other => panic!("expected CacheHit, got {other:?}"),
        }
    }

    #[test]
    fn fresh_hits_do_not_request_refresh() {
        let policy = policy(10.0, 0.0, 100, 0.9);
        set(&policy, "k", b"v", None);

        match get(&policy, "k") {
            Directive::CacheHit { should_refresh, .. } => assert!(!should_refresh),
            other => panic!("expected CacheHit, got {other:?}"),
        }
    }

    #[test]
    fn capacity_evicts_the_earliest_expiring_entry() {
        let policy = policy(60.0, 0.0, 2, 0.8);

        // Explicit TTL overrides make the eviction order deterministic.
        set(&policy, "short", b"a", Some(5.0));
        set(&policy, "long", b"b", Some(500.0));
        set(&policy, "new", b"c", None);

        assert!(matches!(get(&policy, "short"), Directive::CacheMiss { .. }));
        assert!(matches!(get(&policy, "long"), Directive::CacheHit { .. }));
        assert!(matches!(get(&policy, "new"), Directive::CacheHit { .. }));
        assert_eq!(policy.stats().size, 2);
    }

    #[test]
    fn overwriting_does_not_evict() {
        let policy = policy(60.0, 0.0, 2, 0.8);

        set(&policy, "a", b"1", None);
        set(&policy, "b", b"2", None);
        set(&policy, "a", b"updated", None);

        match get(&policy, "a") {
            Directive::CacheHit { value, .. } => assert_eq!(value, b"updated"),
            other => panic!("expected CacheHit, got {other:?}"),
        }
        assert!(matches!(get(&policy, "b"), Directive::CacheHit { .. }));
    }

    #[test]
    fn jittered_ttls_stay_in_range_and_vary() {
        let policy = policy(60.0, 0.2, 100, 0.8);

        let ttls: Vec<f64> = (0..20).map(|_| policy.ttl_with_jitter()).collect();
        for ttl in &ttls {
            assert!(*ttl >= 60.0 * 0.8 && *ttl <= 60.0 * 1.2, "ttl {ttl}");
        }
        assert!(ttls.iter().any(|ttl| (ttl - ttls[0]).abs() > f64::EPSILON));
    }

    #[test]
    fn ttl_override_bypasses_jitter() {
        let policy = policy(60.0, 0.5, 100, 0.8);

        for _ in 0..5 {
            match set(&policy, "k", b"v", Some(30.0)) {
                Directive::CacheSet { ttl, .. } => assert_eq!(ttl, 30.0),
                other => panic!("expected CacheSet, got {other:?}"),
            }
        }
    }

    #[test]
    fn delete_is_unsupported() {
        let policy = policy(60.0, 0.0, 100, 0.8);

        let err = policy
            .apply(Context {
                key: "k".to_string(),
                request: Request::Delete,
            })
            .unwrap_err();
        assert!(matches!(err, KeyflareError::UnsupportedOperation("delete")));
    }

    #[test]
    fn stats_count_expired_entries() {
        let policy = policy(0.1, 0.0, 100, 0.8);

        for i in 0..3 {
            set(&policy, &format!("key{i}"), b"v", None);
        }
        std::thread::sleep(Duration::from_millis(150));
        set(&policy, "fresh", b"v", Some(60.0));

        let stats = policy.stats();
        assert_eq!(stats.size, 4);
        assert_eq!(stats.capacity, 100);
        assert!(stats.expired >= 3);
    }

    #[test]
    fn invalid_params_fall_back_to_defaults() {
        let params = LocalCacheParams {
            ttl: 0.0,
            jitter: 1.5,
            capacity: 0,
            refresh_ahead: 0.0,
        }
        .normalized();

        assert_eq!(params.ttl, DEFAULT_CACHE_TTL);
        assert_eq!(params.jitter, DEFAULT_CACHE_JITTER);
        assert_eq!(params.capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(params.refresh_ahead, DEFAULT_CACHE_REFRESH_AHEAD);
    }
}
