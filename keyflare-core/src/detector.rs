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

//! Hot key detector.
//!
//! Combines a Count-Min Sketch (per-key count approximation) with a
//! Space-Saving tracker (bounded top-K membership) under a single exclusive
//! lock, and ages the sketch with a decay clock so the detector adapts to
//! shifting workloads. Decay is applied on demand at increment time, before
//! the current add, so the current event is not itself attenuated.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::count_min::CountMinSketch;
use crate::space_saving::SpaceSaving;

pub const DEFAULT_ERROR_RATE: f64 = 0.01;
pub const DEFAULT_TOP_K: usize = 100;
pub const DEFAULT_DECAY_FACTOR: f64 = 0.98;
pub const DEFAULT_DECAY_INTERVAL: Duration = Duration::from_secs(60);

// Confidence parameter for the sketch (99%).
const SKETCH_DELTA: f64 = 0.01;

/// Detector configuration. Out-of-range fields fall back to the defaults
/// above; `hot_threshold` of 0 switches hotness to top-K membership.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Acceptable error rate for the frequency sketch.
    pub error_rate: f64,

    /// Number of top hot keys to track.
    pub top_k: usize,

    /// Factor applied to aged counts, in (0, 1].
    pub decay_factor: f64,

    /// Minimum interval between decay passes.
    pub decay_interval: Duration,

    /// Keys at or above this estimated count are hot. 0 means hotness is
    /// determined by top-K membership instead.
    pub hot_threshold: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            error_rate: DEFAULT_ERROR_RATE,
            top_k: DEFAULT_TOP_K,
            decay_factor: DEFAULT_DECAY_FACTOR,
            decay_interval: DEFAULT_DECAY_INTERVAL,
            hot_threshold: 0,
        }
    }
}

impl DetectorConfig {
    /// Replaces out-of-range fields with defaults.
    pub fn normalized(mut self) -> Self {
        if !(self.error_rate > 0.0) {
            self.error_rate = DEFAULT_ERROR_RATE;
        }
        if self.top_k == 0 {
            self.top_k = DEFAULT_TOP_K;
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            self.decay_factor = DEFAULT_DECAY_FACTOR;
        }
        if self.decay_interval.is_zero() {
            self.decay_interval = DEFAULT_DECAY_INTERVAL;
        }
        self
    }
}

/// A key and its estimated access count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

struct DetectorState {
    sketch: CountMinSketch,
    top_keys: SpaceSaving,
    last_decay: Instant,
}

/// Thread-safe hot key detector.
pub struct Detector {
    config: DetectorConfig,
    state: Mutex<DetectorState>,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        let config = config.normalized();
        let state = DetectorState {
            sketch: CountMinSketch::new(config.error_rate, SKETCH_DELTA),
            top_keys: SpaceSaving::new(config.top_k),
            last_decay: Instant::now(),
        };

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Records `count` accesses of `key`, applying a decay pass first when
    /// the decay interval has elapsed.
    pub fn increment(&self, key: &str, count: u64) {
        let mut state = self.state.lock();

        let now = Instant::now();
        if now.duration_since(state.last_decay) >= self.config.decay_interval {
            state.sketch.decay(self.config.decay_factor);
            state.last_decay = now;
        }

        state.sketch.add(key.as_bytes(), count);
        state.top_keys.add(key, count);
    }

    /// Estimated access count for `key`.
    pub fn get_count(&self, key: &str) -> u64 {
        self.state.lock().sketch.estimate(key.as_bytes())
    }

    /// Current top-K keys, ordered by count descending.
    ///
    /// Membership comes from the Space-Saving tracker, but each count is
    /// re-estimated from the sketch (the tighter of the two estimators) and
    /// the list re-sorted by that count.
    pub fn top_k(&self) -> Vec<KeyCount> {
        let state = self.state.lock();

        let mut result: Vec<KeyCount> = state
            .top_keys
            .top_k(self.config.top_k)
            .into_iter()
            .map(|entry| KeyCount {
                count: state.sketch.estimate(entry.key.as_bytes()),
                key: entry.key,
            })
            .collect();

        result.sort_by(|a, b| b.count.cmp(&a.count));
        result
    }

    /// Whether `key` is currently considered hot.
    pub fn is_hot(&self, key: &str) -> bool {
        if self.config.hot_threshold > 0 {
            return self.get_count(key) >= self.config.hot_threshold;
        }
        self.top_k().iter().any(|kc| kc.key == key)
    }

    /// Clears all counts and restarts the decay clock.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.sketch.reset();
        state.top_keys = SpaceSaving::new(self.config.top_k);
        state.last_decay = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_out_of_range_fields() {
        let config = DetectorConfig {
            error_rate: 0.0,
            top_k: 0,
            decay_factor: -1.0,
            decay_interval: Duration::ZERO,
            hot_threshold: 0,
        }
        .normalized();

        assert_eq!(config.error_rate, DEFAULT_ERROR_RATE);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.decay_factor, DEFAULT_DECAY_FACTOR);
        assert_eq!(config.decay_interval, DEFAULT_DECAY_INTERVAL);
    }

    #[test]
    fn counts_track_relative_frequency() {
        let detector = Detector::new(DetectorConfig {
            top_k: 10,
            ..Default::default()
        });

        for _ in 0..100 {
            detector.increment("key1", 1);
        }
        for _ in 0..50 {
            detector.increment("key2", 1);
        }

        assert!(detector.get_count("key1") >= detector.get_count("key2"));
        assert!(detector.get_count("key1") >= 100);
    }

    #[test]
    fn top_k_is_sorted_by_estimate() {
        let detector = Detector::new(DetectorConfig {
            top_k: 3,
            ..Default::default()
        });

        for _ in 0..100 {
            detector.increment("popular", 1);
        }
        for _ in 0..50 {
            detector.increment("medium", 1);
        }
        for _ in 0..10 {
            detector.increment("rare", 1);
        }

        let top = detector.top_k();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].key, "popular");
        for pair in top.windows(2) {
            assert!(pair[0].count >= pair[1].count);
        }
    }

    #[test]
    fn hotness_by_threshold() {
        let detector = Detector::new(DetectorConfig {
            top_k: 3,
            hot_threshold: 50,
            ..Default::default()
        });

        for _ in 0..100 {
            detector.increment("popular", 1);
        }
        for _ in 0..10 {
            detector.increment("rare", 1);
        }

        assert!(detector.is_hot("popular"));
        assert!(!detector.is_hot("rare"));
        // Threshold semantics: hot iff estimate >= threshold.
        assert_eq!(
            detector.is_hot("popular"),
            detector.get_count("popular") >= 50
        );
    }

    #[test]
    fn hotness_by_top_k_membership() {
        let detector = Detector::new(DetectorConfig {
            top_k: 2,
            hot_threshold: 0,
            ..Default::default()
        });

        detector.increment("a", 100);
        detector.increment("b", 50);
        detector.increment("c", 1);

        assert!(detector.is_hot("a"));
        assert!(detector.is_hot("b"));
        assert!(!detector.is_hot("never-seen"));
    }

    #[test]
    fn decay_runs_after_interval() {
        let detector = Detector::new(DetectorConfig {
            decay_factor: 0.5,
            decay_interval: Duration::from_millis(50),
            ..Default::default()
        });

        detector.increment("aging", 100);
        std::thread::sleep(Duration::from_millis(80));
        // The decay pass runs before this add, so the event itself is kept.
        detector.increment("aging", 1);

        let count = detector.get_count("aging");
        assert!(count >= 51);
        assert!(count < 100);
    }

    #[test]
    fn reset_clears_both_structures() {
        let detector = Detector::new(DetectorConfig {
            top_k: 10,
            ..Default::default()
        });

        detector.increment("key1", 100);
        detector.increment("key2", 50);
        assert!(detector.get_count("key1") > 0);

        detector.reset();

        assert_eq!(detector.get_count("key1"), 0);
        assert_eq!(detector.get_count("key2"), 0);
        assert!(detector.top_k().is_empty());
    }

    #[test]
    fn concurrent_increments_are_safe() {
        let detector = std::sync::Arc::new(Detector::new(DetectorConfig::default()));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let detector = detector.clone();
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        detector.increment(&format!("w{worker}-k{}", i % 5), 1);
                        detector.increment("shared", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(detector.get_count("shared") >= 1600);
        assert!(detector.is_hot("shared"));
    }
}
