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

//! Snapshot history: a bounded ring of top-K observations.
//!
//! Each collection tick appends a snapshot of the detector's top-K list,
//! enriched with per-key metadata (first/last seen, previous count). The
//! previous count is updated only *after* the snapshot is materialized, so
//! every snapshot carries the prior interval's counts as its reference and
//! trend derivation compares current against previous accurately.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::detector::KeyCount;

pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Per-key observation metadata, process-wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMetadata {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub prev_count: u64,
}

/// One top-K observation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub keys: Vec<KeyCount>,
    /// Metadata for the keys in this snapshot, as of before this snapshot's
    /// counts were folded in.
    pub key_meta: HashMap<String, KeyMetadata>,
}

/// One point of a per-key time series.
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    /// Key to count at this snapshot (0 if absent).
    pub keys: HashMap<String, u64>,
    /// Key to accesses per second since the previous point.
    pub rates: HashMap<String, f64>,
    /// Seconds since the previous point, 0 at the first.
    pub interval: f64,
}

/// Direction of a key's count between consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    New,
    Rising,
    Falling,
    Stable,
}

impl Trend {
    /// Derives a trend from the current count and the previous one.
    pub fn derive(current: u64, prev: u64) -> Self {
        if prev == 0 {
            Trend::New
        } else if current > prev {
            Trend::Rising
        } else if current < prev {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }
}

struct HistoryState {
    snapshots: VecDeque<Snapshot>,
    key_meta: HashMap<String, KeyMetadata>,
}

/// Bounded ring of snapshots with O(1) latest access.
pub struct SnapshotHistory {
    max_size: usize,
    state: RwLock<HistoryState>,
}

impl SnapshotHistory {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            state: RwLock::new(HistoryState {
                snapshots: VecDeque::with_capacity(max_size),
                key_meta: HashMap::new(),
            }),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.state.read().snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().snapshots.is_empty()
    }

    /// Appends a snapshot of the given top-K list, dropping the oldest when
    /// the ring is full.
    pub fn add(&self, keys: &[KeyCount]) {
        let now = Utc::now();
        let mut state = self.state.write();

        let mut snapshot_meta = HashMap::with_capacity(keys.len());
        for kc in keys {
            let meta = state
                .key_meta
                .entry(kc.key.clone())
                .and_modify(|meta| meta.last_seen = now)
                .or_insert(KeyMetadata {
                    first_seen: now,
                    last_seen: now,
                    prev_count: 0,
                });
            snapshot_meta.insert(kc.key.clone(), meta.clone());
        }

        state.snapshots.push_back(Snapshot {
            timestamp: now,
            keys: keys.to_vec(),
            key_meta: snapshot_meta,
        });
        if state.snapshots.len() > self.max_size {
            state.snapshots.pop_front();
        }

        // Only now that the snapshot holds the prior counts: roll prev_count
        // forward so the next snapshot compares against this one.
        for kc in keys {
            if let Some(meta) = state.key_meta.get_mut(&kc.key) {
                meta.prev_count = kc.count;
            }
        }
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Option<Snapshot> {
        self.state.read().snapshots.back().cloned()
    }

    /// Per-key counts and rates over at most the last `max_points`
    /// snapshots. The rate at a point is `max(0, Δcount) / Δt` against the
    /// previous returned point (0 at the first point, and treating keys
    /// absent from a snapshot as count 0).
    pub fn time_series(&self, keys: &[String], max_points: usize) -> Vec<TimeSeriesPoint> {
        let state = self.state.read();
        if state.snapshots.is_empty() {
            return Vec::new();
        }

        let start = if max_points > 0 {
            state.snapshots.len().saturating_sub(max_points)
        } else {
            0
        };

        let mut points = Vec::with_capacity(state.snapshots.len() - start);
        let mut prev_counts: HashMap<&str, u64> = HashMap::new();
        let mut prev_timestamp: Option<DateTime<Utc>> = None;

        for snapshot in state.snapshots.iter().skip(start) {
            let interval = prev_timestamp
                .map(|prev| (snapshot.timestamp - prev).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0);

            let mut counts = HashMap::with_capacity(keys.len());
            let mut rates = HashMap::with_capacity(keys.len());

            for key in keys {
                let current = snapshot
                    .keys
                    .iter()
                    .find(|kc| &kc.key == key)
                    .map(|kc| kc.count)
                    .unwrap_or(0);

                let rate = if prev_timestamp.is_some() && interval > 0.0 {
                    let prev = prev_counts.get(key.as_str()).copied().unwrap_or(0);
                    current.saturating_sub(prev) as f64 / interval
                } else {
                    0.0
                };

                counts.insert(key.clone(), current);
                rates.insert(key.clone(), rate);
                prev_counts.insert(key.as_str(), current);
            }

            points.push(TimeSeriesPoint {
                timestamp: snapshot.timestamp,
                keys: counts,
                rates,
                interval,
            });
            prev_timestamp = Some(snapshot.timestamp);
        }

        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> Vec<KeyCount> {
        pairs
            .iter()
            .map(|(key, count)| KeyCount {
                key: key.to_string(),
                count: *count,
            })
            .collect()
    }

    #[test]
    fn trend_derivation() {
        assert_eq!(Trend::derive(30, 0), Trend::New);
        assert_eq!(Trend::derive(80, 50), Trend::Rising);
        assert_eq!(Trend::derive(120, 200), Trend::Falling);
        assert_eq!(Trend::derive(100, 100), Trend::Stable);
    }

    #[test]
    fn snapshot_carries_prior_counts_for_trends() {
        let history = SnapshotHistory::new(5);

        history.add(&counts(&[("stable", 100), ("rising", 50), ("falling", 200)]));
        history.add(&counts(&[
            ("stable", 100),
            ("rising", 80),
            ("falling", 120),
            ("new", 30),
        ]));

        let snapshot = history.latest().unwrap();
        let prev = |key: &str| snapshot.key_meta[key].prev_count;
        assert_eq!(prev("stable"), 100);
        assert_eq!(prev("rising"), 50);
        assert_eq!(prev("falling"), 200);
        assert_eq!(prev("new"), 0);

        let trend = |key: &str, current: u64| Trend::derive(current, prev(key));
        assert_eq!(trend("stable", 100), Trend::Stable);
        assert_eq!(trend("rising", 80), Trend::Rising);
        assert_eq!(trend("falling", 120), Trend::Falling);
        assert_eq!(trend("new", 30), Trend::New);
    }

    #[test]
    fn ring_drops_the_oldest_snapshot() {
        let history = SnapshotHistory::new(3);

        for round in 0..5u64 {
            history.add(&counts(&[("k", round)]));
        }

        assert_eq!(history.len(), 3);
        let latest = history.latest().unwrap();
        assert_eq!(latest.keys[0].count, 4);
    }

    #[test]
    fn empty_history_has_no_latest() {
        let history = SnapshotHistory::new(3);
        assert!(history.latest().is_none());
        assert!(history.is_empty());
        assert!(history.time_series(&["k".to_string()], 10).is_empty());
    }

    #[test]
    fn first_and_last_seen_are_maintained() {
        let history = SnapshotHistory::new(5);

        history.add(&counts(&[("k", 1)]));
        let first = history.latest().unwrap().key_meta["k"].clone();

        history.add(&counts(&[("k", 2)]));
        let second = history.latest().unwrap().key_meta["k"].clone();

        assert_eq!(first.first_seen, second.first_seen);
        assert!(second.last_seen >= first.last_seen);
    }

    #[test]
    fn time_series_counts_and_bounds() {
        let history = SnapshotHistory::new(10);

        history.add(&counts(&[("a", 10)]));
        history.add(&counts(&[("a", 25), ("b", 5)]));
        history.add(&counts(&[("b", 9)]));

        let keys = vec!["a".to_string(), "b".to_string()];
        let series = history.time_series(&keys, 50);
        assert_eq!(series.len(), 3);

        assert_eq!(series[0].keys["a"], 10);
        assert_eq!(series[0].keys["b"], 0);
        assert_eq!(series[0].rates["a"], 0.0);
        assert_eq!(series[0].interval, 0.0);

        assert_eq!(series[1].keys["a"], 25);
        assert_eq!(series[1].keys["b"], 5);

        // "a" disappeared in the third snapshot: count drops to 0 and the
        // rate clamps at 0 instead of going negative.
        assert_eq!(series[2].keys["a"], 0);
        assert_eq!(series[2].rates["a"], 0.0);
        assert_eq!(series[2].keys["b"], 9);
        assert!(series[2].rates["b"] >= 0.0);
    }

    #[test]
    fn time_series_honors_max_points() {
        let history = SnapshotHistory::new(10);
        for round in 0..6u64 {
            history.add(&counts(&[("k", round)]));
        }

        let series = history.time_series(&["k".to_string()], 2);
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].keys["k"], 5);
        // The window restarts: its first point reports no rate.
        assert_eq!(series[0].rates["k"], 0.0);
    }
}
