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

//! Count-Min Sketch for per-key frequency estimation.
//!
//! Sublinear-space estimator with one-sided error: `estimate(k)` is always
//! greater than or equal to the true count of `k`. Dimensions derive from
//! the accuracy parameters: `depth = ceil(ln(1/delta))` rows and
//! `width = ceil(e/epsilon)` columns of unsigned 64-bit counters.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over the key bytes followed by the little-endian bytes of the
/// per-row seed, so collisions differ per row.
fn fnv1a_seeded(data: &[u8], seed: u32) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in seed.to_le_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Count-Min Sketch with decay support.
///
/// Counters are unsigned 64-bit; the caller is expected to keep the total
/// stream below 2^64 (overflow is not defended against).
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    depth: usize,
    width: usize,
    // depth * width counters, row-major
    matrix: Vec<u64>,
}

impl CountMinSketch {
    /// Creates a sketch sized for the given error rate and confidence.
    pub fn new(epsilon: f64, delta: f64) -> Self {
        let depth = ((1.0 / delta).ln().ceil() as usize).max(1);
        let width = ((std::f64::consts::E / epsilon).ceil() as usize).max(1);

        Self {
            depth,
            width,
            matrix: vec![0; depth * width],
        }
    }

    /// Number of hash rows.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of counters per row.
    pub fn width(&self) -> usize {
        self.width
    }

    fn column(&self, key: &[u8], row: usize) -> usize {
        (fnv1a_seeded(key, row as u32) % self.width as u64) as usize
    }

    /// Adds `count` occurrences of `key`.
    pub fn add(&mut self, key: &[u8], count: u64) {
        for row in 0..self.depth {
            let col = self.column(key, row);
            self.matrix[row * self.width + col] += count;
        }
    }

    /// Estimates the frequency of `key`: the minimum counter across rows.
    /// Keys never added estimate to 0.
    pub fn estimate(&self, key: &[u8]) -> u64 {
        (0..self.depth)
            .map(|row| self.matrix[row * self.width + self.column(key, row)])
            .min()
            .unwrap_or(0)
    }

    /// Scales every counter by `factor`, truncating toward zero. The
    /// overestimate property is preserved over the post-decay stream.
    pub fn decay(&mut self, factor: f64) {
        for counter in &mut self.matrix {
            *counter = (*counter as f64 * factor) as u64;
        }
    }

    /// Zeroes all counters.
    pub fn reset(&mut self) {
        self.matrix.fill(0);
    }
}
