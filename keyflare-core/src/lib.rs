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

//! KeyFlare Core
//!
//! Detection and mitigation primitives for client-side hot key handling:
//! frequency sketches (Count-Min, Space-Saving), the combined detector,
//! mitigation policies (local cache, key splitting) with allow-list
//! admission, and the snapshot history that backs the trends API.

pub mod count_min;
pub mod detector;
pub mod error;
pub mod history;
pub mod policy;
pub mod space_saving;

pub use count_min::CountMinSketch;
pub use detector::{Detector, DetectorConfig, KeyCount};
pub use error::{KeyflareError, Result};
pub use history::{KeyMetadata, Snapshot, SnapshotHistory, TimeSeriesPoint, Trend};
pub use policy::{
    Context, Directive, KeySplittingParams, KeySplittingPolicy, LocalCacheParams, LocalCachePolicy,
    Policy, PolicyConfig, PolicyManager, PolicyParams, PolicyType, Request,
};
pub use space_saving::SpaceSaving;
