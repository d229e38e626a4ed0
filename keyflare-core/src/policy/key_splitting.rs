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

//! Key splitting policy: spread a hot key's read load across shard replicas.
//!
//! A key `K` maps deterministically to `K:shard:0 .. K:shard:S-1`. Writes
//! replicate to every shard key; reads target one shard chosen uniformly at
//! random, falling back to the original key. The policy itself is a pure
//! transformation; the wrapper performs the actual store operations.

use rand::Rng;

use crate::error::{KeyflareError, Result};
use crate::policy::{Context, Directive, Policy, Request};

pub const DEFAULT_SHARDS: usize = 10;

/// Parameters for the key splitting policy.
#[derive(Debug, Clone)]
pub struct KeySplittingParams {
    /// Number of shard replicas per hot key.
    pub shards: usize,
}

impl Default for KeySplittingParams {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
        }
    }
}

/// Stateless shard-key generator.
pub struct KeySplittingPolicy {
    params: KeySplittingParams,
}

impl KeySplittingPolicy {
    pub fn new(params: KeySplittingParams) -> Self {
        let shards = if params.shards == 0 {
            DEFAULT_SHARDS
        } else {
            params.shards
        };
        Self {
            params: KeySplittingParams { shards },
        }
    }

    fn shard_keys(&self, key: &str) -> Vec<String> {
        (0..self.params.shards)
            .map(|shard| format!("{key}:shard:{shard}"))
            .collect()
    }
}

impl Policy for KeySplittingPolicy {
    fn apply(&self, ctx: Context) -> Result<Directive> {
        match ctx.request {
            Request::Get => {
                let shard_keys = self.shard_keys(&ctx.key);
                let pick = rand::thread_rng().gen_range(0..shard_keys.len());
                Ok(Directive::KeySplittingGet {
                    rand_shard_key: shard_keys[pick].clone(),
                    original_key: ctx.key,
                    shard_keys,
                })
            }
            Request::Set { value, ttl } => Ok(Directive::KeySplittingSet {
                shard_keys: self.shard_keys(&ctx.key),
                original_key: ctx.key,
                value,
                ttl,
            }),
            Request::Delete => Err(KeyflareError::UnsupportedOperation("delete")),
        }
    }

    fn name(&self) -> &'static str {
        "key-splitting"
    }
}
