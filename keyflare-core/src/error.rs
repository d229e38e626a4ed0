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

use thiserror::Error;

/// Convenience alias used across all KeyFlare crates.
pub type Result<T> = std::result::Result<T, KeyflareError>;

/// Error taxonomy for the engine.
///
/// Lifecycle variants surface from the singleton facade; construction
/// variants from the policy manager; `UnsupportedOperation` from policy
/// `apply`; `Encode` maps to HTTP 500 in the metrics server.
#[derive(Debug, Error)]
pub enum KeyflareError {
    #[error("keyflare is already initialized")]
    AlreadyInitialized,

    #[error("keyflare is not initialized; call init() first")]
    NotInitialized,

    #[error("keyflare is already running")]
    AlreadyRunning,

    #[error("keyflare is not running; call start() first")]
    NotRunning,

    #[error("invalid policy parameters: expected {expected}, got {got}")]
    InvalidParameters {
        expected: &'static str,
        got: &'static str,
    },

    #[error("unsupported policy type: {0}")]
    UnsupportedPolicyType(String),

    #[error("invalid whitelist pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
