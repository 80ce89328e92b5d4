// Copyright 2026 Bifrost Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
use std::time::Duration;

use backoff::ExponentialBackoff;
use serde::Deserialize;

use crate::defaults;

/// BackOffConfig is the exponential retry policy of the block scanners.
///
/// Durations are in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackOffConfig {
    /// The first wait.
    pub initial_interval: u64,
    /// Every wait is randomized by this factor.
    pub randomization_factor: f64,
    /// How much longer each wait is than the previous one.
    pub multiplier: f64,
    /// The longest single wait.
    pub max_interval: u64,
    /// Give up after this long. `0` retries forever.
    pub max_elapsed_time: u64,
}

impl Default for BackOffConfig {
    fn default() -> Self {
        Self {
            initial_interval: defaults::INITIAL_INTERVAL.as_millis() as u64,
            randomization_factor: defaults::RANDOMIZATION_FACTOR,
            multiplier: defaults::MULTIPLIER,
            max_interval: defaults::MAX_INTERVAL.as_millis() as u64,
            max_elapsed_time: defaults::MAX_ELAPSED_TIME.as_millis() as u64,
        }
    }
}

impl BackOffConfig {
    /// Builds the backoff policy.
    pub fn exponential(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: Duration::from_millis(self.initial_interval),
            initial_interval: Duration::from_millis(self.initial_interval),
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: Duration::from_millis(self.max_interval),
            max_elapsed_time: (self.max_elapsed_time > 0)
                .then(|| Duration::from_millis(self.max_elapsed_time)),
            ..Default::default()
        }
    }
}
