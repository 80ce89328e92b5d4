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

/// ThorNode HTTP requests time out after 30 seconds.
pub const fn http_timeout() -> u64 {
    30_000
}

/// Vaults are refreshed from ThorNode every minute.
pub const fn vault_refresh_interval() -> u64 {
    60_000
}

/// Capacity of the channels between scanners and their consumers.
pub const fn channel_capacity() -> usize {
    64
}

/// A keysign batch must be signed and broadcast within a minute.
pub const fn keysign_timeout() -> u64 {
    60_000
}

/// A keygen ceremony must finish within a minute.
pub const fn keygen_timeout() -> u64 {
    60_000
}

/// Vaults signed for concurrently.
pub const fn worker_count() -> usize {
    4
}

/// The metric server listens on port 9000.
pub const fn metric_port() -> u16 {
    9000
}

/// Metric server read and write timeouts.
pub const fn metric_timeout() -> u64 {
    30_000
}

/// The go-tss default port.
pub const fn tss_port() -> u16 {
    4040
}

/// The node key file name inside the home folder.
pub fn signer_name() -> String {
    String::from("thorchain")
}

/// Loopback.
pub fn tss_host() -> String {
    String::from("127.0.0.1")
}

/// Plain HTTP.
pub fn tss_scheme() -> String {
    String::from("http")
}

pub(crate) const fn enabled() -> bool {
    true
}

/// The scanner starts waiting half a second after a failure.
pub const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
/// Each retry waits one and a half times longer.
pub const MULTIPLIER: f64 = 1.5;
/// Waits are randomized by ±50%.
pub const RANDOMIZATION_FACTOR: f64 = 0.5;
/// No wait exceeds three minutes.
pub const MAX_INTERVAL: Duration = Duration::from_secs(3 * 60);
/// A scanner gives up after a week of failures.
pub const MAX_ELAPSED_TIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);
