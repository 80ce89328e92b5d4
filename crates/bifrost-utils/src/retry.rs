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
//! Retry logic for async calls

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// Constant with Max Retry Count is a backoff policy which always returns
/// a constant duration, until it exceeds the maximum retry count.
#[derive(Debug, Clone)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a new Constant backoff with `interval` and `max_retry_count`.
    /// `interval` is the duration to wait between retries, and `max_retry_count` is the maximum
    /// number of retries, after which we return `None` to indicate that we should stop retrying.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            self.count += 1;
            self.interval
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// An exponential backoff that gives up after `max_retry_count` retries,
/// or earlier if the inner policy's max elapsed time is reached.
#[derive(Debug, Clone)]
pub struct ExponentialWithMaxRetryCount {
    inner: ExponentialBackoff,
    max_retry_count: usize,
    count: usize,
}

impl ExponentialWithMaxRetryCount {
    /// Wraps `inner`, allowing at most `max_retry_count` retries.
    pub fn new(inner: ExponentialBackoff, max_retry_count: usize) -> Self {
        Self {
            inner,
            max_retry_count,
            count: 0,
        }
    }

    /// The retry policy used by every HTTP client in Bifrost:
    /// 10 retries, starting at 500ms and capped at 3 minutes between attempts.
    pub fn http_default() -> Self {
        let inner = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(3 * 60),
            max_elapsed_time: None,
            ..Default::default()
        };
        Self::new(inner, 10)
    }
}

impl Backoff for ExponentialWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.count >= self.max_retry_count {
            return None;
        }
        self.count += 1;
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.count = 0;
        self.inner.reset();
    }
}
