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
//! A JSON over HTTP client that retries with Bifrost's policy.

use std::time::Duration;

use backoff::backoff::Backoff;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::probe;
use crate::retry::ExponentialWithMaxRetryCount;
use crate::{Error, Result};

/// A [`reqwest::Client`] whose requests are retried on 5xx and network errors.
///
/// A 4xx response is returned as [`Error::Http`] right away.
#[derive(Debug, Clone)]
pub struct RetryHttpClient {
    inner: reqwest::Client,
    policy: ExponentialWithMaxRetryCount,
}

impl RetryHttpClient {
    /// Wraps `inner` with the default policy, see [`ExponentialWithMaxRetryCount::http_default`].
    pub fn new(inner: reqwest::Client) -> Self {
        Self {
            inner,
            policy: ExponentialWithMaxRetryCount::http_default(),
        }
    }

    /// Replaces the retry policy.
    pub fn with_policy(mut self, policy: ExponentialWithMaxRetryCount) -> Self {
        self.policy = policy;
        self
    }

    /// The wrapped client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// `GET url`, decoding the JSON body. Retried.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.retry(|| self.get_text_once(url)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `GET url`, returning the body as text. Retried.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.retry(|| self.get_text_once(url)).await
    }

    /// `GET url` once, decoding the JSON body.
    pub async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text_once(url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `POST url` with a JSON body, decoding the JSON response. Retried.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.retry(|| self.post_json_once(url, body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `POST url` with a JSON body once, returning the response as text.
    pub async fn post_json_once<B>(&self, url: &str, body: &B) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let response = self.inner.post(url).json(body).send().await?;
        Self::read(response).await
    }

    /// `GET url` once, returning the body as text.
    pub async fn get_text_once(&self, url: &str) -> Result<String> {
        let response = self.inner.get(url).send().await?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn retry<F, Fut, T>(&self, mut task: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut policy = self.policy.clone();
        policy.reset();
        let operation = || {
            let fut = task();
            async move {
                fut.await.map_err(|e| {
                    if e.is_retriable() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        };
        let notify = |e: Error, wait: Duration| {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Retry,
                error = %e,
                wait = ?wait,
            );
        };
        backoff::future::retry_notify(policy, operation, notify).await
    }
}
