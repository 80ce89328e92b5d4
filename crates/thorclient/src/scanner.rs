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
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use bifrost_context::Shutdown;
use bifrost_signing_backends::PubKeyManager;
use bifrost_types::{KeygenBlock, KeysignWorkUnit};
use bifrost_utils::metric::Metrics;
use bifrost_utils::{probe, Error, Result};
use tokio::sync::mpsc;

use crate::ThorClient;

/// Polls ThorNode block by block for keysign and keygen work addressed to
/// the pubkeys this node holds.
///
/// Heights `[cursor, tip)` are processed on every pass, then the cursor
/// jumps to the tip. A cursor at or beyond the tip backs off without
/// advancing.
#[derive(Debug)]
pub struct ThorScanner {
    client: ThorClient,
    pub_keys: PubKeyManager,
    cursor: i64,
    backoff: ExponentialBackoff,
    keysign_tx: mpsc::Sender<KeysignWorkUnit>,
    keygen_tx: mpsc::Sender<KeygenBlock>,
    metrics: Arc<Metrics>,
}

impl ThorScanner {
    /// Creates a scanner resuming at `cursor`.
    pub fn new(
        client: ThorClient,
        pub_keys: PubKeyManager,
        cursor: i64,
        backoff: ExponentialBackoff,
        keysign_tx: mpsc::Sender<KeysignWorkUnit>,
        keygen_tx: mpsc::Sender<KeygenBlock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            pub_keys,
            cursor,
            backoff,
            keysign_tx,
            keygen_tx,
            metrics,
        }
    }

    /// The next height to process.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Runs the scan loop until shutdown, or until the work consumers go away.
    #[tracing::instrument(skip_all, fields(tag = "thorchain"))]
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        self.backoff.reset();
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            let progressed = tokio::select! {
                r = self.poll_once() => r,
                _ = shutdown.recv() => break,
            };
            match progressed {
                Ok(true) => {
                    self.backoff.reset();
                    continue;
                }
                Ok(false) => {
                    tracing::trace!(cursor = self.cursor, "thorchain tip not reached yet");
                }
                Err(Error::ChannelClosed(what)) => {
                    tracing::debug!("{what} closed, stopping the scanner");
                    break;
                }
                Err(e) => {
                    tracing::warn!(cursor = self.cursor, error = %e, "thorchain scan failed");
                    self.metrics.record_error(&e);
                }
            }
            let wait = self.next_wait();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!(cursor = self.cursor, "thorchain scanner stopped");
        Ok(())
    }

    /// Processes every height between the cursor and ThorNode's tip.
    ///
    /// Returns `false` without doing anything when the cursor is not behind the tip.
    pub async fn poll_once(&mut self) -> Result<bool> {
        let tip = self.client.get_statechain_height().await?;
        if self.cursor >= tip {
            return Ok(false);
        }
        for height in self.cursor..tip {
            self.process_height(height).await?;
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            chain = "THOR",
            from = self.cursor,
            to = tip,
        );
        self.cursor = tip;
        Ok(true)
    }

    async fn process_height(&self, height: i64) -> Result<()> {
        let mut seen = HashSet::new();
        let mut keygens = Vec::new();
        for pk in self.pub_keys.pub_keys() {
            match self.client.get_keysign(height, &pk).await {
                Ok(items) if !items.is_empty() => {
                    for item in &items {
                        self.metrics
                            .keysign_received
                            .with_label_values(&[&item.chain.to_string()])
                            .inc();
                    }
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Keysign,
                        height,
                        vault = %pk,
                        items = items.len(),
                    );
                    let unit = KeysignWorkUnit {
                        height,
                        vault_pub_key: pk.clone(),
                        items,
                    };
                    self.keysign_tx
                        .send(unit)
                        .await
                        .map_err(|_| Error::ChannelClosed("keysign channel"))?;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(height, vault = %pk, error = %e, "failed to fetch keysign");
                    self.metrics.record_error(&e);
                }
            }
            match self.client.get_keygen(height, &pk).await {
                Ok(Some(block)) => keygens.extend(
                    block
                        .keygens
                        .into_iter()
                        .filter(|keygen| seen.insert(keygen.id.clone())),
                ),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(height, pk = %pk, error = %e, "failed to fetch keygen");
                    self.metrics.record_error(&e);
                }
            }
        }
        if !keygens.is_empty() {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Keygen,
                height,
                keygens = keygens.len(),
            );
            self.keygen_tx
                .send(KeygenBlock { height, keygens })
                .await
                .map_err(|_| Error::ChannelClosed("keygen channel"))?;
        }
        Ok(())
    }

    fn next_wait(&mut self) -> Duration {
        match self.backoff.next_backoff() {
            Some(wait) => wait,
            None => {
                // never give up, start over.
                self.backoff.reset();
                self.backoff.initial_interval
            }
        }
    }
}
