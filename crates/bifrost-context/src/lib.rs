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
#![warn(missing_docs)]
//! # Bifrost Context Module 🌈
//!
//! A module for managing the context of Bifrost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bifrost_config::BifrostConfig;
use bifrost_types::{Address, Chain, PrivateKey};
use bifrost_utils::metric::Metrics;
use tokio::sync::broadcast;

/// BifrostContext contains Bifrost's configuration and shutdown signal.
#[derive(Clone)]
pub struct BifrostContext {
    /// The configuration of Bifrost.
    pub config: BifrostConfig,
    /// Broadcasts a shutdown signal to all long-lived tasks.
    ///
    /// When a task is spawned, it is passed a broadcast receiver handle.
    /// When a graceful shutdown is initiated, a `()` value is sent via
    /// the broadcast::Sender. Each task receives it, reaches a safe terminal
    /// state, and completes.
    notify_shutdown: broadcast::Sender<()>,
    shutting_down: Arc<AtomicBool>,
    /// Represents the metrics for Bifrost
    pub metrics: Arc<Metrics>,
}

impl BifrostContext {
    /// Creates a new BifrostContext.
    pub fn new(config: BifrostConfig) -> bifrost_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config,
            notify_shutdown,
            shutting_down: Arc::new(AtomicBool::new(false)),
            metrics,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown {
            shutdown: self.shutting_down.load(Ordering::SeqCst),
            notify: self.notify_shutdown.subscribe(),
        }
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.notify_shutdown.send(());
    }

    /// Whether a shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// The node's key, which signs every consensus-layer transaction.
    ///
    /// Read from `thorchain.signer_key`, or else from the key file in the home folder.
    pub fn node_key(&self) -> bifrost_utils::Result<PrivateKey> {
        if let Some(key) = &self.config.thorchain.signer_key {
            return Ok(key.clone());
        }
        let path = self.config.thorchain.key_file();
        tracing::debug!("Reading node key from {}", path.display());
        let contents = std::fs::read_to_string(&path)?;
        contents
            .trim()
            .parse()
            .map_err(|_| bifrost_utils::Error::MissingSecrets)
    }

    /// The node's consensus-layer address.
    pub fn node_address(&self) -> bifrost_utils::Result<Address> {
        self.node_key()?
            .pub_key()?
            .address_on(Chain::Thor, self.config.network)
    }

    /// An HTTP client with the configured request timeout.
    pub fn http_client(&self) -> bifrost_utils::Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.thorchain.http_timeout))
            .build()?;
        Ok(client)
    }

    /// How many vaults are processed concurrently by the signer.
    pub fn worker_count(&self) -> usize {
        self.config.tx_signer.worker_count.max(1)
    }
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the server
/// should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BifrostConfig {
        serde_json::from_value(serde_json::json!({
            "network": "mock",
            "thorchain": {
                "chain_id": "thorchain",
                "chain_host": "localhost:1317",
                "signer_key": "0x000000000000000000000000000000000000000000000000000000000000002a"
            },
            "chains": [{ "name": "BNB", "chain_host": "localhost:26657" }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn late_subscribers_see_the_shutdown() {
        let ctx = BifrostContext::new(config()).unwrap();
        let mut early = ctx.shutdown_signal();
        ctx.shutdown();
        early.recv().await;
        assert!(early.is_shutdown());
        let mut late = ctx.shutdown_signal();
        assert!(late.is_shutdown());
        late.recv().await;
    }

    #[test]
    fn node_address_uses_the_network_prefix() {
        let ctx = BifrostContext::new(config()).unwrap();
        let address = ctx.node_address().unwrap();
        assert!(address.as_str().starts_with("tthor1"));
    }
}
