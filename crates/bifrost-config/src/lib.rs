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

//! # Bifrost Configuration Module 🌈
//!
//! A module for configuring Bifrost.
//!
//! ## Overview
//!
//! Every `*.toml` and `*.json` file under the config directory is merged,
//! then environment variables prefixed with `BIFROST__` are layered on top
//! (nested keys separated by `__`, for example `BIFROST__THORCHAIN__CHAIN_ID`).
//! Possible configuration include:
//! * `network`: `mainnet`, `testnet` or `mock`; picks address prefixes.
//! * `thorchain`: how to reach ThorNode and which key signs for this node.
//! * `chains`: the external chains to observe and sign for.
//! * `metric`: the HTTP server exposing `/ping`, `/p2pid` and `/metrics`.
//! * `tx_scanner`, `tx_signer`, `back_off`, `tss`: tuning knobs.
//!
//! See [config/mocknet](../../config/mocknet) for an example.

/// Back off configuration
pub mod back_off;
/// External chain configuration
pub mod chain;
/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values
pub mod defaults;
/// ThorNode configuration
pub mod thorchain;
/// TSS configuration
pub mod tss;
/// Utils for processing configuration
pub mod utils;

use std::time::Duration;

use bifrost_types::{Chain, Network};
use serde::Deserialize;

use back_off::BackOffConfig;
use chain::ChainConfig;
use thorchain::ThorchainConfig;
use tss::TssConfig;

/// Used by the directories crate to find the default config location.
pub const PACKAGE_ID: [&str; 3] = ["tools", "thorchain", "bifrost"];

/// BifrostConfig is the configuration for Bifrost.
#[derive(Debug, Clone, Deserialize)]
pub struct BifrostConfig {
    /// The network Bifrost runs on.
    #[serde(default)]
    pub network: Network,
    /// How to reach ThorNode.
    pub thorchain: ThorchainConfig,
    /// The HTTP server.
    #[serde(default)]
    pub metric: MetricConfig,
    /// The external chains. Disabled chains are dropped while loading.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    /// Observation tuning.
    #[serde(default)]
    pub tx_scanner: TxScannerConfig,
    /// Signing tuning.
    #[serde(default)]
    pub tx_signer: TxSignerConfig,
    /// Retry policy of the block scanners.
    #[serde(default)]
    pub back_off: BackOffConfig,
    /// The TSS party.
    #[serde(default)]
    pub tss: TssConfig,
}

impl BifrostConfig {
    /// The configuration of `chain`, if it is enabled.
    pub fn chain(&self, chain: Chain) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name == chain && c.enabled)
    }

    /// The enabled external chains.
    pub fn enabled_chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.chains.iter().filter(|c| c.enabled).map(|c| c.name)
    }
}

/// MetricConfig is the configuration of the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    /// Serve `/metrics`. `/ping` and `/p2pid` are always served.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// The port to listen on.
    #[serde(default = "defaults::metric_port")]
    pub listen_port: u16,
    /// Request read timeout, in milliseconds.
    #[serde(default = "defaults::metric_timeout")]
    pub read_timeout: u64,
    /// Response write timeout, in milliseconds.
    #[serde(default = "defaults::metric_timeout")]
    pub write_timeout: u64,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_port: defaults::metric_port(),
            read_timeout: defaults::metric_timeout(),
            write_timeout: defaults::metric_timeout(),
        }
    }
}

impl MetricConfig {
    /// The longer of the two timeouts, applied to every request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout.max(self.write_timeout))
    }
}

/// TxScannerConfig tunes observation.
#[derive(Debug, Clone, Deserialize)]
pub struct TxScannerConfig {
    /// Capacity of the block and work channels.
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,
    /// How often vaults are refreshed from ThorNode, in milliseconds.
    #[serde(default = "defaults::vault_refresh_interval")]
    pub vault_refresh_interval: u64,
}

impl Default for TxScannerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::channel_capacity(),
            vault_refresh_interval: defaults::vault_refresh_interval(),
        }
    }
}

/// TxSignerConfig tunes the outbound signer.
#[derive(Debug, Clone, Deserialize)]
pub struct TxSignerConfig {
    /// Budget for signing and broadcasting one keysign batch, in milliseconds.
    #[serde(default = "defaults::keysign_timeout")]
    pub keysign_timeout: u64,
    /// Budget for one keygen ceremony, in milliseconds.
    #[serde(default = "defaults::keygen_timeout")]
    pub keygen_timeout: u64,
    /// How many vaults are signed for concurrently.
    #[serde(default = "defaults::worker_count")]
    pub worker_count: usize,
}

impl Default for TxSignerConfig {
    fn default() -> Self {
        Self {
            keysign_timeout: defaults::keysign_timeout(),
            keygen_timeout: defaults::keygen_timeout(),
            worker_count: defaults::worker_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_config_files_are_correct() {
        // Walks every directory under the workspace's config directory and
        // tries to parse the config file(s) inside it.
        let config_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config");
        let pattern = config_dir.join("*");
        let config_dirs = glob::glob(&pattern.to_string_lossy())
            .expect("Failed to read config directory")
            .filter_map(|p| p.ok())
            .filter(|p| p.is_dir())
            .collect::<Vec<_>>();
        assert!(
            !config_dirs.is_empty(),
            "No config directories found in the config directory"
        );
        for config_subdir in config_dirs {
            // Load the example dot env file.
            let _ = dotenv::from_path(config_subdir.join(".env.example"));
            if let Err(e) = utils::load(&config_subdir) {
                panic!("Failed to parse config file in directory: {config_subdir:?} with error: {e}");
            }
        }
    }

    #[test]
    fn defaults_are_filled_in() {
        let config: BifrostConfig = serde_json::from_value(serde_json::json!({
            "thorchain": { "chain_id": "thorchain", "chain_host": "localhost:1317" },
            "chains": [{ "name": "BNB", "chain_host": "localhost:26657" }]
        }))
        .unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.tx_scanner.vault_refresh_interval, 60_000);
        assert_eq!(config.metric.listen_port, 9000);
        assert_eq!(config.enabled_chains().collect::<Vec<_>>(), vec![Chain::Binance]);
        assert_eq!(config.back_off.initial_interval, 500);
    }
}
