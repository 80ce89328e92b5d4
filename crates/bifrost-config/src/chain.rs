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
use bifrost_types::{Chain, Network, RpcUrl, Secret};
use serde::Deserialize;

use crate::defaults;

/// ChainConfig is the configuration of one external chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// The chain, `BNB`, `BTC` or `ETH` (case-insensitive).
    pub name: Chain,
    /// Whether to observe and sign for this chain.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// The chain's RPC endpoint.
    pub chain_host: RpcUrl,
    /// The chain's network. Defaults to the top-level network.
    #[serde(default)]
    pub chain_network: Option<Network>,
    /// RPC user name (bitcoind).
    #[serde(default)]
    pub username: String,
    /// RPC password (bitcoind), or `$ENV_VAR`.
    #[serde(default)]
    pub password: Secret,
    /// Send RPC requests as HTTP POST only.
    #[serde(default)]
    pub http_post_mode: bool,
    /// Talk plain HTTP to the RPC endpoint.
    #[serde(default)]
    pub disable_tls: bool,
    /// The Binance DEX API, used to read account numbers and sequences.
    #[serde(default)]
    pub api_host: Option<RpcUrl>,
    /// Fallback fee rate, in sat/vbyte (bitcoin) or gwei (ethereum).
    #[serde(default)]
    pub fee_rate: Option<u64>,
    /// The EVM chain id (ethereum). Queried from the node when unset.
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Scanner settings.
    #[serde(default)]
    pub block_scanner: BlockScannerConfig,
}

impl ChainConfig {
    /// The network this chain runs on.
    pub fn network(&self, fallback: Network) -> Network {
        self.chain_network.unwrap_or(fallback)
    }
}

/// BlockScannerConfig tunes the scanner of one chain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockScannerConfig {
    /// Start here instead of ThorNode's last observed height.
    #[serde(default)]
    pub start_block_height: Option<i64>,
}
