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
//! # Bifrost Binance Chain Client 🌈
//!
//! Scans Binance Chain over Tendermint RPC for transfers to and from
//! vaults, and builds, signs and broadcasts amino encoded transfers.

use std::collections::HashMap;
use std::sync::Arc;

use backoff::ExponentialBackoff;
use bifrost_chain_client_traits::{
    signer_for, BlockScanner, BlockSource, ChainClient, ScanTask, VaultLookup,
};
use bifrost_context::{BifrostContext, Shutdown};
use bifrost_signing_backends::KeySignerSelector;
use bifrost_types::{Address, Block, Chain, Network, TxOutItem};
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::metric::Metrics;
use bifrost_utils::{Error, Result};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

/// Amino encoding of transfers
#[allow(missing_docs)]
pub mod amino;
/// Tendermint RPC and block extraction
pub mod rpc;

pub use rpc::{Account, BinanceRpc};

use amino::{SendMsg, StdSignature, Token, Transfer};

/// The Binance Chain [`ChainClient`].
pub struct BinanceClient {
    rpc: Arc<BinanceRpc>,
    network: Network,
    selector: KeySignerSelector,
    vaults: Arc<dyn VaultLookup>,
    backoff: ExponentialBackoff,
    metrics: Arc<Metrics>,
    scan: ScanTask,
    // sequences used by transactions signed but not yet seen by the api.
    sequences: Mutex<HashMap<Address, i64>>,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("rpc", &self.rpc)
            .field("network", &self.network)
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl BinanceClient {
    /// Creates a client over `rpc`.
    pub fn new(
        rpc: BinanceRpc,
        network: Network,
        selector: KeySignerSelector,
        vaults: Arc<dyn VaultLookup>,
        backoff: ExponentialBackoff,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            rpc: Arc::new(rpc),
            network,
            selector,
            vaults,
            backoff,
            metrics,
            scan: ScanTask::default(),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the client from the `BNB` entry of the configuration.
    pub fn from_context(
        ctx: &BifrostContext,
        selector: KeySignerSelector,
        vaults: Arc<dyn VaultLookup>,
    ) -> Result<Self> {
        let config = ctx.config.chain(Chain::Binance).ok_or_else(|| Error::ChainNotFound {
            chain: Chain::Binance.to_string(),
        })?;
        let network = config.network(ctx.config.network);
        let rpc = BinanceRpc::new(
            config.chain_host.clone(),
            config.api_host.clone(),
            RetryHttpClient::new(ctx.http_client()?),
            config.http_post_mode,
            network,
        );
        Ok(Self::new(
            rpc,
            network,
            selector,
            vaults,
            ctx.config.back_off.exponential(),
            ctx.metrics.clone(),
        ))
    }

    /// The RPC client.
    pub fn rpc(&self) -> &BinanceRpc {
        &self.rpc
    }

    /// The account of `address`, with its sequence moved past anything this
    /// client signed already.
    async fn account(&self, address: &Address) -> Result<rpc::Account> {
        let mut account = self.rpc.account(address).await?;
        if let Some(local) = self.sequences.lock().get(address) {
            account.sequence = account.sequence.max(*local);
        }
        Ok(account)
    }
}

#[async_trait::async_trait]
impl ChainClient for BinanceClient {
    fn chain(&self) -> Chain {
        Chain::Binance
    }

    async fn latest_height(&self) -> Result<i64> {
        self.rpc.tip().await
    }

    async fn start(
        &self,
        output: mpsc::Sender<Block>,
        start_height: i64,
        shutdown: Shutdown,
    ) -> Result<()> {
        let scanner = BlockScanner::new(
            self.rpc.clone(),
            self.vaults.clone(),
            self.network,
            self.backoff.clone(),
            self.metrics.clone(),
            start_height,
        );
        self.scan.spawn(scanner, output, shutdown)
    }

    async fn stop(&self) -> Result<()> {
        self.scan.stop().await
    }

    #[tracing::instrument(skip_all, fields(chain = "BNB", in_hash = %item.in_hash))]
    async fn sign(&self, item: &TxOutItem, _height: i64) -> Result<Option<Vec<u8>>> {
        let Some(signer) = signer_for(&self.selector, self.vaults.as_ref(), item, self.network)?
        else {
            return Ok(None);
        };
        let hrp = Chain::Binance
            .address_prefix(self.network)
            .ok_or_else(|| Error::UnsupportedChain(Chain::Binance.to_string()))?;
        let from = item.vault_pub_key.address_on(Chain::Binance, self.network)?;
        let (_, from_bytes) = from.to_bech32()?;
        let (to_hrp, to_bytes) = item.to_address.to_bech32()?;
        if to_hrp != hrp || to_bytes.len() != 20 {
            return Err(Error::InvalidAddress(item.to_address.to_string()));
        }
        let amount = i64::try_from(item.coin.amount)
            .map_err(|_| Error::ChainClient(format!("amount {} overflows", item.coin.amount)))?;
        let coins = vec![Token {
            denom: item.coin.asset.symbol.clone(),
            amount,
        }];
        let send = SendMsg {
            inputs: vec![Transfer {
                address: from_bytes,
                coins: coins.clone(),
            }],
            outputs: vec![Transfer {
                address: to_bytes,
                coins,
            }],
        };

        let account = self.account(&from).await?;
        let chain_id = self.rpc.chain_id().await?;
        let sign_bytes = amino::sign_bytes(
            chain_id,
            account.account_number,
            account.sequence,
            &item.memo,
            &send,
            hrp,
        )?;
        let digest: [u8; 32] = Sha256::digest(&sign_bytes).into();
        let signature = signer.sign(digest).await?;
        let std_signature = StdSignature {
            pub_key: amino::encode_pub_key(&signer.pub_key().compressed()?),
            signature: signature.rs.to_vec(),
            account_number: account.account_number,
            sequence: account.sequence,
        };
        self.sequences.lock().insert(from, account.sequence + 1);
        tracing::debug!(
            sequence = account.sequence,
            to = %item.to_address,
            coin = %item.coin,
            "signed binance transfer",
        );
        Ok(Some(amino::encode_tx(&send, &item.memo, &std_signature)))
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String> {
        self.rpc.broadcast(raw_tx).await
    }
}
