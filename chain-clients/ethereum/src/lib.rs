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
//! # Bifrost Ethereum Client 🌈
//!
//! Scans an Ethereum node over JSON-RPC for ether sent to and from vaults,
//! and signs legacy EIP-155 transfers carrying the memo as calldata.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use bifrost_chain_client_traits::{
    signer_for, BlockScanner, BlockSource, ChainClient, ScanTask, VaultLookup,
};
use bifrost_context::{BifrostContext, Shutdown};
use bifrost_signing_backends::KeySignerSelector;
use bifrost_types::{Asset, Block, Chain, Network, TxOutItem};
use bifrost_utils::metric::Metrics;
use bifrost_utils::{Error, Result};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{BlockNumber, Bytes, TransactionRequest, H160, U256};
use parking_lot::Mutex;
use tokio::sync::{mpsc, OnceCell};

/// Block extraction
pub mod block;

pub use block::EthereumSource;

/// Gas every transaction pays before its calldata.
pub const TX_BASE_GAS: u64 = 21_000;
/// Gas per zero byte of calldata.
pub const ZERO_BYTE_GAS: u64 = 4;
/// Gas per non-zero byte of calldata.
pub const NON_ZERO_BYTE_GAS: u64 = 16;

/// The gas a plain transfer carrying `data` needs.
pub fn intrinsic_gas(data: &[u8]) -> u64 {
    data.iter().fold(TX_BASE_GAS, |gas, byte| {
        gas + if *byte == 0 {
            ZERO_BYTE_GAS
        } else {
            NON_ZERO_BYTE_GAS
        }
    })
}

/// The Ethereum [`ChainClient`].
pub struct EthereumClient {
    source: Arc<EthereumSource>,
    network: Network,
    selector: KeySignerSelector,
    vaults: Arc<dyn VaultLookup>,
    backoff: ExponentialBackoff,
    metrics: Arc<Metrics>,
    scan: ScanTask,
    chain_id: OnceCell<u64>,
    // next nonce per vault, for transactions the node has not seen yet.
    nonces: Mutex<HashMap<H160, U256>>,
}

impl std::fmt::Debug for EthereumClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumClient")
            .field("network", &self.network)
            .field("chain_id", &self.chain_id.get())
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl EthereumClient {
    /// Creates a client over `provider`. Without a `chain_id` it is asked from the node.
    pub fn new(
        provider: Provider<Http>,
        network: Network,
        selector: KeySignerSelector,
        vaults: Arc<dyn VaultLookup>,
        backoff: ExponentialBackoff,
        metrics: Arc<Metrics>,
        chain_id: Option<u64>,
    ) -> Self {
        Self {
            source: Arc::new(EthereumSource::new(provider)),
            network,
            selector,
            vaults,
            backoff,
            metrics,
            scan: ScanTask::default(),
            chain_id: OnceCell::new_with(chain_id),
            nonces: Mutex::new(HashMap::new()),
        }
    }

    /// Creates the client from the `ETH` entry of the configuration.
    pub fn from_context(
        ctx: &BifrostContext,
        selector: KeySignerSelector,
        vaults: Arc<dyn VaultLookup>,
    ) -> Result<Self> {
        let config = ctx.config.chain(Chain::Ethereum).ok_or_else(|| Error::ChainNotFound {
            chain: Chain::Ethereum.to_string(),
        })?;
        let provider = Provider::try_from(config.chain_host.as_str())?
            .interval(Duration::from_millis(500u64));
        Ok(Self::new(
            provider,
            config.network(ctx.config.network),
            selector,
            vaults,
            ctx.config.back_off.exponential(),
            ctx.metrics.clone(),
            config.chain_id,
        ))
    }

    /// The JSON-RPC provider.
    pub fn provider(&self) -> &Provider<Http> {
        self.source.provider()
    }

    async fn chain_id(&self) -> Result<u64> {
        let provider = self.provider();
        let id = self
            .chain_id
            .get_or_try_init(|| async move {
                let id = provider.get_chainid().await?;
                Ok::<_, Error>(id.as_u64())
            })
            .await?;
        Ok(*id)
    }

    async fn nonce(&self, from: H160) -> Result<U256> {
        let remote = self
            .provider()
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await?;
        let local = self.nonces.lock().get(&from).copied().unwrap_or_default();
        Ok(remote.max(local))
    }
}

#[async_trait::async_trait]
impl ChainClient for EthereumClient {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn latest_height(&self) -> Result<i64> {
        self.source.tip().await
    }

    async fn start(
        &self,
        output: mpsc::Sender<Block>,
        start_height: i64,
        shutdown: Shutdown,
    ) -> Result<()> {
        let scanner = BlockScanner::new(
            self.source.clone(),
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

    #[tracing::instrument(skip_all, fields(chain = "ETH", in_hash = %item.in_hash))]
    async fn sign(&self, item: &TxOutItem, _height: i64) -> Result<Option<Vec<u8>>> {
        let Some(signer) = signer_for(&self.selector, self.vaults.as_ref(), item, self.network)?
        else {
            return Ok(None);
        };
        if item.coin.asset != Asset::eth() {
            return Err(Error::InvalidAsset(item.coin.asset.to_string()));
        }
        if !item.to_address.is_chain(Chain::Ethereum) {
            return Err(Error::InvalidAddress(item.to_address.to_string()));
        }
        let to: H160 = item
            .to_address
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidAddress(item.to_address.to_string()))?;
        let vault = item.vault_pub_key.address_on(Chain::Ethereum, self.network)?;
        let from: H160 = vault
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidAddress(vault.to_string()))?;

        let chain_id = self.chain_id().await?;
        let nonce = self.nonce(from).await?;
        let gas_price = self.provider().get_gas_price().await?;
        let data = Bytes::from(item.memo.as_bytes().to_vec());
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(U256::from(item.coin.amount))
            .gas(intrinsic_gas(&data))
            .gas_price(gas_price)
            .nonce(nonce)
            .data(data)
            .chain_id(chain_id)
            .into();

        let signature = signer.sign(tx.sighash().0).await?;
        let signature = ethers::types::Signature {
            r: U256::from_big_endian(&signature.rs[..32]),
            s: U256::from_big_endian(&signature.rs[32..]),
            v: u64::from(signature.recovery_id) + chain_id * 2 + 35,
        };
        self.nonces.lock().insert(from, nonce + 1);
        tracing::debug!(
            %nonce,
            %gas_price,
            to = %item.to_address,
            coin = %item.coin,
            "signed ethereum transfer",
        );
        Ok(Some(tx.rlp_signed(&signature).to_vec()))
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String> {
        match self
            .provider()
            .send_raw_transaction(Bytes::from(raw_tx.to_vec()))
            .await
        {
            Ok(pending) => Ok(format!("{:#x}", pending.tx_hash())),
            Err(e) => {
                // the node's pending count is authoritative again
                self.nonces.lock().clear();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calldata_bytes_cost_gas() {
        assert_eq!(intrinsic_gas(&[]), 21_000);
        assert_eq!(intrinsic_gas(b"OUT:AB"), 21_000 + 6 * 16);
        assert_eq!(intrinsic_gas(&[0, 0, 1]), 21_000 + 4 + 4 + 16);
    }
}
