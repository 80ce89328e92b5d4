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
//! # Bifrost Bitcoin Client 🌈
//!
//! Scans bitcoind over JSON-RPC for payments to and spends from vaults, and
//! builds P2WPKH spends carrying the memo in an `OP_RETURN` output.

use std::collections::HashSet;
use std::sync::Arc;

use backoff::ExponentialBackoff;
use bifrost_chain_client_traits::{
    signer_for, BlockScanner, BlockSource, ChainClient, ScanTask, VaultLookup,
};
use bifrost_context::{BifrostContext, Shutdown};
use bifrost_signing_backends::KeySignerSelector;
use bifrost_types::{Asset, Block, Chain, Network, TxOutItem};
use bifrost_utils::metric::Metrics;
use bifrost_utils::{Error, Result};
use bitcoin::{Amount, OutPoint};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Block extraction
pub mod block;
/// bitcoind JSON-RPC
#[allow(missing_docs)]
pub mod rpc;
/// Spend building and signing
pub mod tx;

pub use block::BitcoinSource;
pub use rpc::BitcoinRpc;

/// The fee rate used when bitcoind has no estimate and none is configured, in sat/vB.
pub const DEFAULT_FEE_RATE: u64 = 25;
/// Blocks `estimatesmartfee` targets.
pub const FEE_TARGET_BLOCKS: u16 = 2;

/// The Bitcoin [`ChainClient`].
pub struct BitcoinClient {
    source: Arc<BitcoinSource>,
    network: Network,
    selector: KeySignerSelector,
    vaults: Arc<dyn VaultLookup>,
    backoff: ExponentialBackoff,
    metrics: Arc<Metrics>,
    scan: ScanTask,
    fee_rate: u64,
    // outputs spent by signed transactions that bitcoind still reports unspent.
    pending: Mutex<HashSet<OutPoint>>,
}

impl std::fmt::Debug for BitcoinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitcoinClient")
            .field("network", &self.network)
            .field("fee_rate", &self.fee_rate)
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl BitcoinClient {
    /// Creates a client over `rpc`. `fee_rate` is the fallback rate in sat/vB.
    pub fn new(
        rpc: BitcoinRpc,
        network: Network,
        selector: KeySignerSelector,
        vaults: Arc<dyn VaultLookup>,
        backoff: ExponentialBackoff,
        metrics: Arc<Metrics>,
        fee_rate: u64,
    ) -> Self {
        Self {
            source: Arc::new(BitcoinSource::new(rpc, network)),
            network,
            selector,
            vaults,
            backoff,
            metrics,
            scan: ScanTask::default(),
            fee_rate,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Creates the client from the `BTC` entry of the configuration.
    pub fn from_context(
        ctx: &BifrostContext,
        selector: KeySignerSelector,
        vaults: Arc<dyn VaultLookup>,
    ) -> Result<Self> {
        let config = ctx.config.chain(Chain::Bitcoin).ok_or_else(|| Error::ChainNotFound {
            chain: Chain::Bitcoin.to_string(),
        })?;
        let rpc = BitcoinRpc::new(
            config.chain_host.clone(),
            ctx.http_client()?,
            config.username.clone(),
            config.password.clone(),
        );
        Ok(Self::new(
            rpc,
            config.network(ctx.config.network),
            selector,
            vaults,
            ctx.config.back_off.exponential(),
            ctx.metrics.clone(),
            config.fee_rate.unwrap_or(DEFAULT_FEE_RATE),
        ))
    }

    fn rpc(&self) -> &BitcoinRpc {
        self.source.rpc()
    }

    async fn fee_rate(&self) -> u64 {
        match self.rpc().estimate_fee_rate(FEE_TARGET_BLOCKS).await {
            Ok(Some(rate)) if rate > 0 => rate,
            Ok(_) => self.fee_rate,
            Err(e) => {
                tracing::warn!(error = %e, fallback = self.fee_rate, "fee estimation failed");
                self.fee_rate
            }
        }
    }

    /// The vault's spendable outputs, minus those already spent by this client.
    async fn utxos(&self, script_hex: &str) -> Result<Vec<tx::Utxo>> {
        let utxos = self
            .rpc()
            .unspents(script_hex)
            .await?
            .iter()
            .map(tx::Utxo::try_from)
            .collect::<Result<Vec<_>>>()?;
        let mut pending = self.pending.lock();
        // gone from the utxo set: the spend confirmed
        pending.retain(|outpoint| utxos.iter().any(|u| &u.outpoint == outpoint));
        Ok(utxos
            .into_iter()
            .filter(|u| !pending.contains(&u.outpoint))
            .collect())
    }
}

#[async_trait::async_trait]
impl ChainClient for BitcoinClient {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
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

    #[tracing::instrument(skip_all, fields(chain = "BTC", in_hash = %item.in_hash))]
    async fn sign(&self, item: &TxOutItem, _height: i64) -> Result<Option<Vec<u8>>> {
        let Some(signer) = signer_for(&self.selector, self.vaults.as_ref(), item, self.network)?
        else {
            return Ok(None);
        };
        if item.coin.asset != Asset::btc() {
            return Err(Error::InvalidAsset(item.coin.asset.to_string()));
        }
        let amount = u64::try_from(item.coin.amount)
            .map(Amount::from_sat)
            .map_err(|_| Error::ChainClient(format!("amount {} overflows", item.coin.amount)))?;
        let to = tx::recipient_script(&item.to_address, self.network)?;
        let change = tx::vault_script(&item.vault_pub_key)?;
        let utxos = self.utxos(&hex::encode(change.as_bytes())).await?;
        let fee_rate = self.fee_rate().await;

        let (unsigned, values) = tx::build_spend(utxos, to, amount, &item.memo, change, fee_rate)?;
        let signed = tx::sign_spend(unsigned, &values, signer.as_ref()).await?;
        self.pending
            .lock()
            .extend(signed.input.iter().map(|input| input.previous_output));
        tracing::debug!(
            txid = %signed.compute_txid(),
            inputs = signed.input.len(),
            fee_rate,
            "signed bitcoin spend",
        );
        Ok(Some(bitcoin::consensus::encode::serialize(&signed)))
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String> {
        match self.rpc().send_raw_transaction(raw_tx).await {
            Ok(txid) => Ok(txid),
            Err(e) => {
                // release the inputs so the next attempt can spend them
                if let Ok(tx) =
                    bitcoin::consensus::encode::deserialize::<bitcoin::Transaction>(raw_tx)
                {
                    let mut pending = self.pending.lock();
                    for input in &tx.input {
                        pending.remove(&input.previous_output);
                    }
                }
                Err(e)
            }
        }
    }
}
