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
use base64::Engine;
use bifrost_chain_client_traits::{BlockSource, VaultLookup};
use bifrost_types::serde_helpers::{i64_string, null_as_default};
use bifrost_types::{Address, Asset, Block, Chain, Coin, Network, RpcUrl, TxIn};
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::amino::{self, SendMsg, Token};

/// The fee Binance Chain charges for a single transfer, in jager.
pub const SINGLE_TRANSFER_FEE: u128 = 37_500;
/// The fee per output of a multi-send, in jager.
pub const MULTI_TRANSFER_FEE: u128 = 30_000;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

impl<T> RpcResponse<T> {
    fn into_result(self) -> Result<T> {
        match (self.result, self.error) {
            (_, Some(e)) => Err(Error::ChainClient(format!(
                "tendermint rpc error {}: {} {}",
                e.code, e.message, e.data
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(Error::ChainClient("empty tendermint rpc response".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Status {
    node_info: NodeInfo,
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    network: String,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    #[serde(with = "i64_string")]
    latest_block_height: i64,
}

#[derive(Debug, Deserialize)]
struct BlockId {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct BlockMeta {
    block_id: BlockId,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(with = "i64_string")]
    height: i64,
}

#[derive(Debug, Deserialize)]
struct BlockData {
    #[serde(default, deserialize_with = "null_as_default")]
    txs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    header: Header,
    data: BlockData,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    block_id: Option<BlockId>,
    block_meta: Option<BlockMeta>,
    block: RawBlock,
}

/// An account as reported by the DEX API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Account {
    /// The account number.
    #[serde(with = "i64_string")]
    pub account_number: i64,
    /// The next sequence to sign with.
    #[serde(with = "i64_string")]
    pub sequence: i64,
}

#[derive(Debug, Deserialize)]
struct BroadcastResult {
    code: u32,
    #[serde(default)]
    log: String,
    hash: String,
}

/// Talks to a Binance Chain node over Tendermint RPC, and to the DEX API.
#[derive(Debug)]
pub struct BinanceRpc {
    base: RpcUrl,
    api: Option<RpcUrl>,
    http: RetryHttpClient,
    post_mode: bool,
    network: Network,
    chain_id: OnceCell<String>,
}

impl BinanceRpc {
    /// Creates a client for the node at `base`.
    pub fn new(
        base: RpcUrl,
        api: Option<RpcUrl>,
        http: RetryHttpClient,
        post_mode: bool,
        network: Network,
    ) -> Self {
        Self {
            base,
            api,
            http,
            post_mode,
            network,
            chain_id: OnceCell::new(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response: RpcResponse<T> = self.http.get_json(&self.base.join_path(path)).await?;
        response.into_result()
    }

    async fn status(&self) -> Result<Status> {
        self.call("status").await
    }

    /// The Tendermint chain id, read once from `/status`.
    pub async fn chain_id(&self) -> Result<&str> {
        let id = self
            .chain_id
            .get_or_try_init(|| async { self.status().await.map(|s| s.node_info.network) })
            .await?;
        Ok(id.as_str())
    }

    /// The account number and sequence of `address`.
    pub async fn account(&self, address: &Address) -> Result<Account> {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| Error::ChainClient("binance api_host is not configured".into()))?;
        self.http
            .get_json(&api.join_path(&format!("api/v1/account/{address}")))
            .await
    }

    /// Sends a signed transaction with `broadcast_tx_sync`, returning its hash.
    pub async fn broadcast(&self, raw_tx: &[u8]) -> Result<String> {
        let body = if self.post_mode {
            let request = serde_json::json!({
                "jsonrpc": "2.0",
                "id": "bifrost",
                "method": "broadcast_tx_sync",
                "params": {
                    "tx": base64::engine::general_purpose::STANDARD.encode(raw_tx),
                },
            });
            self.http.post_json_once(self.base.as_str(), &request).await?
        } else {
            let url = self
                .base
                .join_path(&format!("broadcast_tx_sync?tx=0x{}", hex::encode(raw_tx)));
            self.http.get_text_once(&url).await?
        };
        let response: RpcResponse<BroadcastResult> = serde_json::from_str(&body)?;
        let result = response.into_result()?;
        if result.code != 0 {
            return Err(Error::TxRejected {
                code: result.code,
                log: result.log,
            });
        }
        Ok(result.hash)
    }
}

#[async_trait::async_trait]
impl BlockSource for BinanceRpc {
    fn chain(&self) -> Chain {
        Chain::Binance
    }

    async fn tip(&self) -> Result<i64> {
        Ok(self.status().await?.sync_info.latest_block_height)
    }

    async fn fetch_block(&self, height: i64, vaults: &dyn VaultLookup) -> Result<Block> {
        let result: BlockResult = self.call(&format!("block?height={height}")).await?;
        let hash = result
            .block_id
            .or(result.block_meta.map(|m| m.block_id))
            .map(|id| id.hash)
            .unwrap_or_default();
        if result.block.header.height != height {
            return Err(Error::MalformedBlock {
                height,
                reason: format!("node returned block {}", result.block.header.height),
            });
        }
        extract_block(height, hash, &result.block.data.txs, vaults, self.network)
    }
}

/// Normalizes the base64 transactions of a block, keeping transfers to and from vaults.
///
/// Transactions that are not decodable as transfers are skipped.
pub fn extract_block(
    height: i64,
    hash: String,
    txs: &[String],
    vaults: &dyn VaultLookup,
    network: Network,
) -> Result<Block> {
    let hrp = Chain::Binance
        .address_prefix(network)
        .ok_or_else(|| Error::UnsupportedChain(Chain::Binance.to_string()))?;
    let mut block = Block::new(Chain::Binance, height, hash);
    for encoded in txs {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        let tx_id = hex::encode_upper(Sha256::digest(&bytes));
        let decoded = match amino::decode_tx(&bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(height, %tx_id, error = %e, "skipping undecodable transaction");
                continue;
            }
        };
        for send in &decoded.sends {
            let observed = Observed {
                block: &block,
                tx_id: &tx_id,
                memo: &decoded.memo,
                hrp,
            };
            let (txs, out_txs) = observed.transfers(send, vaults)?;
            block.txs.extend(txs);
            block.out_txs.extend(out_txs);
        }
    }
    Ok(block)
}

struct Observed<'a> {
    block: &'a Block,
    tx_id: &'a str,
    memo: &'a str,
    hrp: &'a str,
}

impl Observed<'_> {
    fn transfers(&self, send: &SendMsg, vaults: &dyn VaultLookup) -> Result<(Vec<TxIn>, Vec<TxIn>)> {
        let (Some(input), Some(output)) = (send.inputs.first(), send.outputs.first()) else {
            return Ok(Default::default());
        };
        let sender = Address::from_bech32(self.hrp, &input.address)?;
        let gas = vec![Coin::new(Asset::bnb(), fee(send.outputs.len()))];
        let mut txs = Vec::new();
        for out in &send.outputs {
            let to = Address::from_bech32(self.hrp, &out.address)?;
            if let Some(pk) = vaults.lookup(Chain::Binance, &to) {
                txs.push(self.tx_in(sender.clone(), to, coins(&out.coins), gas.clone(), pk));
            }
        }
        let mut out_txs = Vec::new();
        if let Some(pk) = vaults.lookup(Chain::Binance, &sender) {
            let to = Address::from_bech32(self.hrp, &output.address)?;
            out_txs.push(self.tx_in(sender, to, coins(&input.coins), gas, pk));
        }
        Ok((txs, out_txs))
    }

    fn tx_in(
        &self,
        from: Address,
        to: Address,
        coins: Vec<Coin>,
        gas: Vec<Coin>,
        observed_vault_pub_key: bifrost_types::PubKey,
    ) -> TxIn {
        TxIn {
            chain: Chain::Binance,
            block_height: self.block.height,
            block_hash: self.block.hash.clone(),
            tx_id: self.tx_id.to_owned(),
            from,
            to,
            coins,
            gas,
            memo: self.memo.to_owned(),
            observed_vault_pub_key,
        }
    }
}

fn fee(outputs: usize) -> u128 {
    match outputs {
        0 | 1 => SINGLE_TRANSFER_FEE,
        n => MULTI_TRANSFER_FEE * n as u128,
    }
}

fn coins(tokens: &[Token]) -> Vec<Coin> {
    tokens
        .iter()
        .filter(|t| t.amount > 0)
        .map(|t| Coin::new(Asset::new(Chain::Binance, &t.denom), t.amount as u128))
        .collect()
}
