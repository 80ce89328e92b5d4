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
use std::time::Duration;

use backoff::backoff::Backoff;
use bifrost_types::{RpcUrl, Secret};
use bifrost_utils::retry::ExponentialWithMaxRetryCount;
use bifrost_utils::{probe, Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// A previous output, as inlined by `getblock` verbosity 3.
#[derive(Debug, Clone, Deserialize)]
pub struct PrevOut {
    /// Value in BTC.
    pub value: f64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPubKey {
    /// The script, hex encoded.
    pub hex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerboseVin {
    /// Set on the coinbase input only.
    #[serde(default)]
    pub coinbase: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
    /// Only inlined by bitcoind 22 and later.
    #[serde(default)]
    pub prevout: Option<PrevOut>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerboseVout {
    /// Value in BTC.
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerboseTx {
    pub txid: String,
    pub vin: Vec<VerboseVin>,
    pub vout: Vec<VerboseVout>,
}

/// `getblock <hash> 3`
#[derive(Debug, Clone, Deserialize)]
pub struct VerboseBlock {
    pub hash: String,
    pub height: i64,
    pub tx: Vec<VerboseTx>,
}

/// One entry of `scantxoutset`.
#[derive(Debug, Clone, Deserialize)]
pub struct Unspent {
    pub txid: String,
    pub vout: u32,
    /// Value in BTC.
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
struct ScanResult {
    #[serde(default)]
    unspents: Vec<Unspent>,
}

#[derive(Debug, Deserialize)]
struct FeeEstimate {
    /// BTC per kvB. Missing when bitcoind has no estimate.
    feerate: Option<f64>,
}

/// A bitcoind JSON-RPC client with basic auth.
///
/// Transport failures and 5xx responses without an RPC error are retried.
/// RPC errors are returned right away.
#[derive(Debug, Clone)]
pub struct BitcoinRpc {
    url: RpcUrl,
    http: reqwest::Client,
    username: String,
    password: Secret,
    policy: ExponentialWithMaxRetryCount,
}

impl BitcoinRpc {
    /// Creates a client for the bitcoind at `url`.
    pub fn new(url: RpcUrl, http: reqwest::Client, username: String, password: Secret) -> Self {
        Self {
            url,
            http,
            username,
            password,
            policy: ExponentialWithMaxRetryCount::http_default(),
        }
    }

    /// Replaces the retry policy.
    pub fn with_policy(mut self, policy: ExponentialWithMaxRetryCount) -> Self {
        self.policy = policy;
        self
    }

    /// Calls `method`, retrying transient failures.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let mut policy = self.policy.clone();
        policy.reset();
        let client = self;
        let task = move || {
            let params = params.clone();
            async move {
                client.call_once(method, params).await.map_err(|e| {
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
                chain = "BTC",
                method,
                error = %e,
                wait = ?wait,
            );
        };
        backoff::future::retry_notify(policy, task, notify).await
    }

    async fn call_once<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = json!({
            "jsonrpc": "1.0",
            "id": "bifrost",
            "method": method,
            "params": params,
        });
        let mut builder = self.http.post(self.url.as_str()).json(&request);
        if !self.username.is_empty() {
            builder = builder.basic_auth(&self.username, Some(self.password.expose()));
        }
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<RpcResponse<T>>(&body) {
            Ok(RpcResponse {
                error: Some(e), ..
            }) => Err(Error::ChainClient(format!(
                "bitcoind {method} failed ({}): {}",
                e.code, e.message
            ))),
            Ok(RpcResponse {
                result: Some(result),
                ..
            }) if status.is_success() => Ok(result),
            _ if !status.is_success() => Err(Error::Http {
                status: status.as_u16(),
                body,
            }),
            Ok(_) => Err(Error::ChainClient(format!("bitcoind {method} returned no result"))),
            Err(e) => Err(e.into()),
        }
    }

    /// `getblockcount`
    pub async fn block_count(&self) -> Result<i64> {
        self.call("getblockcount", json!([])).await
    }

    /// `getblockhash`
    pub async fn block_hash(&self, height: i64) -> Result<String> {
        self.call("getblockhash", json!([height])).await
    }

    /// `getblock` with every transaction and its previous outputs.
    pub async fn block(&self, hash: &str) -> Result<VerboseBlock> {
        self.call("getblock", json!([hash, 3])).await
    }

    /// `getrawtransaction`, decoded.
    pub async fn raw_transaction(&self, txid: &str) -> Result<VerboseTx> {
        self.call("getrawtransaction", json!([txid, true])).await
    }

    /// The unspent outputs locked by `script`, via `scantxoutset`.
    pub async fn unspents(&self, script_hex: &str) -> Result<Vec<Unspent>> {
        let descriptor = format!("raw({script_hex})");
        let result: ScanResult = self
            .call("scantxoutset", json!(["start", [descriptor]]))
            .await?;
        Ok(result.unspents)
    }

    /// `estimatesmartfee` in sat/vB, if bitcoind has an estimate.
    pub async fn estimate_fee_rate(&self, blocks: u16) -> Result<Option<u64>> {
        let estimate: FeeEstimate = self.call("estimatesmartfee", json!([blocks])).await?;
        Ok(estimate.feerate.map(|btc_per_kvb| {
            let sat_per_kvb = (btc_per_kvb * 100_000_000.0).round() as u64;
            (sat_per_kvb + 999) / 1_000
        }))
    }

    /// `sendrawtransaction`, returning the txid.
    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<String> {
        self.call_once("sendrawtransaction", json!([hex::encode(raw_tx)]))
            .await
    }
}
