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
//! # Bifrost ThorNode Client 🌈
//!
//! Talks to ThorNode's REST API: checks the node is whitelisted, discovers
//! the vaults this node signs for, polls keysign and keygen work block by
//! block, and submits signed consensus-layer transactions.

use bifrost_context::BifrostContext;
use bifrost_signing_backends::PubKeyManager;
use bifrost_types::{
    Address, Chain, Heights, KeygenBlock, PubKey, RawVaults, RpcUrl, StdTx,
    TxOutItem,
};
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::retry::ConstantWithMaxRetryCount;
use bifrost_utils::{probe, Error, Result};

/// Polling ThorNode for keysign and keygen work
pub mod scanner;
/// Starting the client
pub mod start;
/// Serialized transaction submission
pub mod submitter;
/// ThorNode response types
pub mod types;

pub use scanner::ThorScanner;
pub use start::{start, StartupPolicies, ThorClientHandles};
pub use submitter::{SubmitHandle, SubmissionWorker};
pub use types::{AccountInfo, NodeAccount, NodeStatus};

/// A client for ThorNode's REST API, bound to this node's address.
#[derive(Debug, Clone)]
pub struct ThorClient {
    base: RpcUrl,
    http: RetryHttpClient,
    node_address: Address,
}

impl ThorClient {
    /// Creates a client talking to `base` on behalf of `node_address`.
    pub fn new(base: RpcUrl, http: RetryHttpClient, node_address: Address) -> Self {
        Self {
            base,
            http,
            node_address,
        }
    }

    /// Creates a client from the configuration in `ctx`.
    pub fn from_context(ctx: &BifrostContext) -> Result<Self> {
        let http = RetryHttpClient::new(ctx.http_client()?);
        Ok(Self::new(
            ctx.config.thorchain.chain_host.clone(),
            http,
            ctx.node_address()?,
        ))
    }

    /// This node's consensus-layer address.
    pub fn node_address(&self) -> &Address {
        &self.node_address
    }

    fn url(&self, path: &str) -> String {
        self.base.join_path(path)
    }

    /// The account number and sequence of this node.
    pub async fn get_account(&self) -> Result<AccountInfo> {
        let response: types::AccountResponse = self
            .http
            .get_json(&self.url(&format!("auth/accounts/{}", self.node_address)))
            .await?;
        Ok(response.result.value)
    }

    /// This node's account, as seen by the observer module.
    pub async fn get_observer(&self) -> Result<NodeAccount> {
        self.http
            .get_json(&self.url(&format!("thorchain/observer/{}", self.node_address)))
            .await
    }

    /// This node's account.
    pub async fn get_node_account(&self) -> Result<NodeAccount> {
        self.http
            .get_json(&self.url(&format!(
                "thorchain/nodeaccount/{}",
                self.node_address
            )))
            .await
    }

    /// Scan heights of `chain`, or of every chain when `None`.
    pub async fn get_last_blocks(&self, chain: Option<Chain>) -> Result<Vec<Heights>> {
        let path = match chain {
            Some(chain) => format!("thorchain/lastblock/{chain}"),
            None => "thorchain/lastblock".to_owned(),
        };
        let value: serde_json::Value = self.http.get_json(&self.url(&path)).await?;
        // a single chain may come back as an object.
        let heights = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)?,
            serde_json::Value::Null => Vec::new(),
            other => vec![serde_json::from_value(other)?],
        };
        Ok(heights)
    }

    /// The last height of `chain` the network witnessed.
    pub async fn last_observed_in(&self, chain: Chain) -> Result<i64> {
        let heights = self.get_last_blocks(Some(chain)).await?;
        Ok(heights
            .iter()
            .filter(|h| h.chain == chain)
            .map(|h| h.last_observed_in)
            .max()
            .unwrap_or_default())
    }

    /// The last ThorNode height whose outbound items were signed.
    pub async fn last_signed_out(&self) -> Result<i64> {
        let heights = self.get_last_blocks(None).await?;
        Ok(heights
            .iter()
            .map(|h| h.last_signed_out)
            .max()
            .unwrap_or_default())
    }

    /// ThorNode's current block height.
    pub async fn get_statechain_height(&self) -> Result<i64> {
        let heights = self.get_last_blocks(None).await?;
        Ok(heights
            .iter()
            .map(|h| h.consensus_height)
            .max()
            .unwrap_or_default())
    }

    /// The Asgard and Yggdrasil vaults.
    pub async fn get_vaults(&self) -> Result<RawVaults> {
        self.http
            .get_json(&self.url("thorchain/vaults/pubkeys"))
            .await
    }

    /// The outbound items scheduled at `height` for the vault `pk`.
    pub async fn get_keysign(&self, height: i64, pk: &PubKey) -> Result<Vec<TxOutItem>> {
        let response: types::KeysignResponse = self
            .http
            .get_json(&self.url(&format!("thorchain/keysign/{height}/{pk}")))
            .await?;
        let items = response
            .chains
            .into_values()
            .flat_map(|c| c.tx_array)
            .filter(|item| &item.vault_pub_key == pk)
            .collect();
        Ok(items)
    }

    /// The keygens scheduled at `height` that involve `pk`.
    pub async fn get_keygen(&self, height: i64, pk: &PubKey) -> Result<Option<KeygenBlock>> {
        let response: types::KeygenResponse = self
            .http
            .get_json(&self.url(&format!("thorchain/keygen/{height}/{pk}")))
            .await?;
        Ok(response
            .keygen_block
            .filter(|b| !b.keygens.is_empty())
            .map(KeygenBlock::with_ids))
    }

    /// Posts a signed transaction, returning its hash.
    ///
    /// The request is sent once. Sequence errors come back as
    /// [`Error::SequenceMismatch`], the caller owns sequence recovery.
    pub async fn broadcast(&self, tx: &StdTx) -> Result<String> {
        let request = types::BroadcastRequest { tx, mode: "sync" };
        let text = match self.http.post_json_once(&self.url("txs"), &request).await {
            Ok(text) => text,
            Err(Error::Http { body, .. }) if is_sequence_error(&body) => {
                return Err(Error::SequenceMismatch(body))
            }
            Err(e) => return Err(e),
        };
        let response: types::BroadcastResponse = serde_json::from_str(&text)?;
        if response.code != 0 {
            if is_sequence_error(&response.raw_log)
                || SEQUENCE_CODES.contains(&response.code)
            {
                return Err(Error::SequenceMismatch(response.raw_log));
            }
            return Err(Error::TxRejected {
                code: response.code,
                log: response.raw_log,
            });
        }
        let hash = response.txhash;
        match hex::decode(&hash) {
            Ok(bytes) if bytes.len() == 32 => Ok(hash),
            _ => Err(Error::Http {
                status: 200,
                body: format!("malformed transaction hash: {hash}"),
            }),
        }
    }

    /// Waits until ThorNode whitelists this node.
    ///
    /// A `Disabled` node fails right away, an unknown node is retried under `policy`.
    pub async fn wait_for_whitelist(
        &self,
        policy: ConstantWithMaxRetryCount,
    ) -> Result<NodeAccount> {
        let client = self;
        let task = move || async move {
            let account = match client.get_observer().await {
                Ok(account) => account,
                // not registered yet
                Err(Error::Http { status: 404, .. }) => NodeAccount::default(),
                Err(e) if e.is_retriable() => {
                    return Err(backoff::Error::transient(e))
                }
                Err(e) => return Err(backoff::Error::permanent(e)),
            };
            match account.status {
                NodeStatus::Disabled => Err(backoff::Error::permanent(
                    Error::NotWhitelisted {
                        status: account.status.to_string(),
                    },
                )),
                NodeStatus::Unknown => {
                    tracing::info!(
                        node = %client.node_address,
                        "node is not whitelisted yet, waiting",
                    );
                    Err(backoff::Error::transient(Error::NotWhitelisted {
                        status: account.status.to_string(),
                    }))
                }
                _ => Ok(account),
            }
        };
        let account = backoff::future::retry(policy, task).await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            node = %self.node_address,
            status = %account.status,
            whitelisted = true,
        );
        Ok(account)
    }

    /// Waits until the node account has a secp256k1 pubkey, then seeds `pub_keys`
    /// with it and the node's vault memberships.
    pub async fn discover_keys(
        &self,
        policy: ConstantWithMaxRetryCount,
        pub_keys: &PubKeyManager,
    ) -> Result<NodeAccount> {
        let client = self;
        let task = move || async move {
            let account = client.get_node_account().await.map_err(|e| {
                if e.is_retriable() {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })?;
            if account.pub_key_set.secp256k1.is_empty() {
                tracing::info!("node pubkey is not registered yet, waiting");
                return Err(backoff::Error::transient(Error::Timeout(
                    "waiting for the node pubkey",
                )));
            }
            Ok(account)
        };
        let account = backoff::future::retry(policy, task).await?;
        pub_keys.seed(
            account.pub_key_set.secp256k1.clone(),
            account.signer_membership.iter().cloned(),
        );
        tracing::debug!(
            pub_key = %account.pub_key_set.secp256k1,
            memberships = account.signer_membership.len(),
            "node keys discovered",
        );
        Ok(account)
    }
}

/// ABCI codes for an unauthorized signature and a wrong sequence.
const SEQUENCE_CODES: [u32; 2] = [4, 32];

fn is_sequence_error(log: &str) -> bool {
    log.to_ascii_lowercase().contains("sequence")
}
