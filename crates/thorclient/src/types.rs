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
//! ThorNode's REST response shapes.

use std::collections::BTreeMap;

use bifrost_types::serde_helpers::{null_as_default, u64_string};
use bifrost_types::{Address, KeygenBlock, PubKey, PubKeySet, StdTx, TxOutItem};
use serde::{Deserialize, Serialize};

/// The account number and sequence consensus-layer transactions are signed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct AccountInfo {
    /// The account number.
    #[serde(default, with = "u64_string")]
    pub account_number: u64,
    /// The next sequence.
    #[serde(default, with = "u64_string")]
    pub sequence: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountResult {
    pub value: AccountInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountResponse {
    pub result: AccountResult,
}

/// The state of a node account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum NodeStatus {
    /// Whitelisted, but not bonded yet.
    #[serde(alias = "whitelisted")]
    Whitelisted,
    /// Waiting to churn in.
    #[serde(alias = "standby")]
    Standby,
    /// Ready to churn in.
    #[serde(alias = "ready")]
    Ready,
    /// Validating.
    #[serde(alias = "active")]
    Active,
    /// Disabled by the network.
    #[serde(alias = "disabled")]
    Disabled,
    /// Not known to ThorNode, or a status this node does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl NodeStatus {
    /// Whether the node may observe and sign.
    pub fn is_whitelisted(&self) -> bool {
        !matches!(self, NodeStatus::Unknown | NodeStatus::Disabled)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A node account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeAccount {
    /// The node's consensus-layer address.
    #[serde(default)]
    pub node_address: Address,
    /// The node's state.
    #[serde(default)]
    pub status: NodeStatus,
    /// The node's registered keys.
    #[serde(default, deserialize_with = "null_as_default")]
    pub pub_key_set: PubKeySet,
    /// The node's validator consensus pubkey.
    #[serde(default)]
    pub validator_cons_pub_key: String,
    /// The vaults this node signs for.
    #[serde(default, deserialize_with = "null_as_default")]
    pub signer_membership: Vec<PubKey>,
    /// The node's registered IP address.
    #[serde(default)]
    pub ip_address: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChainTxOut {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tx_array: Vec<TxOutItem>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct KeysignResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub chains: BTreeMap<String, ChainTxOut>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct KeygenResponse {
    #[serde(default)]
    pub keygen_block: Option<KeygenBlock>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BroadcastRequest<'a> {
    pub tx: &'a StdTx,
    pub mode: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BroadcastResponse {
    #[serde(default)]
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_parses_known_and_unknown_values() {
        let parse = |s: &str| serde_json::from_value::<NodeStatus>(serde_json::json!(s)).unwrap();
        assert_eq!(parse("Active"), NodeStatus::Active);
        assert_eq!(parse("whitelisted"), NodeStatus::Whitelisted);
        assert_eq!(parse("Disabled"), NodeStatus::Disabled);
        assert_eq!(parse("Unknown"), NodeStatus::Unknown);
        assert_eq!(parse("Retiring"), NodeStatus::Unknown);
        assert!(!parse("Retiring").is_whitelisted());
        assert!(parse("Standby").is_whitelisted());
    }

    #[test]
    fn missing_status_defaults_to_unknown() {
        let account: NodeAccount =
            serde_json::from_value(serde_json::json!({ "node_address": "tthor1node" })).unwrap();
        assert_eq!(account.status, NodeStatus::Unknown);
    }
}
