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
//! Consensus-layer messages Bifrost sends to ThorNode, and the cosmos
//! `StdTx` envelope that carries them.

use bifrost_utils::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::serde_helpers::{i64_string, u64_string};
use crate::{Address, Chain, Coin, PubKey, PubKeySet, TxIn};

/// A transaction as ThorNode records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// The chain-native transaction id.
    pub id: String,
    /// The chain.
    pub chain: Chain,
    /// The sender.
    pub from_address: Address,
    /// The recipient.
    pub to_address: Address,
    /// The value moved.
    pub coins: Vec<Coin>,
    /// The fee paid.
    pub gas: Vec<Coin>,
    /// The memo.
    pub memo: String,
}

/// A transaction witnessed by this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTx {
    /// The transaction.
    pub tx: Tx,
    /// The external block height it was seen at.
    #[serde(with = "i64_string")]
    pub block_height: i64,
    /// The vault that owns the observed address.
    pub observed_pub_key: PubKey,
}

impl From<&TxIn> for ObservedTx {
    fn from(tx: &TxIn) -> Self {
        Self {
            tx: Tx {
                id: tx.tx_id.clone(),
                chain: tx.chain,
                from_address: tx.from.clone(),
                to_address: tx.to.clone(),
                coins: tx.coins.clone(),
                gas: tx.gas.clone(),
                memo: tx.memo.clone(),
            },
            block_height: tx.block_height,
            observed_pub_key: tx.observed_vault_pub_key.clone(),
        }
    }
}

/// Witnesses funds arriving at vaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgObservedTxIn {
    /// The observed transactions.
    pub txs: Vec<ObservedTx>,
    /// The node's consensus-layer address.
    pub signer: Address,
}

/// Confirms funds leaving vaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgObservedTxOut {
    /// The observed transactions.
    pub txs: Vec<ObservedTx>,
    /// The node's consensus-layer address.
    pub signer: Address,
}

/// Reports the pubkey agreed on by a keygen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTssPool {
    /// `sha256` over the sorted member pubkeys.
    pub id: String,
    /// The new vault pubkey.
    pub pool_pub_key: PubKey,
    /// The members of the keygen.
    pub pubkeys: Vec<PubKey>,
    /// The node's consensus-layer address.
    pub signer: Address,
}

impl MsgTssPool {
    /// Builds the message, computing its id.
    pub fn new(pool_pub_key: PubKey, pubkeys: Vec<PubKey>, signer: Address) -> Self {
        let mut sorted: Vec<&str> = pubkeys.iter().map(PubKey::as_str).collect();
        sorted.sort_unstable();
        let mut hasher = Sha256::new();
        for pk in sorted {
            hasher.update(pk.as_bytes());
        }
        Self {
            id: hex::encode_upper(hasher.finalize()),
            pool_pub_key,
            pubkeys,
            signer,
        }
    }
}

/// The members blamed for a failed TSS ceremony.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blame {
    /// Why the ceremony failed.
    #[serde(default)]
    pub fail_reason: String,
    /// The pubkeys of the blamed members.
    #[serde(default, deserialize_with = "crate::serde_helpers::null_as_default")]
    pub blame_nodes: Vec<PubKey>,
}

/// Attributes a failed keysign (or keygen) to the members that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTssKeysignFail {
    /// See [`MsgTssKeysignFail::compute_id`].
    pub id: String,
    /// The ThorNode height of the failed work.
    #[serde(with = "i64_string")]
    pub height: i64,
    /// Who failed.
    pub blame: Blame,
    /// The memo of the failed item.
    pub memo: String,
    /// The coins of the failed item, empty for keygen.
    pub coins: Vec<Coin>,
    /// The node's consensus-layer address.
    pub signer: Address,
}

impl MsgTssKeysignFail {
    /// Builds the message, computing its id.
    pub fn new(
        height: i64,
        blame: Blame,
        memo: impl Into<String>,
        coins: Vec<Coin>,
        signer: Address,
    ) -> Self {
        let memo = memo.into();
        let id = Self::compute_id(height, &blame.blame_nodes, &memo, &coins);
        Self {
            id,
            height,
            blame,
            memo,
            coins,
            signer,
        }
    }

    /// `sha256(sorted blamed pubkeys ∥ height ∥ memo ∥ "ASSET AMOUNT"...)`, upper case hex.
    ///
    /// Identical failures yield identical ids, so every member reporting one is counted once.
    pub fn compute_id(
        height: i64,
        blamed: &[PubKey],
        memo: &str,
        coins: &[Coin],
    ) -> String {
        let mut sorted: Vec<&str> = blamed.iter().map(PubKey::as_str).collect();
        sorted.sort_unstable();
        let mut hasher = Sha256::new();
        for pk in sorted {
            hasher.update(pk.as_bytes());
        }
        hasher.update(height.to_string().as_bytes());
        hasher.update(memo.as_bytes());
        for coin in coins {
            hasher.update(coin.to_string().as_bytes());
        }
        hex::encode_upper(hasher.finalize())
    }
}

/// Registers the node's keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetNodeKeys {
    /// The node's pubkeys.
    #[serde(rename = "pub_key_set")]
    pub node_pub_keys: PubKeySet,
    /// The validator consensus pubkey.
    pub validator_cons_pub_key: String,
    /// The node's consensus-layer address.
    pub signer: Address,
}

/// Registers the node's public IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetIPAddress {
    /// The IP address.
    pub ip_address: String,
    /// The node's consensus-layer address.
    pub signer: Address,
}

/// Any message Bifrost submits, tagged with its amino type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ThorMsg {
    /// Inbound witness.
    #[serde(rename = "thorchain/ObservedTxIn")]
    ObservedTxIn(MsgObservedTxIn),
    /// Outbound witness.
    #[serde(rename = "thorchain/ObservedTxOut")]
    ObservedTxOut(MsgObservedTxOut),
    /// Keygen result.
    #[serde(rename = "thorchain/TssPool")]
    TssPool(MsgTssPool),
    /// Signing failure.
    #[serde(rename = "thorchain/TssKeysignFail")]
    TssKeysignFail(MsgTssKeysignFail),
    /// Node key registration.
    #[serde(rename = "thorchain/MsgSetNodeKeys")]
    SetNodeKeys(MsgSetNodeKeys),
    /// Node IP registration.
    #[serde(rename = "thorchain/MsgSetIPAddress")]
    SetIpAddress(MsgSetIPAddress),
}

impl ThorMsg {
    /// A short name, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ThorMsg::ObservedTxIn(_) => "observed_tx_in",
            ThorMsg::ObservedTxOut(_) => "observed_tx_out",
            ThorMsg::TssPool(_) => "tss_pool",
            ThorMsg::TssKeysignFail(_) => "tss_keysign_fail",
            ThorMsg::SetNodeKeys(_) => "set_node_keys",
            ThorMsg::SetIpAddress(_) => "set_ip_address",
        }
    }
}

/// A fee amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCoin {
    /// The denomination.
    pub denom: String,
    /// The amount, as a decimal string.
    pub amount: String,
}

/// The fee of a consensus-layer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFee {
    /// Fee amounts. ThorNode charges none.
    pub amount: Vec<FeeCoin>,
    /// The gas limit, as a decimal string.
    pub gas: String,
}

impl Default for StdFee {
    fn default() -> Self {
        Self {
            amount: Vec::new(),
            gas: "100000000".into(),
        }
    }
}

/// An amino encoded public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AminoPubKey {
    /// Always `tendermint/PubKeySecp256k1`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Base64 of the compressed key.
    pub value: String,
}

/// A signature over a [`StdSignDoc`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    /// The signer's key.
    pub pub_key: AminoPubKey,
    /// Base64 of the 64 byte `r ∥ s` signature.
    pub signature: String,
}

/// A signed consensus-layer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdTx {
    /// The messages.
    pub msg: Vec<ThorMsg>,
    /// The fee.
    pub fee: StdFee,
    /// The signatures.
    pub signatures: Vec<StdSignature>,
    /// The memo.
    pub memo: String,
}

/// The document a consensus-layer transaction signature commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StdSignDoc<'a> {
    /// The signer's account number.
    #[serde(with = "u64_string")]
    pub account_number: u64,
    /// The consensus chain id.
    pub chain_id: &'a str,
    /// The fee.
    pub fee: &'a StdFee,
    /// The memo.
    pub memo: &'a str,
    /// The messages.
    pub msgs: &'a [ThorMsg],
    /// The signer's sequence.
    #[serde(with = "u64_string")]
    pub sequence: u64,
}

impl StdSignDoc<'_> {
    /// The canonical bytes to sign.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }
}

/// Serializes `value` as compact JSON with every object's keys sorted.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&value)?)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Asset;

    fn pk(seed: u8) -> PubKey {
        let secret = libsecp256k1::SecretKey::parse(&[seed; 32]).unwrap();
        PubKey::from_secp256k1(&libsecp256k1::PublicKey::from_secret_key(&secret))
            .unwrap()
    }

    #[test]
    fn keysign_fail_id_is_deterministic() {
        let coins = vec![Coin::new(Asset::bnb(), 100)];
        let blame = |nodes| Blame {
            fail_reason: "timeout".into(),
            blame_nodes: nodes,
        };
        let signer = Address::new("thor1signer");
        let one = MsgTssKeysignFail::new(
            1718,
            blame(vec![pk(1), pk(2)]),
            "OUTBOUND:ABC",
            coins.clone(),
            signer.clone(),
        );
        let two = MsgTssKeysignFail::new(
            1718,
            blame(vec![pk(2), pk(1)]),
            "OUTBOUND:ABC",
            coins.clone(),
            signer,
        );
        assert_eq!(one.id, two.id);

        let mut sorted = vec![pk(1).to_string(), pk(2).to_string()];
        sorted.sort();
        let preimage = format!("{}{}1718OUTBOUND:ABCBNB.BNB 100", sorted[0], sorted[1]);
        assert_eq!(one.id, hex::encode_upper(Sha256::digest(preimage.as_bytes())));
    }

    #[test]
    fn tss_pool_id_ignores_order() {
        let signer = Address::new("thor1signer");
        let a = MsgTssPool::new(pk(3), vec![pk(1), pk(2)], signer.clone());
        let b = MsgTssPool::new(pk(3), vec![pk(2), pk(1)], signer);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let value = serde_json::json!({ "b": 1, "a": { "d": [ { "z": 1, "y": 2 } ], "c": null } });
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"c":null,"d":[{"y":2,"z":1}]},"b":1}"#
        );
    }

    #[test]
    fn messages_carry_their_amino_type() {
        let msg = ThorMsg::SetIpAddress(MsgSetIPAddress {
            ip_address: "1.2.3.4".into(),
            signer: Address::new("thor1signer"),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "thorchain/MsgSetIPAddress");
        assert_eq!(json["value"]["ip_address"], "1.2.3.4");
    }
}
