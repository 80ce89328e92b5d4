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
use bifrost_utils::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::serde_helpers::{i64_string, null_as_default};
use crate::{Address, Chain, Coin, Network, PubKey};

/// A transaction observed on an external chain, moving funds into (or out of) a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// The chain the transaction happened on.
    pub chain: Chain,
    /// The height of the block containing it.
    pub block_height: i64,
    /// The hash of the block containing it.
    pub block_hash: String,
    /// The chain-native transaction id.
    pub tx_id: String,
    /// The sender.
    pub from: Address,
    /// The recipient.
    pub to: Address,
    /// The value moved.
    pub coins: Vec<Coin>,
    /// The fee paid.
    pub gas: Vec<Coin>,
    /// The memo attached to the transaction.
    pub memo: String,
    /// The vault that owns the observed address.
    pub observed_vault_pub_key: PubKey,
}

impl TxIn {
    /// Checks that the recipient is the observed vault's address and the sender belongs to the chain.
    pub fn validate_inbound(&self, network: Network) -> Result<()> {
        self.validate_common()?;
        let vault_address =
            self.observed_vault_pub_key.address_on(self.chain, network)?;
        if self.to != vault_address {
            return Err(Error::InvalidAddress(format!(
                "{} is not the address of vault {} on {}",
                self.to, self.observed_vault_pub_key, self.chain
            )));
        }
        if !self.from.is_chain(self.chain) {
            return Err(Error::InvalidAddress(self.from.to_string()));
        }
        Ok(())
    }

    /// Checks that the sender is the observed vault's address.
    pub fn validate_outbound(&self, network: Network) -> Result<()> {
        self.validate_common()?;
        let vault_address =
            self.observed_vault_pub_key.address_on(self.chain, network)?;
        if self.from != vault_address {
            return Err(Error::InvalidAddress(format!(
                "{} is not the address of vault {} on {}",
                self.from, self.observed_vault_pub_key, self.chain
            )));
        }
        Ok(())
    }

    fn validate_common(&self) -> Result<()> {
        if self.tx_id.is_empty() {
            return Err(Error::MalformedBlock {
                height: self.block_height,
                reason: "transaction without id".into(),
            });
        }
        if self.coins.is_empty() {
            return Err(Error::MalformedBlock {
                height: self.block_height,
                reason: format!("transaction {} carries no coins", self.tx_id),
            });
        }
        Ok(())
    }
}

/// A block normalized across chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The chain.
    pub chain: Chain,
    /// The block height.
    pub height: i64,
    /// The block hash.
    pub hash: String,
    /// Transactions paying into a vault.
    pub txs: Vec<TxIn>,
    /// Transactions sent by a vault.
    pub out_txs: Vec<TxIn>,
}

impl Block {
    /// An empty block of `chain`.
    pub fn new(chain: Chain, height: i64, hash: impl Into<String>) -> Self {
        Self {
            chain,
            height,
            hash: hash.into(),
            txs: Vec::new(),
            out_txs: Vec::new(),
        }
    }

    /// Whether the block carries nothing to witness.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty() && self.out_txs.is_empty()
    }
}

/// An outbound instruction: ThorNode asks a vault to send a coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutItem {
    /// The chain to send on.
    pub chain: Chain,
    /// The recipient.
    #[serde(rename = "to")]
    pub to_address: Address,
    /// The vault that must sign.
    #[serde(rename = "vault_pubkey")]
    pub vault_pub_key: PubKey,
    /// What to send.
    pub coin: Coin,
    /// The memo to attach.
    pub memo: String,
    /// The inbound transaction that caused this outbound.
    pub in_hash: String,
    /// The outbound hash, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_hash: Option<String>,
}

impl TxOutItem {
    /// Checks that every required field is set and the coin belongs to the item's chain.
    pub fn validate(&self) -> Result<()> {
        if self.to_address.is_empty()
            || self.vault_pub_key.is_empty()
            || self.memo.is_empty()
            || self.in_hash.is_empty()
        {
            return Err(Error::InvalidAddress(format!(
                "incomplete outbound item for {}",
                self.in_hash
            )));
        }
        if self.coin.asset.chain != self.chain {
            return Err(Error::InvalidAsset(format!(
                "{} cannot be sent on {}",
                self.coin.asset, self.chain
            )));
        }
        Ok(())
    }
}

/// Outbound items of one block, all owned by one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysignWorkUnit {
    /// The ThorNode block height the items were scheduled at.
    pub height: i64,
    /// The vault the items belong to.
    pub vault_pub_key: PubKey,
    /// The items.
    pub items: Vec<TxOutItem>,
}

/// The kind of vault a keygen creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, derive_more::Display)]
pub enum KeygenType {
    /// A shared vault.
    #[default]
    #[serde(rename = "asgard", alias = "AsgardKeygen")]
    #[display(fmt = "asgard")]
    Asgard,
    /// A per-node vault.
    #[serde(rename = "yggdrasil", alias = "YggdrasilKeygen")]
    #[display(fmt = "yggdrasil")]
    Yggdrasil,
}

/// One keygen ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keygen {
    /// Deterministic id, see [`Keygen::compute_id`].
    #[serde(default)]
    pub id: String,
    /// The vault kind to create.
    #[serde(rename = "type", default)]
    pub keygen_type: KeygenType,
    /// The nodes taking part.
    #[serde(default, deserialize_with = "null_as_default")]
    pub members: Vec<PubKey>,
}

impl Keygen {
    /// Creates a keygen with its id computed.
    pub fn new(height: i64, members: Vec<PubKey>, keygen_type: KeygenType) -> Self {
        let id = Self::compute_id(height, &members, keygen_type);
        Self {
            id,
            keygen_type,
            members,
        }
    }

    /// `sha256(sorted members ∥ height ∥ type)`, upper case hex.
    pub fn compute_id(
        height: i64,
        members: &[PubKey],
        keygen_type: KeygenType,
    ) -> String {
        let mut sorted: Vec<&str> = members.iter().map(PubKey::as_str).collect();
        sorted.sort_unstable();
        let mut hasher = Sha256::new();
        for member in sorted {
            hasher.update(member.as_bytes());
        }
        hasher.update(height.to_string().as_bytes());
        hasher.update(keygen_type.to_string().as_bytes());
        hex::encode_upper(hasher.finalize())
    }
}

/// The keygens scheduled at one ThorNode block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeygenBlock {
    /// The ThorNode block height.
    #[serde(with = "i64_string")]
    pub height: i64,
    /// The ceremonies.
    #[serde(default, deserialize_with = "null_as_default")]
    pub keygens: Vec<Keygen>,
}

impl KeygenBlock {
    /// Fills in any id ThorNode left out.
    pub fn with_ids(mut self) -> Self {
        let height = self.height;
        for keygen in &mut self.keygens {
            if keygen.id.is_empty() {
                keygen.id =
                    Keygen::compute_id(height, &keygen.members, keygen.keygen_type);
            }
        }
        self
    }
}

/// Scan progress of a chain, as tracked by ThorNode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heights {
    /// The chain.
    pub chain: Chain,
    /// The last external height witnessed by the network.
    #[serde(rename = "lastobservedin", with = "i64_string")]
    pub last_observed_in: i64,
    /// The last ThorNode height whose outbound items were signed.
    #[serde(rename = "lastsignedout", with = "i64_string")]
    pub last_signed_out: i64,
    /// The current ThorNode height.
    #[serde(rename = "thorchain", with = "i64_string")]
    pub consensus_height: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Asset;

    const PK: &str =
        "thorpub1addwnpepqflvfv08t6qt95lmttd6wpf3ss8wx63e9vf6fvyuj2yy6nnyna5763e2kck";

    fn item() -> TxOutItem {
        TxOutItem {
            chain: Chain::Binance,
            to_address: "bnb1l8tt4f2xycdz4e5u6veqmj5qwhp4vsktdkl447".into(),
            vault_pub_key: PK.parse().unwrap(),
            coin: Coin::new(Asset::bnb(), 100),
            memo: "OUTBOUND:ABC".into(),
            in_hash: "ABC".into(),
            out_hash: None,
        }
    }

    #[test]
    fn outbound_coin_must_match_chain() {
        assert!(item().validate().is_ok());
        let mut bad = item();
        bad.coin = Coin::new(Asset::btc(), 100);
        assert!(bad.validate().is_err());
        let mut empty = item();
        empty.memo.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn outbound_item_wire_names() {
        let json = serde_json::to_value(item()).unwrap();
        assert_eq!(json["to"], "bnb1l8tt4f2xycdz4e5u6veqmj5qwhp4vsktdkl447");
        assert_eq!(json["vault_pubkey"], PK);
        assert!(json.get("out_hash").is_none());
    }

    #[test]
    fn inbound_recipient_must_be_the_vault() {
        let mut tx = TxIn {
            chain: Chain::Binance,
            block_height: 1,
            block_hash: "H".into(),
            tx_id: "T".into(),
            from: "bnb1l8tt4f2xycdz4e5u6veqmj5qwhp4vsktdkl447".into(),
            to: "bnb1l8tt4f2xycdz4e5u6veqmj5qwhp4vsktdkl447".into(),
            coins: vec![Coin::new(Asset::bnb(), 1)],
            gas: vec![],
            memo: String::new(),
            observed_vault_pub_key: PK.parse().unwrap(),
        };
        assert!(tx.validate_inbound(Network::Mainnet).is_ok());
        assert!(tx.validate_inbound(Network::Testnet).is_err());
        tx.from = "0xabc".into();
        assert!(tx.validate_inbound(Network::Mainnet).is_err());
    }

    #[test]
    fn keygen_id_ignores_member_order() {
        let a: PubKey = PK.parse().unwrap();
        let b = PubKey::from_secp256k1(
            &libsecp256k1::PublicKey::from_secret_key(
                &libsecp256k1::SecretKey::parse(&[7u8; 32]).unwrap(),
            ),
        )
        .unwrap();
        let one = Keygen::new(10, vec![a.clone(), b.clone()], KeygenType::Asgard);
        let two = Keygen::new(10, vec![b, a], KeygenType::Asgard);
        assert_eq!(one.id, two.id);
        assert_eq!(one.id.len(), 64);
        let other_height = Keygen::new(11, one.members.clone(), KeygenType::Asgard);
        assert_ne!(one.id, other_height.id);
    }

    #[test]
    fn heights_accept_string_numbers() {
        let h: Heights = serde_json::from_value(serde_json::json!({
            "chain": "BNB",
            "lastobservedin": "12",
            "lastsignedout": 3,
            "thorchain": "7"
        }))
        .unwrap();
        assert_eq!(h.last_observed_in, 12);
        assert_eq!(h.last_signed_out, 3);
        assert_eq!(h.consensus_height, 7);
    }
}
