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
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Asset, Coin, PubKey};

/// The role of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VaultType {
    /// A vault shared by all active nodes through TSS.
    #[serde(rename = "asgard", alias = "AsgardVault")]
    Asgard,
    /// A per-node vault.
    #[serde(rename = "yggdrasil", alias = "YggdrasilVault")]
    Yggdrasil,
    /// Anything else.
    #[default]
    #[serde(other, rename = "unknown")]
    Unknown,
}

/// The lifecycle state of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Accepting inbound and signing outbound.
    #[default]
    #[serde(rename = "active", alias = "ActiveVault")]
    Active,
    /// Draining to a successor, still signing outbound.
    #[serde(rename = "retiring", alias = "RetiringVault")]
    Retiring,
    /// Retired.
    #[serde(other, rename = "inactive")]
    Inactive,
}

/// A vault, as reported by ThorNode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// The vault's public key. Never empty.
    pub pub_key: PubKey,
    /// The vault's role.
    #[serde(rename = "type", default)]
    pub vault_type: VaultType,
    /// The vault's lifecycle state.
    #[serde(default)]
    pub status: VaultStatus,
    /// The node pubkeys taking part in TSS for this vault.
    #[serde(default, deserialize_with = "crate::serde_helpers::null_as_default")]
    pub membership: Vec<PubKey>,
    /// Balances held by this vault.
    #[serde(default, with = "coin_list")]
    pub coins: BTreeMap<Asset, u128>,
}

impl Vault {
    /// A vault that only carries its key and role.
    pub fn new(pub_key: PubKey, vault_type: VaultType) -> Self {
        Self {
            pub_key,
            vault_type,
            status: VaultStatus::Active,
            membership: Vec::new(),
            coins: BTreeMap::new(),
        }
    }

    /// Only active and retiring vaults may sign outbound transactions.
    pub fn can_sign(&self) -> bool {
        matches!(self.status, VaultStatus::Active | VaultStatus::Retiring)
    }

    /// Whether `pk` takes part in signing for this vault.
    pub fn has_member(&self, pk: &PubKey) -> bool {
        self.membership.contains(pk)
    }

    /// The balance of `asset` held by this vault.
    pub fn balance(&self, asset: &Asset) -> u128 {
        self.coins.get(asset).copied().unwrap_or_default()
    }
}

/// The vault pubkey lists returned by `/thorchain/vaults/pubkeys`.
///
/// Entries are either bare pubkey strings or vault objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawVaultsWire")]
pub struct RawVaults {
    /// Shared vaults.
    pub asgard: Vec<Vault>,
    /// Per-node vaults.
    pub yggdrasil: Vec<Vault>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VaultEntry {
    Key(PubKey),
    Detailed(Vault),
}

#[derive(Deserialize)]
struct RawVaultsWire {
    #[serde(default, deserialize_with = "crate::serde_helpers::null_as_default")]
    asgard: Vec<VaultEntry>,
    #[serde(default, deserialize_with = "crate::serde_helpers::null_as_default")]
    yggdrasil: Vec<VaultEntry>,
}

impl From<RawVaultsWire> for RawVaults {
    fn from(wire: RawVaultsWire) -> Self {
        let convert = |entries: Vec<VaultEntry>, vault_type| {
            entries
                .into_iter()
                .map(|entry| match entry {
                    VaultEntry::Key(pk) => Vault::new(pk, vault_type),
                    VaultEntry::Detailed(mut vault) => {
                        vault.vault_type = vault_type;
                        vault
                    }
                })
                .filter(|v| !v.pub_key.is_empty())
                .collect()
        };
        Self {
            asgard: convert(wire.asgard, VaultType::Asgard),
            yggdrasil: convert(wire.yggdrasil, VaultType::Yggdrasil),
        }
    }
}

/// Balances travel as a list of coins.
mod coin_list {
    use super::*;

    pub fn serialize<S>(
        coins: &BTreeMap<Asset, u128>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(
            coins
                .iter()
                .map(|(asset, amount)| Coin::new(asset.clone(), *amount)),
        )
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<Asset, u128>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let coins = Option::<Vec<Coin>>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for coin in coins.unwrap_or_default() {
            *map.entry(coin.asset).or_default() += coin.amount;
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str =
        "thorpub1addwnpepqflvfv08t6qt95lmttd6wpf3ss8wx63e9vf6fvyuj2yy6nnyna5763e2kck";

    #[test]
    fn accepts_both_vault_list_shapes() {
        let raw: RawVaults = serde_json::from_value(serde_json::json!({
            "asgard": [PK],
            "yggdrasil": [{
                "pub_key": PK,
                "status": "RetiringVault",
                "coins": [{ "asset": "BNB.BNB", "amount": "100" }]
            }]
        }))
        .unwrap();
        assert_eq!(raw.asgard.len(), 1);
        assert_eq!(raw.asgard[0].vault_type, VaultType::Asgard);
        let ygg = &raw.yggdrasil[0];
        assert_eq!(ygg.vault_type, VaultType::Yggdrasil);
        assert_eq!(ygg.status, VaultStatus::Retiring);
        assert!(ygg.can_sign());
        assert_eq!(ygg.balance(&Asset::bnb()), 100);
    }

    #[test]
    fn inactive_vaults_cannot_sign() {
        let mut vault = Vault::new(PK.parse().unwrap(), VaultType::Asgard);
        vault.status = VaultStatus::Inactive;
        assert!(!vault.can_sign());
    }
}
