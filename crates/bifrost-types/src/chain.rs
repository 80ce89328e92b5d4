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
use std::str::FromStr;

use bifrost_utils::Error;
use serde::{Deserialize, Serialize};

use crate::Asset;

/// The network an external chain (and ThorNode) runs on.
///
/// Picks the address prefixes used when deriving addresses from a [`PubKey`](crate::PubKey).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production networks.
    #[default]
    #[display(fmt = "mainnet")]
    Mainnet,
    /// Public test networks.
    #[display(fmt = "testnet")]
    Testnet,
    /// Local mock networks (regtest and friends).
    #[display(fmt = "mock")]
    Mock,
}

/// The signature scheme a chain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgo {
    /// ECDSA over secp256k1.
    Secp256k1,
    /// EdDSA over ed25519.
    Ed25519,
}

/// A tag identifying a chain Bifrost knows about.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::Display,
)]
pub enum Chain {
    /// Binance Chain.
    #[display(fmt = "BNB")]
    Binance,
    /// Bitcoin.
    #[display(fmt = "BTC")]
    Bitcoin,
    /// Ethereum.
    #[display(fmt = "ETH")]
    Ethereum,
    /// ThorChain itself.
    #[display(fmt = "THOR")]
    Thor,
}

impl Chain {
    /// The external chains Bifrost can scan and sign for.
    pub const EXTERNAL: [Chain; 3] =
        [Chain::Binance, Chain::Bitcoin, Chain::Ethereum];

    /// The native gas asset of this chain.
    pub fn gas_asset(&self) -> Asset {
        match self {
            Chain::Binance => Asset::bnb(),
            Chain::Bitcoin => Asset::btc(),
            Chain::Ethereum => Asset::eth(),
            Chain::Thor => Asset::rune(),
        }
    }

    /// The signature scheme used on this chain.
    pub fn signing_algo(&self) -> SigningAlgo {
        match self {
            Chain::Binance | Chain::Bitcoin | Chain::Ethereum | Chain::Thor => {
                SigningAlgo::Secp256k1
            }
        }
    }

    /// The human readable part of bech32 addresses on this chain, if the chain uses bech32.
    pub fn address_prefix(&self, network: Network) -> Option<&'static str> {
        let prefix = match (self, network) {
            (Chain::Binance, Network::Mainnet) => "bnb",
            (Chain::Binance, _) => "tbnb",
            (Chain::Bitcoin, Network::Mainnet) => "bc",
            (Chain::Bitcoin, Network::Testnet) => "tb",
            (Chain::Bitcoin, Network::Mock) => "bcrt",
            (Chain::Thor, Network::Mainnet) => "thor",
            (Chain::Thor, _) => "tthor",
            (Chain::Ethereum, _) => return None,
        };
        Some(prefix)
    }

    /// Every bech32 prefix this chain uses, across all networks.
    pub fn all_address_prefixes(&self) -> &'static [&'static str] {
        match self {
            Chain::Binance => &["bnb", "tbnb"],
            Chain::Bitcoin => &["bc", "tb", "bcrt"],
            Chain::Thor => &["thor", "tthor"],
            Chain::Ethereum => &[],
        }
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BNB" => Ok(Chain::Binance),
            "BTC" => Ok(Chain::Bitcoin),
            "ETH" => Ok(Chain::Ethereum),
            "THOR" => Ok(Chain::Thor),
            _ => Err(Error::UnsupportedChain(s.to_owned())),
        }
    }
}

impl Serialize for Chain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Chain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Chain::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_names_round_trip() {
        for chain in Chain::EXTERNAL {
            assert_eq!(chain.to_string().parse::<Chain>().unwrap(), chain);
        }
        assert_eq!("bnb".parse::<Chain>().unwrap(), Chain::Binance);
        assert!("DOGE".parse::<Chain>().is_err());
    }

    #[test]
    fn gas_asset_belongs_to_its_chain() {
        for chain in Chain::EXTERNAL {
            assert_eq!(chain.gas_asset().chain, chain);
        }
    }
}
