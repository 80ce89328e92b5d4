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
use std::fmt;
use std::str::FromStr;

use bifrost_utils::Error;
use serde::{Deserialize, Serialize};

use crate::Chain;

/// A coin type on a given chain, written `CHAIN.SYMBOL` (for example `BNB.RUNE-A1F`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asset {
    /// The chain the asset lives on.
    pub chain: Chain,
    /// The full symbol, including any issuer suffix.
    pub symbol: String,
    /// The symbol without the issuer suffix.
    pub ticker: String,
}

impl Asset {
    /// Creates an asset, deriving the ticker from the symbol.
    pub fn new(chain: Chain, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into().to_ascii_uppercase();
        let ticker = symbol
            .split_once('-')
            .map(|(t, _)| t.to_owned())
            .unwrap_or_else(|| symbol.clone());
        Self {
            chain,
            symbol,
            ticker,
        }
    }

    /// `BNB.BNB`
    pub fn bnb() -> Self {
        Self::new(Chain::Binance, "BNB")
    }

    /// `BTC.BTC`
    pub fn btc() -> Self {
        Self::new(Chain::Bitcoin, "BTC")
    }

    /// `ETH.ETH`
    pub fn eth() -> Self {
        Self::new(Chain::Ethereum, "ETH")
    }

    /// `THOR.RUNE`, the native coin of the consensus layer.
    pub fn rune() -> Self {
        Self::new(Chain::Thor, "RUNE")
    }

    /// Whether this is the gas asset of its chain.
    pub fn is_gas_asset(&self) -> bool {
        *self == self.chain.gas_asset()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.chain, self.symbol)
    }
}

impl FromStr for Asset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chain, symbol) = s
            .split_once('.')
            .ok_or_else(|| Error::InvalidAsset(s.to_owned()))?;
        if symbol.is_empty() {
            return Err(Error::InvalidAsset(s.to_owned()));
        }
        let chain =
            Chain::from_str(chain).map_err(|_| Error::InvalidAsset(s.to_owned()))?;
        Ok(Self::new(chain, symbol))
    }
}

impl Serialize for Asset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Asset::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An amount of an asset, in the chain's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    /// The asset.
    pub asset: Asset,
    /// Amount in base units (satoshi, wei, jager).
    #[serde(with = "crate::serde_helpers::u128_string")]
    pub amount: u128,
}

impl Coin {
    /// Creates a coin.
    pub fn new(asset: Asset, amount: u128) -> Self {
        Self { asset, amount }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.asset, self.amount)
    }
}
