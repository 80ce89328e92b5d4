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

use bech32::{FromBase32, ToBase32, Variant};
use bifrost_utils::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::Chain;

/// A chain-tagged address string.
///
/// Validity depends on the chain; see [`Address::is_chain`].
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps an address string without validating it.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Bech32 encodes `data` under `hrp`.
    pub fn from_bech32(hrp: &str, data: &[u8]) -> Result<Self> {
        let encoded = bech32::encode(hrp, data.to_base32(), Variant::Bech32)?;
        Ok(Self(encoded))
    }

    /// Decodes a bech32 address into its prefix and payload.
    pub fn to_bech32(&self) -> Result<(String, Vec<u8>)> {
        let (hrp, data, _) = bech32::decode(&self.0)?;
        let bytes = Vec::<u8>::from_base32(&data)?;
        Ok((hrp, bytes))
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this address is well formed for `chain`, on any network.
    pub fn is_chain(&self, chain: Chain) -> bool {
        match chain {
            Chain::Ethereum => is_eth_address(&self.0),
            Chain::Bitcoin => {
                self.has_bech32_prefix(chain) || is_base58_btc_address(&self.0)
            }
            Chain::Binance | Chain::Thor => self.has_bech32_prefix(chain),
        }
    }

    /// The chain this address belongs to, inferred from its prefix and format.
    pub fn chain(&self) -> Option<Chain> {
        [Chain::Thor, Chain::Binance, Chain::Bitcoin, Chain::Ethereum]
            .into_iter()
            .find(|c| self.is_chain(*c))
    }

    fn has_bech32_prefix(&self, chain: Chain) -> bool {
        match bech32::decode(&self.0) {
            Ok((hrp, _, _)) => chain.all_address_prefixes().contains(&hrp.as_str()),
            Err(_) => false,
        }
    }
}

fn is_eth_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .map(|h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

fn is_base58_btc_address(s: &str) -> bool {
    const ALPHABET: &str =
        "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    (26..=35).contains(&s.len())
        && matches!(s.chars().next(), Some('1' | '3' | 'm' | 'n' | '2'))
        && s.chars().all(|c| ALPHABET.contains(c))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let address = Self(s.to_owned());
        match address.chain() {
            Some(_) => Ok(address),
            None => Err(Error::InvalidAddress(s.to_owned())),
        }
    }
}
