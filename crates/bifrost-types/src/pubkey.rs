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

use bech32::{FromBase32, ToBase32, Variant};
use bifrost_utils::{Error, Result};
use bitcoin::hashes::{hash160::Hash as Hash160, Hash as _};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{Address, Chain, Network, SigningAlgo};

/// The bech32 prefix of every node and vault public key.
pub const PUBKEY_HRP: &str = "thorpub";

/// Amino prefix of a compressed secp256k1 public key (including the length byte).
const AMINO_SECP256K1_PREFIX: [u8; 5] = [0xeb, 0x5a, 0xe9, 0x87, 0x21];

/// `ripemd160(sha256(data))`
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Hash160::hash(data).to_byte_array()
}

/// A bech32 encoded, amino wrapped, compressed secp256k1 public key.
///
/// An empty key is representable, since ThorNode reports unset keys as `""`.
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
)]
#[serde(transparent)]
pub struct PubKey(String);

impl PubKey {
    /// Encodes a secp256k1 public key.
    pub fn from_secp256k1(key: &libsecp256k1::PublicKey) -> Result<Self> {
        let mut data = AMINO_SECP256K1_PREFIX.to_vec();
        data.extend_from_slice(&key.serialize_compressed());
        let encoded = bech32::encode(PUBKEY_HRP, data.to_base32(), Variant::Bech32)?;
        Ok(Self(encoded))
    }

    /// Whether the key is unset.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The bech32 string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 33 bytes of the compressed public key.
    pub fn compressed(&self) -> Result<[u8; 33]> {
        let (hrp, data, _) = bech32::decode(&self.0)?;
        if hrp != PUBKEY_HRP {
            return Err(Error::InvalidPubKey(self.0.clone()));
        }
        let bytes = Vec::<u8>::from_base32(&data)?;
        let key = bytes
            .strip_prefix(&AMINO_SECP256K1_PREFIX[..])
            .ok_or_else(|| Error::InvalidPubKey(self.0.clone()))?;
        key.try_into()
            .map_err(|_| Error::InvalidPubKey(self.0.clone()))
    }

    /// The key as a secp256k1 point.
    pub fn secp256k1(&self) -> Result<libsecp256k1::PublicKey> {
        let compressed = self.compressed()?;
        Ok(libsecp256k1::PublicKey::parse_compressed(&compressed)?)
    }

    /// Derives the address this key controls on `chain` for the given `network`.
    pub fn address_on(&self, chain: Chain, network: Network) -> Result<Address> {
        if self.is_empty() {
            return Err(Error::InvalidPubKey("empty pubkey".into()));
        }
        match chain {
            Chain::Ethereum => {
                let key = self.secp256k1()?;
                let uncompressed = key.serialize();
                let hash = Keccak256::digest(&uncompressed[1..]);
                Ok(Address::new(format!("0x{}", hex::encode(&hash[12..]))))
            }
            Chain::Binance | Chain::Bitcoin | Chain::Thor => {
                let prefix = chain
                    .address_prefix(network)
                    .ok_or_else(|| Error::UnsupportedChain(chain.to_string()))?;
                Address::from_bech32(prefix, &hash160(&self.compressed()?))
            }
        }
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PubKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let key = Self(s.to_owned());
        key.compressed()?;
        Ok(key)
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        PubKey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The public keys of a node, one per signature scheme. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeySet {
    /// The secp256k1 key.
    #[serde(default)]
    pub secp256k1: PubKey,
    /// The ed25519 key.
    #[serde(default)]
    pub ed25519: PubKey,
}

impl PubKeySet {
    /// Derives the address on `chain`, using the key matching the chain's signing algorithm.
    pub fn address_on(&self, chain: Chain, network: Network) -> Result<Address> {
        match chain.signing_algo() {
            SigningAlgo::Secp256k1 => self.secp256k1.address_on(chain, network),
            SigningAlgo::Ed25519 => self.ed25519.address_on(chain, network),
        }
    }

    /// Whether neither key is set.
    pub fn is_empty(&self) -> bool {
        self.secp256k1.is_empty() && self.ed25519.is_empty()
    }
}
