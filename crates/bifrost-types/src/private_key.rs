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

use bifrost_utils::{Error, Result};
use serde::Deserialize;

use crate::PubKey;

/// PrivateKey represents a secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey(libsecp256k1::SecretKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl PrivateKey {
    /// The public key of this private key.
    pub fn public_key(&self) -> libsecp256k1::PublicKey {
        libsecp256k1::PublicKey::from_secret_key(&self.0)
    }

    /// The bech32 pubkey of this private key.
    pub fn pub_key(&self) -> Result<PubKey> {
        PubKey::from_secp256k1(&self.public_key())
    }

    /// Signs a 32 byte digest, returning the `r ∥ s` signature and its recovery id.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> ([u8; 64], u8) {
        let message = libsecp256k1::Message::parse(digest);
        let (signature, recovery_id) = libsecp256k1::sign(&message, &self.0);
        (signature.serialize(), recovery_id.serialize())
    }
}

impl From<libsecp256k1::SecretKey> for PrivateKey {
    fn from(secret: libsecp256k1::SecretKey) -> Self {
        PrivateKey(secret)
    }
}

impl FromStr for PrivateKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_str)?;
        let secret = libsecp256k1::SecretKey::parse_slice(&bytes)?;
        Ok(Self(secret))
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = PrivateKey;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let val = if let Some(var) = value.strip_prefix('$') {
                    tracing::trace!("Reading {} from env", var);
                    std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?
                } else {
                    value.to_owned()
                };
                PrivateKey::from_str(&val).map_err(|e| {
                    serde::de::Error::custom(format!(
                        "{e}\n expected a 64 chars hex string (optionally 0x prefixed) but found {} chars",
                        val.len()
                    ))
                })
            }
        }

        deserializer.deserialize_str(PrivateKeyVistor)
    }
}

/// A password or token read from the config, optionally through an env var (`$NAME`).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// The secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is unset.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Secret").finish()
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.strip_prefix('$') {
            Some(var) => {
                tracing::trace!("Reading {} from env", var);
                std::env::var(var).map(Secret).map_err(|e| {
                    serde::de::Error::custom(format!(
                        "error while loading this env {var}: {e}",
                    ))
                })
            }
            None => Ok(Secret(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "0x000000000000000000000000000000000000000000000000000000000000002a";

    #[test]
    fn parses_hex_and_env() {
        let key: PrivateKey =
            serde_json::from_value(serde_json::json!(KEY)).unwrap();
        std::env::set_var("BIFROST_TEST_SIGNER_KEY", &KEY[2..]);
        let from_env: PrivateKey =
            serde_json::from_value(serde_json::json!("$BIFROST_TEST_SIGNER_KEY"))
                .unwrap();
        assert_eq!(key.pub_key().unwrap(), from_env.pub_key().unwrap());
        assert!(serde_json::from_value::<PrivateKey>(serde_json::json!("0x12")).is_err());
        assert_eq!(format!("{key:?}"), "PrivateKey");
    }

    #[test]
    fn signatures_recover_to_the_key() {
        let key: PrivateKey = KEY.parse().unwrap();
        let digest = [9u8; 32];
        let (sig, recid) = key.sign_digest(&digest);
        let recovered = libsecp256k1::recover(
            &libsecp256k1::Message::parse(&digest),
            &libsecp256k1::Signature::parse_standard(&sig).unwrap(),
            &libsecp256k1::RecoveryId::parse(recid).unwrap(),
        )
        .unwrap();
        assert_eq!(recovered, key.public_key());
    }
}
