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
//! # Bifrost Signing Backends 🔑
//!
//! Everything that produces a signature for a vault: the node's local key,
//! the TSS party shared with the other members of a vault, and the
//! selection between the two.

use std::sync::Arc;

use bifrost_types::PubKey;
use bifrost_utils::Result;

/// Local signing
pub mod local;
/// The vaults this node belongs to
pub mod pubkey_manager;
/// Signer selection per vault
pub mod selector;
/// TSS signing and keygen
pub mod tss;

pub use local::LocalKeySigner;
pub use pubkey_manager::PubKeyManager;
pub use selector::KeySignerSelector;
pub use tss::{TssClient, TssKeySigner};

/// A recoverable ECDSA signature over secp256k1, with a low `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// `r ∥ s`, 32 bytes each.
    pub rs: [u8; 64],
    /// The recovery id, `0` or `1`.
    pub recovery_id: u8,
}

impl Signature {
    /// Normalizes `s` to the lower half of the curve order, flipping the recovery id with it.
    pub fn normalized(rs: [u8; 64], recovery_id: u8) -> Result<Self> {
        let mut signature = libsecp256k1::Signature::parse_standard(&rs)?;
        let mut recovery_id = recovery_id;
        if signature.s.is_high() {
            signature.normalize_s();
            recovery_id ^= 1;
        }
        Ok(Self {
            rs: signature.serialize(),
            recovery_id,
        })
    }

    /// DER encoding, as used inside bitcoin witnesses.
    pub fn der(&self) -> Result<Vec<u8>> {
        let signature = libsecp256k1::Signature::parse_standard(&self.rs)?;
        Ok(signature.serialize_der().as_ref().to_vec())
    }

    /// The public key that produced this signature over `digest`.
    pub fn recover(&self, digest: &[u8; 32]) -> Result<libsecp256k1::PublicKey> {
        let message = libsecp256k1::Message::parse(digest);
        let signature = libsecp256k1::Signature::parse_standard(&self.rs)?;
        let recovery_id = libsecp256k1::RecoveryId::parse(self.recovery_id)?;
        Ok(libsecp256k1::recover(&message, &signature, &recovery_id)?)
    }
}

/// Something that signs digests on behalf of a vault key.
#[async_trait::async_trait]
pub trait KeySigner: Send + Sync {
    /// The public key whose signatures this signer produces.
    fn pub_key(&self) -> &PubKey;

    /// Signs a 32 byte digest.
    async fn sign(&self, digest: [u8; 32]) -> Result<Signature>;
}

#[async_trait::async_trait]
impl<T> KeySigner for Arc<T>
where
    T: KeySigner + ?Sized,
{
    fn pub_key(&self) -> &PubKey {
        (**self).pub_key()
    }

    async fn sign(&self, digest: [u8; 32]) -> Result<Signature> {
        (**self).sign(digest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_s_is_normalized() {
        let key: bifrost_types::PrivateKey =
            "0x000000000000000000000000000000000000000000000000000000000000002a"
                .parse()
                .unwrap();
        let digest = [3u8; 32];
        let (rs, recid) = key.sign_digest(&digest);
        // flip s to the upper half: s' = n - s
        let mut high = libsecp256k1::Signature::parse_standard(&rs).unwrap();
        high.s = -high.s;
        assert!(high.s.is_high());
        let flipped = Signature::normalized(high.serialize(), recid ^ 1).unwrap();
        assert_eq!(flipped.rs, rs);
        assert_eq!(flipped.recovery_id, recid);
        assert_eq!(flipped.recover(&digest).unwrap(), key.public_key());
        assert!(!flipped.der().unwrap().is_empty());
    }
}
