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
use std::sync::Arc;

use bifrost_types::PubKey;

use crate::{KeySigner, LocalKeySigner, PubKeyManager, TssClient, TssKeySigner};

/// Picks the signer for a vault.
///
/// * the node's own pubkey is signed for with the local key;
/// * a vault the node is a member of is signed for through TSS;
/// * anything else gets the local signer, whose address will not match the
///   vault's, so the item is skipped by the chain client.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct KeySignerSelector {
    local: Arc<LocalKeySigner>,
    tss: TssClient,
    pub_keys: PubKeyManager,
}

impl KeySignerSelector {
    /// The signer to use for `vault`, given the vault's `members`.
    pub fn select(&self, vault: &PubKey, members: &[PubKey]) -> Arc<dyn KeySigner> {
        if self.local.pub_key() == vault {
            return self.local.clone();
        }
        if self.pub_keys.is_member(vault) {
            tracing::trace!(%vault, members = members.len(), "signing through tss");
            return Arc::new(TssKeySigner::new(
                self.tss.clone(),
                vault.clone(),
                members.to_vec(),
            ));
        }
        self.local.clone()
    }

    /// The local signer.
    pub fn local(&self) -> Arc<LocalKeySigner> {
        self.local.clone()
    }

    /// The TSS client.
    pub fn tss(&self) -> &TssClient {
        &self.tss
    }

    /// The node's vault memberships.
    pub fn pub_keys(&self) -> &PubKeyManager {
        &self.pub_keys
    }
}

#[cfg(test)]
mod tests {
    use bifrost_types::{PrivateKey, RpcUrl};
    use bifrost_utils::http::RetryHttpClient;

    use super::*;

    fn pk(seed: u8) -> PubKey {
        let secret = libsecp256k1::SecretKey::parse(&[seed; 32]).unwrap();
        PubKey::from_secp256k1(&libsecp256k1::PublicKey::from_secret_key(&secret))
            .unwrap()
    }

    #[test]
    fn routes_by_vault_ownership() {
        let key: PrivateKey =
            "000000000000000000000000000000000000000000000000000000000000002a"
                .parse()
                .unwrap();
        let local = Arc::new(LocalKeySigner::new(key.clone()).unwrap());
        let own = key.pub_key().unwrap();
        let pub_keys = PubKeyManager::new();
        pub_keys.seed(own.clone(), [pk(9)]);
        let selector = KeySignerSelector::builder()
            .local(local)
            .tss(TssClient::new(
                RpcUrl::parse("127.0.0.1:4040").unwrap(),
                RetryHttpClient::new(reqwest::Client::new()),
            ))
            .pub_keys(pub_keys)
            .build();

        assert_eq!(selector.select(&own, &[]).pub_key(), &own);
        assert_eq!(selector.select(&pk(9), &[own.clone()]).pub_key(), &pk(9));
        // not ours: the local signer, which the chain client will skip on
        assert_eq!(selector.select(&pk(8), &[]).pub_key(), &own);
    }
}
