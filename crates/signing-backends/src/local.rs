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
use bifrost_types::{PrivateKey, PubKey};
use bifrost_utils::Result;

use crate::{KeySigner, Signature};

/// Signs with a private key held by this process.
#[derive(Debug, Clone)]
pub struct LocalKeySigner {
    key: PrivateKey,
    pub_key: PubKey,
}

impl LocalKeySigner {
    /// Creates a signer for `key`.
    pub fn new(key: PrivateKey) -> Result<Self> {
        let pub_key = key.pub_key()?;
        Ok(Self { key, pub_key })
    }
}

#[async_trait::async_trait]
impl KeySigner for LocalKeySigner {
    fn pub_key(&self) -> &PubKey {
        &self.pub_key
    }

    async fn sign(&self, digest: [u8; 32]) -> Result<Signature> {
        let (rs, recovery_id) = self.key.sign_digest(&digest);
        Signature::normalized(rs, recovery_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signs_for_its_own_key() {
        let key: PrivateKey =
            "000000000000000000000000000000000000000000000000000000000000002a"
                .parse()
                .unwrap();
        let signer = LocalKeySigner::new(key.clone()).unwrap();
        assert_eq!(signer.pub_key(), &key.pub_key().unwrap());
        let digest = [1u8; 32];
        let signature = signer.sign(digest).await.unwrap();
        assert_eq!(signature.recover(&digest).unwrap(), key.public_key());
    }
}
