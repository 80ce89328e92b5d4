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
use base64::Engine;
use bifrost_types::{Blame, PubKey, RpcUrl};
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::{probe, Error, Result};
use serde::{Deserialize, Serialize};

use crate::{KeySigner, Signature};

/// A TSS ceremony finished successfully.
const STATUS_SUCCESS: u8 = 1;

/// A keysign request, as the TSS party expects it.
#[derive(Debug, Clone, Serialize)]
pub struct KeysignRequest {
    /// The vault to sign for.
    pub pool_pub_key: PubKey,
    /// Base64 of the digest to sign.
    pub message: String,
    /// The members expected to take part.
    pub signer_pub_keys: Vec<PubKey>,
}

/// A keygen request, as the TSS party expects it.
#[derive(Debug, Clone, Serialize)]
pub struct KeygenRequest {
    /// The members of the new vault.
    pub keys: Vec<PubKey>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BlameNode {
    #[serde(alias = "pubkey")]
    pub_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireBlame {
    #[serde(default)]
    fail_reason: String,
    #[serde(default, deserialize_with = "bifrost_types::serde_helpers::null_as_default")]
    blame_nodes: Vec<BlameNode>,
}

impl From<WireBlame> for Blame {
    fn from(wire: WireBlame) -> Self {
        Blame {
            fail_reason: wire.fail_reason,
            blame_nodes: wire
                .blame_nodes
                .into_iter()
                .filter_map(|n| n.pub_key.parse().ok())
                .filter(|pk: &PubKey| !pk.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct KeysignResponse {
    #[serde(default)]
    r: String,
    #[serde(default)]
    s: String,
    status: u8,
    #[serde(default)]
    blame: WireBlame,
}

#[derive(Debug, Clone, Deserialize)]
struct KeygenResponse {
    #[serde(default)]
    pub_key: String,
    status: u8,
    #[serde(default)]
    blame: WireBlame,
}

/// The outcome of a failed ceremony.
fn ceremony_failed(blame: WireBlame) -> Error {
    let blame = Blame::from(blame);
    Error::Tss {
        reason: if blame.fail_reason.is_empty() {
            "tss ceremony failed".into()
        } else {
            blame.fail_reason
        },
        blame: blame.blame_nodes.iter().map(ToString::to_string).collect(),
    }
}

/// Extracts the blame of a [`Error::Tss`], for reporting back to ThorNode.
pub fn blame_of(error: &Error) -> Option<Blame> {
    match error {
        Error::Tss { reason, blame } => Some(Blame {
            fail_reason: reason.clone(),
            blame_nodes: blame.iter().filter_map(|pk| pk.parse().ok()).collect(),
        }),
        _ => None,
    }
}

/// An HTTP client for the local TSS party.
#[derive(Debug, Clone)]
pub struct TssClient {
    base: RpcUrl,
    http: RetryHttpClient,
}

impl TssClient {
    /// Creates a client for the TSS party at `base`.
    pub fn new(base: RpcUrl, http: RetryHttpClient) -> Self {
        Self { base, http }
    }

    /// Runs a keysign ceremony for `pool_pub_key`, returning the raw `r ∥ s`.
    pub async fn keysign(
        &self,
        pool_pub_key: &PubKey,
        digest: [u8; 32],
        members: &[PubKey],
    ) -> Result<[u8; 64]> {
        let engine = base64::engine::general_purpose::STANDARD;
        let request = KeysignRequest {
            pool_pub_key: pool_pub_key.clone(),
            message: engine.encode(digest),
            signer_pub_keys: members.to_vec(),
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Keysign,
            pool_pub_key = %pool_pub_key,
            members = members.len(),
        );
        let response: KeysignResponse = self
            .http
            .post_json(&self.base.join_path("keysign"), &request)
            .await?;
        if response.status != STATUS_SUCCESS {
            return Err(ceremony_failed(response.blame));
        }
        let r = engine.decode(response.r.as_bytes())?;
        let s = engine.decode(response.s.as_bytes())?;
        if r.len() > 32 || s.len() > 32 {
            return Err(Error::Tss {
                reason: "tss returned a malformed signature".into(),
                blame: Vec::new(),
            });
        }
        // left pad, big endian
        let mut rs = [0u8; 64];
        rs[32 - r.len()..32].copy_from_slice(&r);
        rs[64 - s.len()..].copy_from_slice(&s);
        Ok(rs)
    }

    /// Runs a keygen ceremony among `members`, returning the new vault pubkey.
    pub async fn keygen(&self, members: &[PubKey]) -> Result<PubKey> {
        let request = KeygenRequest {
            keys: members.to_vec(),
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Keygen,
            members = members.len(),
        );
        let response: KeygenResponse = self
            .http
            .post_json(&self.base.join_path("keygen"), &request)
            .await?;
        if response.status != STATUS_SUCCESS {
            return Err(ceremony_failed(response.blame));
        }
        let pub_key: PubKey = response.pub_key.parse()?;
        if pub_key.is_empty() {
            return Err(Error::InvalidPubKey("keygen returned no pubkey".into()));
        }
        Ok(pub_key)
    }

    /// The peer id of the local TSS party.
    pub async fn p2p_id(&self) -> Result<String> {
        let id = self.http.get_text(&self.base.join_path("p2pid")).await?;
        Ok(id.trim().to_owned())
    }
}

/// Signs for a vault through the TSS party shared with the vault's members.
#[derive(Debug, Clone)]
pub struct TssKeySigner {
    client: TssClient,
    pool_pub_key: PubKey,
    members: Vec<PubKey>,
}

impl TssKeySigner {
    /// Creates a signer for the vault `pool_pub_key`.
    pub fn new(client: TssClient, pool_pub_key: PubKey, members: Vec<PubKey>) -> Self {
        Self {
            client,
            pool_pub_key,
            members,
        }
    }
}

#[async_trait::async_trait]
impl KeySigner for TssKeySigner {
    fn pub_key(&self) -> &PubKey {
        &self.pool_pub_key
    }

    async fn sign(&self, digest: [u8; 32]) -> Result<Signature> {
        let rs = self
            .client
            .keysign(&self.pool_pub_key, digest, &self.members)
            .await?;
        let expected = self.pool_pub_key.secp256k1()?;
        // the party does not report the recovery id, find it.
        for recovery_id in 0..2u8 {
            let signature = Signature::normalized(rs, recovery_id)?;
            if matches!(signature.recover(&digest), Ok(key) if key == expected) {
                return Ok(signature);
            }
        }
        Err(Error::Tss {
            reason: "tss signature does not verify against the vault pubkey".into(),
            blame: Vec::new(),
        })
    }
}
