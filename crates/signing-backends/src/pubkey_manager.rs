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
use std::collections::BTreeSet;
use std::sync::Arc;

use bifrost_types::PubKey;
use parking_lot::RwLock;

/// Tracks the node's own pubkey and the vault pubkeys it is a member of.
///
/// ThorNode is polled for keysign and keygen work once per tracked pubkey.
#[derive(Debug, Clone, Default)]
pub struct PubKeyManager {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    node: Option<PubKey>,
    memberships: BTreeSet<PubKey>,
}

impl PubKeyManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the node pubkey and the memberships with a fresh view from ThorNode.
    pub fn seed(&self, node: PubKey, memberships: impl IntoIterator<Item = PubKey>) {
        let mut inner = self.inner.write();
        inner.memberships = memberships
            .into_iter()
            .filter(|pk| !pk.is_empty() && *pk != node)
            .collect();
        inner.node = Some(node);
    }

    /// The node's own pubkey, once known.
    pub fn node_pub_key(&self) -> Option<PubKey> {
        self.inner.read().node.clone()
    }

    /// Adds a vault this node became a member of.
    pub fn add(&self, pk: PubKey) {
        if pk.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        if inner.node.as_ref() != Some(&pk) {
            inner.memberships.insert(pk);
        }
    }

    /// Forgets a vault.
    pub fn remove(&self, pk: &PubKey) {
        self.inner.write().memberships.remove(pk);
    }

    /// Whether this node is a member of the vault `pk`.
    pub fn is_member(&self, pk: &PubKey) -> bool {
        self.inner.read().memberships.contains(pk)
    }

    /// Whether `pk` is the node's own pubkey.
    pub fn is_node(&self, pk: &PubKey) -> bool {
        self.inner.read().node.as_ref() == Some(pk)
    }

    /// The node pubkey followed by every membership, without duplicates.
    pub fn pub_keys(&self) -> Vec<PubKey> {
        let inner = self.inner.read();
        inner
            .node
            .iter()
            .cloned()
            .chain(inner.memberships.iter().cloned())
            .collect()
    }
}
