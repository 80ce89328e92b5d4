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
//! # Bifrost Chain Client Traits 🌈
//!
//! The contract every external chain client fulfils, and the pieces they
//! share: the block scan loop, vault address resolution, and the decision
//! whether this node should sign an outbound item at all.

use std::sync::Arc;

use bifrost_context::Shutdown;
use bifrost_signing_backends::{KeySigner, KeySignerSelector};
use bifrost_types::{Address, Block, Chain, Network, PubKey, TxOutItem};
use bifrost_utils::Result;
use bifrost_vault_manager::VaultManager;
use tokio::sync::mpsc;

/// The block scan loop
pub mod scanner;

pub use scanner::{BlockScanner, BlockSource, ScanTask};

/// An external chain: scanned for vault transactions, and used to send
/// outbound transactions signed for a vault.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// The chain this client talks to.
    fn chain(&self) -> Chain;

    /// Whether this client handles `chain`.
    fn equals_chain(&self, chain: Chain) -> bool {
        self.chain() == chain
    }

    /// The current tip of the chain.
    async fn latest_height(&self) -> Result<i64>;

    /// Starts scanning at `start_height`, sending every block to `output`.
    ///
    /// Blocks are sent in strictly increasing height.
    async fn start(
        &self,
        output: mpsc::Sender<Block>,
        start_height: i64,
        shutdown: Shutdown,
    ) -> Result<()>;

    /// Stops scanning, returning once the scan loop has exited.
    async fn stop(&self) -> Result<()>;

    /// Builds and signs the chain-native transaction for `item`.
    ///
    /// Returns `None` when this node does not sign for the item's vault.
    async fn sign(&self, item: &TxOutItem, height: i64) -> Result<Option<Vec<u8>>>;

    /// Sends a signed transaction, returning its chain-native hash.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String>;
}

#[async_trait::async_trait]
impl<T> ChainClient for Arc<T>
where
    T: ChainClient + ?Sized,
{
    fn chain(&self) -> Chain {
        (**self).chain()
    }

    fn equals_chain(&self, chain: Chain) -> bool {
        (**self).equals_chain(chain)
    }

    async fn latest_height(&self) -> Result<i64> {
        (**self).latest_height().await
    }

    async fn start(
        &self,
        output: mpsc::Sender<Block>,
        start_height: i64,
        shutdown: Shutdown,
    ) -> Result<()> {
        (**self).start(output, start_height, shutdown).await
    }

    async fn stop(&self) -> Result<()> {
        (**self).stop().await
    }

    async fn sign(&self, item: &TxOutItem, height: i64) -> Result<Option<Vec<u8>>> {
        (**self).sign(item, height).await
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String> {
        (**self).broadcast(raw_tx).await
    }
}

/// Resolves chain addresses to the vaults that control them.
pub trait VaultLookup: Send + Sync {
    /// The vault controlling `address` on `chain`.
    fn lookup(&self, chain: Chain, address: &Address) -> Option<PubKey>;

    /// The members of the vault `pk`, empty when unknown.
    fn members(&self, pk: &PubKey) -> Vec<PubKey>;
}

impl VaultLookup for VaultManager {
    fn lookup(&self, chain: Chain, address: &Address) -> Option<PubKey> {
        VaultManager::lookup(self, chain, address)
    }

    fn members(&self, pk: &PubKey) -> Vec<PubKey> {
        self.lookup_vault(pk)
            .map(|vault| vault.membership)
            .unwrap_or_default()
    }
}

impl<T> VaultLookup for Arc<T>
where
    T: VaultLookup + ?Sized,
{
    fn lookup(&self, chain: Chain, address: &Address) -> Option<PubKey> {
        (**self).lookup(chain, address)
    }

    fn members(&self, pk: &PubKey) -> Vec<PubKey> {
        (**self).members(pk)
    }
}

/// Whether `signer` produces signatures for the address `item` is sent from.
pub fn signs_for(signer: &dyn KeySigner, item: &TxOutItem, network: Network) -> Result<bool> {
    let vault = item.vault_pub_key.address_on(item.chain, network)?;
    let ours = signer.pub_key().address_on(item.chain, network)?;
    Ok(vault == ours)
}

/// Picks the signer for `item`, or `None` when this node does not sign for its vault.
pub fn signer_for(
    selector: &KeySignerSelector,
    vaults: &dyn VaultLookup,
    item: &TxOutItem,
    network: Network,
) -> Result<Option<Arc<dyn KeySigner>>> {
    let members = vaults.members(&item.vault_pub_key);
    let signer = selector.select(&item.vault_pub_key, &members);
    if signs_for(signer.as_ref(), item, network)? {
        Ok(Some(signer))
    } else {
        tracing::debug!(
            vault = %item.vault_pub_key,
            chain = %item.chain,
            in_hash = %item.in_hash,
            "not a signer of this vault, skipping",
        );
        Ok(None)
    }
}
