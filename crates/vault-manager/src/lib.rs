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
//! # Bifrost Vault Manager 🌈
//!
//! Keeps the set of Asgard and Yggdrasil vaults known to ThorNode, and an
//! index from every chain address they control back to the vault pubkey.
//!
//! The index is rebuilt from scratch on every refresh and swapped in under
//! the write lock, so readers only ever see a fully built index.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bifrost_context::{BifrostContext, Shutdown};
use bifrost_thorclient::ThorClient;
use bifrost_types::{Address, Chain, Network, PubKey, RawVaults, Vault};
use bifrost_utils::metric::Metrics;
use bifrost_utils::{probe, Result};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::task::JoinHandle;

/// Where vaults come from.
#[async_trait::async_trait]
pub trait VaultSource: Send + Sync {
    /// The current Asgard and Yggdrasil vaults.
    async fn get_vaults(&self) -> Result<RawVaults>;
}

#[async_trait::async_trait]
impl VaultSource for ThorClient {
    async fn get_vaults(&self) -> Result<RawVaults> {
        ThorClient::get_vaults(self).await
    }
}

#[async_trait::async_trait]
impl<T> VaultSource for Arc<T>
where
    T: VaultSource + ?Sized,
{
    async fn get_vaults(&self) -> Result<RawVaults> {
        self.as_ref().get_vaults().await
    }
}

/// `chain -> address -> vault pubkey`
pub type AddressIndex = HashMap<Chain, HashMap<Address, PubKey>>;

/// A fully built view of the vaults.
#[derive(Debug, Clone, Default)]
pub struct VaultSnapshot {
    /// The vaults as last fetched, without duplicates.
    pub raw: RawVaults,
    /// Addresses of Asgard vaults.
    pub asgard: AddressIndex,
    /// Addresses of Yggdrasil vaults.
    pub yggdrasil: AddressIndex,
}

impl VaultSnapshot {
    /// Builds the indices of `raw` for every chain in `chains`.
    ///
    /// Vaults whose pubkey cannot be turned into an address are left out of
    /// both the indices and the stored vault list.
    pub fn build(raw: RawVaults, chains: &[Chain], network: Network) -> Self {
        let (asgard_vaults, asgard) = index(raw.asgard, chains, network);
        let (yggdrasil_vaults, yggdrasil) = index(raw.yggdrasil, chains, network);
        Self {
            raw: RawVaults {
                asgard: asgard_vaults,
                yggdrasil: yggdrasil_vaults,
            },
            asgard,
            yggdrasil,
        }
    }

    fn lookup(&self, chain: Chain, address: &Address) -> Option<PubKey> {
        self.asgard
            .get(&chain)
            .and_then(|by_address| by_address.get(address))
            .or_else(|| {
                self.yggdrasil
                    .get(&chain)
                    .and_then(|by_address| by_address.get(address))
            })
            .cloned()
    }

    fn vault(&self, pk: &PubKey) -> Option<&Vault> {
        self.raw
            .asgard
            .iter()
            .chain(self.raw.yggdrasil.iter())
            .find(|v| &v.pub_key == pk)
    }
}

fn index(
    vaults: Vec<Vault>,
    chains: &[Chain],
    network: Network,
) -> (Vec<Vault>, AddressIndex) {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::with_capacity(vaults.len());
    let mut by_chain: AddressIndex = chains
        .iter()
        .map(|chain| (*chain, HashMap::with_capacity(vaults.len())))
        .collect();
    'vaults: for vault in vaults {
        if vault.pub_key.is_empty() || seen.contains(&vault.pub_key) {
            continue;
        }
        let mut addresses = Vec::with_capacity(chains.len());
        for chain in chains {
            match vault.pub_key.address_on(*chain, network) {
                Ok(address) => addresses.push((*chain, address)),
                Err(e) => {
                    tracing::warn!(pk = %vault.pub_key, %chain, error = %e, "skipping vault");
                    continue 'vaults;
                }
            }
        }
        for (chain, address) in addresses {
            by_chain
                .entry(chain)
                .or_default()
                .insert(address, vault.pub_key.clone());
        }
        seen.insert(vault.pub_key.clone());
        kept.push(vault);
    }
    (kept, by_chain)
}

/// Tracks ThorNode's vaults and resolves chain addresses to vault pubkeys.
#[derive(Clone)]
pub struct VaultManager {
    source: Arc<dyn VaultSource>,
    chains: Arc<[Chain]>,
    network: Network,
    refresh_interval: Duration,
    snapshot: Arc<RwLock<Arc<VaultSnapshot>>>,
    // vaults added locally that the source did not report yet.
    added: Arc<Mutex<Vec<Vault>>>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for VaultManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultManager")
            .field("chains", &self.chains)
            .field("network", &self.network)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

impl VaultManager {
    /// Creates an empty manager indexing addresses on `chains`.
    pub fn new(
        source: Arc<dyn VaultSource>,
        chains: Vec<Chain>,
        network: Network,
        refresh_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            chains: chains.into(),
            network,
            refresh_interval,
            snapshot: Default::default(),
            added: Default::default(),
            metrics,
        }
    }

    /// Creates a manager for the enabled chains in `ctx`.
    pub fn from_context(ctx: &BifrostContext, source: Arc<dyn VaultSource>) -> Self {
        Self::new(
            source,
            ctx.config.enabled_chains().collect(),
            ctx.config.network,
            Duration::from_millis(ctx.config.tx_scanner.vault_refresh_interval),
            ctx.metrics.clone(),
        )
    }

    /// Fetches the vaults once, then keeps refreshing them in the background
    /// until shutdown.
    pub async fn start(&self, shutdown: Shutdown) -> Result<JoinHandle<Result<()>>> {
        self.refresh().await?;
        let this = self.clone();
        Ok(tokio::spawn(this.run(shutdown)))
    }

    #[tracing::instrument(skip_all, fields(tag = "vault_manager"))]
    async fn run(self, mut shutdown: Shutdown) -> Result<()> {
        loop {
            let wait = self.next_wait();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = shutdown.recv() => break,
            }
            if let Err(e) = self.refresh().await {
                tracing::warn!(error = %e, "vault refresh failed, keeping the previous index");
                self.metrics.record_error(&e);
            }
        }
        tracing::debug!("vault manager stopped");
        Ok(())
    }

    /// The refresh interval, give or take ten percent.
    fn next_wait(&self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        self.refresh_interval.mul_f64(jitter)
    }

    /// Fetches the vaults and swaps in a freshly built index.
    pub async fn refresh(&self) -> Result<()> {
        let raw = self.source.get_vaults().await?;
        self.replace(raw);
        Ok(())
    }

    /// Swaps in the vaults fetched from the source.
    ///
    /// Locally added vaults the source does not know yet are carried over.
    /// The whole swap happens under the write lock, so it cannot interleave
    /// with [`Self::add_vault`] or [`Self::remove_pub_key`].
    fn replace(&self, mut raw: RawVaults) {
        let mut current = self.snapshot.write();
        {
            let mut added = self.added.lock();
            added.retain(|vault| !contains(&raw, &vault.pub_key));
            for vault in added.iter() {
                push(&mut raw, vault.clone());
            }
        }
        self.swap(&mut current, raw);
    }

    fn swap(&self, current: &mut Arc<VaultSnapshot>, raw: RawVaults) {
        let snapshot = VaultSnapshot::build(raw, &self.chains, self.network);
        let (asgard, yggdrasil) =
            (snapshot.raw.asgard.len(), snapshot.raw.yggdrasil.len());
        *current = Arc::new(snapshot);
        self.metrics.vault_refreshes.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::VaultManager,
            asgard,
            yggdrasil,
        );
    }

    /// The current index. It stays consistent however long it is held.
    pub fn snapshot(&self) -> Arc<VaultSnapshot> {
        self.snapshot.read().clone()
    }

    /// The vault pubkey that controls `address` on `chain`.
    pub fn lookup(&self, chain: Chain, address: &Address) -> Option<PubKey> {
        self.snapshot.read().lookup(chain, address)
    }

    /// The vault with pubkey `pk`.
    pub fn lookup_vault(&self, pk: &PubKey) -> Option<Vault> {
        self.snapshot.read().vault(pk).cloned()
    }

    /// Adds a freshly generated Asgard vault without waiting for the next refresh.
    pub fn add_pub_key(&self, pk: PubKey) {
        self.add_vault(Vault::new(pk, bifrost_types::VaultType::Asgard));
    }

    /// Adds `vault` without waiting for the next refresh.
    ///
    /// The vault is kept across refreshes until the source reports it too.
    pub fn add_vault(&self, vault: Vault) {
        let mut current = self.snapshot.write();
        if contains(&current.raw, &vault.pub_key) {
            return;
        }
        self.added.lock().push(vault.clone());
        let mut raw = current.raw.clone();
        push(&mut raw, vault);
        self.swap(&mut current, raw);
    }

    /// Removes the vault with pubkey `pk` until the next refresh brings it back.
    pub fn remove_pub_key(&self, pk: &PubKey) {
        let mut current = self.snapshot.write();
        self.added.lock().retain(|v| &v.pub_key != pk);
        if !contains(&current.raw, pk) {
            return;
        }
        let mut raw = current.raw.clone();
        raw.asgard.retain(|v| &v.pub_key != pk);
        raw.yggdrasil.retain(|v| &v.pub_key != pk);
        self.swap(&mut current, raw);
    }
}

fn contains(raw: &RawVaults, pk: &PubKey) -> bool {
    raw.asgard.iter().chain(raw.yggdrasil.iter()).any(|v| &v.pub_key == pk)
}

fn push(raw: &mut RawVaults, vault: Vault) {
    match vault.vault_type {
        bifrost_types::VaultType::Yggdrasil => raw.yggdrasil.push(vault),
        _ => raw.asgard.push(vault),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bifrost_types::VaultType;
    use parking_lot::Mutex;

    const PK: &str =
        "thorpub1addwnpepqflvfv08t6qt95lmttd6wpf3ss8wx63e9vf6fvyuj2yy6nnyna5763e2kck";

    fn pk(seed: u8) -> PubKey {
        let secret = libsecp256k1::SecretKey::parse(&[seed; 32]).unwrap();
        PubKey::from_secp256k1(&libsecp256k1::PublicKey::from_secret_key(&secret)).unwrap()
    }

    #[derive(Default)]
    struct Scripted(Mutex<Vec<RawVaults>>);

    #[async_trait::async_trait]
    impl VaultSource for Scripted {
        async fn get_vaults(&self) -> Result<RawVaults> {
            let mut answers = self.0.lock();
            if answers.len() > 1 {
                Ok(answers.remove(0))
            } else {
                Ok(answers.first().cloned().unwrap_or_default())
            }
        }
    }

    fn manager(answers: Vec<RawVaults>, network: Network) -> VaultManager {
        VaultManager::new(
            Arc::new(Scripted(Mutex::new(answers))),
            vec![Chain::Binance, Chain::Bitcoin, Chain::Ethereum],
            network,
            Duration::from_secs(60),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn vaults(asgard: &[PubKey], yggdrasil: &[PubKey]) -> RawVaults {
        RawVaults {
            asgard: asgard.iter().cloned().map(|pk| Vault::new(pk, VaultType::Asgard)).collect(),
            yggdrasil: yggdrasil
                .iter()
                .cloned()
                .map(|pk| Vault::new(pk, VaultType::Yggdrasil))
                .collect(),
        }
    }

    #[tokio::test]
    async fn addresses_resolve_back_to_their_vault() {
        let pk: PubKey = PK.parse().unwrap();
        let manager = manager(vec![vaults(&[pk.clone()], &[])], Network::Mainnet);
        manager.refresh().await.unwrap();

        let bnb = Address::new("bnb1l8tt4f2xycdz4e5u6veqmj5qwhp4vsktdkl447");
        let btc = Address::new("bc1l8tt4f2xycdz4e5u6veqmj5qwhp4vskt83lp92");
        assert_eq!(manager.lookup(Chain::Binance, &bnb), Some(pk.clone()));
        assert_eq!(manager.lookup(Chain::Bitcoin, &btc), Some(pk.clone()));
        // an address is only known on its own chain.
        assert_eq!(manager.lookup(Chain::Bitcoin, &bnb), None);
        assert_eq!(manager.lookup_vault(&pk).map(|v| v.vault_type), Some(VaultType::Asgard));
    }

    #[tokio::test]
    async fn index_sizes_match_the_raw_vaults() {
        let asgard = [pk(1), pk(2), pk(3)];
        let yggdrasil = [pk(4), pk(5)];
        let manager = manager(vec![vaults(&asgard, &yggdrasil)], Network::Testnet);
        manager.refresh().await.unwrap();
        let snapshot = manager.snapshot();
        for chain in [Chain::Binance, Chain::Bitcoin, Chain::Ethereum] {
            assert_eq!(snapshot.asgard[&chain].len(), snapshot.raw.asgard.len());
            assert_eq!(snapshot.yggdrasil[&chain].len(), snapshot.raw.yggdrasil.len());
        }
        assert_eq!(snapshot.raw.asgard.len(), 3);
    }

    #[tokio::test]
    async fn duplicates_and_empty_keys_are_dropped() {
        let raw = vaults(&[pk(1), pk(1), PubKey::default()], &[]);
        let manager = manager(vec![raw], Network::Testnet);
        manager.refresh().await.unwrap();
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.raw.asgard.len(), 1);
        assert_eq!(snapshot.asgard[&Chain::Binance].len(), 1);
    }

    #[tokio::test]
    async fn refresh_replaces_the_whole_index() {
        let (old, new) = (pk(1), pk(2));
        let manager = manager(
            vec![vaults(&[old.clone()], &[]), vaults(&[new.clone()], &[])],
            Network::Testnet,
        );
        manager.refresh().await.unwrap();
        let held = manager.snapshot();
        let old_address = old.address_on(Chain::Binance, Network::Testnet).unwrap();
        let new_address = new.address_on(Chain::Binance, Network::Testnet).unwrap();

        manager.refresh().await.unwrap();
        assert_eq!(manager.lookup(Chain::Binance, &old_address), None);
        assert_eq!(manager.lookup(Chain::Binance, &new_address), Some(new));
        // a snapshot taken before the refresh is left untouched.
        assert_eq!(held.lookup(Chain::Binance, &old_address), Some(old));
        assert_eq!(held.lookup(Chain::Binance, &new_address), None);
    }

    #[tokio::test]
    async fn keygen_results_are_visible_before_the_next_refresh() {
        let manager = manager(vec![vaults(&[pk(1)], &[])], Network::Testnet);
        manager.refresh().await.unwrap();
        let fresh = pk(9);
        let address = fresh.address_on(Chain::Ethereum, Network::Testnet).unwrap();
        assert_eq!(manager.lookup(Chain::Ethereum, &address), None);

        manager.add_pub_key(fresh.clone());
        assert_eq!(manager.lookup(Chain::Ethereum, &address), Some(fresh.clone()));
        assert_eq!(manager.snapshot().raw.asgard.len(), 2);

        manager.remove_pub_key(&fresh);
        assert_eq!(manager.lookup(Chain::Ethereum, &address), None);
    }

    /// Answers only once let through, so a refresh can be held mid-flight.
    #[derive(Default)]
    struct Gated {
        entered: tokio::sync::Notify,
        gate: tokio::sync::Notify,
        raw: Mutex<RawVaults>,
    }

    #[async_trait::async_trait]
    impl VaultSource for Gated {
        async fn get_vaults(&self) -> Result<RawVaults> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(self.raw.lock().clone())
        }
    }

    #[tokio::test]
    async fn vaults_added_during_a_refresh_survive_it() {
        let source = Arc::new(Gated::default());
        *source.raw.lock() = vaults(&[pk(1), pk(2)], &[]);
        let manager = VaultManager::new(
            source.clone(),
            vec![Chain::Binance, Chain::Ethereum],
            Network::Testnet,
            Duration::from_secs(60),
            Arc::new(Metrics::new().unwrap()),
        );
        let fresh = pk(9);
        let address = fresh.address_on(Chain::Ethereum, Network::Testnet).unwrap();

        let refresh = tokio::spawn({
            let manager = manager.clone();
            async move { manager.refresh().await }
        });
        source.entered.notified().await;
        manager.add_pub_key(fresh.clone());
        source.gate.notify_one();
        refresh.await.unwrap().unwrap();

        assert_eq!(manager.lookup(Chain::Ethereum, &address), Some(fresh.clone()));
        assert!(manager.lookup_vault(&pk(2)).is_some());
        assert_eq!(manager.snapshot().raw.asgard.len(), 3);

        // once the source reports it, the vault is no longer carried locally.
        *source.raw.lock() = vaults(&[pk(1), fresh.clone()], &[]);
        source.gate.notify_one();
        manager.refresh().await.unwrap();
        assert_eq!(manager.snapshot().raw.asgard.len(), 2);
        *source.raw.lock() = vaults(&[pk(1)], &[]);
        source.gate.notify_one();
        manager.refresh().await.unwrap();
        assert_eq!(manager.lookup(Chain::Ethereum, &address), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_and_refreshes_lose_nothing() {
        let manager = manager(vec![vaults(&[pk(1)], &[])], Network::Testnet);
        manager.refresh().await.unwrap();
        let refresher = tokio::spawn({
            let manager = manager.clone();
            async move {
                for _ in 0..50 {
                    manager.refresh().await.unwrap();
                    tokio::task::yield_now().await;
                }
            }
        });
        let adders: Vec<_> = (10..30u8)
            .map(|seed| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.add_pub_key(pk(seed)) })
            })
            .collect();
        for adder in adders {
            adder.await.unwrap();
        }
        refresher.await.unwrap();

        for seed in 10..30u8 {
            assert!(manager.lookup_vault(&pk(seed)).is_some(), "vault {seed} was lost");
        }
        assert!(manager.lookup_vault(&pk(1)).is_some());
        assert_eq!(manager.snapshot().raw.asgard.len(), 21);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn refresher_stops_on_shutdown() {
        let manager = manager(vec![vaults(&[pk(1)], &[])], Network::Testnet);
        let (tx, rx) = tokio::sync::broadcast::channel(1);
        let handle = manager.start(Shutdown::new(rx)).await.unwrap();
        assert_eq!(manager.snapshot().raw.asgard.len(), 1);
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
