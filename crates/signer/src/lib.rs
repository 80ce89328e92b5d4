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
//! # Bifrost Signer 🌈
//!
//! Works through what ThorNode asks of this node: outbound items are signed
//! by the chain client of their chain and broadcast, keygen ceremonies are
//! run against the TSS party. Failures of either are reported back to
//! ThorNode so the work can be rescheduled or the culprits punished.
//!
//! Items of one vault are handled in the order of the ThorNode heights they
//! were scheduled at. Different vaults are worked on concurrently, by a fixed
//! number of workers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use bifrost_chain_client_traits::ChainClient;
use bifrost_context::{BifrostContext, Shutdown};
use bifrost_signing_backends::tss::blame_of;
use bifrost_signing_backends::{KeySignerSelector, PubKeyManager, TssClient};
use bifrost_thorclient::SubmitHandle;
use bifrost_types::{
    Address, Blame, Keygen, KeygenBlock, KeygenType, KeysignWorkUnit, MsgTssKeysignFail,
    MsgTssPool, PubKey, ThorMsg, TxOutItem, Vault, VaultType,
};
use bifrost_utils::metric::Metrics;
use bifrost_utils::{probe, Error, Result};
use bifrost_vault_manager::VaultManager;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// How many work units may wait in front of one worker.
const WORKER_BACKLOG: usize = 16;

/// Signs outbound items and runs keygens.
#[derive(typed_builder::TypedBuilder)]
pub struct Signer {
    /// One client per enabled chain.
    clients: Vec<Arc<dyn ChainClient>>,
    vaults: VaultManager,
    tss: TssClient,
    pub_keys: PubKeyManager,
    submitter: SubmitHandle,
    /// The node's consensus-layer address.
    signer: Address,
    metrics: Arc<Metrics>,
    #[builder(default = Duration::from_secs(60))]
    keysign_timeout: Duration,
    #[builder(default = Duration::from_secs(60))]
    keygen_timeout: Duration,
    #[builder(default = 4)]
    worker_count: usize,
    #[builder(default = broadcast::channel(1).0, setter(skip))]
    stop: broadcast::Sender<()>,
    #[builder(default, setter(skip))]
    tasks: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("signer", &self.signer)
            .field(
                "chains",
                &self.clients.iter().map(|c| c.chain()).collect::<Vec<_>>(),
            )
            .field("worker_count", &self.worker_count)
            .field("running", &!self.tasks.lock().is_empty())
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Creates the signer from the configuration in `ctx`.
    pub fn from_context(
        ctx: &BifrostContext,
        clients: Vec<Arc<dyn ChainClient>>,
        vaults: VaultManager,
        selector: &KeySignerSelector,
        submitter: SubmitHandle,
    ) -> Result<Self> {
        let config = &ctx.config.tx_signer;
        Ok(Self::builder()
            .clients(clients)
            .vaults(vaults)
            .tss(selector.tss().clone())
            .pub_keys(selector.pub_keys().clone())
            .submitter(submitter)
            .signer(ctx.node_address()?)
            .metrics(ctx.metrics.clone())
            .keysign_timeout(Duration::from_millis(config.keysign_timeout))
            .keygen_timeout(Duration::from_millis(config.keygen_timeout))
            .worker_count(config.worker_count)
            .build())
    }

    /// The client handling `item`'s chain.
    fn client_for(&self, item: &TxOutItem) -> Option<&Arc<dyn ChainClient>> {
        self.clients.iter().find(|c| c.equals_chain(item.chain))
    }

    /// Signs and broadcasts one outbound item, returning its chain-native hash.
    ///
    /// Yields `None` when this node is not the one to sign the item. Signing
    /// failures, and broadcasts the chain refused, are reported to ThorNode
    /// before the error is returned.
    #[tracing::instrument(skip_all, fields(chain = %item.chain, in_hash = %item.in_hash))]
    pub async fn process_item(&self, height: i64, item: &TxOutItem) -> Result<Option<String>> {
        item.validate()?;
        let vault = self
            .vaults
            .lookup_vault(&item.vault_pub_key)
            .ok_or_else(|| Error::VaultNotFound(item.vault_pub_key.to_string()))?;
        if !vault.can_sign() {
            tracing::debug!(vault = %vault.pub_key, status = ?vault.status, "vault cannot sign");
            return Ok(None);
        }
        let client = self.client_for(item).ok_or_else(|| Error::ChainNotFound {
            chain: item.chain.to_string(),
        })?;

        let raw_tx = match client.sign(item, height).await {
            Ok(Some(raw_tx)) => raw_tx,
            Ok(None) => {
                tracing::trace!(vault = %item.vault_pub_key, "not signing for vault");
                return Ok(None);
            }
            Err(e) => {
                self.report_keysign_failure(height, item, &e).await;
                return Err(e);
            }
        };
        let hash = match client.broadcast(&raw_tx).await {
            Ok(hash) => hash,
            Err(e) => {
                // a transient failure leaves the item for ThorNode to reschedule
                if !e.is_retriable() {
                    self.report_keysign_failure(height, item, &e).await;
                }
                return Err(e);
            }
        };
        self.metrics
            .keysign_broadcast
            .with_label_values(&[&item.chain.to_string()])
            .inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Keysign,
            chain = %item.chain,
            height,
            in_hash = %item.in_hash,
            tx_hash = %hash,
        );
        Ok(Some(hash))
    }

    /// Works through every item of `unit` in order, within the keysign budget.
    ///
    /// Items left when the budget runs out count as failed; ThorNode
    /// reschedules them.
    #[tracing::instrument(skip_all, fields(height = unit.height, vault = %unit.vault_pub_key))]
    pub async fn process_unit(&self, unit: KeysignWorkUnit) {
        let mut done = 0;
        let work = async {
            for item in &unit.items {
                if let Err(e) = self.process_item(unit.height, item).await {
                    tracing::error!(
                        in_hash = %item.in_hash,
                        coin = %item.coin,
                        error = %e,
                        "failed to send outbound item",
                    );
                    self.failed(item, &e);
                }
                done += 1;
            }
        };
        if tokio::time::timeout(self.keysign_timeout, work).await.is_err() {
            let e = Error::Timeout("keysign batch");
            let left = &unit.items[done..];
            tracing::warn!(items = left.len(), error = %e, "gave up on keysign batch");
            for item in left {
                tracing::warn!(
                    in_hash = %item.in_hash,
                    coin = %item.coin,
                    "outbound item left for ThorNode to reschedule",
                );
                self.failed(item, &e);
            }
        }
    }

    fn failed(&self, item: &TxOutItem, error: &Error) {
        self.metrics
            .keysign_failed
            .with_label_values(&[&item.chain.to_string()])
            .inc();
        self.metrics.record_error(error);
    }

    async fn report_keysign_failure(&self, height: i64, item: &TxOutItem, error: &Error) {
        let msg = MsgTssKeysignFail::new(
            height,
            blame_for(error),
            item.memo.clone(),
            vec![item.coin.clone()],
            self.signer.clone(),
        );
        match self.submitter.submit(ThorMsg::TssKeysignFail(msg)).await {
            Ok(hash) => tracing::info!(tx_hash = %hash, error = %error, "reported keysign failure"),
            Err(e) => {
                tracing::error!(error = %e, "failed to report keysign failure");
                self.metrics.record_error(&e);
            }
        }
    }

    /// Runs one keygen ceremony and reports its outcome to ThorNode.
    ///
    /// Returns the new vault's pubkey, or `None` when this node is not a
    /// member of the ceremony.
    #[tracing::instrument(skip_all, fields(height = height, id = %keygen.id))]
    pub async fn process_keygen(&self, height: i64, keygen: &Keygen) -> Result<Option<PubKey>> {
        if let Some(own) = self.pub_keys.node_pub_key() {
            if !keygen.members.contains(&own) {
                tracing::debug!("not a member of keygen");
                return Ok(None);
            }
        }
        let result = tokio::time::timeout(self.keygen_timeout, self.tss.keygen(&keygen.members))
            .await
            .unwrap_or(Err(Error::Timeout("keygen")));

        match result {
            Ok(pub_key) => {
                self.metrics.keygen_total.with_label_values(&["success"]).inc();
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Keygen,
                    height,
                    pool_pub_key = %pub_key,
                    members = keygen.members.len(),
                );
                // usable before ThorNode lists it
                let mut vault = Vault::new(
                    pub_key.clone(),
                    match keygen.keygen_type {
                        KeygenType::Asgard => VaultType::Asgard,
                        KeygenType::Yggdrasil => VaultType::Yggdrasil,
                    },
                );
                vault.membership = keygen.members.clone();
                self.pub_keys.add(pub_key.clone());
                self.vaults.add_vault(vault);

                let msg = MsgTssPool::new(
                    pub_key.clone(),
                    keygen.members.clone(),
                    self.signer.clone(),
                );
                self.submitter.submit(ThorMsg::TssPool(msg)).await?;
                Ok(Some(pub_key))
            }
            Err(e) => {
                tracing::error!(error = %e, "keygen failed");
                self.metrics.keygen_total.with_label_values(&["failure"]).inc();
                let msg = MsgTssKeysignFail::new(
                    height,
                    blame_for(&e),
                    String::new(),
                    Vec::new(),
                    self.signer.clone(),
                );
                self.submitter.submit(ThorMsg::TssKeysignFail(msg)).await?;
                Err(e)
            }
        }
    }

    /// Spawns the workers consuming `keysign` and `keygen`.
    pub fn start(
        self: &Arc<Self>,
        keysign: mpsc::Receiver<KeysignWorkUnit>,
        keygen: mpsc::Receiver<KeygenBlock>,
        mut shutdown: Shutdown,
    ) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Err(Error::Generic("signer already started"));
        }
        let workers: Vec<_> = (0..self.worker_count.max(1))
            .map(|_| {
                let (tx, rx) = mpsc::channel(WORKER_BACKLOG);
                let this = self.clone();
                let stop = self.stop.subscribe();
                tasks.push(tokio::spawn(async move { this.work(rx, stop).await }));
                tx
            })
            .collect();

        let this = self.clone();
        let stop = self.stop.subscribe();
        tasks.push(tokio::spawn(async move {
            this.dispatch(keysign, workers, stop).await
        }));
        let this = self.clone();
        let stop = self.stop.subscribe();
        tasks.push(tokio::spawn(async move { this.keygens(keygen, stop).await }));

        let relay_stop = self.stop.clone();
        let mut relay_stopped = self.stop.subscribe();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = relay_stop.send(());
                }
                _ = relay_stopped.recv() => {}
            }
            Ok(())
        }));
        tracing::info!(workers = self.worker_count.max(1), "signer started");
        Ok(())
    }

    /// Stops every worker and waits for them to exit.
    pub async fn stop(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return Ok(());
        }
        let _ = self.stop.send(());
        let mut result = Ok(());
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "signer task panicked");
                    result = Err(Error::TaskStoppedAbnormally);
                }
            }
        }
        tracing::info!("signer stopped");
        result
    }

    /// Hands every unit to the worker owning its vault.
    async fn dispatch(
        &self,
        mut units: mpsc::Receiver<KeysignWorkUnit>,
        workers: Vec<mpsc::Sender<KeysignWorkUnit>>,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            let unit = tokio::select! {
                unit = units.recv() => match unit {
                    Some(unit) => unit,
                    None => break,
                },
                _ = stop.recv() => break,
            };
            let worker = &workers[worker_of(&unit.vault_pub_key, workers.len())];
            tokio::select! {
                sent = worker.send(unit) => {
                    if sent.is_err() {
                        return Err(Error::ChannelClosed("keysign worker"));
                    }
                }
                _ = stop.recv() => break,
            }
        }
        Ok(())
    }

    async fn work(
        &self,
        mut units: mpsc::Receiver<KeysignWorkUnit>,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            let unit = tokio::select! {
                unit = units.recv() => match unit {
                    Some(unit) => unit,
                    None => break,
                },
                _ = stop.recv() => break,
            };
            tokio::select! {
                _ = self.process_unit(unit) => {}
                _ = stop.recv() => break,
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(tag = "keygen"))]
    async fn keygens(
        &self,
        mut blocks: mpsc::Receiver<KeygenBlock>,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            let block = tokio::select! {
                block = blocks.recv() => match block {
                    Some(block) => block,
                    None => break,
                },
                _ = stop.recv() => break,
            };
            for keygen in &block.keygens {
                tokio::select! {
                    result = self.process_keygen(block.height, keygen) => {
                        if let Err(e) = result {
                            self.metrics.record_error(&e);
                        }
                    }
                    _ = stop.recv() => return Ok(()),
                }
            }
        }
        Ok(())
    }
}

/// The blame carried by a TSS failure, or just the reason for anything else.
fn blame_for(error: &Error) -> Blame {
    blame_of(error).unwrap_or_else(|| Blame {
        fail_reason: error.to_string(),
        blame_nodes: Vec::new(),
    })
}

/// The worker all units of `vault` go to.
fn worker_of(vault: &PubKey, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    vault.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}
