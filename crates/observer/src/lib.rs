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
//! # Bifrost Observer 🌈
//!
//! Fans in the blocks every chain client scans and witnesses their vault
//! transactions to ThorNode, one consensus-layer transaction per block.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use bifrost_context::{BifrostContext, Shutdown};
use bifrost_thorclient::SubmitHandle;
use bifrost_types::{Address, Block, MsgObservedTxIn, MsgObservedTxOut, ObservedTx, ThorMsg};
use bifrost_utils::metric::Metrics;
use bifrost_utils::retry::ExponentialWithMaxRetryCount;
use bifrost_utils::{probe, Error, Result};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// How many times a witness is retried before the block is given up.
const WITNESS_RETRIES: usize = 5;

/// Receives scanned blocks from every chain client and witnesses them.
pub struct Observer {
    submitter: SubmitHandle,
    signer: Address,
    metrics: Arc<Metrics>,
    policy: ExponentialWithMaxRetryCount,
    sink: mpsc::Sender<Block>,
    blocks: Mutex<Option<mpsc::Receiver<Block>>>,
    stop: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("signer", &self.signer)
            .field("running", &self.task.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Observer {
    /// Creates an observer witnessing as `signer`, buffering up to `capacity` blocks.
    pub fn new(
        submitter: SubmitHandle,
        signer: Address,
        metrics: Arc<Metrics>,
        policy: ExponentialWithMaxRetryCount,
        capacity: usize,
    ) -> Self {
        let (sink, blocks) = mpsc::channel(capacity.max(1));
        let (stop, _) = broadcast::channel(1);
        Self {
            submitter,
            signer,
            metrics,
            policy,
            sink,
            blocks: Mutex::new(Some(blocks)),
            stop,
            task: Mutex::new(None),
        }
    }

    /// Creates the observer from the configuration in `ctx`.
    pub fn from_context(ctx: &BifrostContext, submitter: SubmitHandle) -> Result<Self> {
        Ok(Self::new(
            submitter,
            ctx.node_address()?,
            ctx.metrics.clone(),
            ExponentialWithMaxRetryCount::new(ctx.config.back_off.exponential(), WITNESS_RETRIES),
            ctx.config.tx_scanner.channel_capacity,
        ))
    }

    /// The channel chain clients send their blocks to.
    pub fn sink(&self) -> mpsc::Sender<Block> {
        self.sink.clone()
    }

    /// The consensus-layer messages witnessing `block`, none when it carries nothing.
    pub fn messages(&self, block: &Block) -> Vec<ThorMsg> {
        let mut msgs = Vec::new();
        if !block.txs.is_empty() {
            msgs.push(ThorMsg::ObservedTxIn(MsgObservedTxIn {
                txs: block.txs.iter().map(ObservedTx::from).collect(),
                signer: self.signer.clone(),
            }));
        }
        if !block.out_txs.is_empty() {
            msgs.push(ThorMsg::ObservedTxOut(MsgObservedTxOut {
                txs: block.out_txs.iter().map(ObservedTx::from).collect(),
                signer: self.signer.clone(),
            }));
        }
        msgs
    }

    /// Witnesses `block`, returning the hash of the ThorNode transaction.
    ///
    /// Empty blocks are dropped and yield `None`.
    #[tracing::instrument(skip_all, fields(chain = %block.chain, height = block.height))]
    pub async fn witness(&self, block: &Block) -> Result<Option<String>> {
        let msgs = self.messages(block);
        if msgs.is_empty() {
            tracing::trace!("nothing to witness");
            return Ok(None);
        }
        let submitter = &self.submitter;
        let mut policy = self.policy.clone();
        policy.reset();
        let task = || {
            let msgs = msgs.clone();
            async move {
                submitter.submit_all(msgs, String::new()).await.map_err(|e| {
                    if e.is_retriable() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        };
        let notify = |e: Error, wait: Duration| {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Retry,
                witness = true,
                error = %e,
                wait = ?wait,
            );
        };
        let hash = backoff::future::retry_notify(policy, task, notify).await?;
        self.metrics.witness_submitted.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Witness,
            chain = %block.chain,
            height = block.height,
            txs_in = block.txs.len(),
            txs_out = block.out_txs.len(),
            tx_hash = %hash,
        );
        Ok(Some(hash))
    }

    /// Spawns the loop witnessing every block sent to [`Observer::sink`].
    pub fn start(self: &Arc<Self>, shutdown: Shutdown) -> Result<()> {
        let blocks = self
            .blocks
            .lock()
            .take()
            .ok_or(Error::Generic("observer already started"))?;
        let this = self.clone();
        let stop = self.stop.subscribe();
        let handle = tokio::spawn(async move { this.run(blocks, shutdown, stop).await });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stops the loop and waits for it to exit.
    pub async fn stop(&self) -> Result<()> {
        let Some(handle) = self.task.lock().take() else {
            return Ok(());
        };
        let _ = self.stop.send(());
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "observer panicked");
                Err(Error::TaskStoppedAbnormally)
            }
        }
    }

    #[tracing::instrument(skip_all, fields(tag = "observer"))]
    async fn run(
        &self,
        mut blocks: mpsc::Receiver<Block>,
        mut shutdown: Shutdown,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<()> {
        tracing::info!("observer started");
        loop {
            let block = tokio::select! {
                block = blocks.recv() => match block {
                    Some(block) => block,
                    None => break,
                },
                _ = shutdown.recv() => break,
                _ = stop.recv() => break,
            };
            if let Err(e) = self.witness(&block).await {
                tracing::error!(
                    chain = %block.chain,
                    height = block.height,
                    error = %e,
                    "failed to witness block",
                );
                self.metrics.record_error(&e);
            }
        }
        tracing::info!("observer stopped");
        Ok(())
    }
}
