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
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use bifrost_context::Shutdown;
use bifrost_types::{Block, Chain, Network};
use bifrost_utils::metric::Metrics;
use bifrost_utils::{probe, Error, Result};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::VaultLookup;

/// Where a chain client reads blocks from.
#[async_trait::async_trait]
pub trait BlockSource: Send + Sync {
    /// The chain blocks come from.
    fn chain(&self) -> Chain;

    /// The height of the newest block.
    async fn tip(&self) -> Result<i64>;

    /// The block at `height`, holding only transactions to or from a vault
    /// known to `vaults`, each tagged with that vault's pubkey.
    async fn fetch_block(&self, height: i64, vaults: &dyn VaultLookup) -> Result<Block>;
}

#[async_trait::async_trait]
impl<T> BlockSource for Arc<T>
where
    T: BlockSource + ?Sized,
{
    fn chain(&self) -> Chain {
        (**self).chain()
    }

    async fn tip(&self) -> Result<i64> {
        (**self).tip().await
    }

    async fn fetch_block(&self, height: i64, vaults: &dyn VaultLookup) -> Result<Block> {
        (**self).fetch_block(height, vaults).await
    }
}

/// Walks a chain one block at a time.
///
/// The cursor only advances once the block at the cursor has been sent.
/// Failures, and a tip behind the cursor, back off and retry the same height
/// forever.
pub struct BlockScanner<S> {
    source: S,
    vaults: Arc<dyn VaultLookup>,
    network: Network,
    backoff: ExponentialBackoff,
    metrics: Arc<Metrics>,
    cursor: i64,
    tip: i64,
}

impl<S> std::fmt::Debug for BlockScanner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockScanner")
            .field("cursor", &self.cursor)
            .field("tip", &self.tip)
            .finish_non_exhaustive()
    }
}

impl<S: BlockSource> BlockScanner<S> {
    /// Creates a scanner starting at `start_height`.
    pub fn new(
        source: S,
        vaults: Arc<dyn VaultLookup>,
        network: Network,
        backoff: ExponentialBackoff,
        metrics: Arc<Metrics>,
        start_height: i64,
    ) -> Self {
        Self {
            source,
            vaults,
            network,
            backoff,
            metrics,
            cursor: start_height,
            tip: 0,
        }
    }

    /// The next height to scan.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Scans until `shutdown` fires or `output` is closed.
    #[tracing::instrument(skip_all, fields(chain = %self.source.chain()))]
    pub async fn run(&mut self, output: mpsc::Sender<Block>, mut shutdown: Shutdown) -> Result<()> {
        let chain = self.source.chain().to_string();
        self.backoff.reset();
        tracing::info!(cursor = self.cursor, "block scanner started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            let result = tokio::select! {
                r = self.next_block() => r,
                _ = shutdown.recv() => break,
            };
            match result {
                Ok(block) => {
                    let observed = (block.txs.len(), block.out_txs.len());
                    tokio::select! {
                        sent = output.send(block) => {
                            if sent.is_err() {
                                tracing::debug!("block consumer is gone, stopping");
                                break;
                            }
                        },
                        _ = shutdown.recv() => break,
                    }
                    self.metrics.blocks_scanned.with_label_values(&[&chain]).inc();
                    self.metrics
                        .txs_observed
                        .with_label_values(&[&chain, "in"])
                        .inc_by(observed.0 as f64);
                    self.metrics
                        .txs_observed
                        .with_label_values(&[&chain, "out"])
                        .inc_by(observed.1 as f64);
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %probe::Kind::Sync,
                        chain = %chain,
                        height = self.cursor,
                        tip = self.tip,
                    );
                    self.cursor += 1;
                    self.backoff.reset();
                    continue;
                }
                Err(Error::BlockNotAvailable { height, tip }) => {
                    tracing::trace!(height, tip, "waiting for the next block");
                }
                Err(e) => {
                    tracing::warn!(height = self.cursor, error = %e, "failed to scan block");
                    self.metrics.record_error(&e);
                }
            }
            self.metrics.scanner_back_off.with_label_values(&[&chain]).inc();
            let wait = self.next_wait();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!(cursor = self.cursor, "block scanner stopped");
        Ok(())
    }

    /// Fetches the block at the cursor, without advancing it.
    pub async fn next_block(&mut self) -> Result<Block> {
        if self.cursor > self.tip {
            self.tip = self.source.tip().await?;
            if self.cursor > self.tip {
                return Err(Error::BlockNotAvailable {
                    height: self.cursor,
                    tip: self.tip,
                });
            }
        }
        let mut block = self.source.fetch_block(self.cursor, self.vaults.as_ref()).await?;
        if block.height != self.cursor || block.chain != self.source.chain() {
            return Err(Error::MalformedBlock {
                height: self.cursor,
                reason: format!("got {} block {}", block.chain, block.height),
            });
        }
        let network = self.network;
        block.txs.retain(|tx| match tx.validate_inbound(network) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tx_id = %tx.tx_id, error = %e, "dropping inbound transaction");
                false
            }
        });
        block.out_txs.retain(|tx| match tx.validate_outbound(network) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tx_id = %tx.tx_id, error = %e, "dropping outbound transaction");
                false
            }
        });
        Ok(block)
    }

    fn next_wait(&mut self) -> Duration {
        match self.backoff.next_backoff() {
            Some(wait) => wait,
            None => {
                self.backoff.reset();
                self.backoff.initial_interval
            }
        }
    }
}

struct Running {
    stop: broadcast::Sender<()>,
    scan: JoinHandle<Result<()>>,
    relay: JoinHandle<()>,
}

/// The scan loop of one chain client, stoppable on its own or through the
/// process wide shutdown.
#[derive(Default)]
pub struct ScanTask {
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for ScanTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanTask")
            .field("running", &self.running.lock().is_some())
            .finish()
    }
}

impl ScanTask {
    /// Spawns `scanner`, failing if a scan is already running.
    pub fn spawn<S>(
        &self,
        mut scanner: BlockScanner<S>,
        output: mpsc::Sender<Block>,
        mut shutdown: Shutdown,
    ) -> Result<()>
    where
        S: BlockSource + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(Error::Generic("block scanner already started"));
        }
        let (stop, stop_rx) = broadcast::channel(1);
        let relay_stop = stop.clone();
        let relay = tokio::spawn(async move {
            shutdown.recv().await;
            let _ = relay_stop.send(());
        });
        let scan = tokio::spawn(async move {
            scanner.run(output, Shutdown::new(stop_rx)).await
        });
        *running = Some(Running { stop, scan, relay });
        Ok(())
    }

    /// Stops the scan loop and waits for it to exit.
    pub async fn stop(&self) -> Result<()> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(());
        };
        let _ = running.stop.send(());
        running.relay.abort();
        match running.scan.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "block scanner panicked");
                Err(Error::TaskStoppedAbnormally)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bifrost_types::{Address, Asset, Coin, PubKey, TxIn};
    use tokio::time::Instant;

    use super::*;

    const VAULT: &str =
        "thorpub1addwnpepqflvfv08t6qt95lmttd6wpf3ss8wx63e9vf6fvyuj2yy6nnyna5763e2kck";
    const VAULT_BNB: &str = "tbnb1l8tt4f2xycdz4e5u6veqmj5qwhp4vsktrrk340";
    const SENDER_BNB: &str = "tbnb1qyqszqgpqyqszqgpqyqszqgpqyqszqgp7zhkvr";

    struct Vaults(HashMap<Address, PubKey>);

    impl VaultLookup for Vaults {
        fn lookup(&self, _: Chain, address: &Address) -> Option<PubKey> {
            self.0.get(address).cloned()
        }

        fn members(&self, _: &PubKey) -> Vec<PubKey> {
            Vec::new()
        }
    }

    /// A chain whose tip is fixed, failing the first `failures` fetches.
    struct FlakyChain {
        tip: i64,
        failures: Mutex<usize>,
        fetches: Mutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl BlockSource for FlakyChain {
        fn chain(&self) -> Chain {
            Chain::Binance
        }

        async fn tip(&self) -> Result<i64> {
            Ok(self.tip)
        }

        async fn fetch_block(&self, height: i64, vaults: &dyn VaultLookup) -> Result<Block> {
            self.fetches.lock().push(height);
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(Error::Http {
                        status: 500,
                        body: "internal error".into(),
                    });
                }
            }
            let mut block = Block::new(Chain::Binance, height, format!("HASH{height}"));
            let to = Address::new(VAULT_BNB);
            if let Some(pk) = vaults.lookup(Chain::Binance, &to) {
                block.txs.push(TxIn {
                    chain: Chain::Binance,
                    block_height: height,
                    block_hash: block.hash.clone(),
                    tx_id: format!("TX{height}"),
                    from: Address::new(SENDER_BNB),
                    to,
                    coins: vec![Coin::new(Asset::bnb(), 100)],
                    gas: Vec::new(),
                    memo: "SWAP:BTC.BTC".into(),
                    observed_vault_pub_key: pk,
                });
            }
            Ok(block)
        }
    }

    fn scanner(chain: Arc<FlakyChain>, start: i64) -> (BlockScanner<Arc<FlakyChain>>, Arc<Metrics>) {
        let vault: PubKey = VAULT.parse().unwrap();
        let vaults = Vaults(HashMap::from([(Address::new(VAULT_BNB), vault)]));
        let metrics = Arc::new(Metrics::new().unwrap());
        let backoff = ExponentialBackoff {
            current_interval: Duration::from_millis(500),
            initial_interval: Duration::from_millis(500),
            randomization_factor: 0.0,
            multiplier: 1.5,
            max_interval: Duration::from_secs(180),
            max_elapsed_time: None,
            ..Default::default()
        };
        let scanner = BlockScanner::new(
            chain,
            Arc::new(vaults),
            Network::Testnet,
            backoff,
            metrics.clone(),
            start,
        );
        (scanner, metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn retries_the_same_height_after_errors() {
        let chain = Arc::new(FlakyChain {
            tip: 100,
            failures: Mutex::new(2),
            fetches: Mutex::default(),
        });
        let (mut scanner, metrics) = scanner(chain.clone(), 100);
        let (output, mut blocks) = mpsc::channel(4);
        let (stop, stop_rx) = broadcast::channel(1);
        let started = Instant::now();
        let task = tokio::spawn(async move {
            scanner.run(output, Shutdown::new(stop_rx)).await?;
            Ok::<_, Error>(scanner.cursor())
        });

        let block = blocks.recv().await.unwrap();
        // two backoff sleeps: 500ms, then 750ms.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1250), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1300), "{elapsed:?}");
        assert_eq!(block.height, 100);
        assert_eq!(block.txs.len(), 1);
        assert_eq!(block.txs[0].observed_vault_pub_key.as_str(), VAULT);

        // the tip is 100, so nothing else shows up however long we wait.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(blocks.try_recv().is_err());
        stop.send(()).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), 101);
        assert_eq!(*chain.fetches.lock(), vec![100, 100, 100]);
        assert_eq!(metrics.blocks_scanned.with_label_values(&["BNB"]).get(), 1.0);
        assert_eq!(
            metrics.txs_observed.with_label_values(&["BNB", "in"]).get(),
            1.0
        );
    }

    #[tokio::test]
    async fn a_cursor_beyond_the_tip_is_not_available() {
        let chain = Arc::new(FlakyChain {
            tip: 99,
            failures: Mutex::new(0),
            fetches: Mutex::default(),
        });
        let (mut scanner, _) = scanner(chain.clone(), 100);
        let err = scanner.next_block().await.unwrap_err();
        assert!(matches!(err, Error::BlockNotAvailable { height: 100, tip: 99 }));
        assert!(chain.fetches.lock().is_empty());
        assert_eq!(scanner.cursor(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_are_emitted_in_order() {
        let chain = Arc::new(FlakyChain {
            tip: 5,
            failures: Mutex::new(0),
            fetches: Mutex::default(),
        });
        let (scanner, _) = scanner(chain, 1);
        let (output, mut blocks) = mpsc::channel(8);
        let (stop, stop_rx) = broadcast::channel(1);
        let task = ScanTask::default();
        task.spawn(scanner, output, Shutdown::new(stop_rx)).unwrap();
        let mut heights = Vec::new();
        for _ in 0..5 {
            heights.push(blocks.recv().await.unwrap().height);
        }
        assert_eq!(heights, vec![1, 2, 3, 4, 5]);
        // the process wide shutdown reaches the loop too.
        stop.send(()).unwrap();
        task.stop().await.unwrap();
    }
}
