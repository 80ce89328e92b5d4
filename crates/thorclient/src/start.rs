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
use std::time::Duration;

use bifrost_context::BifrostContext;
use bifrost_signing_backends::PubKeyManager;
use bifrost_types::{
    KeygenBlock, KeysignWorkUnit, MsgSetIPAddress, MsgSetNodeKeys, PubKeySet,
    ThorMsg,
};
use bifrost_utils::retry::ConstantWithMaxRetryCount;
use bifrost_utils::{probe, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{NodeAccount, SubmissionWorker, SubmitHandle, ThorClient, ThorScanner};

/// How long each startup gate waits.
#[derive(Debug, Clone)]
pub struct StartupPolicies {
    /// Polls the observer endpoint until the node is whitelisted.
    pub whitelist: ConstantWithMaxRetryCount,
    /// Polls the node account until its pubkey is registered.
    pub key_discovery: ConstantWithMaxRetryCount,
}

impl Default for StartupPolicies {
    /// An hour for the whitelist, five minutes for the keys.
    fn default() -> Self {
        Self {
            whitelist: ConstantWithMaxRetryCount::new(Duration::from_secs(30), 120),
            key_discovery: ConstantWithMaxRetryCount::new(Duration::from_secs(5), 60),
        }
    }
}

/// Everything a started ThorClient hands to the rest of Bifrost.
#[derive(Debug)]
pub struct ThorClientHandles {
    /// The client itself.
    pub client: ThorClient,
    /// Queues consensus-layer messages.
    pub submitter: SubmitHandle,
    /// The node account, as seen after key discovery.
    pub node_account: NodeAccount,
    /// Outbound work, one unit per height and vault.
    pub keysign_rx: mpsc::Receiver<KeysignWorkUnit>,
    /// Keygen work, one block per height.
    pub keygen_rx: mpsc::Receiver<KeygenBlock>,
    /// The submission worker and the scanner.
    pub tasks: Vec<JoinHandle<Result<()>>>,
}

/// Runs the startup sequence and spawns the submission worker and the scanner.
///
/// Whitelist, account, registration, key discovery and the scan cursor are
/// resolved in that order. Any failure aborts the start.
#[tracing::instrument(skip_all, fields(node = %client.node_address()))]
pub async fn start(
    ctx: &BifrostContext,
    client: ThorClient,
    pub_keys: PubKeyManager,
    policies: StartupPolicies,
) -> Result<ThorClientHandles> {
    let observer = client.wait_for_whitelist(policies.whitelist).await?;
    let account = client.get_account().await?;
    tracing::debug!(
        account_number = account.account_number,
        sequence = account.sequence,
        "node account loaded",
    );

    let capacity = ctx.config.tx_scanner.channel_capacity;
    let (worker, submitter) = SubmissionWorker::new(
        client.clone(),
        ctx.node_key()?,
        ctx.config.thorchain.chain_id.clone(),
        account,
        capacity,
    );
    let mut tasks = vec![tokio::spawn(worker.run(ctx.shutdown_signal()))];

    if ctx.config.thorchain.register_node {
        register(ctx, &client, &submitter, &observer).await?;
    }

    let node_account = client.discover_keys(policies.key_discovery, &pub_keys).await?;
    let cursor = client.last_signed_out().await?;

    let (keysign_tx, keysign_rx) = mpsc::channel(capacity.max(1));
    let (keygen_tx, keygen_rx) = mpsc::channel(capacity.max(1));
    let scanner = ThorScanner::new(
        client.clone(),
        pub_keys,
        cursor,
        ctx.config.back_off.exponential(),
        keysign_tx,
        keygen_tx,
        ctx.metrics.clone(),
    );
    tasks.push(tokio::spawn(scanner.run(ctx.shutdown_signal())));
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        thorclient = "started",
        cursor,
    );
    Ok(ThorClientHandles {
        client,
        submitter,
        node_account,
        keysign_rx,
        keygen_rx,
        tasks,
    })
}

/// Registers the node's keys and IP address when ThorNode does not have them yet.
async fn register(
    ctx: &BifrostContext,
    client: &ThorClient,
    submitter: &SubmitHandle,
    observer: &NodeAccount,
) -> Result<()> {
    let signer = client.node_address().clone();
    if observer.pub_key_set.is_empty() {
        let msg = MsgSetNodeKeys {
            node_pub_keys: PubKeySet {
                secp256k1: ctx.node_key()?.pub_key()?,
                ..Default::default()
            },
            validator_cons_pub_key: ctx
                .config
                .thorchain
                .validator_cons_pub_key
                .clone()
                .unwrap_or_default(),
            signer: signer.clone(),
        };
        let hash = submitter.submit(ThorMsg::SetNodeKeys(msg)).await?;
        tracing::info!(%hash, "node keys registered");
    }
    match &ctx.config.thorchain.ip_address {
        Some(ip) if observer.ip_address.is_empty() => {
            let msg = MsgSetIPAddress {
                ip_address: ip.clone(),
                signer,
            };
            let hash = submitter.submit(ThorMsg::SetIpAddress(msg)).await?;
            tracing::info!(%hash, %ip, "node ip address registered");
        }
        _ => {}
    }
    Ok(())
}
