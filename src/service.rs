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
//! # Bifrost Service Module 🌈
//!
//! Starts every long-running component in dependency order and stops them
//! in reverse.
//!
//! ## Overview
//!
//! The status server comes first, so `/ping` answers while the node waits
//! to be whitelisted. Then ThorClient, the vault index, one client per
//! enabled chain, the observer witnessing their blocks, and finally the
//! signer working through what ThorNode schedules.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use bifrost_chain_binance::BinanceClient;
use bifrost_chain_bitcoin::BitcoinClient;
use bifrost_chain_client_traits::{ChainClient, VaultLookup};
use bifrost_chain_ethereum::EthereumClient;
use bifrost_context::BifrostContext;
use bifrost_handlers::{handle_metrics, handle_p2p_id, handle_ping, HandlerState};
use bifrost_observer::Observer;
use bifrost_signer::Signer;
use bifrost_signing_backends::{KeySignerSelector, LocalKeySigner, PubKeyManager, TssClient};
use bifrost_thorclient::{StartupPolicies, ThorClient};
use bifrost_types::Chain;
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::{probe, Error, Result};
use bifrost_vault_manager::VaultManager;
use futures::future;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// The status server's routes.
///
/// `/metrics` is only served when `metrics` is set.
pub fn build_router(state: Arc<HandlerState>, metrics: bool) -> Router {
    let router = Router::new()
        .route("/ping", get(handle_ping))
        .route("/p2pid", get(handle_p2p_id));
    let router = if metrics {
        router.route("/metrics", get(handle_metrics))
    } else {
        router
    };
    router.with_state(state)
}

/// Binds the status server and serves it until shutdown.
///
/// Binding happens before this returns, so a taken port fails the start.
pub fn build_web_services(
    ctx: &BifrostContext,
    tss: TssClient,
) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
    let config = &ctx.config.metric;
    let state = HandlerState::new(ctx.metrics.clone(), tss, ctx.config.tss.node_id.clone());
    let app = build_router(state, config.enabled)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http());

    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), config.listen_port);
    let server = axum::Server::try_bind(&socket_addr)?.serve(app.into_make_service());
    let addr = server.local_addr();
    let mut shutdown = ctx.shutdown_signal();
    let handle = tokio::spawn(async move {
        server
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;
        Ok(())
    });
    tracing::info!("Starting the status server on {}", addr);
    Ok((addr, handle))
}

/// A client for every enabled chain.
pub fn build_chain_clients(
    ctx: &BifrostContext,
    selector: &KeySignerSelector,
    vaults: Arc<dyn VaultLookup>,
) -> Result<Vec<Arc<dyn ChainClient>>> {
    ctx.config
        .enabled_chains()
        .map(|chain| {
            let client: Arc<dyn ChainClient> = match chain {
                Chain::Binance => Arc::new(BinanceClient::from_context(
                    ctx,
                    selector.clone(),
                    vaults.clone(),
                )?),
                Chain::Bitcoin => Arc::new(BitcoinClient::from_context(
                    ctx,
                    selector.clone(),
                    vaults.clone(),
                )?),
                Chain::Ethereum => Arc::new(EthereumClient::from_context(
                    ctx,
                    selector.clone(),
                    vaults.clone(),
                )?),
                Chain::Thor => return Err(Error::UnsupportedChain(chain.to_string())),
            };
            Ok(client)
        })
        .collect()
}

/// Where scanning of `client`'s chain resumes.
///
/// The configured start height wins, then the block after the last one the
/// network witnessed, then the chain's tip.
pub async fn start_height(
    ctx: &BifrostContext,
    thor: &ThorClient,
    client: &dyn ChainClient,
) -> Result<i64> {
    let chain = client.chain();
    let configured = ctx
        .config
        .chain(chain)
        .and_then(|c| c.block_scanner.start_block_height);
    if let Some(height) = configured {
        return Ok(height);
    }
    let observed = thor.last_observed_in(chain).await?;
    if observed > 0 {
        return Ok(observed + 1);
    }
    client.latest_height().await
}

/// Every running component of Bifrost.
pub struct Bifrost {
    ctx: BifrostContext,
    server: Option<JoinHandle<Result<()>>>,
    // ThorClient and vault refresh tasks; any of them exiting is fatal.
    critical: Vec<JoinHandle<Result<()>>>,
    clients: Vec<Arc<dyn ChainClient>>,
    observer: Arc<Observer>,
    signer: Arc<Signer>,
}

impl std::fmt::Debug for Bifrost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bifrost")
            .field(
                "chains",
                &self.clients.iter().map(|c| c.chain()).collect::<Vec<_>>(),
            )
            .field("observer", &self.observer)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl Bifrost {
    /// Starts every component, in dependency order.
    ///
    /// Blocks until the node is whitelisted and its keys are known.
    pub async fn ignite(ctx: BifrostContext) -> Result<Self> {
        tracing::trace!(
            network = %ctx.config.network,
            chains = ?ctx.config.enabled_chains().collect::<Vec<_>>(),
            "igniting bifrost",
        );
        let http = RetryHttpClient::new(ctx.http_client()?);
        let tss = TssClient::new(ctx.config.tss.url()?, http);
        let (_, server) = build_web_services(&ctx, tss.clone())?;

        let pub_keys = PubKeyManager::new();
        let thor = ThorClient::from_context(&ctx)?;
        let handles = bifrost_thorclient::start(
            &ctx,
            thor,
            pub_keys.clone(),
            StartupPolicies::default(),
        )
        .await?;
        let mut critical = handles.tasks;

        let vaults = VaultManager::from_context(&ctx, Arc::new(handles.client.clone()));
        critical.push(vaults.start(ctx.shutdown_signal()).await?);

        let selector = KeySignerSelector::builder()
            .local(Arc::new(LocalKeySigner::new(ctx.node_key()?)?))
            .tss(tss)
            .pub_keys(pub_keys)
            .build();
        let clients = build_chain_clients(&ctx, &selector, Arc::new(vaults.clone()))?;
        let observer = Arc::new(Observer::from_context(&ctx, handles.submitter.clone())?);
        for client in &clients {
            let height = start_height(&ctx, &handles.client, client.as_ref()).await?;
            client
                .start(observer.sink(), height, ctx.shutdown_signal())
                .await?;
            tracing::info!(chain = %client.chain(), height, "chain client started");
        }
        observer.start(ctx.shutdown_signal())?;

        let signer = Arc::new(Signer::from_context(
            &ctx,
            clients.clone(),
            vaults,
            &selector,
            handles.submitter,
        )?);
        signer.start(handles.keysign_rx, handles.keygen_rx, ctx.shutdown_signal())?;

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            started = true,
            node = %handles.node_account.node_address,
        );
        Ok(Self {
            ctx,
            server: Some(server),
            critical,
            clients,
            observer,
            signer,
        })
    }

    /// Resolves once a component Bifrost cannot run without has exited,
    /// with the reason.
    pub async fn exited(&mut self) -> Error {
        if self.critical.is_empty() {
            return future::pending().await;
        }
        let (result, index, _) = future::select_all(self.critical.iter_mut()).await;
        self.critical.remove(index);
        match result {
            Ok(Err(e)) => e,
            Ok(Ok(())) => Error::TaskStoppedAbnormally,
            Err(e) => {
                tracing::error!(error = %e, "task panicked");
                Error::TaskStoppedAbnormally
            }
        }
    }

    /// Stops every component in reverse start order, each one fully before
    /// the next.
    pub async fn stop(mut self) -> Result<()> {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            shutdown = true
        );
        let mut result = Ok(());
        let mut keep = |stopped: Result<()>| {
            if let Err(e) = stopped {
                tracing::error!(error = %e, "component did not stop cleanly");
                result = Err(e);
            }
        };
        keep(self.signer.stop().await);
        keep(self.observer.stop().await);
        for client in &self.clients {
            keep(client.stop().await);
        }
        // the rest listens to the process wide signal.
        self.ctx.shutdown();
        for task in self.critical.drain(..).chain(self.server.take()) {
            keep(task.await.unwrap_or(Err(Error::TaskStoppedAbnormally)));
        }
        tracing::info!("Clean Exit ..");
        result
    }
}
