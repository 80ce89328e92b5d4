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
//! Bifrost Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use bifrost::Bifrost;
use bifrost_config::cli::{load_config, setup_logger, Opts};
use bifrost_context::BifrostContext;
use tokio::signal::unix;

/// How long the components get to wind down once asked to.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The main entry point for Bifrost.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, "bifrost")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }
    println!("bifrost v{}", env!("CARGO_PKG_VERSION"));
    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;
    let ctx = BifrostContext::new(config)?;

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;

    // ignition waits on ThorNode, so it has to give way to a signal too.
    let mut bifrost = tokio::select! {
        bifrost = Bifrost::ignite(ctx.clone()) => bifrost?,
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) before startup completed");
            ctx.shutdown();
            return Ok(());
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal before startup completed");
            ctx.shutdown();
            return Ok(());
        },
    };
    tracing::info!("Bifrost is running");

    let fatal = tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            None
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            None
        },
        e = bifrost.exited() => {
            tracing::error!(error = %e, "a critical task exited");
            Some(e)
        },
    };

    tracing::warn!("Shutting down...");
    match tokio::time::timeout(SHUTDOWN_GRACE, bifrost.stop()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "shutdown was not clean"),
        Err(_) => tracing::error!("components did not stop within {:?}", SHUTDOWN_GRACE),
    }
    match fatal {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
