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
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories_next::ProjectDirs;
use structopt::StructOpt;

use crate::{BifrostConfig, PACKAGE_ID};

/// The Bifrost Command-line tool
///
/// Start Bifrost from a config directory:
///
/// $ bifrost -vvv -c <CONFIG_DIR_PATH>
#[derive(StructOpt)]
#[structopt(name = "Bifrost")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: Option<PathBuf>,
}

/// Loads the configuration from the given directory, or the platform's
/// default config directory when none is given.
pub fn load_config<P>(config_dir: Option<P>) -> anyhow::Result<BifrostConfig>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for bifrost");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let v = crate::utils::load(path)?;
    tracing::trace!("Config loaded..");
    Ok(v)
}

/// Sets up the logger for Bifrost, based on the verbosity level passed in.
///
/// The level applies to the `filter` target and to the probes. `RUST_LOG`
/// directives are honoured on top of it.
pub fn setup_logger(verbosity: i32, filter: &str) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in [filter, bifrost_utils::probe::TARGET] {
        env_filter = env_filter.add_directive(format!("{target}={log_level}").parse()?);
    }
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    // if we are not compiling for integration tests, we should use pretty logs
    #[cfg(not(feature = "integration-tests"))]
    let logger = logger.pretty();
    // otherwise, we should use json, which is easy to parse.
    #[cfg(feature = "integration-tests")]
    let logger = logger.json().flatten_event(true).with_current_span(false);

    logger.init();
    Ok(())
}
