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
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, File};

use crate::BifrostConfig;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> bifrost_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(bifrost_utils::Error::from))
        .collect()
}

/// Try to parse the [`BifrostConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> bifrost_utils::Result<BifrostConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of BIFROST).
    let builder = builder.add_source(
        config::Environment::with_prefix("BIFROST")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        BifrostConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// Returns `Ok(BifrostConfig)` on success, or an error on failure.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(path: P) -> bifrost_utils::Result<BifrostConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: BifrostConfig,
) -> bifrost_utils::Result<BifrostConfig> {
    tracing::trace!("Checking configration sanity ...");

    // only keep the enabled chains.
    config.chains.retain(|c| c.enabled);

    let mut seen = HashSet::new();
    for chain in &config.chains {
        if chain.name == bifrost_types::Chain::Thor {
            return Err(bifrost_utils::Error::UnsupportedChain(
                "THOR is not an external chain".into(),
            ));
        }
        if !seen.insert(chain.name) {
            return Err(bifrost_utils::Error::UnsupportedChain(format!(
                "{} is configured more than once",
                chain.name
            )));
        }
    }
    if config.chains.is_empty() {
        return Err(bifrost_utils::Error::Generic(
            "at least one chain must be enabled",
        ));
    }
    if config.thorchain.chain_id.is_empty() {
        return Err(bifrost_utils::Error::Generic(
            "thorchain.chain_id must be set",
        ));
    }
    if config.tx_signer.worker_count == 0 {
        tracing::warn!("tx_signer.worker_count is 0, using 1");
        config.tx_signer.worker_count = 1;
    }

    tracing::trace!("postloaded config: {:?}", config);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> serde_json::Value {
        serde_json::json!({
            "thorchain": { "chain_id": "thorchain", "chain_host": "localhost:1317" },
            "chains": [
                { "name": "bnb", "chain_host": "localhost:26657" },
                { "name": "BTC", "chain_host": "localhost:18443", "enabled": false }
            ]
        })
    }

    #[test]
    fn drops_disabled_chains() {
        let config: BifrostConfig = serde_json::from_value(base()).unwrap();
        let config = postloading_process(config).unwrap();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].name, bifrost_types::Chain::Binance);
    }

    #[test]
    fn rejects_duplicated_and_empty_chain_lists() {
        let mut value = base();
        value["chains"][1]["name"] = "BNB".into();
        value["chains"][1]["enabled"] = true.into();
        let config: BifrostConfig = serde_json::from_value(value).unwrap();
        assert!(postloading_process(config).is_err());

        let mut value = base();
        value["chains"] = serde_json::json!([]);
        let config: BifrostConfig = serde_json::from_value(value).unwrap();
        assert!(postloading_process(config).is_err());
    }
}
