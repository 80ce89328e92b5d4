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
use std::path::PathBuf;

use bifrost_types::{PrivateKey, RpcUrl, Secret};
use serde::Deserialize;

use crate::defaults;

/// ThorchainConfig is the configuration for talking to ThorNode.
#[derive(Debug, Clone, Deserialize)]
pub struct ThorchainConfig {
    /// The consensus chain id, signed into every transaction.
    pub chain_id: String,
    /// ThorNode's REST endpoint.
    pub chain_host: RpcUrl,
    /// Where the node key file lives.
    #[serde(default)]
    pub chain_home_folder: PathBuf,
    /// Name of the node key; the key is read from `{chain_home_folder}/{signer_name}.key`.
    #[serde(default = "defaults::signer_name")]
    pub signer_name: String,
    /// Accepted for compatibility with keyring based deployments; not used.
    #[serde(default)]
    pub signer_passwd: Secret,
    /// The node key as hex (or `$ENV_VAR`). Takes precedence over the key file.
    #[serde(default)]
    pub signer_key: Option<PrivateKey>,
    /// Register missing node keys and IP address with ThorNode on start.
    #[serde(default)]
    pub register_node: bool,
    /// The public IP address to register.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// The validator consensus pubkey to register.
    #[serde(default)]
    pub validator_cons_pub_key: Option<String>,
    /// HTTP request timeout, in milliseconds.
    #[serde(default = "defaults::http_timeout")]
    pub http_timeout: u64,
}

impl ThorchainConfig {
    /// The path of the node key file.
    pub fn key_file(&self) -> PathBuf {
        self.chain_home_folder.join(format!("{}.key", self.signer_name))
    }
}
