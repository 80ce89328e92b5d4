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
use bifrost_types::RpcUrl;
use serde::Deserialize;

use crate::defaults;

/// TssConfig points at the local TSS party.
#[derive(Debug, Clone, Deserialize)]
pub struct TssConfig {
    /// `http` or `https`.
    #[serde(default = "defaults::tss_scheme")]
    pub scheme: String,
    /// The host of the TSS party.
    #[serde(default = "defaults::tss_host")]
    pub host: String,
    /// The port of the TSS party.
    #[serde(default = "defaults::tss_port")]
    pub port: u16,
    /// The local peer id, reported by `/p2pid` when the party cannot be reached.
    #[serde(default)]
    pub node_id: String,
}

impl Default for TssConfig {
    fn default() -> Self {
        Self {
            scheme: defaults::tss_scheme(),
            host: defaults::tss_host(),
            port: defaults::tss_port(),
            node_id: String::new(),
        }
    }
}

impl TssConfig {
    /// The base URL of the TSS party.
    pub fn url(&self) -> bifrost_utils::Result<RpcUrl> {
        let url =
            RpcUrl::parse(&format!("{}://{}:{}", self.scheme, self.host, self.port))?;
        Ok(url)
    }
}
