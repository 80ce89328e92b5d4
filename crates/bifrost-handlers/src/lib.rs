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
//! Bifrost handlers for the status server: liveness, the TSS peer id and
//! the Prometheus metrics.

#![warn(missing_docs)]

use std::sync::Arc;

use bifrost_signing_backends::TssClient;
use bifrost_utils::metric::Metrics;

/// Module handles the status server API
pub mod routes;

pub use routes::*;

/// What the handlers need to answer.
#[derive(Debug, Clone)]
pub struct HandlerState {
    /// Bifrost's metrics.
    pub metrics: Arc<Metrics>,
    /// The local TSS party, asked for its peer id.
    pub tss: TssClient,
    /// The configured peer id, answered when the party cannot be reached.
    pub node_id: String,
}

impl HandlerState {
    /// Creates the state shared by every handler.
    pub fn new(metrics: Arc<Metrics>, tss: TssClient, node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            metrics,
            tss,
            node_id: node_id.into(),
        })
    }
}
