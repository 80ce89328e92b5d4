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

use axum::extract::State;
use axum::http::StatusCode;
use bifrost_utils::HandlerError;

use crate::HandlerState;

/// Handles liveness probes.
pub async fn handle_ping() -> StatusCode {
    StatusCode::OK
}

/// Handles peer id requests
///
/// Returns the peer id of the local TSS party as plain text, falling back
/// to the configured one when the party cannot be reached.
pub async fn handle_p2p_id(
    State(state): State<Arc<HandlerState>>,
) -> Result<String, HandlerError> {
    match state.tss.p2p_id().await {
        Ok(id) => Ok(id),
        Err(e) if !state.node_id.is_empty() => {
            tracing::debug!(error = %e, "answering the configured peer id");
            Ok(state.node_id.clone())
        }
        Err(e) => {
            tracing::warn!(error = %e, "tss party did not report its peer id");
            Err(HandlerError(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}
