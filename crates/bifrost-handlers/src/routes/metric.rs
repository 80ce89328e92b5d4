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
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use bifrost_utils::HandlerError;

use crate::HandlerState;

/// The content type of the Prometheus text format.
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4";

/// Handles metric requests
///
/// Returns every registered counter in the Prometheus text format.
pub async fn handle_metrics(
    State(state): State<Arc<HandlerState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let gathered = state.metrics.gather_metrics().map_err(|e| {
        tracing::error!(error = %e, "failed to gather metrics");
        HandlerError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_TEXT)], gathered))
}
