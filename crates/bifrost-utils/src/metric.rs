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
use prometheus::core::{AtomicF64, GenericCounter};
use prometheus::{
    opts, register_counter_vec_with_registry, register_counter_with_registry,
    CounterVec, Encoder, Registry, TextEncoder,
};

use crate::ErrorCategory;

/// A struct definition for collecting metrics in Bifrost.
///
/// Every `Metrics` owns its own [`Registry`], so more than one context can
/// live in the same process.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Blocks scanned, per chain.
    pub blocks_scanned: CounterVec,
    /// How many times a chain scanner backed off, per chain.
    pub scanner_back_off: CounterVec,
    /// Transactions observed, per chain and direction (`in` / `out`).
    pub txs_observed: CounterVec,
    /// Witness batches submitted to ThorNode.
    pub witness_submitted: GenericCounter<AtomicF64>,
    /// Keysign items received from ThorNode, per chain.
    pub keysign_received: CounterVec,
    /// Keysign items signed and broadcast, per chain.
    pub keysign_broadcast: CounterVec,
    /// Keysign items that failed, per chain.
    pub keysign_failed: CounterVec,
    /// Keygen ceremonies, per result (`success` / `failure`).
    pub keygen_total: CounterVec,
    /// Vault index refreshes.
    pub vault_refreshes: GenericCounter<AtomicF64>,
    /// Errors, per category.
    pub errors: CounterVec,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("bifrost".into()), None)?;
        let blocks_scanned = register_counter_vec_with_registry!(
            opts!("blocks_scanned", "The total number of blocks scanned"),
            &["chain"],
            registry
        )?;
        let scanner_back_off = register_counter_vec_with_registry!(
            opts!(
                "scanner_back_off",
                "specifies how many times a block scanner backed off"
            ),
            &["chain"],
            registry
        )?;
        let txs_observed = register_counter_vec_with_registry!(
            opts!("txs_observed", "The total number of observed transactions"),
            &["chain", "direction"],
            registry
        )?;
        let witness_submitted = register_counter_with_registry!(
            "witness_submitted",
            "The total number of witness batches submitted to ThorNode",
            registry
        )?;
        let keysign_received = register_counter_vec_with_registry!(
            opts!("keysign_received", "The total number of keysign items received"),
            &["chain"],
            registry
        )?;
        let keysign_broadcast = register_counter_vec_with_registry!(
            opts!(
                "keysign_broadcast",
                "The total number of keysign items signed and broadcast"
            ),
            &["chain"],
            registry
        )?;
        let keysign_failed = register_counter_vec_with_registry!(
            opts!("keysign_failed", "The total number of failed keysign items"),
            &["chain"],
            registry
        )?;
        let keygen_total = register_counter_vec_with_registry!(
            opts!("keygen_total", "The total number of keygen ceremonies"),
            &["result"],
            registry
        )?;
        let vault_refreshes = register_counter_with_registry!(
            "vault_refreshes",
            "specifies how many times the vault index was rebuilt",
            registry
        )?;
        let errors = register_counter_vec_with_registry!(
            opts!("errors", "The total number of errors, per category"),
            &["category"],
            registry
        )?;

        Ok(Self {
            registry,
            blocks_scanned,
            scanner_back_off,
            txs_observed,
            witness_submitted,
            keysign_received,
            keysign_broadcast,
            keysign_failed,
            keygen_total,
            vault_refreshes,
            errors,
        })
    }

    /// Counts an error under its category.
    pub fn record_error(&self, error: &crate::Error) {
        self.errors
            .with_label_values(&[&error.category().to_string()])
            .inc();
    }

    /// How many errors of the given category were recorded so far.
    pub fn error_count(&self, category: ErrorCategory) -> f64 {
        self.errors
            .with_label_values(&[&category.to_string()])
            .get()
    }

    /// Gathers the whole Bifrost metrics in the Prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        // Gather the metrics.
        let metric_families = self.registry.gather();
        // Encode them to send.
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.blocks_scanned.with_label_values(&["BNB"]).inc();
        assert_eq!(a.blocks_scanned.with_label_values(&["BNB"]).get(), 1.0);
        assert_eq!(b.blocks_scanned.with_label_values(&["BNB"]).get(), 0.0);
    }

    #[test]
    fn errors_are_counted_per_category() {
        let m = Metrics::new().unwrap();
        m.record_error(&crate::Error::VaultNotFound("x".into()));
        assert_eq!(m.error_count(ErrorCategory::Consistency), 1.0);
        let text = m.gather_metrics().unwrap();
        assert!(text.contains("bifrost_errors"));
    }
}
