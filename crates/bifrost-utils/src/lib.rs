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
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Bifrost Utils 🌈
//!
//! The error type, retry policies, probes and metrics shared by every
//! Bifrost crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// JSON over HTTP with retries
pub mod http;
/// Metrics functionality
pub mod metric;
/// A module used for debugging Bifrost lifecycle, sync state, or other internal state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the execution of Bifrost.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// HTTP server error.
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// HTTP client error.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Secp256k1 error occurred.
    #[error(transparent)]
    Secp256k1(#[from] libsecp256k1::Error),
    /// Bech32 encoding error.
    #[error(transparent)]
    Bech32(#[from] bech32::Error),
    /// Hex decoding error.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Base64 decoding error.
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Prometheus registry error.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// A non-success HTTP response.
    #[error("http request failed with status {status}: {body}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The response body, as text.
        body: String,
    },
    /// The node is not (or no longer) whitelisted on ThorNode.
    #[error("node account is not whitelisted (status: {status})")]
    NotWhitelisted {
        /// The status ThorNode reported for this node.
        status: String,
    },
    /// ThorNode rejected a transaction because of a stale account sequence.
    #[error("account sequence mismatch: {}", _0)]
    SequenceMismatch(String),
    /// ThorNode accepted the request but rejected the transaction.
    #[error("transaction rejected (code {code}): {log}")]
    TxRejected {
        /// The ABCI code.
        code: u32,
        /// The raw log explaining the rejection.
        log: String,
    },
    /// A threshold signing or key generation ceremony failed.
    #[error("tss failure: {reason} (blame: {blame:?})")]
    Tss {
        /// Why the ceremony failed.
        reason: String,
        /// The members blamed for the failure.
        blame: Vec<String>,
    },
    /// Invalid public key.
    #[error("Invalid pubkey: {}", _0)]
    InvalidPubKey(String),
    /// Invalid chain address.
    #[error("Invalid address: {}", _0)]
    InvalidAddress(String),
    /// Invalid asset string.
    #[error("Invalid asset: {}", _0)]
    InvalidAsset(String),
    /// Invalid or unsupported chain.
    #[error("Unsupported chain: {}", _0)]
    UnsupportedChain(String),
    /// A block could not be decoded.
    #[error("Malformed block at height {height}: {reason}")]
    MalformedBlock {
        /// The height of the block.
        height: i64,
        /// What went wrong.
        reason: String,
    },
    /// The block at the requested height is not produced yet.
    #[error("Block {height} is not available yet (tip: {tip})")]
    BlockNotAvailable {
        /// The requested height.
        height: i64,
        /// The current tip of the chain.
        tip: i64,
    },
    /// A chain client rejected or failed to relay a transaction.
    #[error("chain client error: {}", _0)]
    ChainClient(String),
    /// The vault is not known to the vault manager.
    #[error("Vault not found: {}", _0)]
    VaultNotFound(String),
    /// Chain not configured or not enabled.
    #[error("Chain Not Found: {}", chain)]
    ChainNotFound {
        /// The chain name.
        chain: String,
    },
    /// Missing Secrets in the config, either private key, password, ...etc.
    #[error("Missing required signer key in the config")]
    MissingSecrets,
    /// An operation did not complete in time.
    #[error("Timed out: {}", _0)]
    Timeout(&'static str),
    /// Failed to send into a channel, the receiver is gone.
    #[error("channel closed: {}", _0)]
    ChannelClosed(&'static str),
    /// a background task failed and force restarted.
    #[error("Task Force Restarted from an error")]
    ForceRestart,
    /// a background task failed and stopped Abnormally.
    #[error("Task Stopped Abnormally")]
    TaskStoppedAbnormally,
}

/// The error categories used to label error metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ErrorCategory {
    /// DNS failures, 5xx, connection resets.
    #[display(fmt = "network")]
    Network,
    /// Unparseable blocks, addresses, assets.
    #[display(fmt = "malformed")]
    Malformed,
    /// Node not whitelisted.
    #[display(fmt = "authorization")]
    Authorization,
    /// TSS or local signing failures.
    #[display(fmt = "signing")]
    Signing,
    /// Rejected consensus transactions.
    #[display(fmt = "submission")]
    Submission,
    /// Vault lookups that missed.
    #[display(fmt = "consistency")]
    Consistency,
    /// Everything else.
    #[display(fmt = "internal")]
    Internal,
}

impl Error {
    /// Returns `true` if retrying the same operation could succeed.
    ///
    /// A 4xx response is never retried, 5xx and network errors are.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Http { status, .. } => *status >= 500,
            Error::Reqwest(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().map_or(true, |s| s.is_server_error())
            }
            Error::Io(_)
            | Error::Hyper(_)
            | Error::EthersProvider(_)
            | Error::Timeout(_)
            | Error::BlockNotAvailable { .. }
            | Error::ForceRestart => true,
            _ => false,
        }
    }

    /// The category of this error, used as a metrics label.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_)
            | Error::Hyper(_)
            | Error::Reqwest(_)
            | Error::EthersProvider(_)
            | Error::Http { .. }
            | Error::Timeout(_)
            | Error::BlockNotAvailable { .. } => ErrorCategory::Network,
            Error::Json(_)
            | Error::Hex(_)
            | Error::Base64(_)
            | Error::Bech32(_)
            | Error::InvalidPubKey(_)
            | Error::InvalidAddress(_)
            | Error::InvalidAsset(_)
            | Error::UnsupportedChain(_)
            | Error::MalformedBlock { .. } => ErrorCategory::Malformed,
            Error::NotWhitelisted { .. } => ErrorCategory::Authorization,
            Error::Tss { .. } | Error::Secp256k1(_) | Error::MissingSecrets => {
                ErrorCategory::Signing
            }
            Error::SequenceMismatch(_)
            | Error::TxRejected { .. }
            | Error::ChainClient(_) => ErrorCategory::Submission,
            Error::VaultNotFound(_) => ErrorCategory::Consistency,
            _ => ErrorCategory::Internal,
        }
    }
}

/// A type alias for the result for Bifrost, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        HandlerError(StatusCode::INTERNAL_SERVER_ERROR, value.to_string())
    }
}

/// Error type for HTTP handlers
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retried() {
        let e = Error::Http {
            status: 404,
            body: "not found".into(),
        };
        assert!(!e.is_retriable());
        assert_eq!(e.category(), ErrorCategory::Network);
        let e = Error::Http {
            status: 503,
            body: "unavailable".into(),
        };
        assert!(e.is_retriable());
    }

    #[test]
    fn authorization_errors_are_fatal() {
        let e = Error::NotWhitelisted {
            status: "disabled".into(),
        };
        assert!(!e.is_retriable());
        assert_eq!(e.category(), ErrorCategory::Authorization);
        assert!(e.to_string().contains("not whitelisted"));
    }
}
