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

//! # Bifrost Types 🌈
//!
//! The domain model shared by the observer and the signer: chains,
//! assets, addresses, vault keys, the work items exchanged with ThorNode
//! and the messages sent back to it.

mod address;
mod asset;
mod chain;
/// Consensus-layer messages.
pub mod msgs;
mod private_key;
mod pubkey;
mod rpc_url;
/// Serde adapters for ThorNode's numeric encodings.
pub mod serde_helpers;
mod tx;
mod vault;

pub use address::Address;
pub use asset::{Asset, Coin};
pub use chain::{Chain, Network, SigningAlgo};
pub use msgs::*;
pub use private_key::{PrivateKey, Secret};
pub use pubkey::{hash160, PubKey, PubKeySet, PUBKEY_HRP};
pub use rpc_url::RpcUrl;
pub use tx::*;
pub use vault::{RawVaults, Vault, VaultStatus, VaultType};
