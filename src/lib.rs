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

//! # Bifrost 🌈
//!
//! Bifrost is the bridge between ThorChain and the chains it holds funds
//! on. Every ThorNode runs one next to it.
//!
//! ## Overview
//!
//! Bifrost does two things for its ThorNode:
//!
//!   1. Witnessing: every enabled chain is scanned block by block for
//!      transactions sent to or from a vault, and those are reported to
//!      ThorNode as `MsgObservedTxIn` / `MsgObservedTxOut`.
//!   2. Signing: ThorNode schedules outbound transactions and keygen
//!      ceremonies. Bifrost builds the chain-native transactions, signs them
//!      with the node key or through the TSS party, and broadcasts them.
//!
//! The [`service`] module wires the components together and owns their
//! lifecycle.

/// Startup, wiring and shutdown of every component.
pub mod service;

pub use service::Bifrost;
