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
use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "bifrost_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of Bifrost changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Scanner sync state on a specific chain.
    #[display(fmt = "sync")]
    Sync,
    /// Vault index refreshes.
    #[display(fmt = "vault_manager")]
    VaultManager,
    /// Outbound keysign work.
    #[display(fmt = "keysign")]
    Keysign,
    /// Keygen ceremonies.
    #[display(fmt = "keygen")]
    Keygen,
    /// Witnessing observed transactions to ThorNode.
    #[display(fmt = "witness")]
    Witness,
    /// Consensus-layer transaction submission.
    #[display(fmt = "submission")]
    Submission,
    /// When Bifrost will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
