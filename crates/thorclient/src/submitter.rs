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
use base64::Engine;
use bifrost_context::Shutdown;
use bifrost_types::{
    AminoPubKey, PrivateKey, StdFee, StdSignDoc, StdSignature, StdTx, ThorMsg,
};
use bifrost_utils::{probe, Error, Result};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{AccountInfo, ThorClient};

const SECP256K1_KEY_TYPE: &str = "tendermint/PubKeySecp256k1";

/// Builds a `StdTx` carrying `msgs`, signed by `key` at `account`.
pub fn build_std_tx(
    key: &PrivateKey,
    chain_id: &str,
    account: AccountInfo,
    msgs: Vec<ThorMsg>,
    memo: String,
) -> Result<StdTx> {
    let fee = StdFee::default();
    let doc = StdSignDoc {
        account_number: account.account_number,
        chain_id,
        fee: &fee,
        memo: &memo,
        msgs: &msgs,
        sequence: account.sequence,
    };
    let digest: [u8; 32] = Sha256::digest(doc.to_bytes()?).into();
    let (rs, _) = key.sign_digest(&digest);
    let engine = base64::engine::general_purpose::STANDARD;
    let signature = StdSignature {
        pub_key: AminoPubKey {
            key_type: SECP256K1_KEY_TYPE.into(),
            value: engine.encode(key.public_key().serialize_compressed()),
        },
        signature: engine.encode(rs),
    };
    Ok(StdTx {
        msg: msgs,
        fee,
        signatures: vec![signature],
        memo,
    })
}

#[derive(Debug)]
struct SubmitRequest {
    msgs: Vec<ThorMsg>,
    memo: String,
    reply: oneshot::Sender<Result<String>>,
}

/// A cloneable handle that queues messages on the [`SubmissionWorker`].
#[derive(Debug, Clone)]
pub struct SubmitHandle {
    tx: mpsc::Sender<SubmitRequest>,
    account: watch::Receiver<AccountInfo>,
}

impl SubmitHandle {
    /// Submits one message, waiting for its transaction hash.
    pub async fn submit(&self, msg: ThorMsg) -> Result<String> {
        self.submit_all(vec![msg], String::new()).await
    }

    /// Submits `msgs` in a single transaction, waiting for its hash.
    pub async fn submit_all(&self, msgs: Vec<ThorMsg>, memo: String) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SubmitRequest { msgs, memo, reply })
            .await
            .map_err(|_| Error::ChannelClosed("submission worker"))?;
        rx.await
            .map_err(|_| Error::ChannelClosed("submission reply"))?
    }

    /// The account number and sequence the next transaction will use.
    pub fn account(&self) -> AccountInfo {
        *self.account.borrow()
    }
}

/// Owns the node account and serializes every submission to ThorNode.
///
/// The sequence only moves forward on an accepted transaction. On a sequence
/// mismatch the account is fetched again and the transaction is retried once.
#[derive(Debug)]
pub struct SubmissionWorker {
    client: ThorClient,
    key: PrivateKey,
    chain_id: String,
    account: watch::Sender<AccountInfo>,
    rx: mpsc::Receiver<SubmitRequest>,
}

impl SubmissionWorker {
    /// Creates the worker and a handle to it.
    pub fn new(
        client: ThorClient,
        key: PrivateKey,
        chain_id: impl Into<String>,
        account: AccountInfo,
        capacity: usize,
    ) -> (Self, SubmitHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (account_tx, account_rx) = watch::channel(account);
        let worker = Self {
            client,
            key,
            chain_id: chain_id.into(),
            account: account_tx,
            rx,
        };
        let handle = SubmitHandle {
            tx,
            account: account_rx,
        };
        (worker, handle)
    }

    /// Processes queued submissions until shutdown, or until every handle is dropped.
    #[tracing::instrument(skip_all, fields(node = %self.client.node_address()))]
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        loop {
            let request = tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                _ = shutdown.recv() => break,
            };
            let result = self.submit(request.msgs, request.memo).await;
            // the caller may have given up waiting.
            let _ = request.reply.send(result);
        }
        tracing::debug!("submission worker stopped");
        Ok(())
    }

    async fn submit(&mut self, msgs: Vec<ThorMsg>, memo: String) -> Result<String> {
        let kinds: Vec<&'static str> = msgs.iter().map(ThorMsg::kind).collect();
        let account = *self.account.borrow();
        let result = match self.send(&msgs, &memo, account).await {
            Err(Error::SequenceMismatch(log)) => {
                tracing::warn!(
                    sequence = account.sequence,
                    %log,
                    "sequence mismatch, refreshing the account",
                );
                let account = self.client.get_account().await?;
                self.account.send_replace(account);
                self.send(&msgs, &memo, account).await
            }
            other => other,
        };
        match &result {
            Ok(hash) => {
                self.account.send_modify(|a| a.sequence += 1);
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Submission,
                    msgs = ?kinds,
                    tx_hash = %hash,
                    sequence = self.account.borrow().sequence,
                );
            }
            Err(e) => {
                tracing::error!(msgs = ?kinds, error = %e, "submission failed");
            }
        }
        result
    }

    async fn send(
        &self,
        msgs: &[ThorMsg],
        memo: &str,
        account: AccountInfo,
    ) -> Result<String> {
        let tx = build_std_tx(
            &self.key,
            &self.chain_id,
            account,
            msgs.to_vec(),
            memo.to_owned(),
        )?;
        self.client.broadcast(&tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bifrost_types::{Address, MsgSetIPAddress};
    use bifrost_signing_backends::Signature;

    fn key() -> PrivateKey {
        "0x0101010101010101010101010101010101010101010101010101010101010101"
            .parse()
            .unwrap()
    }

    #[test]
    fn std_tx_signature_verifies_against_the_sign_doc() {
        let key = key();
        let msg = ThorMsg::SetIpAddress(MsgSetIPAddress {
            ip_address: "1.2.3.4".into(),
            signer: Address::new("thor1node"),
        });
        let account = AccountInfo {
            account_number: 7,
            sequence: 3,
        };
        let tx = build_std_tx(&key, "thorchain", account, vec![msg], String::new())
            .unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(tx.signatures[0].pub_key.key_type, SECP256K1_KEY_TYPE);

        let doc = StdSignDoc {
            account_number: 7,
            chain_id: "thorchain",
            fee: &tx.fee,
            memo: &tx.memo,
            msgs: &tx.msg,
            sequence: 3,
        };
        let digest: [u8; 32] = Sha256::digest(doc.to_bytes().unwrap()).into();
        let engine = base64::engine::general_purpose::STANDARD;
        let raw = engine.decode(&tx.signatures[0].signature).unwrap();
        let mut rs = [0u8; 64];
        rs.copy_from_slice(&raw);
        let verified = [0u8, 1].into_iter().any(|recid| {
            Signature::normalized(rs, recid)
                .and_then(|s| s.recover(&digest))
                .map(|pk| pk == key.public_key())
                .unwrap_or(false)
        });
        assert!(verified);
    }
}
