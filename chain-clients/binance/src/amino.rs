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
//! The amino wire format of Binance Chain transfers.
//!
//! Amino structs are protobuf messages behind a 4 byte type prefix. A
//! transaction on the wire is `uvarint(len) ∥ prefix(StdTx) ∥ StdTx`.

use bifrost_types::{canonical_json, Address};
use bifrost_utils::{Error, Result};
use prost::Message;
use serde::Serialize;

/// `auth/StdTx`
pub const STD_TX_PREFIX: [u8; 4] = [0xF0, 0x62, 0x5D, 0xEE];
/// `cosmos-sdk/Send`
pub const SEND_MSG_PREFIX: [u8; 4] = [0x2A, 0x2C, 0x87, 0xFA];
/// `tendermint/PubKeySecp256k1`
pub const PUB_KEY_PREFIX: [u8; 4] = [0xEB, 0x5A, 0xE9, 0x87];

#[derive(Clone, PartialEq, Message)]
pub struct StdTx {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub msgs: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub signatures: Vec<Vec<u8>>,
    #[prost(string, tag = "3")]
    pub memo: String,
    #[prost(int64, tag = "4")]
    pub source: i64,
    #[prost(bytes = "vec", tag = "5")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StdSignature {
    #[prost(bytes = "vec", tag = "1")]
    pub pub_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub account_number: i64,
    #[prost(int64, tag = "4")]
    pub sequence: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SendMsg {
    #[prost(message, repeated, tag = "1")]
    pub inputs: Vec<Transfer>,
    #[prost(message, repeated, tag = "2")]
    pub outputs: Vec<Transfer>,
}

/// One side of a transfer. Inputs and outputs share the layout.
#[derive(Clone, PartialEq, Message)]
pub struct Transfer {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub coins: Vec<Token>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct Token {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(int64, tag = "2")]
    pub amount: i64,
}

/// A decoded transaction: its transfers and memo.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTx {
    pub sends: Vec<SendMsg>,
    pub memo: String,
}

fn with_prefix(prefix: [u8; 4], message: &impl Message) -> Vec<u8> {
    let mut out = prefix.to_vec();
    out.extend(message.encode_to_vec());
    out
}

fn strip_prefix(prefix: [u8; 4], bytes: &[u8]) -> Option<&[u8]> {
    bytes.strip_prefix(&prefix[..])
}

/// Encodes a signed single-send transaction, length prefixed.
pub fn encode_tx(send: &SendMsg, memo: &str, signature: &StdSignature) -> Vec<u8> {
    let tx = StdTx {
        msgs: vec![with_prefix(SEND_MSG_PREFIX, send)],
        signatures: vec![signature.encode_to_vec()],
        memo: memo.to_owned(),
        source: 0,
        data: Vec::new(),
    };
    let body = with_prefix(STD_TX_PREFIX, &tx);
    let mut out = Vec::with_capacity(body.len() + 4);
    prost::encoding::encode_varint(body.len() as u64, &mut out);
    out.extend(body);
    out
}

/// Decodes a transaction as found in a block, with or without its length prefix.
///
/// Messages other than transfers are ignored.
pub fn decode_tx(bytes: &[u8]) -> Result<DecodedTx> {
    let body = match strip_prefix(STD_TX_PREFIX, bytes) {
        Some(body) => body,
        None => {
            let mut rest = bytes;
            let len = prost::encoding::decode_varint(&mut rest)
                .map_err(|e| Error::ChainClient(format!("bad tx length prefix: {e}")))?;
            if len as usize != rest.len() {
                return Err(Error::ChainClient(format!(
                    "tx length prefix {len} does not match {} bytes",
                    rest.len()
                )));
            }
            strip_prefix(STD_TX_PREFIX, rest)
                .ok_or_else(|| Error::ChainClient("not a StdTx".into()))?
        }
    };
    let tx = StdTx::decode(body)
        .map_err(|e| Error::ChainClient(format!("bad StdTx: {e}")))?;
    let sends = tx
        .msgs
        .iter()
        .filter_map(|msg| strip_prefix(SEND_MSG_PREFIX, msg))
        .map(|msg| {
            SendMsg::decode(msg).map_err(|e| Error::ChainClient(format!("bad send msg: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DecodedTx {
        sends,
        memo: tx.memo,
    })
}

/// The amino encoding of a compressed secp256k1 key.
pub fn encode_pub_key(compressed: &[u8; 33]) -> Vec<u8> {
    let mut out = PUB_KEY_PREFIX.to_vec();
    out.push(compressed.len() as u8);
    out.extend_from_slice(compressed);
    out
}

#[derive(Serialize)]
struct JsonToken<'a> {
    denom: &'a str,
    amount: i64,
}

#[derive(Serialize)]
struct JsonTransfer<'a> {
    address: String,
    coins: Vec<JsonToken<'a>>,
}

#[derive(Serialize)]
struct JsonSend<'a> {
    inputs: Vec<JsonTransfer<'a>>,
    outputs: Vec<JsonTransfer<'a>>,
}

#[derive(Serialize)]
struct SignDoc<'a> {
    account_number: String,
    chain_id: &'a str,
    data: Option<()>,
    memo: &'a str,
    msgs: Vec<JsonSend<'a>>,
    sequence: String,
    source: String,
}

fn json_transfers<'a>(side: &'a [Transfer], hrp: &str) -> Result<Vec<JsonTransfer<'a>>> {
    side.iter()
        .map(|t| {
            Ok(JsonTransfer {
                address: Address::from_bech32(hrp, &t.address)?.to_string(),
                coins: t
                    .coins
                    .iter()
                    .map(|c| JsonToken {
                        denom: &c.denom,
                        amount: c.amount,
                    })
                    .collect(),
            })
        })
        .collect()
}

/// The bytes a Binance Chain signature commits to: the sign doc as JSON, keys sorted.
pub fn sign_bytes(
    chain_id: &str,
    account_number: i64,
    sequence: i64,
    memo: &str,
    send: &SendMsg,
    hrp: &str,
) -> Result<Vec<u8>> {
    let doc = SignDoc {
        account_number: account_number.to_string(),
        chain_id,
        data: None,
        memo,
        msgs: vec![JsonSend {
            inputs: json_transfers(&send.inputs, hrp)?,
            outputs: json_transfers(&send.outputs, hrp)?,
        }],
        sequence: sequence.to_string(),
        source: "0".into(),
    };
    canonical_json(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send() -> SendMsg {
        let coins = vec![Token {
            denom: "BNB".into(),
            amount: 100_000,
        }];
        SendMsg {
            inputs: vec![Transfer {
                address: vec![1; 20],
                coins: coins.clone(),
            }],
            outputs: vec![Transfer {
                address: vec![2; 20],
                coins,
            }],
        }
    }

    #[test]
    fn sign_doc_is_sorted_json() {
        let bytes = sign_bytes("Binance-Chain-Nile", 7, 3, "OUT:abc", &send(), "tbnb").unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["account_number"], "7");
        assert_eq!(doc["sequence"], "3");
        assert_eq!(doc["source"], "0");
        assert!(doc["data"].is_null());
        assert_eq!(
            doc["msgs"][0]["inputs"][0]["address"],
            "tbnb1qyqszqgpqyqszqgpqyqszqgpqyqszqgp7zhkvr"
        );
        assert_eq!(doc["msgs"][0]["outputs"][0]["coins"][0]["amount"], 100_000);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"account_number":"7","chain_id":"Binance-Chain-Nile","data":null,"memo":"OUT:abc","msgs":"#));
    }

    #[test]
    fn decodes_with_and_without_length_prefix() {
        let signature = StdSignature {
            pub_key: encode_pub_key(&[2; 33]),
            signature: vec![9; 64],
            account_number: 7,
            sequence: 3,
        };
        let wire = encode_tx(&send(), "memo", &signature);
        let decoded = decode_tx(&wire).unwrap();
        assert_eq!(decoded.memo, "memo");
        assert_eq!(decoded.sends, vec![send()]);

        let mut rest = &wire[..];
        prost::encoding::decode_varint(&mut rest).unwrap();
        assert_eq!(decode_tx(rest).unwrap(), decoded);
    }

    #[test]
    fn rejects_foreign_payloads() {
        assert!(decode_tx(&[0x03, 0x01, 0x02, 0x03]).is_err());
        assert!(decode_tx(b"").is_err());
    }
}
