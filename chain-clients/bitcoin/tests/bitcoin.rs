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
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use backoff::ExponentialBackoff;
use bifrost_chain_bitcoin::{tx, BitcoinClient, BitcoinRpc};
use bifrost_chain_client_traits::{ChainClient, VaultLookup};
use bifrost_context::Shutdown;
use bifrost_signing_backends::{KeySignerSelector, LocalKeySigner, PubKeyManager, TssClient};
use bifrost_types::{Address, Asset, Chain, Coin, Network, PrivateKey, PubKey, RpcUrl, TxOutItem};
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::metric::Metrics;
use bifrost_utils::retry::ExponentialWithMaxRetryCount;
use bifrost_utils::Error;
use bitcoin::Amount;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

const SENDER: &str = "00140101010101010101010101010101010101010101";
const RECIPIENT: &str = "tb1qqyqszqgpqyqszqgpqyqszqgpqyqszqgpw0yxjz";

#[derive(Default)]
struct Node {
    tip: i64,
    blocks: HashMap<i64, Value>,
    unspents: Vec<Value>,
    reject: bool,
    sent: Vec<String>,
    calls: Vec<String>,
    authorized: bool,
}

type Shared = Arc<Mutex<Node>>;

fn reply(result: Value) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "result": result, "error": null, "id": "bifrost" })),
    )
}

fn fail(code: i64, message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "result": null, "error": { "code": code, "message": message }, "id": "bifrost" })),
    )
}

async fn rpc(
    State(node): State<Shared>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut node = node.lock();
    let method = request["method"].as_str().unwrap_or_default().to_owned();
    let params = &request["params"];
    node.calls.push(method.clone());
    node.authorized &= headers.contains_key("authorization");
    match method.as_str() {
        "getblockcount" => reply(json!(node.tip)),
        "getblockhash" => reply(json!(format!("hash{}", params[0]))),
        "getblock" => {
            let height: i64 = params[0].as_str().unwrap()[4..].parse().unwrap();
            match node.blocks.get(&height) {
                Some(block) => reply(block.clone()),
                None => fail(-5, "Block not found"),
            }
        }
        "scantxoutset" => reply(json!({ "success": true, "unspents": node.unspents })),
        "estimatesmartfee" => reply(json!({ "feerate": 0.0002, "blocks": 2 })),
        "sendrawtransaction" if node.reject => fail(-26, "min relay fee not met"),
        "sendrawtransaction" => {
            node.sent.push(params[0].as_str().unwrap().to_owned());
            reply(json!("f00d"))
        }
        _ => fail(-32601, "Method not found"),
    }
}

async fn serve(node: Shared) -> SocketAddr {
    let router = Router::new().route("/", post(rpc)).with_state(node);
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);
    addr
}

struct Vaults(HashMap<Address, PubKey>);

impl VaultLookup for Vaults {
    fn lookup(&self, _: Chain, address: &Address) -> Option<PubKey> {
        self.0.get(address).cloned()
    }

    fn members(&self, _: &PubKey) -> Vec<PubKey> {
        Vec::new()
    }
}

fn key() -> PrivateKey {
    "000000000000000000000000000000000000000000000000000000000000002a"
        .parse()
        .unwrap()
}

fn vault_script_hex() -> String {
    let script = tx::vault_script(&key().pub_key().unwrap()).unwrap();
    hex::encode(script.as_bytes())
}

fn client(addr: SocketAddr) -> BitcoinClient {
    let fast = ExponentialBackoff {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(2),
        max_elapsed_time: None,
        ..Default::default()
    };
    let rpc = BitcoinRpc::new(
        RpcUrl::parse(&addr.to_string()).unwrap(),
        reqwest::Client::new(),
        "bifrost".into(),
        "password".into(),
    )
    .with_policy(ExponentialWithMaxRetryCount::new(fast.clone(), 3));
    let own = key().pub_key().unwrap();
    let vault_address = own.address_on(Chain::Bitcoin, Network::Testnet).unwrap();
    let pub_keys = PubKeyManager::new();
    pub_keys.seed(own.clone(), []);
    let selector = KeySignerSelector::builder()
        .local(Arc::new(LocalKeySigner::new(key()).unwrap()))
        .tss(TssClient::new(
            RpcUrl::parse("127.0.0.1:1").unwrap(),
            RetryHttpClient::new(reqwest::Client::new()),
        ))
        .pub_keys(pub_keys)
        .build();
    BitcoinClient::new(
        rpc,
        Network::Testnet,
        selector,
        Arc::new(Vaults(HashMap::from([(vault_address, own)]))),
        fast,
        Arc::new(Metrics::new().unwrap()),
        5,
    )
}

fn item(amount: u128) -> TxOutItem {
    TxOutItem {
        chain: Chain::Bitcoin,
        to_address: Address::new(RECIPIENT),
        vault_pub_key: key().pub_key().unwrap(),
        coin: Coin::new(Asset::btc(), amount),
        memo: "OUT:7A3F".into(),
        in_hash: "7A3F".into(),
        out_hash: None,
    }
}

fn unspent(byte: char, amount: f64) -> Value {
    json!({
        "txid": byte.to_string().repeat(64),
        "vout": 0,
        "scriptPubKey": vault_script_hex(),
        "amount": amount,
        "height": 100,
    })
}

fn decode(raw: &[u8]) -> bitcoin::Transaction {
    bitcoin::consensus::encode::deserialize(raw).unwrap()
}

#[tokio::test]
#[tracing_test::traced_test]
async fn scans_deposits_with_basic_auth() {
    let node = Shared::default();
    {
        let mut node = node.lock();
        node.tip = 101;
        node.authorized = true;
        node.blocks.insert(
            101,
            json!({
                "hash": "hash101",
                "height": 101,
                "tx": [{
                    "txid": "deposit",
                    "vin": [{ "txid": "aa", "vout": 0, "prevout": { "value": 1.0, "scriptPubKey": { "hex": SENDER } } }],
                    "vout": [
                        { "value": 0.75, "n": 0, "scriptPubKey": { "hex": vault_script_hex() } },
                        { "value": 0.0, "n": 1, "scriptPubKey": { "hex": "6a0c535741503a4254432e425443" } },
                    ],
                }],
            }),
        );
    }
    let addr = serve(node.clone()).await;
    let client = client(addr);

    let (tx, mut rx) = mpsc::channel(4);
    let (_stop, stop_rx) = broadcast::channel(1);
    client.start(tx, 101, Shutdown::new(stop_rx)).await.unwrap();
    let block = rx.recv().await.unwrap();
    client.stop().await.unwrap();

    assert_eq!(block.height, 101);
    assert_eq!(block.hash, "hash101");
    assert_eq!(block.txs.len(), 1);
    let deposit = &block.txs[0];
    assert_eq!(deposit.from.as_str(), RECIPIENT);
    assert_eq!(deposit.coins, vec![Coin::new(Asset::btc(), 75_000_000)]);
    assert_eq!(deposit.gas, vec![Coin::new(Asset::btc(), 25_000_000)]);
    assert_eq!(deposit.memo, "SWAP:BTC.BTC");
    assert!(node.lock().authorized);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn spends_each_output_once() {
    let node = Shared::default();
    node.lock().unspents = vec![unspent('a', 0.01), unspent('b', 0.02)];
    let addr = serve(node.clone()).await;
    let client = client(addr);

    let first = decode(&client.sign(&item(500_000), 7).await.unwrap().unwrap());
    assert_eq!(first.input.len(), 1);
    assert_eq!(first.input[0].previous_output.txid.to_string(), "b".repeat(64));
    assert_eq!(first.output[0].value, Amount::from_sat(500_000));
    assert!(first.output[1].script_pubkey.is_op_return());
    assert_eq!(hex::encode(first.output[2].script_pubkey.as_bytes()), vault_script_hex());
    // 20 sat/vB from estimatesmartfee
    let fee = 2_000_000 - 500_000 - first.output[2].value.to_sat();
    assert_eq!(fee, tx::estimate_vsize(1, &first.output) * 20);

    let second = decode(&client.sign(&item(500_000), 7).await.unwrap().unwrap());
    assert_eq!(second.input[0].previous_output.txid.to_string(), "a".repeat(64));

    let raw = bitcoin::consensus::encode::serialize(&first);
    assert_eq!(client.broadcast(&raw).await.unwrap(), "f00d");
    assert_eq!(node.lock().sent, vec![hex::encode(&raw)]);

    // both outputs are spent now
    let err = client.sign(&item(500_000), 7).await.unwrap_err();
    assert!(matches!(err, Error::ChainClient(_)));
}

#[tokio::test]
async fn failed_broadcast_releases_the_inputs() {
    let node = Shared::default();
    {
        let mut node = node.lock();
        node.unspents = vec![unspent('c', 0.01)];
        node.reject = true;
    }
    let addr = serve(node.clone()).await;
    let client = client(addr);

    let raw = client.sign(&item(100_000), 7).await.unwrap().unwrap();
    let err = client.broadcast(&raw).await.unwrap_err();
    assert!(err.to_string().contains("min relay fee not met"));
    // rpc errors are not retried
    assert_eq!(
        node.lock().calls.iter().filter(|c| *c == "sendrawtransaction").count(),
        1
    );

    let again = decode(&client.sign(&item(100_000), 7).await.unwrap().unwrap());
    assert_eq!(again.input[0].previous_output.txid.to_string(), "c".repeat(64));
}
