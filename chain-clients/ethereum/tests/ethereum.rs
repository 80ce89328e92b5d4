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
use axum::routing::post;
use axum::{Json, Router};
use backoff::ExponentialBackoff;
use bifrost_chain_client_traits::{ChainClient, VaultLookup};
use bifrost_chain_ethereum::{intrinsic_gas, EthereumClient};
use bifrost_context::Shutdown;
use bifrost_signing_backends::{KeySignerSelector, LocalKeySigner, PubKeyManager, TssClient};
use bifrost_types::{Address, Asset, Chain, Coin, Network, PrivateKey, PubKey, RpcUrl, TxOutItem};
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::metric::Metrics;
use bifrost_utils::Error;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, Transaction, H160, H256, U256};
use ethers::utils::rlp::Rlp;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

const CHAIN_ID: u64 = 5;
const RECIPIENT: &str = "0x0101010101010101010101010101010101010101";

#[derive(Default)]
struct Node {
    tip: u64,
    blocks: HashMap<u64, Value>,
    nonce: u64,
    reject: bool,
    sent: Vec<String>,
    calls: Vec<String>,
}

type Shared = Arc<Mutex<Node>>;

async fn rpc(State(node): State<Shared>, Json(request): Json<Value>) -> Json<Value> {
    let mut node = node.lock();
    let method = request["method"].as_str().unwrap_or_default().to_owned();
    let params = &request["params"];
    node.calls.push(method.clone());
    let result = match method.as_str() {
        "eth_blockNumber" => json!(format!("{:#x}", node.tip)),
        "eth_chainId" => json!(format!("{CHAIN_ID:#x}")),
        "eth_gasPrice" => json!("0x3b9aca00"),
        "eth_getTransactionCount" => {
            assert_eq!(params[1], "pending");
            json!(format!("{:#x}", node.nonce))
        }
        "eth_getBlockByNumber" => {
            let height =
                u64::from_str_radix(params[0].as_str().unwrap().trim_start_matches("0x"), 16)
                    .unwrap();
            node.blocks.get(&height).cloned().unwrap_or(Value::Null)
        }
        "eth_sendRawTransaction" if node.reject => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32000, "message": "nonce too low" },
            }))
        }
        "eth_sendRawTransaction" => {
            node.sent.push(params[0].as_str().unwrap().to_owned());
            json!(format!("0x{}", "ab".repeat(32)))
        }
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32601, "message": "method not found" },
            }))
        }
    };
    Json(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
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

fn vault_address() -> Address {
    key()
        .pub_key()
        .unwrap()
        .address_on(Chain::Ethereum, Network::Testnet)
        .unwrap()
}

fn vault_h160() -> H160 {
    vault_address().as_str().parse().unwrap()
}

fn client(addr: SocketAddr, chain_id: Option<u64>) -> EthereumClient {
    let fast = ExponentialBackoff {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(2),
        max_elapsed_time: None,
        ..Default::default()
    };
    let provider = Provider::<Http>::try_from(format!("http://{addr}").as_str())
        .unwrap()
        .interval(Duration::from_millis(5u64));
    let own = key().pub_key().unwrap();
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
    EthereumClient::new(
        provider,
        Network::Testnet,
        selector,
        Arc::new(Vaults(HashMap::from([(vault_address(), own)]))),
        fast,
        Arc::new(Metrics::new().unwrap()),
        chain_id,
    )
}

fn item(vault_pub_key: PubKey, amount: u128) -> TxOutItem {
    TxOutItem {
        chain: Chain::Ethereum,
        to_address: Address::new(RECIPIENT),
        vault_pub_key,
        coin: Coin::new(Asset::eth(), amount),
        memo: "OUT:7A3F".into(),
        in_hash: "7A3F".into(),
        out_hash: None,
    }
}

fn decode(raw: &[u8]) -> (TypedTransaction, ethers::types::Signature) {
    TypedTransaction::decode_signed(&Rlp::new(raw)).unwrap()
}

#[tokio::test]
#[tracing_test::traced_test]
async fn scans_ether_sent_to_vaults() {
    let node = Shared::default();
    {
        let mut node = node.lock();
        node.tip = 11;
        let deposit = Transaction {
            hash: H256::repeat_byte(0x01),
            from: H160::repeat_byte(0x22),
            to: Some(vault_h160()),
            value: U256::exp10(18),
            gas: 21_000.into(),
            gas_price: Some(1_000_000_000u64.into()),
            input: Bytes::from(b"SWAP:ETH.ETH".to_vec()),
            ..Default::default()
        };
        let block = ethers::types::Block::<Transaction> {
            hash: Some(H256::repeat_byte(0xbb)),
            number: Some(11u64.into()),
            transactions: vec![deposit],
            ..Default::default()
        };
        node.blocks.insert(11, serde_json::to_value(block).unwrap());
    }
    let addr = serve(node.clone()).await;
    let client = client(addr, Some(CHAIN_ID));
    assert_eq!(client.latest_height().await.unwrap(), 11);

    let (tx, mut rx) = mpsc::channel(4);
    let (_stop, stop_rx) = broadcast::channel(1);
    client.start(tx, 11, Shutdown::new(stop_rx)).await.unwrap();
    let block = rx.recv().await.unwrap();
    client.stop().await.unwrap();

    assert_eq!(block.height, 11);
    assert_eq!(block.hash, format!("0x{}", "bb".repeat(32)));
    assert_eq!(block.txs.len(), 1);
    let deposit = &block.txs[0];
    assert_eq!(deposit.to, vault_address());
    assert_eq!(deposit.from.as_str(), format!("0x{}", "22".repeat(20)));
    assert_eq!(
        deposit.coins,
        vec![Coin::new(Asset::eth(), 1_000_000_000_000_000_000)]
    );
    assert_eq!(deposit.memo, "SWAP:ETH.ETH");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn signs_transfers_with_increasing_nonces() {
    let node = Shared::default();
    node.lock().nonce = 7;
    let addr = serve(node.clone()).await;
    // chain id comes from the node
    let client = client(addr, None);
    let vault = key().pub_key().unwrap();

    let first = client.sign(&item(vault.clone(), 5_000), 3).await.unwrap().unwrap();
    let (tx, signature) = decode(&first);
    assert_eq!(tx.nonce(), Some(&U256::from(7)));
    assert_eq!(tx.to_addr(), Some(&RECIPIENT.parse::<H160>().unwrap()));
    assert_eq!(tx.value(), Some(&U256::from(5_000)));
    assert_eq!(tx.data().unwrap().as_ref(), b"OUT:7A3F");
    assert_eq!(tx.gas(), Some(&U256::from(intrinsic_gas(b"OUT:7A3F"))));
    assert_eq!(tx.gas_price(), Some(U256::from(1_000_000_000u64)));
    assert!(signature.v == CHAIN_ID * 2 + 35 || signature.v == CHAIN_ID * 2 + 36);
    assert_eq!(signature.recover(tx.sighash()).unwrap(), vault_h160());

    let second = client.sign(&item(vault, 5_000), 3).await.unwrap().unwrap();
    let (tx, _) = decode(&second);
    assert_eq!(tx.nonce(), Some(&U256::from(8)));
    let chain_id_calls = node.lock().calls.iter().filter(|c| *c == "eth_chainId").count();
    assert_eq!(chain_id_calls, 1);

    let hash = client.broadcast(&first).await.unwrap();
    assert_eq!(hash, format!("0x{}", "ab".repeat(32)));
    assert_eq!(node.lock().sent, vec![format!("0x{}", hex::encode(&first))]);
}

#[tokio::test]
async fn rejected_broadcast_resets_the_nonce() {
    let node = Shared::default();
    node.lock().nonce = 3;
    let addr = serve(node.clone()).await;
    let client = client(addr, Some(CHAIN_ID));
    let vault = key().pub_key().unwrap();

    let raw = client.sign(&item(vault.clone(), 1), 3).await.unwrap().unwrap();
    node.lock().reject = true;
    let err = client.broadcast(&raw).await.unwrap_err();
    assert!(matches!(err, Error::EthersProvider(_)));

    let again = client.sign(&item(vault, 1), 3).await.unwrap().unwrap();
    assert_eq!(decode(&again).0.nonce(), Some(&U256::from(3)));
}

#[tokio::test]
async fn skips_vaults_it_does_not_sign_for() {
    let node = Shared::default();
    let addr = serve(node.clone()).await;
    let client = client(addr, Some(CHAIN_ID));
    let other: PrivateKey = "000000000000000000000000000000000000000000000000000000000000002b"
        .parse()
        .unwrap();

    let signed = client.sign(&item(other.pub_key().unwrap(), 1), 3).await.unwrap();
    assert!(signed.is_none());
    assert!(node.lock().calls.is_empty());
}

#[tokio::test]
async fn refuses_tokens() {
    let node = Shared::default();
    let addr = serve(node).await;
    let client = client(addr, Some(CHAIN_ID));
    let mut item = item(key().pub_key().unwrap(), 1);
    item.coin = Coin::new(Asset::new(Chain::Ethereum, "USDT-0XDAC17F958D2EE523A2206206994597C13D831EC7"), 1);

    let err = client.sign(&item, 3).await.unwrap_err();
    assert!(matches!(err, Error::InvalidAsset(_)));
}
