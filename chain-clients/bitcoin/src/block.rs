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
use bifrost_chain_client_traits::{BlockSource, VaultLookup};
use bifrost_types::{Address, Asset, Block, Chain, Coin, Network, PubKey, TxIn};
use bifrost_utils::{Error, Result};
use bitcoin::script::Instruction;
use bitcoin::{Amount, Script, ScriptBuf};

use crate::rpc::{BitcoinRpc, PrevOut, VerboseBlock, VerboseTx};

/// The `bitcoin` crate's network for `network`.
pub fn btc_network(network: Network) -> bitcoin::Network {
    match network {
        Network::Mainnet => bitcoin::Network::Bitcoin,
        Network::Testnet => bitcoin::Network::Testnet,
        Network::Mock => bitcoin::Network::Regtest,
    }
}

/// Satoshis from a bitcoind BTC amount.
pub fn sats(btc: f64) -> Result<u64> {
    Amount::from_btc(btc)
        .map(|a| a.to_sat())
        .map_err(|e| Error::ChainClient(format!("bad amount {btc}: {e}")))
}

pub(crate) fn script(hex_script: &str) -> Result<ScriptBuf> {
    Ok(ScriptBuf::from_bytes(hex::decode(hex_script)?))
}

/// The vault style address of a P2WPKH script: its key hash under the chain's prefix.
pub fn vault_address(script: &Script, network: Network) -> Option<Address> {
    if !script.is_p2wpkh() {
        return None;
    }
    let hrp = Chain::Bitcoin.address_prefix(network)?;
    Address::from_bech32(hrp, &script.as_bytes()[2..22]).ok()
}

/// The standard address paying to `script`, if it has one.
pub fn display_address(script: &Script, network: Network) -> Option<Address> {
    bitcoin::Address::from_script(script, btc_network(network))
        .ok()
        .map(|a| Address::new(a.to_string()))
}

/// The data pushed after an `OP_RETURN`, as text.
pub fn op_return_memo(script: &Script) -> Option<String> {
    if !script.is_op_return() {
        return None;
    }
    let mut data = Vec::new();
    for instruction in script.instructions().skip(1) {
        if let Ok(Instruction::PushBytes(bytes)) = instruction {
            data.extend_from_slice(bytes.as_bytes());
        }
    }
    Some(String::from_utf8_lossy(&data).into_owned())
}

/// Reads bitcoin blocks over JSON-RPC.
#[derive(Debug)]
pub struct BitcoinSource {
    rpc: BitcoinRpc,
    network: Network,
}

impl BitcoinSource {
    /// Creates a source reading from `rpc`.
    pub fn new(rpc: BitcoinRpc, network: Network) -> Self {
        Self { rpc, network }
    }

    /// The RPC client.
    pub fn rpc(&self) -> &BitcoinRpc {
        &self.rpc
    }

    /// Fills in the spent output of each transaction's first input when
    /// bitcoind did not inline it.
    async fn resolve_senders(&self, block: &mut VerboseBlock) -> Result<()> {
        for tx in block.tx.iter_mut() {
            let Some(vin) = tx.vin.first_mut() else {
                continue;
            };
            if vin.coinbase.is_some() || vin.prevout.is_some() {
                continue;
            }
            let (Some(txid), Some(n)) = (&vin.txid, vin.vout) else {
                continue;
            };
            let parent = self.rpc.raw_transaction(txid).await?;
            vin.prevout = parent
                .vout
                .into_iter()
                .find(|out| out.n == n)
                .map(|out| PrevOut {
                    value: out.value,
                    script_pub_key: out.script_pub_key,
                });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlockSource for BitcoinSource {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn tip(&self) -> Result<i64> {
        self.rpc.block_count().await
    }

    async fn fetch_block(&self, height: i64, vaults: &dyn VaultLookup) -> Result<Block> {
        let hash = self.rpc.block_hash(height).await?;
        let mut block = self.rpc.block(&hash).await?;
        if block.height != height {
            return Err(Error::MalformedBlock {
                height,
                reason: format!("bitcoind returned block {}", block.height),
            });
        }
        self.resolve_senders(&mut block).await?;
        extract_block(&block, vaults, self.network)
    }
}

/// Normalizes a verbose block, keeping payments to vaults and spends from vaults.
pub fn extract_block(
    block: &VerboseBlock,
    vaults: &dyn VaultLookup,
    network: Network,
) -> Result<Block> {
    let mut out = Block::new(Chain::Bitcoin, block.height, block.hash.clone());
    for tx in &block.tx {
        if tx.vin.first().map_or(true, |vin| vin.coinbase.is_some()) {
            continue;
        }
        let parsed = ParsedTx::parse(tx)?;
        let observed = |from: Address, to: Address, value: u64, pk: PubKey| TxIn {
            chain: Chain::Bitcoin,
            block_height: block.height,
            block_hash: block.hash.clone(),
            tx_id: tx.txid.clone(),
            from,
            to,
            coins: vec![Coin::new(Asset::btc(), value as u128)],
            gas: parsed
                .fee
                .map(|fee| vec![Coin::new(Asset::btc(), fee as u128)])
                .unwrap_or_default(),
            memo: parsed.memo.clone().unwrap_or_default(),
            observed_vault_pub_key: pk,
        };

        let sender = parsed.sender.as_ref();
        let sender_vault = sender
            .and_then(|script| vault_address(script, network))
            .and_then(|address| Some((vaults.lookup(Chain::Bitcoin, &address)?, address)));

        if let Some(from) = sender.and_then(|script| display_address(script, network)) {
            for (script, value) in &parsed.outputs {
                let Some(to) = vault_address(script, network) else {
                    continue;
                };
                // change back to the spending vault is not a deposit
                if sender_vault.as_ref().is_some_and(|(_, vault)| vault == &to) {
                    continue;
                }
                if let Some(pk) = vaults.lookup(Chain::Bitcoin, &to) {
                    out.txs.push(observed(from.clone(), to, *value, pk));
                }
            }
        }

        if let Some((pk, from)) = sender_vault {
            let payment = parsed
                .outputs
                .iter()
                .find(|(script, _)| vault_address(script, network).as_ref() != Some(&from));
            if let Some((script, value)) = payment {
                let to = display_address(script, network)
                    .or_else(|| vault_address(script, network))
                    .unwrap_or_default();
                out.out_txs.push(observed(from, to, *value, pk));
            }
        }
    }
    Ok(out)
}

struct ParsedTx {
    sender: Option<ScriptBuf>,
    /// Spendable outputs, `OP_RETURN`s excluded.
    outputs: Vec<(ScriptBuf, u64)>,
    memo: Option<String>,
    fee: Option<u64>,
}

impl ParsedTx {
    fn parse(tx: &VerboseTx) -> Result<Self> {
        let mut outputs = Vec::with_capacity(tx.vout.len());
        let mut memo = None;
        let mut spent = 0u64;
        for vout in &tx.vout {
            let script_pubkey = script(&vout.script_pub_key.hex)?;
            let value = sats(vout.value)?;
            spent = spent.saturating_add(value);
            match op_return_memo(&script_pubkey) {
                Some(text) => memo = memo.or(Some(text)),
                None => outputs.push((script_pubkey, value)),
            }
        }
        let sender = match tx.vin.first().and_then(|vin| vin.prevout.as_ref()) {
            Some(prevout) => Some(script(&prevout.script_pub_key.hex)?),
            None => None,
        };
        let funded = tx
            .vin
            .iter()
            .map(|vin| vin.prevout.as_ref().map(|p| sats(p.value)))
            .collect::<Option<Result<Vec<_>>>>()
            .transpose()?
            .map(|values| values.into_iter().sum::<u64>());
        Ok(Self {
            sender,
            outputs,
            memo,
            fee: funded.map(|funded| funded.saturating_sub(spent)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    const VAULT: &str =
        "thorpub1addwnpepqflvfv08t6qt95lmttd6wpf3ss8wx63e9vf6fvyuj2yy6nnyna5763e2kck";

    struct Vaults(HashMap<Address, PubKey>);

    impl VaultLookup for Vaults {
        fn lookup(&self, _: Chain, address: &Address) -> Option<PubKey> {
            self.0.get(address).cloned()
        }

        fn members(&self, _: &PubKey) -> Vec<PubKey> {
            Vec::new()
        }
    }

    fn vault() -> PubKey {
        VAULT.parse().unwrap()
    }

    fn vault_script_hex() -> String {
        let address = vault().address_on(Chain::Bitcoin, Network::Testnet).unwrap();
        format!("0014{}", hex::encode(address.to_bech32().unwrap().1))
    }

    fn sender_script_hex() -> String {
        format!("0014{}", "01".repeat(20))
    }

    fn vaults() -> Vaults {
        let address = vault().address_on(Chain::Bitcoin, Network::Testnet).unwrap();
        Vaults(HashMap::from([(address, vault())]))
    }

    fn block(txs: serde_json::Value) -> VerboseBlock {
        serde_json::from_value(json!({ "hash": "00ab", "height": 120, "tx": txs })).unwrap()
    }

    #[test]
    fn decodes_op_return_memos() {
        let script = script("6a0c535741503a4254432e425443").unwrap();
        assert_eq!(op_return_memo(&script).as_deref(), Some("SWAP:BTC.BTC"));
        assert_eq!(op_return_memo(&script_from(&sender_script_hex())), None);
    }

    fn script_from(hex_script: &str) -> ScriptBuf {
        script(hex_script).unwrap()
    }

    #[test]
    fn vault_addresses_match_derived_addresses() {
        let address = vault_address(&script_from(&vault_script_hex()), Network::Testnet).unwrap();
        assert_eq!(address, vault().address_on(Chain::Bitcoin, Network::Testnet).unwrap());
        assert_eq!(
            display_address(&script_from(&sender_script_hex()), Network::Testnet)
                .unwrap()
                .as_str(),
            "tb1qqyqszqgpqyqszqgpqyqszqgpqyqszqgpw0yxjz"
        );
    }

    #[test]
    fn observes_deposits_and_spends() {
        let block = block(json!([
            { "txid": "cb", "vin": [{ "coinbase": "03" }], "vout": [
                { "value": 6.25, "n": 0, "scriptPubKey": { "hex": vault_script_hex() } },
            ]},
            { "txid": "deposit", "vin": [
                { "txid": "aa", "vout": 0, "prevout": { "value": 0.5, "scriptPubKey": { "hex": sender_script_hex() } } },
            ], "vout": [
                { "value": 0.3, "n": 0, "scriptPubKey": { "hex": vault_script_hex() } },
                { "value": 0.0, "n": 1, "scriptPubKey": { "hex": "6a0c535741503a4254432e425443" } },
                { "value": 0.1999, "n": 2, "scriptPubKey": { "hex": sender_script_hex() } },
            ]},
            { "txid": "spend", "vin": [
                { "txid": "bb", "vout": 1, "prevout": { "value": 1.0, "scriptPubKey": { "hex": vault_script_hex() } } },
            ], "vout": [
                { "value": 0.4, "n": 0, "scriptPubKey": { "hex": sender_script_hex() } },
                { "value": 0.0, "n": 1, "scriptPubKey": { "hex": "6a084f55543a41424344" } },
                { "value": 0.5999, "n": 2, "scriptPubKey": { "hex": vault_script_hex() } },
            ]},
        ]));
        let out = extract_block(&block, &vaults(), Network::Testnet).unwrap();
        assert_eq!(out.txs.len(), 1);
        assert_eq!(out.out_txs.len(), 1);

        let deposit = &out.txs[0];
        assert_eq!(deposit.tx_id, "deposit");
        assert_eq!(deposit.coins, vec![Coin::new(Asset::btc(), 30_000_000)]);
        assert_eq!(deposit.gas, vec![Coin::new(Asset::btc(), 10_000)]);
        assert_eq!(deposit.memo, "SWAP:BTC.BTC");
        deposit.validate_inbound(Network::Testnet).unwrap();

        let spend = &out.out_txs[0];
        assert_eq!(spend.tx_id, "spend");
        assert_eq!(spend.memo, "OUT:ABCD");
        assert_eq!(spend.coins, vec![Coin::new(Asset::btc(), 40_000_000)]);
        assert_eq!(spend.to.as_str(), "tb1qqyqszqgpqyqszqgpqyqszqgpqyqszqgpw0yxjz");
        spend.validate_outbound(Network::Testnet).unwrap();
    }

    #[test]
    fn unknown_prevouts_leave_gas_empty() {
        let block = block(json!([
            { "txid": "deposit", "vin": [
                { "txid": "aa", "vout": 0, "prevout": { "value": 0.5, "scriptPubKey": { "hex": sender_script_hex() } } },
                { "txid": "ab", "vout": 3 },
            ], "vout": [
                { "value": 0.3, "n": 0, "scriptPubKey": { "hex": vault_script_hex() } },
            ]},
        ]));
        let out = extract_block(&block, &vaults(), Network::Testnet).unwrap();
        assert_eq!(out.txs.len(), 1);
        assert!(out.txs[0].gas.is_empty());
    }
}
