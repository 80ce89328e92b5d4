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
use bifrost_types::{Address, Asset, Block, Chain, Coin, PubKey, TxIn};
use bifrost_utils::{Error, Result};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Transaction, U256};

/// Reads Ethereum blocks, with their transactions, over JSON-RPC.
#[derive(Debug, Clone)]
pub struct EthereumSource {
    provider: Provider<Http>,
}

impl EthereumSource {
    /// Creates a source reading from `provider`.
    pub fn new(provider: Provider<Http>) -> Self {
        Self { provider }
    }

    /// The provider.
    pub fn provider(&self) -> &Provider<Http> {
        &self.provider
    }
}

#[async_trait::async_trait]
impl BlockSource for EthereumSource {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn tip(&self) -> Result<i64> {
        let number = self.provider.get_block_number().await?;
        Ok(number.as_u64() as i64)
    }

    async fn fetch_block(&self, height: i64, vaults: &dyn VaultLookup) -> Result<Block> {
        let block = self
            .provider
            .get_block_with_txs(height as u64)
            .await?
            .ok_or(Error::BlockNotAvailable {
                height,
                tip: height - 1,
            })?;
        let hash = block.hash.map(|h| format!("{h:#x}")).unwrap_or_default();
        extract_block(height, hash, &block.transactions, vaults)
    }
}

/// Normalizes the transactions of a block, keeping value transfers to and from vaults.
pub fn extract_block(
    height: i64,
    hash: String,
    txs: &[Transaction],
    vaults: &dyn VaultLookup,
) -> Result<Block> {
    let mut block = Block::new(Chain::Ethereum, height, hash);
    for tx in txs {
        if tx.value.is_zero() {
            continue;
        }
        let from = address(&tx.from);
        let to = tx.to.as_ref().map(address);
        let inbound = to
            .as_ref()
            .and_then(|to| vaults.lookup(Chain::Ethereum, to));
        let outbound = vaults.lookup(Chain::Ethereum, &from);
        if inbound.is_none() && outbound.is_none() {
            continue;
        }
        let observed = |pk: PubKey| -> Result<TxIn> {
            Ok(TxIn {
                chain: Chain::Ethereum,
                block_height: height,
                block_hash: block.hash.clone(),
                tx_id: format!("{:#x}", tx.hash),
                from: from.clone(),
                to: to.clone().unwrap_or_default(),
                coins: vec![Coin::new(Asset::eth(), wei(tx.value)?)],
                gas: vec![Coin::new(
                    Asset::eth(),
                    wei(tx.gas_price.unwrap_or_default().saturating_mul(tx.gas))?,
                )],
                memo: String::from_utf8(tx.input.to_vec()).unwrap_or_default(),
                observed_vault_pub_key: pk,
            })
        };
        if let Some(pk) = inbound {
            let tx_in = observed(pk)?;
            block.txs.push(tx_in);
        }
        if let Some(pk) = outbound {
            let tx_out = observed(pk)?;
            block.out_txs.push(tx_out);
        }
    }
    Ok(block)
}

/// `0x` and the lowercase hex of `address`, the form vault addresses take.
pub fn address(address: &ethers::types::Address) -> Address {
    Address::new(format!("{address:#x}"))
}

fn wei(value: U256) -> Result<u128> {
    u128::try_from(value).map_err(|_| Error::ChainClient(format!("{value} wei overflows")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ethers::types::{Bytes, H256};

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

    fn vault_h160() -> ethers::types::Address {
        let address = vault()
            .address_on(Chain::Ethereum, bifrost_types::Network::Testnet)
            .unwrap();
        address.as_str().parse().unwrap()
    }

    fn transfer(
        n: u8,
        from: ethers::types::Address,
        to: ethers::types::Address,
        value: u64,
    ) -> Transaction {
        Transaction {
            hash: H256::repeat_byte(n),
            from,
            to: Some(to),
            value: value.into(),
            gas: 21_000.into(),
            gas_price: Some(2_000_000_000u64.into()),
            input: Bytes::from(b"SWAP:ETH.ETH".to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn keeps_transfers_touching_a_vault() {
        let vaults = Vaults(HashMap::from([(address(&vault_h160()), vault())]));
        let user = ethers::types::Address::repeat_byte(0x11);
        let txs = vec![
            transfer(1, user, vault_h160(), 1_000),
            transfer(2, user, user, 5),
            transfer(3, vault_h160(), user, 7),
            transfer(4, user, vault_h160(), 0),
        ];
        let block = extract_block(9, "0xab".into(), &txs, &vaults).unwrap();
        assert_eq!(block.txs.len(), 1);
        assert_eq!(block.out_txs.len(), 1);

        let deposit = &block.txs[0];
        assert_eq!(deposit.tx_id, format!("0x{}", "01".repeat(32)));
        assert_eq!(deposit.from.as_str(), format!("0x{}", "11".repeat(20)));
        assert_eq!(deposit.coins, vec![Coin::new(Asset::eth(), 1_000)]);
        assert_eq!(deposit.gas, vec![Coin::new(Asset::eth(), 42_000_000_000_000)]);
        assert_eq!(deposit.memo, "SWAP:ETH.ETH");
        deposit
            .validate_inbound(bifrost_types::Network::Testnet)
            .unwrap();
        block.out_txs[0]
            .validate_outbound(bifrost_types::Network::Testnet)
            .unwrap();
    }
}
