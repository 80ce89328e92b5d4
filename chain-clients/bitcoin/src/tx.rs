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
use std::str::FromStr;

use bifrost_signing_backends::KeySigner;
use bifrost_types::{hash160, Address, Network, PubKey};
use bifrost_utils::{Error, Result};
use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{
    absolute, transaction, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, WPubkeyHash, Witness,
};

use crate::block::{btc_network, sats};
use crate::rpc::Unspent;

/// Outputs below this many satoshis are not relayed.
pub const DUST_THRESHOLD: u64 = 546;
/// The largest memo an `OP_RETURN` output carries.
pub const MAX_MEMO_LEN: usize = 80;

/// A spendable output of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utxo {
    /// Where it is.
    pub outpoint: OutPoint,
    /// What it holds.
    pub value: Amount,
}

impl TryFrom<&Unspent> for Utxo {
    type Error = Error;

    fn try_from(unspent: &Unspent) -> Result<Self> {
        let txid = Txid::from_str(&unspent.txid)
            .map_err(|e| Error::ChainClient(format!("bad txid {}: {e}", unspent.txid)))?;
        Ok(Self {
            outpoint: OutPoint::new(txid, unspent.vout),
            value: Amount::from_sat(sats(unspent.amount)?),
        })
    }
}

/// The P2WPKH script locking a vault's funds.
pub fn vault_script(pk: &PubKey) -> Result<ScriptBuf> {
    let hash = WPubkeyHash::from_byte_array(hash160(&pk.compressed()?));
    Ok(ScriptBuf::new_p2wpkh(&hash))
}

/// The script paying to `address`.
///
/// Standard addresses must belong to `network`. Vault style addresses, a
/// bare key hash under the chain's prefix, pay to the P2WPKH of that hash.
pub fn recipient_script(address: &Address, network: Network) -> Result<ScriptBuf> {
    if let Ok(parsed) = address.as_str().parse::<bitcoin::Address<NetworkUnchecked>>() {
        let checked = parsed
            .require_network(btc_network(network))
            .map_err(|_| Error::InvalidAddress(address.to_string()))?;
        return Ok(checked.script_pubkey());
    }
    let (_, data) = address.to_bech32()?;
    let hash: [u8; 20] = data
        .try_into()
        .map_err(|_| Error::InvalidAddress(address.to_string()))?;
    Ok(ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(hash)))
}

/// An `OP_RETURN` output carrying `memo`.
pub fn memo_output(memo: &str) -> Result<TxOut> {
    if memo.len() > MAX_MEMO_LEN {
        return Err(Error::ChainClient(format!(
            "memo of {} bytes does not fit an OP_RETURN",
            memo.len()
        )));
    }
    let data = PushBytesBuf::try_from(memo.as_bytes().to_vec())
        .map_err(|e| Error::ChainClient(e.to_string()))?;
    let script = Builder::new()
        .push_opcode(bitcoin::opcodes::all::OP_RETURN)
        .push_slice(&data)
        .into_script();
    Ok(TxOut {
        value: Amount::ZERO,
        script_pubkey: script,
    })
}

/// Virtual size of a transaction spending `inputs` P2WPKH outputs into `outputs`.
pub fn estimate_vsize(inputs: usize, outputs: &[TxOut]) -> u64 {
    // version, locktime, counts and the segwit marker: 10.5 vbytes, rounded up
    let overhead = 11;
    // outpoint, sequence, empty script sig, and a quarter of the witness
    let per_input = 68;
    let outputs: usize = outputs.iter().map(|o| 9 + o.script_pubkey.len()).sum();
    (overhead + per_input * inputs + outputs) as u64
}

/// The unsigned transaction paying `amount` to `to` and the change back to
/// `change`, along with the values of the spent outputs.
///
/// Largest outputs are spent first. The fee comes on top of `amount`, and
/// change below the dust threshold is left to the miner.
pub fn build_spend(
    mut utxos: Vec<Utxo>,
    to: ScriptBuf,
    amount: Amount,
    memo: &str,
    change: ScriptBuf,
    fee_rate: u64,
) -> Result<(Transaction, Vec<Amount>)> {
    utxos.sort_by(|a, b| b.value.cmp(&a.value));
    let mut outputs = vec![TxOut {
        value: amount,
        script_pubkey: to,
    }];
    if !memo.is_empty() {
        outputs.push(memo_output(memo)?);
    }
    let change_output = TxOut {
        value: Amount::ZERO,
        script_pubkey: change,
    };
    let mut with_change = outputs.clone();
    with_change.push(change_output.clone());

    let mut selected = Vec::new();
    let mut total = Amount::ZERO;
    for utxo in utxos {
        selected.push(utxo);
        total += utxo.value;
        let fee = Amount::from_sat(estimate_vsize(selected.len(), &with_change) * fee_rate);
        if total >= amount + fee {
            break;
        }
    }
    let fee = Amount::from_sat(estimate_vsize(selected.len(), &with_change) * fee_rate);
    if total < amount + fee {
        return Err(Error::ChainClient(format!(
            "vault holds {total} in {} outputs, {amount} plus {fee} fee needed",
            selected.len()
        )));
    }
    let rest = total - amount - fee;
    if rest.to_sat() >= DUST_THRESHOLD {
        outputs.push(TxOut {
            value: rest,
            ..change_output
        });
    }

    let tx = Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: selected
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            })
            .collect(),
        output: outputs,
    };
    Ok((tx, selected.iter().map(|utxo| utxo.value).collect()))
}

/// Signs every input of `tx`. Each spends a P2WPKH output of the signer's key, worth `values[i]`.
pub async fn sign_spend(
    mut tx: Transaction,
    values: &[Amount],
    signer: &dyn KeySigner,
) -> Result<Transaction> {
    let script = vault_script(signer.pub_key())?;
    let digests = {
        let mut cache = SighashCache::new(&tx);
        values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                cache
                    .p2wpkh_signature_hash(index, &script, *value, EcdsaSighashType::All)
                    .map(|sighash| sighash.to_byte_array())
                    .map_err(|e| Error::ChainClient(format!("sighash of input {index}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?
    };
    let compressed = signer.pub_key().compressed()?;
    for (input, digest) in tx.input.iter_mut().zip(digests) {
        let signature = signer.sign(digest).await?;
        let mut der = signature.der()?;
        der.push(EcdsaSighashType::All.to_u32() as u8);
        let mut witness = Witness::new();
        witness.push(der);
        witness.push(compressed);
        input.witness = witness;
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use bifrost_signing_backends::LocalKeySigner;
    use bifrost_types::PrivateKey;

    use super::*;

    fn key() -> PrivateKey {
        "000000000000000000000000000000000000000000000000000000000000002a"
            .parse()
            .unwrap()
    }

    fn utxo(byte: u8, sats: u64) -> Utxo {
        Utxo {
            outpoint: OutPoint::new(Txid::from_byte_array([byte; 32]), 0),
            value: Amount::from_sat(sats),
        }
    }

    fn recipient() -> ScriptBuf {
        recipient_script(
            &Address::new("tb1qqyqszqgpqyqszqgpqyqszqgpqyqszqgpw0yxjz"),
            Network::Testnet,
        )
        .unwrap()
    }

    #[test]
    fn parses_standard_and_vault_style_recipients() {
        let vault_style = recipient_script(
            &Address::new("tb1qyqszqgpqyqszqgpqyqszqgpqyqszqgp20e4hg"),
            Network::Testnet,
        )
        .unwrap();
        assert_eq!(recipient(), vault_style);
        assert!(recipient_script(
            &Address::new("tb1qqyqszqgpqyqszqgpqyqszqgpqyqszqgpw0yxjz"),
            Network::Mainnet
        )
        .is_err());
    }

    #[test]
    fn memo_longer_than_op_return_is_refused() {
        assert!(memo_output(&"x".repeat(81)).is_err());
        let out = memo_output("OUT:ABCD").unwrap();
        assert!(out.script_pubkey.is_op_return());
    }

    #[test]
    fn spends_largest_outputs_first_and_returns_change() {
        let change = vault_script(&key().pub_key().unwrap()).unwrap();
        let (tx, values) = build_spend(
            vec![utxo(1, 10_000), utxo(2, 500_000), utxo(3, 80_000)],
            recipient(),
            Amount::from_sat(300_000),
            "OUT:ABCD",
            change.clone(),
            10,
        )
        .unwrap();
        assert_eq!(values, vec![Amount::from_sat(500_000)]);
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.output.len(), 3);
        assert_eq!(tx.output[0].value, Amount::from_sat(300_000));
        assert!(tx.output[1].script_pubkey.is_op_return());
        assert_eq!(tx.output[2].script_pubkey, change);
        let fee = 500_000 - 300_000 - tx.output[2].value.to_sat();
        assert_eq!(fee, estimate_vsize(1, &tx.output) * 10);
    }

    #[test]
    fn dust_change_goes_to_the_miner() {
        let change = vault_script(&key().pub_key().unwrap()).unwrap();
        let (tx, _) =
            build_spend(vec![utxo(1, 100_600)], recipient(), Amount::from_sat(100_000), "", change, 1)
                .unwrap();
        assert_eq!(tx.output.len(), 1);
    }

    #[test]
    fn refuses_to_overspend() {
        let change = vault_script(&key().pub_key().unwrap()).unwrap();
        let err = build_spend(
            vec![utxo(1, 1_000)],
            recipient(),
            Amount::from_sat(1_000),
            "",
            change,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ChainClient(_)));
    }

    #[tokio::test]
    async fn signatures_commit_to_each_input() {
        let signer = LocalKeySigner::new(key()).unwrap();
        let change = vault_script(signer.pub_key()).unwrap();
        let (tx, values) = build_spend(
            vec![utxo(1, 40_000), utxo(2, 40_000)],
            recipient(),
            Amount::from_sat(60_000),
            "OUT:ABCD",
            change.clone(),
            2,
        )
        .unwrap();
        let signed = sign_spend(tx.clone(), &values, &signer).await.unwrap();
        let compressed = key().pub_key().unwrap().compressed().unwrap();
        let mut cache = SighashCache::new(&tx);
        for (index, input) in signed.input.iter().enumerate() {
            let witness: Vec<&[u8]> = input.witness.iter().collect();
            assert_eq!(witness.len(), 2);
            assert_eq!(witness[1], &compressed[..]);
            let (sighash_byte, der) = witness[0].split_last().unwrap();
            assert_eq!(*sighash_byte, 0x01);
            let digest = cache
                .p2wpkh_signature_hash(index, &change, values[index], EcdsaSighashType::All)
                .unwrap()
                .to_byte_array();
            let signature = libsecp256k1::Signature::parse_der(der).unwrap();
            assert!(libsecp256k1::verify(
                &libsecp256k1::Message::parse(&digest),
                &signature,
                &key().public_key(),
            ));
        }
    }
}
