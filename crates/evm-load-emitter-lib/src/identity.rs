// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::errors::EmitterError;
use ethers::{
    signers::{LocalWallet, Signer},
    types::Address,
};

/// A signing identity and its local nonce counter.
///
/// The nonce is fetched once from the node when the identity is created and
/// from then on only advanced locally, once per signed transaction. An
/// identity is owned by exactly one builder at a time, so the counter needs
/// no synchronization.
#[derive(Clone, Debug)]
pub struct Identity {
    wallet: LocalWallet,
    sequence_number: u64,
}

impl Identity {
    pub fn new(wallet: LocalWallet, sequence_number: u64) -> Self {
        Self {
            wallet,
            sequence_number,
        }
    }

    /// Parses a hex private key (with or without `0x`) and binds the wallet
    /// to `chain_id`.
    pub fn wallet_from_private_key(
        index: usize,
        private_key: &str,
        chain_id: u64,
    ) -> Result<LocalWallet, EmitterError> {
        private_key
            .trim()
            .parse::<LocalWallet>()
            .map(|wallet| wallet.with_chain_id(chain_id))
            .map_err(|e| EmitterError::InvalidPrivateKey {
                index,
                reason: e.to_string(),
            })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }

    /// The nonce the next transaction of this identity will carry.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Hands out the current nonce and advances the counter.
    pub fn next_sequence_number(&mut self) -> u64 {
        let sequence_number = self.sequence_number;
        self.sequence_number += 1;
        sequence_number
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Well-known development keys (anvil / hardhat accounts 0..4).
    pub(crate) const DEV_PRIVATE_KEYS: [&str; 5] = [
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
        "7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6",
        "47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a",
    ];

    pub(crate) const TEST_CHAIN_ID: u64 = 1337;

    pub(crate) fn test_identity(index: usize, sequence_number: u64) -> Identity {
        let wallet =
            Identity::wallet_from_private_key(index, DEV_PRIVATE_KEYS[index], TEST_CHAIN_ID)
                .unwrap();
        Identity::new(wallet, sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::{test_utils::*, *};
    use claims::{assert_err, assert_matches, assert_ok};

    #[test]
    fn test_next_sequence_number_is_strictly_increasing() {
        let mut identity = test_identity(0, 42);
        assert_eq!(identity.sequence_number(), 42);
        let handed_out = (0..5)
            .map(|_| identity.next_sequence_number())
            .collect::<Vec<_>>();
        assert_eq!(handed_out, vec![42, 43, 44, 45, 46]);
        assert_eq!(identity.sequence_number(), 47);
    }

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = assert_ok!(Identity::wallet_from_private_key(
            0,
            &format!("0x{}", DEV_PRIVATE_KEYS[0]),
            TEST_CHAIN_ID
        ));
        assert_eq!(wallet.chain_id(), TEST_CHAIN_ID);
        assert_eq!(
            format!("{:?}", wallet.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );

        let err = assert_err!(Identity::wallet_from_private_key(3, "zz", TEST_CHAIN_ID));
        assert_matches!(err, EmitterError::InvalidPrivateKey { index: 3, .. });
    }
}
