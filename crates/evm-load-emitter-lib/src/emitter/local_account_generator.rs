// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{chain_client::ChainClient, errors::EmitterError, identity::Identity};
use async_trait::async_trait;
use ethers::{signers::Signer, types::Address};
use futures::StreamExt;
use tracing::info;

const QUERY_PARALLELISM: usize = 300;

#[async_trait]
pub trait LocalAccountGenerator: Send + Sync {
    async fn gen_local_accounts(
        &self,
        client: &dyn ChainClient,
    ) -> Result<Vec<Identity>, EmitterError>;
}

/// Loads identities from configured private keys and syncs their nonces with
/// the node's pending state.
pub struct PrivateKeyAccountGenerator {
    private_keys: Vec<String>,
    chain_id: u64,
}

impl PrivateKeyAccountGenerator {
    pub fn new(private_keys: Vec<String>, chain_id: u64) -> Self {
        Self {
            private_keys,
            chain_id,
        }
    }
}

#[async_trait]
impl LocalAccountGenerator for PrivateKeyAccountGenerator {
    async fn gen_local_accounts(
        &self,
        client: &dyn ChainClient,
    ) -> Result<Vec<Identity>, EmitterError> {
        let wallets = self
            .private_keys
            .iter()
            .enumerate()
            .map(|(index, key)| Identity::wallet_from_private_key(index, key, self.chain_id))
            .collect::<Result<Vec<_>, _>>()?;

        let addresses = wallets.iter().map(Signer::address).collect::<Vec<Address>>();
        let seq_nums = futures::stream::iter(addresses.into_iter().map(|address| async move {
            client
                .pending_sequence_number(address)
                .await
                .map_err(|source| EmitterError::NonceSourceUnavailable { address, source })
        }))
        .buffered(QUERY_PARALLELISM)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        let identities = wallets
            .into_iter()
            .zip(seq_nums)
            .map(|(wallet, sequence_number)| Identity::new(wallet, sequence_number))
            .collect::<Vec<_>>();
        for identity in identities.iter() {
            info!(
                "Sender {:?} starts at nonce {}",
                identity.address(),
                identity.sequence_number()
            );
        }
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::test_utils::{DEV_PRIVATE_KEYS, TEST_CHAIN_ID},
        tests::mock_client::MockChainClient,
    };
    use claims::{assert_err, assert_matches, assert_ok};
    use ethers::signers::Signer;

    fn generator(count: usize) -> PrivateKeyAccountGenerator {
        PrivateKeyAccountGenerator::new(
            DEV_PRIVATE_KEYS[..count]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            TEST_CHAIN_ID,
        )
    }

    #[tokio::test]
    async fn test_identities_start_at_pending_nonce() {
        let client = MockChainClient::new();
        let second = assert_ok!(Identity::wallet_from_private_key(
            1,
            DEV_PRIVATE_KEYS[1],
            TEST_CHAIN_ID
        ));
        client.set_pending_nonce(second.address(), 17);

        let identities = assert_ok!(generator(2).gen_local_accounts(&client).await);
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0].sequence_number(), 0);
        assert_eq!(identities[1].sequence_number(), 17);
        assert_eq!(identities[0].wallet().chain_id(), TEST_CHAIN_ID);
    }

    #[tokio::test]
    async fn test_nonce_source_failure_is_fatal() {
        let client = MockChainClient::new();
        client.fail_nonce_queries();

        let err = assert_err!(generator(1).gen_local_accounts(&client).await);
        assert_matches!(err, EmitterError::NonceSourceUnavailable { .. });
        assert!(err.is_fatal());
    }
}
