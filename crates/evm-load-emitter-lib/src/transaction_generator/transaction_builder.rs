// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    chain_client::ChainClient, errors::EmitterError, identity::Identity,
    transaction_generator::SignedArtifact,
};
use ethers::{
    signers::Signer,
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, U256,
    },
};
use std::sync::Arc;

/// Turns a request body into a signed EIP-1559 transaction.
///
/// Fees and gas come from the node for every build. The identity's nonce is
/// only advanced once signing succeeded, so a failed build leaves the counter
/// untouched.
#[derive(Clone)]
pub struct TransactionBuilder {
    client: Arc<dyn ChainClient>,
}

impl TransactionBuilder {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    pub async fn build(
        &self,
        identity: &mut Identity,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<SignedArtifact, EmitterError> {
        let sender = identity.address();
        let fees = self
            .client
            .estimate_fees()
            .await
            .map_err(EmitterError::FeeEstimation)?;
        let gas = self
            .client
            .estimate_gas(sender, to, &data)
            .await
            .map_err(|source| EmitterError::GasEstimation { sender, source })?;

        let nonce = identity.sequence_number();
        let txn: TypedTransaction = Eip1559TransactionRequest::new()
            .from(sender)
            .to(to)
            .value(value)
            .data(data)
            .nonce(nonce)
            .gas(gas)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .chain_id(identity.wallet().chain_id())
            .into();
        let signature = identity
            .wallet()
            .sign_transaction_sync(&txn)
            .map_err(|e| EmitterError::Signing {
                sender,
                reason: e.to_string(),
            })?;

        let artifact = SignedArtifact::new(
            sender,
            nonce,
            txn.hash(&signature),
            txn.rlp_signed(&signature),
        );
        identity.next_sequence_number();
        Ok(artifact)
    }
}
