// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    errors::EmitterError,
    identity::Identity,
    transaction_generator::{SignedArtifact, TransactionBuilder, TransactionGenerator},
};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};

/// Where generated transactions go.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Receiver {
    /// Every sender pays itself.
    Sender,
    Fixed(Address),
}

/// Sends the same `value` and `payload` to the receiver for every
/// transaction. With a contract receiver the payload is the encoded call.
pub struct P2PTransactionGenerator {
    builder: TransactionBuilder,
    receiver: Receiver,
    value: U256,
    payload: Bytes,
}

impl P2PTransactionGenerator {
    pub fn new(
        builder: TransactionBuilder,
        receiver: Receiver,
        value: U256,
        payload: Bytes,
    ) -> Self {
        Self {
            builder,
            receiver,
            value,
            payload,
        }
    }
}

#[async_trait]
impl TransactionGenerator for P2PTransactionGenerator {
    async fn generate_transactions(
        &self,
        account: &mut Identity,
        transactions_per_account: usize,
    ) -> Result<Vec<SignedArtifact>, EmitterError> {
        let to = match self.receiver {
            Receiver::Sender => account.address(),
            Receiver::Fixed(address) => address,
        };
        let mut requests = Vec::with_capacity(transactions_per_account);
        for _ in 0..transactions_per_account {
            requests.push(
                self.builder
                    .build(account, to, self.value, self.payload.clone())
                    .await?,
            );
        }
        Ok(requests)
    }
}
