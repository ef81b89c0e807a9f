// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{chain_client::Outcome, errors::EmitterError, identity::Identity};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use std::time::Duration;

pub mod call_encoder;
pub mod p2p_transaction_generator;
pub mod transaction_builder;

pub use transaction_builder::TransactionBuilder;

/// Byte used to fill raw payloads.
pub const FILLER_BYTE: u8 = b'A';

/// A payload of exactly `size` filler bytes.
pub fn generate_filler_payload(size: usize) -> Bytes {
    Bytes::from(vec![FILLER_BYTE; size])
}

/// A signed, submission-ready transaction plus what the emitter learns about
/// it while the test runs.
#[derive(Clone, Debug)]
pub struct SignedArtifact {
    sender: Address,
    nonce: u64,
    hash: H256,
    raw: Bytes,
    submitted_height: Option<u64>,
    submitted_at: Option<Duration>,
    outcome: Option<Outcome>,
}

impl SignedArtifact {
    pub fn new(sender: Address, nonce: u64, hash: H256, raw: Bytes) -> Self {
        Self {
            sender,
            nonce,
            hash,
            raw,
            submitted_height: None,
            submitted_at: None,
            outcome: None,
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Records the chain height and unix time right before submission.
    pub fn mark_submitted(&mut self, height: u64, at: Duration) {
        self.submitted_height = Some(height);
        self.submitted_at = Some(at);
    }

    pub fn submitted_height(&self) -> Option<u64> {
        self.submitted_height
    }

    pub fn submitted_at(&self) -> Option<Duration> {
        self.submitted_at
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// Sets the outcome unless one is already set. Returns whether it was set.
    pub fn resolve(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }
}

#[async_trait]
pub trait TransactionGenerator: Sync + Send {
    /// Builds and signs `transactions_per_account` artifacts for `account`,
    /// consuming exactly one nonce per artifact.
    async fn generate_transactions(
        &self,
        account: &mut Identity,
        transactions_per_account: usize,
    ) -> Result<Vec<SignedArtifact>, EmitterError>;
}
