// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

/// EIP-1559 fee parameters suggested by the node.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FeeParameters {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// A read-only contract call (`eth_call`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
}

/// Network-confirmed result of one submitted transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Outcome {
    pub block_hash: H256,
    pub block_number: u64,
    pub success: bool,
    pub effective_gas_price: U256,
}

/// The parts of a fetched block the metrics need.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockSummary {
    pub hash: H256,
    pub number: u64,
    pub transaction_count: usize,
    pub gas_used: U256,
    /// Seconds since the unix epoch.
    pub timestamp: u64,
}

/// Node capabilities consumed by the emitter.
///
/// Implementations must be safe to call concurrently from many tasks; the
/// emitter does no locking around them.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Nonce of `address` including transactions still in the mempool.
    async fn pending_sequence_number(&self, address: Address) -> Result<u64>;

    async fn estimate_fees(&self) -> Result<FeeParameters>;

    async fn estimate_gas(&self, from: Address, to: Address, data: &Bytes) -> Result<U256>;

    /// Fire-and-forget: `Ok` means the node accepted the transaction for
    /// processing, not that it was included.
    async fn submit(&self, raw_transaction: Bytes) -> Result<()>;

    async fn call(&self, request: &CallRequest) -> Result<Bytes>;

    /// `Ok(None)` while the transaction isn't included yet.
    async fn fetch_outcome(&self, hash: H256) -> Result<Option<Outcome>>;

    async fn fetch_block(&self, hash: H256) -> Result<BlockSummary>;

    async fn current_height(&self) -> Result<u64>;
}
