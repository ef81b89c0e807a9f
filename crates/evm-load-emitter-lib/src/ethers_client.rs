// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::{BlockSummary, CallRequest, ChainClient, FeeParameters, Outcome};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes,
        Eip1559TransactionRequest, TransactionRequest, H256, U256,
    },
};
use std::{fmt, sync::Arc};

/// [`ChainClient`] talking JSON-RPC to a single node over HTTP.
#[derive(Clone)]
pub struct EthersChainClient {
    provider: Arc<Provider<Http>>,
    rpc_url: String,
}

impl EthersChainClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("invalid rpc url: {}", rpc_url))?;
        Ok(Self {
            provider: Arc::new(provider),
            rpc_url: rpc_url.to_string(),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

impl fmt::Debug for EthersChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthersChainClient")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn pending_sequence_number(&self, address: Address) -> Result<u64> {
        let count = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await?;
        u256_to_u64(count, "pending nonce")
    }

    async fn estimate_fees(&self) -> Result<FeeParameters> {
        let max_fee_per_gas = self.provider.get_gas_price().await?;
        let suggested_tip: U256 = self
            .provider
            .request("eth_maxPriorityFeePerGas", ())
            .await?;
        Ok(FeeParameters {
            max_fee_per_gas,
            // a tip above the fee cap makes the transaction invalid
            max_priority_fee_per_gas: suggested_tip.min(max_fee_per_gas),
        })
    }

    async fn estimate_gas(&self, from: Address, to: Address, data: &Bytes) -> Result<U256> {
        let request: TypedTransaction = Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data.clone())
            .into();
        Ok(self.provider.estimate_gas(&request, None).await?)
    }

    async fn submit(&self, raw_transaction: Bytes) -> Result<()> {
        self.provider.send_raw_transaction(raw_transaction).await?;
        Ok(())
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes> {
        let mut call = TransactionRequest::new()
            .to(request.to)
            .data(request.data.clone());
        if let Some(from) = request.from {
            call = call.from(from);
        }
        let call: TypedTransaction = call.into();
        Ok(self.provider.call(&call, None).await?)
    }

    async fn fetch_outcome(&self, hash: H256) -> Result<Option<Outcome>> {
        let receipt = match self.provider.get_transaction_receipt(hash).await? {
            Some(receipt) => receipt,
            None => return Ok(None),
        };
        let (block_hash, block_number) = match (receipt.block_hash, receipt.block_number) {
            (Some(block_hash), Some(block_number)) => (block_hash, block_number.as_u64()),
            // receipt for a pending transaction
            _ => return Ok(None),
        };
        Ok(Some(Outcome {
            block_hash,
            block_number,
            success: receipt.status.map_or(true, |status| !status.is_zero()),
            effective_gas_price: receipt.effective_gas_price.unwrap_or_default(),
        }))
    }

    async fn fetch_block(&self, hash: H256) -> Result<BlockSummary> {
        let block = self
            .provider
            .get_block(hash)
            .await?
            .ok_or_else(|| anyhow!("block {:?} not found", hash))?;
        let number = block
            .number
            .ok_or_else(|| anyhow!("block {:?} has no number", hash))?;
        Ok(BlockSummary {
            hash,
            number: number.as_u64(),
            transaction_count: block.transactions.len(),
            gas_used: block.gas_used,
            timestamp: u256_to_u64(block.timestamp, "block timestamp")?,
        })
    }

    async fn current_height(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }
}

fn u256_to_u64(value: U256, what: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        bail!("{} {} does not fit in 64 bits", what, value);
    }
    Ok(value.low_u64())
}
