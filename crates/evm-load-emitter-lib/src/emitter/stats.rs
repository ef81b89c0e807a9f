// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pure reduction of collected outcomes and blocks into per-test metrics.

use crate::{
    chain_client::BlockSummary, emitter::submission_worker::CallStats,
    transaction_generator::SignedArtifact,
};
use ethers::types::{H256, U256};
use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmitMetrics {
    pub tps: u64,
    pub avg_txs_per_block: f64,
    /// Blocks between submission height and inclusion height -> transactions.
    pub inclusion_distance: BTreeMap<u64, u64>,
    pub avg_inclusion_latency: Duration,
    pub avg_effective_gas_price: U256,
    pub avg_gas_used_per_block: U256,
    pub successes: u64,
    pub failures: u64,
    /// Artifacts without an outcome when collection gave up.
    pub unresolved: u64,
    /// Resolved transactions over the time spanned by the collected blocks.
    pub realized_tps: f64,
}

impl SubmitMetrics {
    pub fn resolved(&self) -> u64 {
        self.successes + self.failures
    }

    /// `(distance, count)` for every distance up to the largest observed one,
    /// gaps filled with zero.
    pub fn inclusion_distance_rows(&self) -> Vec<(u64, u64)> {
        let max_distance = match self.inclusion_distance.keys().next_back() {
            Some(max) => *max,
            None => return Vec::new(),
        };
        (0..=max_distance)
            .map(|distance| {
                (
                    distance,
                    self.inclusion_distance
                        .get(&distance)
                        .copied()
                        .unwrap_or(0),
                )
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CallMetrics {
    pub tps: u64,
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
    pub error_messages: Vec<String>,
}

impl CallMetrics {
    pub fn new(tps: u64, stats: CallStats) -> Self {
        Self {
            tps,
            sent: stats.sent,
            received: stats.received,
            errors: stats.errors,
            error_messages: stats.error_messages,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TestMetrics {
    Submit(SubmitMetrics),
    Call(CallMetrics),
}

impl TestMetrics {
    /// Label/value pairs, same shape for both modes.
    pub fn summary_rows(&self) -> Vec<(&'static str, String)> {
        match self {
            TestMetrics::Submit(m) => vec![
                ("TPS", m.tps.to_string()),
                ("Realized TPS", format!("{:.2}", m.realized_tps)),
                ("Txs/Block", format!("{:.2}", m.avg_txs_per_block)),
                (
                    "Avg Inclusion Time (s)",
                    format!("{:.3}", m.avg_inclusion_latency.as_secs_f64()),
                ),
                ("Avg Gas Price", m.avg_effective_gas_price.to_string()),
                ("Gas/Block", m.avg_gas_used_per_block.to_string()),
                ("Success", m.successes.to_string()),
                ("Failed", m.failures.to_string()),
                ("Unresolved", m.unresolved.to_string()),
            ],
            TestMetrics::Call(m) => vec![
                ("TPS", m.tps.to_string()),
                ("Sent", m.sent.to_string()),
                ("Received", m.received.to_string()),
                ("Errors", m.errors.to_string()),
            ],
        }
    }
}

/// Milliseconds from submission to the timestamp of the including block, for
/// every resolved artifact whose block was collected. Negative spans count as
/// zero.
pub fn inclusion_latencies_ms<'a>(
    artifacts: impl IntoIterator<Item = &'a SignedArtifact> + 'a,
    blocks: &'a [BlockSummary],
) -> impl Iterator<Item = u64> + 'a {
    let timestamps = blocks
        .iter()
        .map(|block| (block.hash, block.timestamp))
        .collect::<HashMap<H256, u64>>();
    artifacts.into_iter().filter_map(move |artifact| {
        let outcome = artifact.outcome()?;
        let block_timestamp = timestamps.get(&outcome.block_hash)?;
        let submitted_at = artifact.submitted_at()?;
        Some(
            block_timestamp
                .saturating_mul(1000)
                .saturating_sub(submitted_at.as_millis() as u64),
        )
    })
}

pub fn aggregate_submit<'a>(
    tps: u64,
    artifacts: impl IntoIterator<Item = &'a SignedArtifact> + Clone + 'a,
    blocks: &'a [BlockSummary],
) -> SubmitMetrics {
    let mut metrics = SubmitMetrics {
        tps,
        ..Default::default()
    };

    if !blocks.is_empty() {
        let total_txs: usize = blocks.iter().map(|b| b.transaction_count).sum();
        let total_gas = blocks
            .iter()
            .fold(U256::zero(), |acc, b| acc.saturating_add(b.gas_used));
        metrics.avg_txs_per_block = total_txs as f64 / blocks.len() as f64;
        metrics.avg_gas_used_per_block = total_gas / U256::from(blocks.len());
    }

    let mut total_price = U256::zero();
    for artifact in artifacts.clone() {
        let outcome = match artifact.outcome() {
            Some(outcome) => outcome,
            None => {
                metrics.unresolved += 1;
                continue;
            },
        };
        let distance = outcome
            .block_number
            .saturating_sub(artifact.submitted_height().unwrap_or(outcome.block_number));
        *metrics.inclusion_distance.entry(distance).or_insert(0) += 1;
        total_price = total_price.saturating_add(outcome.effective_gas_price);
        if outcome.success {
            metrics.successes += 1;
        } else {
            metrics.failures += 1;
        }
    }

    let resolved = metrics.resolved();
    if resolved > 0 {
        let total_latency_ms =
            inclusion_latencies_ms(artifacts, blocks).fold(0u64, u64::saturating_add);
        metrics.avg_inclusion_latency = Duration::from_millis(total_latency_ms / resolved);
        metrics.avg_effective_gas_price = total_price / U256::from(resolved);
    }

    if let (Some(first), Some(last)) = (blocks.first(), blocks.last()) {
        let span = last.timestamp.saturating_sub(first.timestamp);
        if span > 0 {
            metrics.realized_tps = resolved as f64 / span as f64;
        }
    }
    metrics
}


#[cfg(test)]
pub mod proptests {
    use super::tests::{artifact, block};
    use super::*;
    use proptest::prelude::*;

    fn arb_artifact() -> impl Strategy<Value = SignedArtifact> {
        (
            0u64..100,
            0u64..10_000_000,
            proptest::option::of((0u64..120, any::<bool>(), 0u64..1_000_000)),
        )
            .prop_map(|(height, at, outcome)| artifact(height, at, outcome))
    }

    proptest! {
        #[test]
        fn histogram_sums_to_resolved(
            artifacts in proptest::collection::vec(arb_artifact(), 0..64),
            block_numbers in proptest::collection::btree_set(0u64..120, 0..16),
        ) {
            let blocks = block_numbers
                .into_iter()
                .map(|n| block(n, 3, 21_000, n * 2))
                .collect::<Vec<_>>();
            let metrics = aggregate_submit(10, &artifacts, &blocks);

            let resolved = artifacts.iter().filter(|a| a.is_resolved()).count() as u64;
            prop_assert_eq!(metrics.inclusion_distance.values().sum::<u64>(), resolved);
            prop_assert_eq!(metrics.resolved(), resolved);
            prop_assert_eq!(metrics.unresolved, artifacts.len() as u64 - resolved);
            prop_assert!(metrics.avg_txs_per_block.is_finite());
            prop_assert!(metrics.realized_tps.is_finite());
        }

        #[test]
        fn empty_inputs_yield_zeroes(tps in 0u64..10_000) {
            let metrics = aggregate_submit(tps, &Vec::<SignedArtifact>::new(), &[]);
            prop_assert_eq!(metrics, SubmitMetrics { tps, ..Default::default() });
        }
    }
}
