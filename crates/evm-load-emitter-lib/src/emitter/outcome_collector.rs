// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reconciles submitted artifacts against their on-chain outcomes.
//!
//! Each identity runs its own bounded polling loop:
//!
//! ```text
//! Pending(1) -sweep-> Resolved
//!            -sweep-> Pending(2) -sweep-> ... Pending(max) -sweep-> Abandoned
//! ```
//!
//! A sweep queries every still unresolved artifact once. Every identity is
//! polled on its own task; outcome queries of all identities share one pacer, so the whole test polls at the configured
//! rate. Once every identity is done, each distinct block referenced by an
//! outcome is fetched exactly once.

use crate::{
    chain_client::{BlockSummary, ChainClient},
    config::CollectorConfig,
    emitter::{metrics, pacer::Pacer},
    errors::EmitterError,
    time_service::TimeService,
    transaction_generator::SignedArtifact,
};
use ethers::types::H256;
use futures::{future::join_all, StreamExt};
use std::mem;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, info, warn};

const BLOCK_FETCH_PARALLELISM: usize = 16;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectionState {
    /// `attempt` is the 1-based number of the next sweep.
    Pending { attempt: usize },
    Resolved,
    Abandoned,
}

pub struct OutcomeCollector {
    client: Arc<dyn ChainClient>,
    time_service: TimeService,
    config: CollectorConfig,
    poll_pacer: Pacer,
    block_hashes: Mutex<HashSet<H256>>,
    collected: Arc<AtomicU64>,
}

impl OutcomeCollector {
    pub fn new(
        client: Arc<dyn ChainClient>,
        time_service: TimeService,
        config: CollectorConfig,
    ) -> Self {
        Self {
            client,
            poll_pacer: Pacer::new(config.poll_rate, time_service.clone()),
            time_service,
            config,
            block_hashes: Mutex::new(HashSet::new()),
            collected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of artifacts resolved so far, across all identities.
    pub fn collected_counter(&self) -> Arc<AtomicU64> {
        self.collected.clone()
    }

    /// Polls every identity's artifacts concurrently until each identity is
    /// resolved or abandoned. Returns the terminal state per identity.
    pub async fn collect(
        self: &Arc<Self>,
        artifacts: &mut [Vec<SignedArtifact>],
    ) -> Vec<CollectionState> {
        let workers = artifacts
            .iter_mut()
            .map(|slot| {
                let collector = self.clone();
                let mut owned = mem::take(slot);
                tokio::spawn(async move {
                    let state = collector.collect_identity(&mut owned).await;
                    (owned, state)
                })
            })
            .collect::<Vec<_>>();

        let mut states = Vec::with_capacity(workers.len());
        for (slot, result) in artifacts.iter_mut().zip(join_all(workers).await) {
            match result {
                Ok((owned, state)) => {
                    *slot = owned;
                    states.push(state);
                },
                Err(e) => {
                    warn!("Collection worker failed: {}", e);
                    states.push(CollectionState::Abandoned);
                },
            }
        }

        let abandoned = artifacts
            .iter()
            .flatten()
            .filter(|artifact| !artifact.is_resolved())
            .count() as u64;
        metrics::record_collection_stats(self.collected.load(Ordering::Relaxed), abandoned);
        states
    }

    async fn collect_identity(&self, artifacts: &mut [SignedArtifact]) -> CollectionState {
        let max_attempts = self.config.max_attempts.max(1);
        let mut state = CollectionState::Pending { attempt: 1 };
        loop {
            state = match state {
                CollectionState::Pending { attempt } => {
                    if self.sweep(artifacts).await {
                        CollectionState::Resolved
                    } else if attempt >= max_attempts {
                        let unresolved = artifacts.iter().filter(|a| !a.is_resolved()).count();
                        if let Some(first) = artifacts.first() {
                            warn!(
                                "[{:?}] Giving up on {} transactions after {} attempts",
                                first.sender(),
                                unresolved,
                                attempt
                            );
                        }
                        CollectionState::Abandoned
                    } else {
                        self.time_service
                            .sleep(self.config.attempt_interval())
                            .await;
                        CollectionState::Pending {
                            attempt: attempt + 1,
                        }
                    }
                },
                terminal => return terminal,
            };
        }
    }

    /// Queries each unresolved artifact once. Returns whether all of them are
    /// resolved afterwards.
    async fn sweep(&self, artifacts: &mut [SignedArtifact]) -> bool {
        for artifact in artifacts.iter_mut().filter(|a| !a.is_resolved()) {
            self.poll_pacer.wait().await;
            match self.client.fetch_outcome(artifact.hash()).await {
                Ok(Some(outcome)) => {
                    if artifact.resolve(outcome) {
                        self.block_hashes.lock().insert(outcome.block_hash);
                        self.collected.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Ok(None) => debug!("Transaction {:?} not mined yet", artifact.hash()),
                Err(e) => debug!(
                    "Outcome of {:?} not available yet: {:#}",
                    artifact.hash(),
                    e
                ),
            }
        }
        artifacts.iter().all(SignedArtifact::is_resolved)
    }

    /// Fetches every distinct block referenced by a resolved outcome, sorted by
    /// height. Blocks that can't be fetched are left out and reported.
    pub async fn fetch_blocks(&self) -> (Vec<BlockSummary>, Vec<EmitterError>) {
        let hashes = self.block_hashes.lock().iter().copied().collect::<Vec<_>>();
        info!("Fetching {} blocks", hashes.len());

        let results = futures::stream::iter(hashes.into_iter().map(|hash| async move {
            self.client
                .fetch_block(hash)
                .await
                .map_err(|source| EmitterError::BlockFetch { hash, source })
        }))
        .buffer_unordered(BLOCK_FETCH_PARALLELISM)
        .collect::<Vec<_>>()
        .await;

        let mut blocks = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    warn!("{}", e);
                    errors.push(e);
                },
            }
        }
        blocks.sort_by_key(|block| block.number);
        (blocks, errors)
    }
}
