// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    chain_client::{CallRequest, ChainClient},
    emitter::{metrics, pacer::Pacer},
    time_service::TimeService,
    transaction_generator::SignedArtifact,
};
use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, warn};

/// Submission results of one worker.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubmitStats {
    pub submitted: u64,
    pub failed: u64,
}

impl SubmitStats {
    pub fn merge(mut self, other: SubmitStats) -> Self {
        self.submitted += other.submitted;
        self.failed += other.failed;
        self
    }
}

/// Call-mode counters. `sent` counts every issued call, `received` the ones
/// that returned data; every failure leaves one message in `error_messages`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CallStats {
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
    pub error_messages: Vec<String>,
}

impl CallStats {
    pub fn merge(mut self, other: CallStats) -> Self {
        self.sent += other.sent;
        self.received += other.received;
        self.errors += other.errors;
        self.error_messages.extend(other.error_messages);
        self
    }
}

/// Drives one identity through the dispatch phase, pacing itself on a pacer
/// shared with the other identities of the test.
pub struct SubmissionWorker {
    sender: Address,
    client: Arc<dyn ChainClient>,
    pacer: Arc<Pacer>,
    time_service: TimeService,
    last_height: u64,
}

impl SubmissionWorker {
    pub fn new(
        sender: Address,
        client: Arc<dyn ChainClient>,
        pacer: Arc<Pacer>,
        time_service: TimeService,
        start_height: u64,
    ) -> Self {
        Self {
            sender,
            client,
            pacer,
            time_service,
            last_height: start_height,
        }
    }

    /// Submits `artifacts` in nonce order. A failed submission is logged and
    /// counted; the worker carries on with the next artifact. The artifacts
    /// are handed back with their submission height and time recorded.
    pub async fn submit_all(
        mut self,
        mut artifacts: Vec<SignedArtifact>,
    ) -> (Vec<SignedArtifact>, SubmitStats) {
        let mut stats = SubmitStats::default();
        for artifact in artifacts.iter_mut() {
            let height = self.current_height().await;
            artifact.mark_submitted(height, self.time_service.now_unix_time());
            match self.client.submit(artifact.raw().clone()).await {
                Ok(()) => stats.submitted += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        "[{:?}] Failed to submit transaction {:?} (nonce {}): {:#}",
                        self.sender,
                        artifact.hash(),
                        artifact.nonce(),
                        e
                    );
                },
            }
            self.pacer.wait().await;
        }
        metrics::record_submission_stats(stats.submitted, stats.failed);
        (artifacts, stats)
    }

    /// Issues `count` identical read-only calls from this worker's sender.
    pub async fn call_all(self, request: CallRequest, count: usize) -> CallStats {
        let request = CallRequest {
            from: Some(self.sender),
            ..request
        };
        let mut stats = CallStats::default();
        for _ in 0..count {
            stats.sent += 1;
            match self.client.call(&request).await {
                Ok(_) => stats.received += 1,
                Err(e) => {
                    stats.errors += 1;
                    stats.error_messages.push(format!("error: {:#}", e));
                },
            }
            self.pacer.wait().await;
        }
        metrics::record_call_stats(stats.sent, stats.errors);
        stats
    }

    async fn current_height(&mut self) -> u64 {
        match self.client.current_height().await {
            Ok(height) => self.last_height = height,
            Err(e) => debug!(
                "[{:?}] Height query failed, using last known height {}: {:#}",
                self.sender, self.last_height, e
            ),
        }
        self.last_height
    }
}
