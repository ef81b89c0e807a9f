// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod local_account_generator;
pub mod metrics;
pub mod outcome_collector;
pub mod pacer;
pub mod stats;
pub mod submission_worker;

use crate::{
    chain_client::{BlockSummary, CallRequest, ChainClient},
    config::{CollectorConfig, TestCaseConfig, TestMode},
    errors::EmitterError,
    identity::Identity,
    time_service::TimeService,
    transaction_generator::{
        call_encoder::{encode_function_call, parse_address, AbiCallEncoder},
        generate_filler_payload,
        p2p_transaction_generator::{P2PTransactionGenerator, Receiver},
        SignedArtifact, TransactionBuilder, TransactionGenerator,
    },
};
use ethers::types::{Address, Bytes, U256};
use futures::future::join_all;
use outcome_collector::{CollectionState, OutcomeCollector};
use pacer::Pacer;
use stats::{aggregate_submit, CallMetrics, TestMetrics};
use std::{
    mem,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use submission_worker::{CallStats, SubmissionWorker, SubmitStats};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Body of every request a test sends.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TestPayload {
    /// Self-transfer carrying `size` filler bytes.
    Filler { size: usize },
    /// Pre-encoded call of a contract function.
    ContractCall { contract: Address, data: Bytes },
}

#[derive(Clone, Debug)]
pub struct EmitJobRequest {
    name: String,
    mode: TestMode,
    tps: u64,
    duration: Duration,
    senders: usize,
    value: U256,
    payload: TestPayload,
}

impl EmitJobRequest {
    pub fn new(name: impl Into<String>, mode: TestMode) -> Self {
        Self {
            name: name.into(),
            mode,
            tps: 1,
            duration: Duration::from_secs(1),
            senders: 1,
            value: U256::zero(),
            payload: TestPayload::Filler { size: 0 },
        }
    }

    /// Validates a configured test and resolves its payload. A contract
    /// call's arguments are checked and encoded here, once per test.
    pub fn from_config(name: &str, config: &TestCaseConfig) -> Result<Self, EmitterError> {
        let params = &config.config;
        let invalid = |reason: &str| EmitterError::InvalidTestConfig {
            test: name.to_string(),
            reason: reason.to_string(),
        };
        if params.tps == 0 {
            return Err(invalid("tps must be greater than 0"));
        }
        if params.duration == 0 {
            return Err(invalid("duration must be greater than 0"));
        }
        if params.senders == 0 {
            return Err(invalid("senders must be greater than 0"));
        }

        let payload = match params.contract_target() {
            Some(target) => {
                let contract = parse_address(target.address)
                    .ok_or_else(|| invalid("contract address must be a 20-byte hex string"))?;
                let encoder = AbiCallEncoder::from_abi_json(target.abi, target.function)?;
                TestPayload::ContractCall {
                    contract,
                    data: encode_function_call(&encoder, target.params)?,
                }
            },
            None if config.mode == TestMode::Call => {
                return Err(EmitterError::MissingContract {
                    test: name.to_string(),
                })
            },
            None => TestPayload::Filler {
                size: params.data_size,
            },
        };

        Ok(Self::new(name, config.mode)
            .tps(params.tps)
            .duration(Duration::from_secs(params.duration))
            .senders(params.senders)
            .value(params.value_wei(name))
            .payload(payload))
    }

    pub fn tps(mut self, tps: u64) -> Self {
        self.tps = tps;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn senders(mut self, senders: usize) -> Self {
        self.senders = senders;
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn payload(mut self, payload: TestPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> TestMode {
        self.mode
    }

    pub fn sender_count(&self) -> usize {
        self.senders
    }

    /// `tps * duration`.
    pub fn request_count(&self) -> u64 {
        self.tps.saturating_mul(self.duration.as_secs())
    }

    /// Even share of [`Self::request_count`] per sender, remainder dropped.
    pub fn transactions_per_identity(&self) -> usize {
        if self.senders == 0 {
            return 0;
        }
        (self.request_count() / self.senders as u64) as usize
    }
}

/// One test case: its request plus everything recorded while it runs.
#[derive(Debug)]
pub struct LoadTest {
    request: EmitJobRequest,
    /// Indices into the runner's identity pool.
    identities: Vec<usize>,
    senders: Vec<Address>,
    artifacts: Vec<Vec<SignedArtifact>>,
    start_height: u64,
    end_height: u64,
    call_stats: CallStats,
    blocks: Vec<BlockSummary>,
    collection: Vec<CollectionState>,
    errors: Vec<EmitterError>,
}

impl LoadTest {
    pub fn new(request: EmitJobRequest, identities: Vec<usize>, pool: &[Identity]) -> Self {
        let senders = identities
            .iter()
            .map(|index| pool[*index].address())
            .collect::<Vec<_>>();
        Self {
            artifacts: vec![Vec::new(); senders.len()],
            request,
            identities,
            senders,
            start_height: 0,
            end_height: 0,
            call_stats: CallStats::default(),
            blocks: Vec::new(),
            collection: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn request(&self) -> &EmitJobRequest {
        &self.request
    }

    pub fn identity_indices(&self) -> &[usize] {
        &self.identities
    }

    /// Artifacts per sender, in sender order.
    pub fn artifacts(&self) -> &[Vec<SignedArtifact>] {
        &self.artifacts
    }

    pub fn collection_states(&self) -> &[CollectionState] {
        &self.collection
    }

    pub fn blocks(&self) -> &[BlockSummary] {
        &self.blocks
    }

    pub fn take_errors(&mut self) -> Vec<EmitterError> {
        std::mem::take(&mut self.errors)
    }

    fn artifact_count(&self) -> u64 {
        self.artifacts.iter().map(|a| a.len() as u64).sum()
    }

    pub fn report(&self) -> TestReport {
        let metrics = match self.request.mode {
            TestMode::Send => TestMetrics::Submit(aggregate_submit(
                self.request.tps,
                self.artifacts.iter().flatten(),
                &self.blocks,
            )),
            TestMode::Call => {
                TestMetrics::Call(CallMetrics::new(self.request.tps, self.call_stats.clone()))
            },
        };
        TestReport {
            name: self.request.name.clone(),
            mode: self.request.mode,
            senders: self.senders.len(),
            start_height: self.start_height,
            end_height: self.end_height,
            blocks: self.blocks.clone(),
            metrics,
        }
    }
}

/// Final result of one test.
#[derive(Clone, Debug, PartialEq)]
pub struct TestReport {
    pub name: String,
    pub mode: TestMode,
    pub senders: usize,
    pub start_height: u64,
    pub end_height: u64,
    /// Collected blocks, ascending by height.
    pub blocks: Vec<BlockSummary>,
    pub metrics: TestMetrics,
}

impl TestReport {
    pub fn summary_rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Senders", self.senders.to_string()),
            ("Start Block", self.start_height.to_string()),
            ("End Block", self.end_height.to_string()),
        ];
        rows.extend(self.metrics.summary_rows());
        rows
    }
}

/// Runs the phases of a [`LoadTest`] against one chain client.
#[derive(Clone)]
pub struct TxnEmitter {
    client: Arc<dyn ChainClient>,
    time_service: TimeService,
    collector_config: CollectorConfig,
}

impl TxnEmitter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        time_service: TimeService,
        collector_config: CollectorConfig,
    ) -> Self {
        Self {
            client,
            time_service,
            collector_config,
        }
    }

    pub fn time_service(&self) -> &TimeService {
        &self.time_service
    }

    pub fn collector_config(&self) -> &CollectorConfig {
        &self.collector_config
    }

    /// Signs every artifact of a send test. Call tests have nothing to build.
    /// Errors are fatal for the run.
    pub async fn build(
        &self,
        test: &mut LoadTest,
        pool: &mut [Identity],
    ) -> Result<(), EmitterError> {
        if test.request.mode == TestMode::Call {
            return Ok(());
        }
        let (receiver, payload) = match &test.request.payload {
            TestPayload::Filler { size } => (Receiver::Sender, generate_filler_payload(*size)),
            TestPayload::ContractCall { contract, data } => {
                (Receiver::Fixed(*contract), data.clone())
            },
        };
        let generator = P2PTransactionGenerator::new(
            TransactionBuilder::new(self.client.clone()),
            receiver,
            test.request.value,
            payload,
        );

        let transactions_per_identity = test.request.transactions_per_identity();
        for (slot, index) in test.identities.iter().enumerate() {
            test.artifacts[slot] = generator
                .generate_transactions(&mut pool[*index], transactions_per_identity)
                .await?;
        }
        info!(
            "Test '{}': signed {} transactions for {} senders",
            test.request.name,
            test.artifact_count(),
            test.senders.len()
        );
        Ok(())
    }

    /// Sends a test's load with one worker per sender, all paced on a single
    /// signal at the test's rate.
    pub async fn dispatch(&self, test: &mut LoadTest) {
        let pacer = Arc::new(Pacer::new(test.request.tps, self.time_service.clone()));
        test.start_height = self.current_height_or(0).await;
        info!(
            "Test '{}': dispatching at {} tps from block {}",
            test.request.name, test.request.tps, test.start_height
        );

        match test.request.mode {
            TestMode::Send => {
                let start_height = test.start_height;
                let workers = test
                    .senders
                    .iter()
                    .zip(test.artifacts.iter_mut())
                    .map(|(sender, artifacts)| {
                        let worker = SubmissionWorker::new(
                            *sender,
                            self.client.clone(),
                            pacer.clone(),
                            self.time_service.clone(),
                            start_height,
                        );
                        tokio::spawn(worker.submit_all(mem::take(artifacts)))
                    })
                    .collect::<Vec<_>>();

                let mut stats = SubmitStats::default();
                for (slot, result) in join_all(workers).await.into_iter().enumerate() {
                    match result {
                        Ok((artifacts, worker_stats)) => {
                            test.artifacts[slot] = artifacts;
                            stats = stats.merge(worker_stats);
                        },
                        Err(e) => warn!(
                            "Test '{}': submission worker for {:?} failed: {}",
                            test.request.name, test.senders[slot], e
                        ),
                    }
                }
                info!(
                    "Test '{}': submitted {}, failed {}",
                    test.request.name, stats.submitted, stats.failed
                );
            },
            TestMode::Call => {
                let call = match &test.request.payload {
                    TestPayload::ContractCall { contract, data } => CallRequest {
                        from: None,
                        to: *contract,
                        data: data.clone(),
                    },
                    TestPayload::Filler { .. } => {
                        test.errors.push(EmitterError::MissingContract {
                            test: test.request.name.clone(),
                        });
                        return;
                    },
                };
                let calls_per_identity = test.request.request_count() as usize;
                let start_height = test.start_height;
                let workers = test
                    .senders
                    .iter()
                    .map(|sender| {
                        let worker = SubmissionWorker::new(
                            *sender,
                            self.client.clone(),
                            pacer.clone(),
                            self.time_service.clone(),
                            start_height,
                        );
                        tokio::spawn(worker.call_all(call.clone(), calls_per_identity))
                    })
                    .collect::<Vec<_>>();

                let mut stats = CallStats::default();
                for (slot, result) in join_all(workers).await.into_iter().enumerate() {
                    match result {
                        Ok(worker_stats) => stats = stats.merge(worker_stats),
                        Err(e) => warn!(
                            "Test '{}': call worker for {:?} failed: {}",
                            test.request.name, test.senders[slot], e
                        ),
                    }
                }
                test.call_stats = stats;
                info!(
                    "Test '{}': {} calls sent, {} errors",
                    test.request.name, test.call_stats.sent, test.call_stats.errors
                );
            },
        }

        test.end_height = self.current_height_or(test.start_height).await;
    }

    /// Polls outcomes of a send test and fetches the blocks they landed in.
    pub async fn collect(&self, test: &mut LoadTest) {
        if test.request.mode == TestMode::Call {
            return;
        }
        let collector = Arc::new(OutcomeCollector::new(
            self.client.clone(),
            self.time_service.clone(),
            self.collector_config.clone(),
        ));
        let progress = spawn_progress_logger(
            test.request.name.clone(),
            collector.collected_counter(),
            test.artifact_count(),
        );
        test.collection = collector.collect(&mut test.artifacts).await;
        progress.abort();

        let (blocks, errors) = collector.fetch_blocks().await;
        test.blocks = blocks;
        test.errors.extend(errors);
        stats::inclusion_latencies_ms(test.artifacts.iter().flatten(), &test.blocks)
            .for_each(metrics::record_inclusion_latency_ms);
        info!(
            "Test '{}': collected {}/{} outcomes from {} blocks",
            test.request.name,
            collector.collected_counter().load(Ordering::Relaxed),
            test.artifact_count(),
            test.blocks.len()
        );
    }

    /// Build, dispatch, collect and aggregate a single test.
    pub async fn emit_txn_for(
        &self,
        test: &mut LoadTest,
        pool: &mut [Identity],
    ) -> Result<TestReport, EmitterError> {
        self.build(test, pool).await?;
        self.dispatch(test).await;
        if test.request.mode == TestMode::Send {
            self.time_service
                .sleep(self.collector_config.initial_delay())
                .await;
            self.collect(test).await;
        }
        Ok(test.report())
    }

    async fn current_height_or(&self, fallback: u64) -> u64 {
        match self.client.current_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!("Failed to query current height, using {}: {:#}", fallback, e);
                fallback
            },
        }
    }
}

fn spawn_progress_logger(
    test: String,
    collected: Arc<AtomicU64>,
    total: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_LOG_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            info!(
                "Test '{}': collected transactions {}/{}",
                test,
                collected.load(Ordering::Relaxed),
                total
            );
        }
    })
}
