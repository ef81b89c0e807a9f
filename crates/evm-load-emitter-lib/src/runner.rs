// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runs every configured test against one shared identity pool.
//!
//! Phases run suite-wide: all tests are built, then dispatched, then
//! collected, then aggregated. Tests whose senders don't overlap are
//! dispatched concurrently; a test that shares senders with an earlier one
//! waits for it. A failing test is recorded and its siblings carry on;
//! fatal errors abort the whole run.

use crate::{
    chain_client::ChainClient,
    config::{EmitterConfig, TestMode},
    emitter::{
        local_account_generator::{LocalAccountGenerator, PrivateKeyAccountGenerator},
        EmitJobRequest, LoadTest, TestReport, TxnEmitter,
    },
    errors::EmitterError,
    identity::Identity,
    time_service::TimeService,
};
use futures::future::join_all;
use std::{collections::HashSet, ops::Range, sync::Arc};
use tracing::{info, warn};

/// A non-fatal error and the test it aborted.
#[derive(Debug)]
pub struct TestFailure {
    pub test: String,
    pub error: EmitterError,
}

#[derive(Debug)]
pub struct SuiteReport {
    /// In test name order.
    pub reports: Vec<TestReport>,
    pub errors: Vec<TestFailure>,
}

pub struct Runner {
    client: Arc<dyn ChainClient>,
    emitter: TxnEmitter,
}

impl Runner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        time_service: TimeService,
        config: &EmitterConfig,
    ) -> Self {
        Self {
            emitter: TxnEmitter::new(client.clone(), time_service, config.collector.clone()),
            client,
        }
    }

    pub async fn run(&self, config: &EmitterConfig) -> Result<SuiteReport, EmitterError> {
        if config.tests.is_empty() {
            return Err(EmitterError::EmptyTests);
        }

        info!("Loading {} senders", config.senders.private_keys.len());
        let mut pool = PrivateKeyAccountGenerator::new(
            config.senders.private_keys.clone(),
            config.app.node.chain_id,
        )
        .gen_local_accounts(self.client.as_ref())
        .await?;

        let mut failures = Vec::new();
        let mut tests = self.prepare_tests(config, &pool, &mut failures);

        info!("Preparing and signing transactions");
        for test in tests.iter_mut() {
            self.emitter.build(test, &mut pool).await?;
        }

        info!("Begin sending transactions");
        for wave in dispatch_waves(&tests) {
            join_all(
                tests[wave]
                    .iter_mut()
                    .map(|test| self.emitter.dispatch(test)),
            )
            .await;
        }
        info!("Finished sending transactions");

        if tests.iter().any(|t| t.request().mode() == TestMode::Send) {
            self.emitter
                .time_service()
                .sleep(self.emitter.collector_config().initial_delay())
                .await;
            info!("Begin collecting outcomes");
            for test in tests.iter_mut() {
                self.emitter.collect(test).await;
            }
            info!("Finished collecting outcomes");
        }

        let mut reports = Vec::with_capacity(tests.len());
        for test in tests.iter_mut() {
            reports.push(test.report());
            let name = test.request().name().to_string();
            failures.extend(test.take_errors().into_iter().map(|error| TestFailure {
                test: name.clone(),
                error,
            }));
        }
        Ok(SuiteReport {
            reports,
            errors: failures,
        })
    }

    fn prepare_tests(
        &self,
        config: &EmitterConfig,
        pool: &[Identity],
        failures: &mut Vec<TestFailure>,
    ) -> Vec<LoadTest> {
        let mut assigner = IdentityAssigner::new(pool.len());
        let mut tests = Vec::with_capacity(config.tests.len());
        for (name, case) in config.tests.iter() {
            let prepared = EmitJobRequest::from_config(name, case).and_then(|request| {
                let identities = assigner.assign(name, request.sender_count())?;
                Ok(LoadTest::new(request, identities, pool))
            });
            match prepared {
                Ok(test) => tests.push(test),
                Err(error) => {
                    warn!("Skipping test '{}': {}", name, error);
                    failures.push(TestFailure {
                        test: name.clone(),
                        error,
                    });
                },
            }
        }
        tests
    }
}

/// Hands out identity subsets: disjoint while the pool lasts, then the first
/// `n` identities again.
#[derive(Debug)]
pub(crate) struct IdentityAssigner {
    pool_size: usize,
    next: usize,
}

impl IdentityAssigner {
    pub(crate) fn new(pool_size: usize) -> Self {
        Self { pool_size, next: 0 }
    }

    pub(crate) fn assign(
        &mut self,
        test: &str,
        requested: usize,
    ) -> Result<Vec<usize>, EmitterError> {
        if requested > self.pool_size {
            return Err(EmitterError::InsufficientIdentities {
                test: test.to_string(),
                requested,
                available: self.pool_size,
            });
        }
        if self.next + requested <= self.pool_size {
            let assigned = (self.next..self.next + requested).collect();
            self.next += requested;
            Ok(assigned)
        } else {
            info!("Test '{}' shares senders with earlier tests", test);
            Ok((0..requested).collect())
        }
    }
}

/// Splits tests into consecutive groups whose senders don't overlap.
fn dispatch_waves(tests: &[LoadTest]) -> Vec<Range<usize>> {
    let mut waves = Vec::new();
    let mut start = 0;
    let mut in_use = HashSet::new();
    for (i, test) in tests.iter().enumerate() {
        if test.identity_indices().iter().any(|id| in_use.contains(id)) {
            waves.push(start..i);
            start = i;
            in_use.clear();
        }
        in_use.extend(test.identity_indices().iter().copied());
    }
    if start < tests.len() {
        waves.push(start..tests.len());
    }
    waves
}
