// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios against the in-memory node.


use crate::{
    config::{CollectorConfig, EmitterConfig, TestMode},
    emitter::{
        local_account_generator::{LocalAccountGenerator, PrivateKeyAccountGenerator},
        outcome_collector::CollectionState,
        stats::{SubmitMetrics, TestMetrics},
        EmitJobRequest, LoadTest, TestPayload, TxnEmitter,
    },
    errors::EmitterError,
    identity::{
        test_utils::{DEV_PRIVATE_KEYS, TEST_CHAIN_ID},
        Identity,
    },
    runner::Runner,
    time_service::TimeService,
    transaction_generator::call_encoder::tests::TEST_ABI,
};
use claims::{assert_err, assert_matches, assert_ok};
use ethers::types::{Address, Bytes};
use mock_client::MockChainClient;
use std::{collections::BTreeMap, sync::Arc, time::Duration};

fn collector_config() -> CollectorConfig {
    CollectorConfig {
        max_attempts: 3,
        attempt_interval_secs: 5,
        poll_rate: 600,
        initial_delay_secs: 5,
    }
}

async fn identity_pool(client: &MockChainClient, count: usize) -> Vec<Identity> {
    PrivateKeyAccountGenerator::new(
        DEV_PRIVATE_KEYS[..count]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        TEST_CHAIN_ID,
    )
    .gen_local_accounts(client)
    .await
    .unwrap()
}

fn submit_metrics(metrics: &TestMetrics) -> &SubmitMetrics {
    match metrics {
        TestMetrics::Submit(metrics) => metrics,
        TestMetrics::Call(_) => panic!("expected submit metrics"),
    }
}

#[tokio::test]
async fn test_two_identities_at_rate_ten_for_one_second() {
    let client = Arc::new(MockChainClient::new());
    client.set_height(100);
    client.auto_include(1);
    let mut pool = identity_pool(&client, 2).await;

    let emitter = TxnEmitter::new(client.clone(), TimeService::mock(), collector_config());
    let request = EmitJobRequest::new("transfer", TestMode::Send)
        .tps(10)
        .duration(Duration::from_secs(1))
        .senders(2)
        .payload(TestPayload::Filler { size: 4 });
    let mut test = LoadTest::new(request, vec![0, 1], &pool);

    let report = assert_ok!(emitter.emit_txn_for(&mut test, &mut pool).await);

    assert_eq!(test.artifacts().len(), 2);
    for (artifacts, identity) in test.artifacts().iter().zip(pool.iter()) {
        assert_eq!(artifacts.len(), 5);
        assert_eq!(
            artifacts.iter().map(|a| a.nonce()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(artifacts.iter().all(|a| a.sender() == identity.address()));
        assert_eq!(identity.sequence_number(), 5);
    }
    assert_eq!(client.submitted().len(), 10);
    assert_eq!(test.collection_states(), &[CollectionState::Resolved; 2]);

    let metrics = submit_metrics(&report.metrics);
    assert_eq!(report.senders, 2);
    assert_eq!(report.start_height, 100);
    assert_eq!(metrics.successes, 10);
    assert_eq!(metrics.failures, 0);
    assert_eq!(metrics.unresolved, 0);
    assert_eq!(metrics.inclusion_distance.get(&1), Some(&10));
    assert_eq!(metrics.avg_txs_per_block, 10.0);
    assert_eq!(report.blocks.len(), 1);
}

#[tokio::test]
async fn test_end_height_is_taken_after_all_workers_finish() {
    let client = Arc::new(MockChainClient::new());
    client.set_height(50);
    client.advance_height_on_submit();
    client.auto_include(1);
    let mut pool = identity_pool(&client, 2).await;

    let emitter = TxnEmitter::new(client.clone(), TimeService::mock(), collector_config());
    let request = EmitJobRequest::new("moving-chain", TestMode::Send)
        .tps(10)
        .duration(Duration::from_secs(1))
        .senders(2);
    let mut test = LoadTest::new(request, vec![0, 1], &pool);

    let report = assert_ok!(emitter.emit_txn_for(&mut test, &mut pool).await);
    assert_eq!(report.start_height, 50);
    assert_eq!(report.end_height, 60);
    assert_eq!(report.end_height, client.height());

    let mut heights = test
        .artifacts()
        .iter()
        .flatten()
        .filter_map(|a| a.submitted_height())
        .collect::<Vec<_>>();
    heights.sort_unstable();
    assert_eq!(heights, (50..60).collect::<Vec<_>>());

    let metrics = submit_metrics(&report.metrics);
    assert_eq!(metrics.inclusion_distance.get(&1), Some(&10));
    assert_eq!(report.blocks.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_run_on_their_own_tasks() {
    let client = Arc::new(MockChainClient::new());
    client.auto_include(2);
    let mut pool = identity_pool(&client, 4).await;

    let emitter = TxnEmitter::new(client.clone(), TimeService::mock(), collector_config());
    let request = EmitJobRequest::new("parallel", TestMode::Send)
        .tps(20)
        .duration(Duration::from_secs(2))
        .senders(4);
    let mut test = LoadTest::new(request, vec![0, 1, 2, 3], &pool);

    let report = assert_ok!(emitter.emit_txn_for(&mut test, &mut pool).await);
    assert_eq!(client.submitted().len(), 40);
    assert_eq!(test.collection_states(), &[CollectionState::Resolved; 4]);
    for (artifacts, identity) in test.artifacts().iter().zip(pool.iter()) {
        assert_eq!(artifacts.len(), 10);
        assert!(artifacts.iter().all(|a| a.sender() == identity.address()));
        assert!(artifacts.iter().all(|a| a.is_resolved()));
    }
    let metrics = submit_metrics(&report.metrics);
    assert_eq!(metrics.successes, 40);
    assert_eq!(metrics.inclusion_distance.get(&2), Some(&40));
}

#[tokio::test]
async fn test_nonces_continue_from_pending_state() {
    let client = Arc::new(MockChainClient::new());
    let keys = DEV_PRIVATE_KEYS[..2]
        .iter()
        .map(|k| Identity::wallet_from_private_key(0, k, TEST_CHAIN_ID).unwrap())
        .collect::<Vec<_>>();
    client.set_pending_nonce(ethers::signers::Signer::address(&keys[0]), 7);
    client.set_pending_nonce(ethers::signers::Signer::address(&keys[1]), 30);
    let mut pool = identity_pool(&client, 2).await;

    let emitter = TxnEmitter::new(client.clone(), TimeService::mock(), collector_config());
    let request = EmitJobRequest::new("transfer", TestMode::Send)
        .tps(10)
        .duration(Duration::from_secs(1))
        .senders(2);
    let mut test = LoadTest::new(request, vec![0, 1], &pool);
    assert_ok!(emitter.build(&mut test, &mut pool).await);

    let nonces = test
        .artifacts()
        .iter()
        .map(|artifacts| artifacts.iter().map(|a| a.nonce()).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    assert_eq!(nonces, vec![vec![7, 8, 9, 10, 11], vec![
        30, 31, 32, 33, 34
    ]]);
}

#[tokio::test]
async fn test_unmined_transactions_are_abandoned() {
    let client = Arc::new(MockChainClient::new());
    let time = TimeService::mock();
    let mut pool = identity_pool(&client, 1).await;

    let emitter = TxnEmitter::new(client.clone(), time.clone(), collector_config());
    let request = EmitJobRequest::new("never-mined", TestMode::Send)
        .tps(4)
        .duration(Duration::from_secs(1));
    let mut test = LoadTest::new(request, vec![0], &pool);

    let report = assert_ok!(emitter.emit_txn_for(&mut test, &mut pool).await);
    assert_eq!(test.collection_states(), &[CollectionState::Abandoned]);

    let metrics = submit_metrics(&report.metrics);
    assert_eq!(metrics.successes, 0);
    assert_eq!(metrics.failures, 0);
    assert_eq!(metrics.unresolved, 4);
    assert!(metrics.inclusion_distance.is_empty());
    assert_eq!(metrics.avg_inclusion_latency, Duration::ZERO);
    assert_eq!(metrics.avg_txs_per_block, 0.0);
    // every artifact polled once per attempt, no more
    let hash = test.artifacts()[0][0].hash();
    assert_eq!(client.outcome_queries(hash), 3);
}

#[tokio::test]
async fn test_call_mode_counts_errors() {
    let client = Arc::new(MockChainClient::new());
    client.fail_calls(&[2, 7, 11]);
    let mut pool = identity_pool(&client, 1).await;

    let emitter = TxnEmitter::new(client.clone(), TimeService::mock(), collector_config());
    let request = EmitJobRequest::new("read", TestMode::Call)
        .tps(10)
        .duration(Duration::from_secs(2))
        .payload(TestPayload::ContractCall {
            contract: Address::repeat_byte(0x5f),
            data: Bytes::from(vec![0x70, 0xa0, 0x82, 0x31]),
        });
    let mut test = LoadTest::new(request, vec![0], &pool);

    let report = assert_ok!(emitter.emit_txn_for(&mut test, &mut pool).await);
    match report.metrics {
        TestMetrics::Call(metrics) => {
            assert_eq!(metrics.sent, 20);
            assert_eq!(metrics.received, 17);
            assert_eq!(metrics.errors, 3);
            assert_eq!(metrics.error_messages.len(), 3);
            assert!(metrics.error_messages[0].contains("execution reverted"));
        },
        TestMetrics::Submit(_) => panic!("expected call metrics"),
    }
    assert_eq!(client.calls_made(), 20);
    // nothing signed in call mode
    assert_eq!(pool[0].sequence_number(), 0);
    assert!(client.submitted().is_empty());
}

fn suite_config(tests: &str, senders: usize) -> EmitterConfig {
    let keys = DEV_PRIVATE_KEYS[..senders]
        .iter()
        .map(|k| format!("    - {}\n", k))
        .collect::<String>();
    let tests = if tests.is_empty() {
        "tests: {}\n".to_string()
    } else {
        format!("tests:\n{}", tests)
    };
    let yaml = format!(
        "app:\n  node:\n    rpc_url: http://127.0.0.1:8545\n    chain_id: {}\ncollector:\n  max_attempts: 2\n{}senders:\n  private_keys:\n{}",
        TEST_CHAIN_ID, tests, keys
    );
    EmitterConfig::parse(&yaml).unwrap()
}

#[tokio::test]
async fn test_suite_records_failures_and_runs_siblings() {
    let client = Arc::new(MockChainClient::new());
    client.auto_include(0);
    let mut config = suite_config(
        "  a-transfer:\n    type: send\n    config:\n      senders: 2\n      duration: 1\n      tps: 6\n  b-too-many:\n    type: send\n    config:\n      senders: 5\n      duration: 1\n      tps: 1\n  c-shared:\n    type: send\n    config:\n      senders: 1\n      duration: 1\n      tps: 2\n",
        2,
    );
    let mut bad_call = config.tests["c-shared"].clone();
    bad_call.mode = TestMode::Call;
    bad_call.config.contract = Some(crate::config::ContractConfig {
        address: Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string()),
        function: Some(crate::config::FunctionConfig {
            name: Some("mint".to_string()),
            abi: Some(TEST_ABI.to_string()),
            params: vec![],
        }),
    });
    config.tests.insert("d-unknown-function".to_string(), bad_call);

    let runner = Runner::new(client.clone(), TimeService::mock(), &config);
    let suite = assert_ok!(runner.run(&config).await);

    let names = suite
        .reports
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["a-transfer", "c-shared"]);

    let failures = suite
        .errors
        .iter()
        .map(|f| (f.test.as_str(), &f.error))
        .collect::<BTreeMap<_, _>>();
    assert_eq!(failures.len(), 2);
    assert_matches!(
        failures["b-too-many"],
        EmitterError::InsufficientIdentities { .. }
    );
    assert_matches!(failures["d-unknown-function"], EmitterError::UnknownFunction(_));

    // c-shared reuses the first sender after a-transfer: nonces don't collide
    assert_eq!(client.submitted().len(), 6 + 2);
    let shared = submit_metrics(&suite.reports[1].metrics);
    assert_eq!(shared.successes, 2);
    assert_eq!(submit_metrics(&suite.reports[0].metrics).successes, 6);
}

#[tokio::test]
async fn test_suite_without_tests() {
    let client = Arc::new(MockChainClient::new());
    let config = suite_config("", 1);
    let runner = Runner::new(client, TimeService::mock(), &config);
    let err = assert_err!(runner.run(&config).await);
    assert_matches!(err, EmitterError::EmptyTests);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_suite_aborts_on_fatal_build_error() {
    let client = Arc::new(MockChainClient::new());
    client.fail_fee_estimation();
    let config = suite_config(
        "  transfer:\n    type: send\n    config:\n      senders: 1\n      duration: 1\n      tps: 1\n",
        1,
    );
    let runner = Runner::new(client.clone(), TimeService::mock(), &config);
    let err = assert_err!(runner.run(&config).await);
    assert!(err.is_fatal());
    assert!(client.submitted().is_empty());
}
