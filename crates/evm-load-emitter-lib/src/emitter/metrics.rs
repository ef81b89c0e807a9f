// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process-wide Prometheus counters for the emitter.
//!
//! Registered in the default registry; the binary doesn't serve them, but an
//! embedding process can gather and push them.

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram, register_int_counter, Histogram, IntCounter,
};

/// Counter for total transactions submitted across all workers.
pub static EMITTER_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "evm_emitter_submitted_total",
        "Total number of transactions submitted by the emitter"
    )
    .unwrap()
});

/// Counter for total failed transaction submissions.
pub static EMITTER_FAILED_SUBMISSION: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "evm_emitter_failed_submission_total",
        "Total number of failed transaction submissions"
    )
    .unwrap()
});

/// Counter for transactions whose outcome was observed.
pub static EMITTER_RESOLVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "evm_emitter_resolved_total",
        "Total number of transactions with a confirmed outcome"
    )
    .unwrap()
});

/// Counter for transactions given up on after the last polling attempt.
pub static EMITTER_ABANDONED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "evm_emitter_abandoned_total",
        "Total number of transactions without an outcome after all polling attempts"
    )
    .unwrap()
});

pub static EMITTER_CALLS_SENT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "evm_emitter_calls_sent_total",
        "Total number of read-only contract calls issued"
    )
    .unwrap()
});

pub static EMITTER_CALLS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "evm_emitter_calls_failed_total",
        "Total number of read-only contract calls that returned an error"
    )
    .unwrap()
});

/// Histogram for inclusion latency in seconds, submission to block timestamp.
/// Buckets range from 250ms to ~64 seconds (exponential).
pub static EMITTER_INCLUSION_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "evm_emitter_inclusion_latency_seconds",
        "Transaction latency from submission to block timestamp in seconds",
        exponential_buckets(0.25, 2.0, 9).unwrap()
    )
    .unwrap()
});

pub fn record_submission_stats(submitted: u64, failed: u64) {
    EMITTER_SUBMITTED.inc_by(submitted);
    EMITTER_FAILED_SUBMISSION.inc_by(failed);
}

pub fn record_collection_stats(resolved: u64, abandoned: u64) {
    EMITTER_RESOLVED.inc_by(resolved);
    EMITTER_ABANDONED.inc_by(abandoned);
}

pub fn record_call_stats(sent: u64, failed: u64) {
    EMITTER_CALLS_SENT.inc_by(sent);
    EMITTER_CALLS_FAILED.inc_by(failed);
}

pub fn record_inclusion_latency_ms(latency_ms: u64) {
    EMITTER_INCLUSION_LATENCY_SECONDS.observe(latency_ms as f64 / 1000.0);
}
