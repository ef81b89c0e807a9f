// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod chain_client;
pub mod config;
pub mod emitter;
mod errors;
mod ethers_client;
pub mod identity;
mod runner;
pub mod time_service;
pub mod transaction_generator;

#[cfg(test)]
mod tests;

// These are the top level things you should need to run the emitter.
pub use config::{EmitterConfig, TestMode};
pub use errors::EmitterError;
pub use ethers_client::EthersChainClient;
pub use runner::{Runner, SuiteReport, TestFailure};

// We export these if you want finer grained control.
pub use chain_client::{BlockSummary, ChainClient, Outcome};
pub use emitter::{
    stats::{CallMetrics, SubmitMetrics, TestMetrics},
    EmitJobRequest, LoadTest, TestPayload, TestReport, TxnEmitter,
};
pub use time_service::TimeService;
