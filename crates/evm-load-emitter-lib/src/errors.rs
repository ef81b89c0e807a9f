// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::transaction_generator::call_encoder::ArgKind;
use ethers::types::{Address, H256};
use thiserror::Error;

/// Errors produced while preparing and running load tests.
///
/// Variants fall in two classes, see [`EmitterError::is_fatal`]: process-level
/// failures abort the whole run, everything else only aborts the test case it
/// was raised for.
#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("no tests configured, please define at least one test")]
    EmptyTests,

    #[error("failed to load private key for sender #{index}: {reason}")]
    InvalidPrivateKey { index: usize, reason: String },

    #[error("failed to retrieve pending nonce for address {address:?}: {source}")]
    NonceSourceUnavailable {
        address: Address,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to estimate fees: {0}")]
    FeeEstimation(#[source] anyhow::Error),

    #[error("failed to estimate gas for sender {sender:?}: {source}")]
    GasEstimation {
        sender: Address,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to sign transaction for sender {sender:?}: {reason}")]
    Signing { sender: Address, reason: String },

    #[error("test '{test}' requests {requested} senders but only {available} are configured")]
    InsufficientIdentities {
        test: String,
        requested: usize,
        available: usize,
    },

    #[error("invalid configuration for test '{test}': {reason}")]
    InvalidTestConfig { test: String, reason: String },

    #[error("test '{test}' requires a contract (address, function name and abi)")]
    MissingContract { test: String },

    #[error("invalid contract interface description: {0}")]
    InvalidInterface(String),

    #[error("invalid method name: {0} (ensure the method exists in the contract ABI)")]
    UnknownFunction(String),

    #[error("parameter count mismatch: expected {expected}, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("parameter {position} must be {expected}, got {value}")]
    ParameterConversion {
        position: usize,
        expected: ArgKind,
        value: String,
    },

    #[error("failed to encode call data for '{function}': {reason}")]
    Encoding { function: String, reason: String },

    #[error("failed to fetch block {hash:?}: {source}")]
    BlockFetch {
        hash: H256,
        #[source]
        source: anyhow::Error,
    },
}

impl EmitterError {
    /// Process-level errors: the run cannot continue without the identity,
    /// the fee parameters or the signature that failed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EmitterError::EmptyTests
                | EmitterError::InvalidPrivateKey { .. }
                | EmitterError::NonceSourceUnavailable { .. }
                | EmitterError::FeeEstimation(_)
                | EmitterError::GasEstimation { .. }
                | EmitterError::Signing { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_fatal_classification() {
        assert!(EmitterError::FeeEstimation(anyhow!("rpc down")).is_fatal());
        assert!(EmitterError::NonceSourceUnavailable {
            address: Address::zero(),
            source: anyhow!("rpc down"),
        }
        .is_fatal());
        assert!(!EmitterError::UnknownFunction("transfer".to_string()).is_fatal());
        assert!(!EmitterError::InsufficientIdentities {
            test: "t".to_string(),
            requested: 3,
            available: 2,
        }
        .is_fatal());
    }

    #[test]
    fn test_conversion_error_names_position_and_kind() {
        let err = EmitterError::ParameterConversion {
            position: 1,
            expected: ArgKind::Uint(256),
            value: "\"notanumber\"".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("parameter 1"));
        assert!(message.contains("uint256"));
    }
}
