// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, fs, path::Path, time::Duration};
use tracing::warn;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmitterConfig {
    pub app: AppConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Keyed by test name; iteration order is name order.
    #[serde(default)]
    pub tests: BTreeMap<String, TestCaseConfig>,
    pub senders: SendersConfig,
}

impl EmitterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AppConfig {
    pub node: NodeConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodeConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SendersConfig {
    pub private_keys: Vec<String>,
}

/// Outcome polling policy.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Sweeps per identity before its unresolved artifacts are abandoned.
    pub max_attempts: usize,
    pub attempt_interval_secs: u64,
    /// Outcome queries per second, shared by all identities of a test.
    pub poll_rate: u64,
    /// Delay between the end of dispatch and the first sweep.
    pub initial_delay_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            attempt_interval_secs: 5,
            poll_rate: 600,
            initial_delay_secs: 5,
        }
    }
}

impl CollectorConfig {
    pub fn attempt_interval(&self) -> Duration {
        Duration::from_secs(self.attempt_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// Signed transactions are submitted and tracked to inclusion.
    Send,
    /// Read-only contract calls.
    Call,
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestMode::Send => write!(f, "send"),
            TestMode::Call => write!(f, "call"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TestCaseConfig {
    #[serde(rename = "type")]
    pub mode: TestMode,
    pub config: TestParams,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TestParams {
    pub senders: usize,
    /// Seconds.
    pub duration: u64,
    pub tps: u64,
    #[serde(default)]
    pub data_size: usize,
    /// Wei, base 10.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub contract: Option<ContractConfig>,
}

impl TestParams {
    /// The configured value, or zero when absent or unparsable.
    pub fn value_wei(&self, test: &str) -> U256 {
        match self.value.as_deref().map(str::trim) {
            None | Some("") => U256::zero(),
            Some(value) => U256::from_dec_str(value).unwrap_or_else(|e| {
                warn!(
                    "Test '{}': ignoring invalid value '{}' ({}), sending 0",
                    test, value, e
                );
                U256::zero()
            }),
        }
    }

    /// The contract call target, if address, function name and ABI are all
    /// present.
    pub fn contract_target(&self) -> Option<ContractTarget<'_>> {
        let contract = self.contract.as_ref()?;
        let function = contract.function.as_ref()?;
        match (
            contract.address.as_deref(),
            function.name.as_deref(),
            function.abi.as_deref(),
        ) {
            (Some(address), Some(name), Some(abi))
                if !address.is_empty() && !name.is_empty() && !abi.is_empty() =>
            {
                Some(ContractTarget {
                    address,
                    function: name,
                    abi,
                    params: &function.params,
                })
            },
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ContractConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FunctionConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// JSON ABI of the contract.
    #[serde(default)]
    pub abi: Option<String>,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

#[derive(Clone, Copy, Debug)]
pub struct ContractTarget<'a> {
    pub address: &'a str,
    pub function: &'a str,
    pub abi: &'a str,
    pub params: &'a [serde_json::Value],
}
