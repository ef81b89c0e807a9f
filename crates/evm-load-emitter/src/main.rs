// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use evm_load_emitter_lib::{EmitterConfig, EthersChainClient, Runner, TimeService};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Generates paced transaction load against an EVM node")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "EMITTER_CONFIG")]
    config: PathBuf,

    /// Log level, overridden by RUST_LOG when set
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Directory receiving `<test>/<mode>_output.log` reports
    #[arg(long, default_value = "logs")]
    logs_dir: PathBuf,

    /// Overrides `app.node.rpc_url` from the configuration
    #[arg(long)]
    rpc_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string())),
        )
        .init();

    let mut config = EmitterConfig::load(&args.config)?;
    if let Some(rpc_url) = args.rpc_url {
        config.app.node.rpc_url = rpc_url;
    }
    info!(
        "Using node {} (chain id {})",
        config.app.node.rpc_url, config.app.node.chain_id
    );

    let client = EthersChainClient::new(&config.app.node.rpc_url)
        .with_context(|| format!("invalid rpc url {}", config.app.node.rpc_url))?;
    let runner = Runner::new(Arc::new(client), TimeService::real(), &config);
    let suite = runner.run(&config).await.context("emitter run aborted")?;

    for test in suite.reports.iter() {
        let rendered = report::render(test);
        println!("{}\n", rendered);
        match report::write_report(&args.logs_dir, test, &rendered) {
            Ok(path) => info!("Report for '{}' written to {}", test.name, path.display()),
            Err(e) => error!("{:#}", e),
        }
    }
    if let Some(errors) = report::render_errors(&suite) {
        println!("{}", errors);
    }
    Ok(())
}
