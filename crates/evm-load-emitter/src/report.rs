// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Plain-text rendering of test reports.

use anyhow::{Context, Result};
use evm_load_emitter_lib::{SuiteReport, TestMetrics, TestReport};
use itertools::Itertools;
use std::{
    fs,
    path::{Path, PathBuf},
};

fn table(rows: impl IntoIterator<Item = (String, String)>) -> String {
    let rows = rows.into_iter().collect::<Vec<_>>();
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(key, value)| format!("| {:<width$} | {} |", key, value, width = width))
        .join("\n")
}

pub fn render(report: &TestReport) -> String {
    let mut sections = vec![
        format!("=== {} ({}) ===", report.name, report.mode),
        table(
            report
                .summary_rows()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value)),
        ),
    ];
    match &report.metrics {
        TestMetrics::Submit(metrics) => {
            let distances = metrics.inclusion_distance_rows();
            if !distances.is_empty() {
                sections.push("Inclusion distance".to_string());
                sections.push(table(
                    distances
                        .into_iter()
                        .map(|(distance, count)| (format!("+{}", distance), count.to_string())),
                ));
            }
        },
        TestMetrics::Call(metrics) => {
            if !metrics.error_messages.is_empty() {
                sections.push(metrics.error_messages.iter().join("\n"));
            }
        },
    }
    sections.join("\n\n")
}

/// `<logs_dir>/<test>/<mode>_output.log`
pub fn output_path(logs_dir: &Path, report: &TestReport) -> PathBuf {
    logs_dir
        .join(&report.name)
        .join(format!("{}_output.log", report.mode))
}

pub fn write_report(logs_dir: &Path, report: &TestReport, rendered: &str) -> Result<PathBuf> {
    let path = output_path(logs_dir, report);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    }
    fs::write(&path, format!("{}\n", rendered))
        .with_context(|| format!("failed to write report {}", path.display()))?;
    Ok(path)
}

pub fn render_errors(suite: &SuiteReport) -> Option<String> {
    if suite.errors.is_empty() {
        return None;
    }
    Some(format!(
        "Errors ({}):\n{}",
        suite.errors.len(),
        suite
            .errors
            .iter()
            .map(|failure| format!("  [{}] {}", failure.test, failure.error))
            .join("\n")
    ))
}
