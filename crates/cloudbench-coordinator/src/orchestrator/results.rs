//! Results writing and summary display
//!
//! This module handles writing run reports to JSON files and printing
//! summary tables to stdout.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use cloudbench_common::Sample;
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use tracing::info;

use super::cleanup::CleanupOutcome;
use super::types::RunReport;

/// Per-second series are summarized rather than listed
const PROGRESS_SUFFIX: &str = "_progress";

/// Build the JSON document for a run report
pub fn report_json(report: &RunReport) -> serde_json::Value {
    let failure = report.failure.as_ref().map(|f| {
        serde_json::json!({
            "phase": f.phase,
            "resource": f.resource,
            "message": format!("{:#}", f.source),
        })
    });

    serde_json::json!({
        "run_uri": report.run_uri,
        "benchmark": report.benchmark,
        "cloud": report.cloud.to_string(),
        "started_at": report.started_at.to_rfc3339(),
        "finished_at": report.finished_at.to_rfc3339(),
        "success": report.success(),
        "failure": failure,
        "cleanup": report.cleanup,
        "samples": report.samples,
    })
}

/// Write the run report to `output_path`
pub fn write_results(report: &RunReport, output_path: &Path) -> Result<()> {
    let output = report_json(report);
    std::fs::write(output_path, serde_json::to_string_pretty(&output)?)
        .with_context(|| format!("Failed to write results to {}", output_path.display()))?;
    info!(path = %output_path.display(), "Results written");
    Ok(())
}

/// Min/avg/max over a series of values
fn summarize(values: &[f64]) -> Option<(f64, f64, f64)> {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let min = finite.iter().copied().fold(f64::MAX, f64::min);
    let max = finite.iter().copied().fold(f64::MIN, f64::max);
    let avg = finite.iter().sum::<f64>() / finite.len() as f64;
    Some((min, avg, max))
}

/// Group progress samples by metric
fn progress_series(samples: &[Sample]) -> BTreeMap<&str, (Vec<f64>, &str)> {
    let mut series: BTreeMap<&str, (Vec<f64>, &str)> = BTreeMap::new();
    for sample in samples
        .iter()
        .filter(|s| s.metric.ends_with(PROGRESS_SUFFIX))
    {
        series
            .entry(sample.metric.as_str())
            .or_insert_with(|| (Vec::new(), sample.unit.as_str()))
            .0
            .push(sample.value);
    }
    series
}

/// Print summary tables of samples and cleanup outcomes to stdout
pub fn print_results_summary(report: &RunReport) {
    println!("\n=== Benchmark Results ({}) ===\n", report.run_uri);

    if report.samples.is_empty() {
        println!("No samples recorded");
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Metric"),
                Cell::new("Value"),
                Cell::new("Unit"),
            ]);

        for sample in report
            .samples
            .iter()
            .filter(|s| !s.metric.ends_with(PROGRESS_SUFFIX))
        {
            table.add_row(vec![
                Cell::new(&sample.metric),
                Cell::new(format!("{:.2}", sample.value)),
                Cell::new(&sample.unit),
            ]);
        }

        for (metric, (values, unit)) in progress_series(&report.samples) {
            if let Some((min, avg, max)) = summarize(&values) {
                table.add_row(vec![
                    Cell::new(format!("{metric} ({} samples)", values.len())),
                    Cell::new(format!("{min:.2} / {avg:.2} / {max:.2}")),
                    Cell::new(format!("{unit} (min/avg/max)")),
                ]);
            }
        }

        println!("{table}");
    }

    if report.cleanup.resources.is_empty() {
        return;
    }

    println!("\n=== Cleanup ===\n");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Resource"),
            Cell::new("Kind"),
            Cell::new("Outcome"),
        ]);

    for entry in &report.cleanup.resources {
        let outcome = match &entry.outcome {
            CleanupOutcome::Failed { error } => format!("FAILED: {error}"),
            other => other.label().to_string(),
        };
        table.add_row(vec![
            Cell::new(&entry.resource),
            Cell::new(entry.kind),
            Cell::new(outcome),
        ]);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::cleanup::{CleanupReport, ResourceCleanup};
    use crate::orchestrator::types::{Phase, RunError};
    use chrono::Utc;
    use cloudbench_common::{Cloud, ResourceKind, RunUri};

    fn report(failure: Option<RunError>) -> RunReport {
        RunReport {
            run_uri: RunUri::parse("abc123").unwrap(),
            benchmark: "pgbench".into(),
            cloud: Cloud::Azure,
            samples: vec![
                Sample::new("tps", 1500.0, "transactions/s"),
                Sample::new("tps_progress", 1400.0, "transactions/s").with_metadata("second", "1"),
                Sample::new("tps_progress", 1600.0, "transactions/s").with_metadata("second", "2"),
            ],
            failure,
            cleanup: CleanupReport {
                resources: vec![ResourceCleanup {
                    resource: "cloudbench-abc123-rg".into(),
                    kind: ResourceKind::Network,
                    outcome: CleanupOutcome::Deleted,
                }],
            },
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_report_json_success() {
        let json = report_json(&report(None));
        assert_eq!(json["run_uri"], "abc123");
        assert_eq!(json["cloud"], "azure");
        assert_eq!(json["success"], true);
        assert!(json["failure"].is_null());
        assert_eq!(json["samples"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["cleanup"]["resources"][0]["status"], "deleted");
    }

    #[test]
    fn test_report_json_failure() {
        let failure = RunError::new(
            Phase::Prepare,
            Some("cloudbench-db-abc123".into()),
            anyhow::anyhow!("quota exceeded"),
        );
        let json = report_json(&report(Some(failure)));
        assert_eq!(json["success"], false);
        assert_eq!(json["failure"]["phase"], "Prepare");
        assert_eq!(json["failure"]["resource"], "cloudbench-db-abc123");
        assert_eq!(json["failure"]["message"], "quota exceeded");
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        write_results(&report(None), &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["benchmark"], "pgbench");
    }

    #[test]
    fn test_progress_series() {
        let r = report(None);
        let series = progress_series(&r.samples);
        assert_eq!(series.len(), 1);
        let (values, unit) = &series["tps_progress"];
        assert_eq!(values.len(), 2);
        assert_eq!(*unit, "transactions/s");
        assert_eq!(summarize(values), Some((1400.0, 1500.0, 1600.0)));
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), None);
        assert_eq!(summarize(&[f64::NAN]), None);
    }
}
