//! Output formatters for run summaries
//!
//! Provides table, JSON, CSV and one-line summary renderings.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::metrics::LatencyStats;
use crate::models::{ErrorBreakdown, RunSummary};

/// Renders a finished [`RunSummary`] for some output medium
pub trait Reporter {
    fn render(&self, summary: &RunSummary) -> String;
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Flattened view of a summary with the derived figures filled in
#[derive(Serialize)]
struct SummaryReport<'a> {
    total_requested: usize,
    successful: usize,
    failed: usize,
    success_rate: f64,
    error_breakdown: &'a ErrorBreakdown,
    average_latency_ms: f64,
    latency: LatencyStats,
    primary_error: &'a str,
    distinct_errors: &'a [String],
    peak_memory_mib: f64,
    elapsed_ms: f64,
    started_at: String,
    ended_at: String,
}

impl<'a> SummaryReport<'a> {
    fn new(summary: &'a RunSummary) -> Self {
        Self {
            total_requested: summary.total_requested,
            successful: summary.successful,
            failed: summary.failed,
            success_rate: summary.success_rate(),
            error_breakdown: &summary.error_breakdown,
            average_latency_ms: summary.average_latency_ms(),
            latency: summary.latency_stats(),
            primary_error: summary.primary_error(),
            distinct_errors: &summary.distinct_errors,
            peak_memory_mib: summary.peak_memory_mib(),
            elapsed_ms: summary.elapsed_ms,
            started_at: summary.started_at.to_rfc3339(),
            ended_at: summary.ended_at.to_rfc3339(),
        }
    }
}

/// Summary formatter
pub struct SummaryFormatter {
    format: OutputFormat,
}

impl SummaryFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn format_table(&self, summary: &RunSummary) -> String {
        let stats = summary.latency_stats();
        let p = &stats.percentiles;
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Connection Pool Stress - {:6} attempts                     ║\n",
            summary.total_requested
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Successful: {:8} | Failed: {:8} | Rate: {:6.1}%       ║\n",
            summary.successful,
            summary.failed,
            summary.success_rate()
        ));
        output.push_str(&format!(
            "║  Connect: {:8} | Query: {:8} | Timeout: {:8}         ║\n",
            summary.error_breakdown.connect,
            summary.error_breakdown.query,
            summary.error_breakdown.timeout
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Avg latency: {:10.2}ms                                    ║\n",
            summary.average_latency_ms()
        ));
        output.push_str(&format!(
            "║  Min: {:9.2}ms | Max: {:9.2}ms                        ║\n",
            stats.min, stats.max
        ));
        output.push_str(&format!(
            "║  p50: {:9.2}ms | p90: {:9.2}ms                        ║\n",
            p.p50, p.p90
        ));
        output.push_str(&format!(
            "║  p95: {:9.2}ms | p99: {:9.2}ms                        ║\n",
            p.p95, p.p99
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Primary error: {:44} ║\n",
            truncate(summary.primary_error(), 44)
        ));
        for key in summary.distinct_errors.iter().skip(1) {
            output.push_str(&format!("║    also: {:51} ║\n", truncate(key, 51)));
        }
        output.push_str(&format!(
            "║  Peak memory: {:8.1} MiB | Elapsed: {:10.0}ms           ║\n",
            summary.peak_memory_mib(),
            summary.elapsed_ms
        ));
        output.push_str(&format!(
            "║  Started: {:50} ║\n",
            summary.started_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
        ));
        output.push_str(&format!(
            "║  Ended:   {:50} ║\n",
            summary.ended_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_json(&self, summary: &RunSummary, pretty: bool) -> String {
        let report = SummaryReport::new(summary);
        let rendered = if pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };
        rendered.unwrap_or_default()
    }

    fn format_csv(&self, summary: &RunSummary) -> String {
        let stats = summary.latency_stats();
        let rows: Vec<(&str, String)> = vec![
            ("total_requested", summary.total_requested.to_string()),
            ("successful", summary.successful.to_string()),
            ("failed", summary.failed.to_string()),
            ("connect_failures", summary.error_breakdown.connect.to_string()),
            ("query_failures", summary.error_breakdown.query.to_string()),
            ("timeouts", summary.error_breakdown.timeout.to_string()),
            ("success_rate", format!("{:.2}", summary.success_rate())),
            ("avg_latency_ms", format!("{:.3}", summary.average_latency_ms())),
            ("min_latency_ms", format!("{:.3}", stats.min)),
            ("max_latency_ms", format!("{:.3}", stats.max)),
            ("p50_latency_ms", format!("{:.3}", stats.percentiles.p50)),
            ("p90_latency_ms", format!("{:.3}", stats.percentiles.p90)),
            ("p95_latency_ms", format!("{:.3}", stats.percentiles.p95)),
            ("p99_latency_ms", format!("{:.3}", stats.percentiles.p99)),
            ("primary_error", summary.primary_error().to_string()),
            ("distinct_errors", summary.distinct_errors.join("; ")),
            ("peak_memory_mib", format!("{:.2}", summary.peak_memory_mib())),
            ("elapsed_ms", format!("{:.0}", summary.elapsed_ms)),
            ("started_at", summary.started_at.to_rfc3339()),
            ("ended_at", summary.ended_at.to_rfc3339()),
        ];

        write_csv(&rows).unwrap_or_default()
    }

    fn format_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{}/{} connected ({:.1}%), avg {:.2}ms, primary error: {}, peak {:.1} MiB",
            summary.successful,
            summary.total_requested,
            summary.success_rate(),
            summary.average_latency_ms(),
            summary.primary_error(),
            summary.peak_memory_mib()
        )
    }
}

impl Reporter for SummaryFormatter {
    fn render(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_table(summary),
            OutputFormat::Json => self.format_json(summary, false),
            OutputFormat::JsonPretty => self.format_json(summary, true),
            OutputFormat::Csv => self.format_csv(summary),
            OutputFormat::Summary => self.format_brief(summary),
        }
    }
}

impl Default for SummaryFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn write_csv(rows: &[(&str, String)]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["metric", "value"])?;
    for (metric, value) in rows {
        writer.write_record([*metric, value.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

/// Write a rendered report to a file
pub fn write_report_to_file(
    path: impl AsRef<Path>,
    summary: &RunSummary,
    reporter: &dyn Reporter,
) -> anyhow::Result<()> {
    let content = reporter.render(summary);

    let mut file = std::fs::File::create(path.as_ref())?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Aggregator;
    use crate::models::{AttemptOutcome, FailureStage, TIMEOUT_ERROR_KEY};
    use tempfile::tempdir;

    fn sample_summary() -> RunSummary {
        Aggregator::fold(
            4,
            vec![
                AttemptOutcome::success(0, 10.0),
                AttemptOutcome::failure(1, FailureStage::Connect, "53300"),
                AttemptOutcome::success(2, 30.0),
                AttemptOutcome::timeout(3),
            ],
        )
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TABLE"), Some(OutputFormat::Table));
        assert_eq!(
            OutputFormat::from_str("json-pretty"),
            Some(OutputFormat::JsonPretty)
        );
        assert_eq!(OutputFormat::from_str("unknown"), None);
    }

    #[test]
    fn test_table_has_no_ansi_codes() {
        let output = SummaryFormatter::new(OutputFormat::Table).render(&sample_summary());
        assert!(!output.contains('\x1b'));
        assert!(output.contains("Primary error: 53300"));
        assert!(output.contains(TIMEOUT_ERROR_KEY));
    }

    #[test]
    fn test_json_includes_derived_fields() {
        let output = SummaryFormatter::new(OutputFormat::Json).render(&sample_summary());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["successful"], 2);
        assert_eq!(value["failed"], 2);
        assert_eq!(value["average_latency_ms"], 20.0);
        assert_eq!(value["primary_error"], "53300");
        assert_eq!(value["error_breakdown"]["timeout"], 1);
    }

    #[test]
    fn test_csv_is_metric_value_pairs() {
        let output = SummaryFormatter::new(OutputFormat::Csv).render(&sample_summary());
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("metric,value"));
        assert!(output.contains("timeouts,1"));
        assert!(output.contains("primary_error,53300"));
    }

    #[test]
    fn test_brief_of_empty_summary() {
        let output = SummaryFormatter::new(OutputFormat::Summary).render(&RunSummary::empty());
        assert!(output.starts_with("0/0 connected"));
        assert!(output.contains("primary error: None"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let formatter = SummaryFormatter::new(OutputFormat::JsonPretty);

        write_report_to_file(&path, &sample_summary(), &formatter).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"total_requested\": 4"));
    }
}
