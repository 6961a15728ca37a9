//! Prometheus text exporter for routing statistics
//!
//! # Prometheus Metrics
//!
//! ## Routing
//! - `kvoffload_batches_total` - Batches classified
//! - `kvoffload_classified_requests_total{path}` - Requests per classification path
//! - `kvoffload_shadowed_reads_total` - GETs kept on the host by a same-batch write
//! - `kvoffload_translated_total` - Offload GETs resolved to a physical read
//! - `kvoffload_forwarded_total{reason}` - Requests the translator forwarded to the host
//! - `kvoffload_write_results_total` - Committed writes observed
//! - `kvoffload_host_reads_total` - Host reads observed
//! - `kvoffload_evictions_total` - Live entries evicted after a host read
//!
//! ## Location cache
//! - `kvoffload_cache_lookups_total{result}` - Lookups by result (hit, miss, expired)
//! - `kvoffload_cache_upserts_total{outcome}` - Upserts by outcome
//! - `kvoffload_cache_purged_total` - Expired entries reclaimed
//! - `kvoffload_cache_entries` - Entries currently stored

use crate::stats::StatsSnapshot;
use std::fmt::Write;

/// Formats a [`StatsSnapshot`] in Prometheus text format
#[derive(Debug, Clone)]
pub struct PrometheusExporter {
    /// Metrics prefix (e.g., "kvoffload")
    prefix: String,
}

impl PrometheusExporter {
    /// Create a new Prometheus exporter with the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Export metrics in Prometheus text format
    #[must_use]
    pub fn export(&self, stats: &StatsSnapshot) -> String {
        let mut output = String::with_capacity(4 * 1024);
        self.export_routing_metrics(&mut output, stats);
        self.export_cache_metrics(&mut output, stats);
        output
    }

    fn export_routing_metrics(&self, output: &mut String, s: &StatsSnapshot) {
        self.write_counter(output, "batches_total", "Batches classified", s.batches);

        self.write_help(
            output,
            "classified_requests_total",
            "Requests per classification path",
        );
        self.write_type(output, "classified_requests_total", "counter");
        self.write_metric_with_labels(
            output,
            "classified_requests_total",
            s.classified_host,
            &[("path", "host")],
        );
        self.write_metric_with_labels(
            output,
            "classified_requests_total",
            s.classified_offload,
            &[("path", "offload")],
        );

        self.write_counter(
            output,
            "shadowed_reads_total",
            "GETs kept on the host by an earlier write in the same batch",
            s.shadowed_reads,
        );
        self.write_counter(
            output,
            "translated_total",
            "Offload GETs resolved to a physical read",
            s.translated,
        );

        self.write_help(
            output,
            "forwarded_total",
            "Requests the translator forwarded to the host",
        );
        self.write_type(output, "forwarded_total", "counter");
        for (reason, value) in [
            ("missing_key", s.forwarded_missing_key),
            ("cache_miss", s.forwarded_miss),
            ("not_offloadable", s.forwarded_not_offloadable),
        ] {
            self.write_metric_with_labels(output, "forwarded_total", value, &[("reason", reason)]);
        }

        self.write_counter(
            output,
            "write_results_total",
            "Committed writes observed",
            s.write_results,
        );
        self.write_counter(
            output,
            "host_reads_total",
            "Host reads observed",
            s.host_reads,
        );
        self.write_counter(
            output,
            "evictions_total",
            "Live entries evicted after a host read",
            s.evictions,
        );
    }

    fn export_cache_metrics(&self, output: &mut String, s: &StatsSnapshot) {
        self.write_help(output, "cache_lookups_total", "Location cache lookups by result");
        self.write_type(output, "cache_lookups_total", "counter");
        // Expired lookups are also counted as misses
        for (result, value) in [
            ("hit", s.cache_hits),
            ("miss", s.cache_misses),
            ("expired", s.cache_expired),
        ] {
            self.write_metric_with_labels(
                output,
                "cache_lookups_total",
                value,
                &[("result", result)],
            );
        }

        self.write_help(output, "cache_upserts_total", "Location cache upserts by outcome");
        self.write_type(output, "cache_upserts_total", "counter");
        for (outcome, value) in [
            ("inserted", s.cache_inserted),
            ("replaced", s.cache_replaced),
            ("stale", s.cache_stale),
            ("rejected", s.cache_rejected),
        ] {
            self.write_metric_with_labels(
                output,
                "cache_upserts_total",
                value,
                &[("outcome", outcome)],
            );
        }

        self.write_counter(
            output,
            "cache_purged_total",
            "Expired entries reclaimed",
            s.cache_purged,
        );

        self.write_help(output, "cache_entries", "Entries currently stored");
        self.write_type(output, "cache_entries", "gauge");
        self.write_metric(output, "cache_entries", s.cache_entries);
    }

    fn write_counter(&self, output: &mut String, name: &str, help: &str, value: u64) {
        self.write_help(output, name, help);
        self.write_type(output, name, "counter");
        self.write_metric(output, name, value);
    }

    fn write_help(&self, output: &mut String, name: &str, help: &str) {
        let _ = writeln!(output, "# HELP {}_{} {}", self.prefix, name, help);
    }

    fn write_type(&self, output: &mut String, name: &str, metric_type: &str) {
        let _ = writeln!(output, "# TYPE {}_{} {}", self.prefix, name, metric_type);
    }

    fn write_metric(&self, output: &mut String, name: &str, value: u64) {
        let _ = writeln!(output, "{}_{} {}", self.prefix, name, value);
    }

    fn write_metric_with_labels(
        &self,
        output: &mut String,
        name: &str,
        value: u64,
        labels: &[(&str, &str)],
    ) {
        let labels_str: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect();
        let _ = writeln!(
            output,
            "{}_{}{{{}}} {}",
            self.prefix,
            name,
            labels_str.join(","),
            value
        );
    }
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new("kvoffload")
    }
}
