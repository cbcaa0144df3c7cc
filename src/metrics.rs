//! Prometheus metrics for the incentive ledger service.

use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};

/// Prometheus metrics for the incentive ledger service.
#[derive(Clone, Debug)]
pub struct PrometheusMetrics {
    registry: Registry,

    // Scan metrics
    /// The last block of the most recent completed scan.
    pub latest_scanned_block: Gauge,
    /// Number of incentive records in the reconstructed ledger.
    pub decoded_records: Gauge,
    /// Number of records excluded because their choice could not be resolved.
    pub unresolved_records: Gauge,

    // Ledger metrics
    /// Number of protocols in the by-protocol view.
    pub grouped_protocols: Gauge,
    /// Number of entries in the settled ledger.
    pub settled_entries: Gauge,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    /// Create a new metrics instance with all gauges registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let latest_scanned_block = Gauge::with_opts(Opts::new(
            "latest_scanned_block",
            "The last block of the most recent completed scan",
        ))
        .expect("failed to create latest_scanned_block gauge");
        registry
            .register(Box::new(latest_scanned_block.clone()))
            .expect("failed to register latest_scanned_block gauge");

        let decoded_records = Gauge::with_opts(Opts::new(
            "decoded_records",
            "Number of incentive records in the reconstructed ledger",
        ))
        .expect("failed to create decoded_records gauge");
        registry
            .register(Box::new(decoded_records.clone()))
            .expect("failed to register decoded_records gauge");

        let unresolved_records = Gauge::with_opts(Opts::new(
            "unresolved_records",
            "Number of records excluded because their choice could not be resolved",
        ))
        .expect("failed to create unresolved_records gauge");
        registry
            .register(Box::new(unresolved_records.clone()))
            .expect("failed to register unresolved_records gauge");

        let grouped_protocols = Gauge::with_opts(Opts::new(
            "grouped_protocols",
            "Number of protocols in the by-protocol view",
        ))
        .expect("failed to create grouped_protocols gauge");
        registry
            .register(Box::new(grouped_protocols.clone()))
            .expect("failed to register grouped_protocols gauge");

        let settled_entries = Gauge::with_opts(Opts::new(
            "settled_entries",
            "Number of entries in the settled ledger",
        ))
        .expect("failed to create settled_entries gauge");
        registry
            .register(Box::new(settled_entries.clone()))
            .expect("failed to register settled_entries gauge");

        Self {
            registry,
            latest_scanned_block,
            decoded_records,
            unresolved_records,
            grouped_protocols,
            settled_entries,
        }
    }

    /// Export all metrics in the Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode metrics: {err}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn test_metrics_register_and_export() {
        let metrics = PrometheusMetrics::new();
        metrics.latest_scanned_block.set(12345.0);
        metrics.decoded_records.set(7.0);

        let exported = metrics.export();
        assert!(exported.contains("latest_scanned_block 12345"));
        assert!(exported.contains("decoded_records 7"));
    }
}
