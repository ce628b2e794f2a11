//! Internal observability metrics for vsphere-collector
//!
//! # Metrics
//!
//! - `vsphere_collector_cycles_success_total` - Counter of completed cycles
//! - `vsphere_collector_cycles_failure_total` - Counter of aborted cycles
//! - `vsphere_collector_cycle_duration_seconds` - Histogram of cycle durations
//! - `vsphere_collector_last_cycle_entities` - Entities collected by the last cycle
//! - `vsphere_collector_last_cycle_skipped` - Objects skipped by the last cycle
//! - `vsphere_collector_last_cycle_samples` - Samples reported by the last cycle
//! - `vsphere_collector_last_success_timestamp` - Unix time of the last completed cycle
//!
//! Every metric carries a `vcenter_server` label.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::check::CycleSummary;
use crate::report::{MetricType, PrometheusFormatter, PrometheusMetric};

/// Histogram buckets for cycle duration (in seconds)
///
/// A cycle issues one query per entity, so durations run much longer than a
/// single HTTP request.
pub const DEFAULT_HISTOGRAM_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0,
];

const INSTANCE_LABEL: &str = "vcenter_server";

/// Thread-safe counter using atomic operations
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe gauge using atomic operations
#[derive(Debug, Default)]
pub struct Gauge {
    /// Stored as bits of f64 for atomic operations
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn set(&self, v: f64) {
        self.value.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Set the gauge to the current Unix timestamp
    pub fn set_to_current_time(&self) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.set(timestamp);
    }
}

/// Thread-safe histogram for measuring distributions
#[derive(Debug)]
pub struct Histogram {
    /// Upper bounds, ending with +Inf
    buckets: Vec<f64>,
    /// Cumulative count of observations <= each bound
    bucket_counts: Vec<AtomicU64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: &[f64]) -> Self {
        let mut sorted_buckets: Vec<f64> = buckets.to_vec();
        sorted_buckets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        if sorted_buckets
            .last()
            .map(|v| !v.is_infinite())
            .unwrap_or(true)
        {
            sorted_buckets.push(f64::INFINITY);
        }

        let bucket_counts = (0..sorted_buckets.len())
            .map(|_| AtomicU64::new(0))
            .collect();

        Self {
            buckets: sorted_buckets,
            bucket_counts,
            sum: AtomicU64::new(0.0_f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    pub fn with_default_buckets() -> Self {
        Self::new(DEFAULT_HISTOGRAM_BUCKETS)
    }

    pub fn observe(&self, v: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        // atomic f64 add
        loop {
            let current = self.sum.load(Ordering::Relaxed);
            let new = f64::from_bits(current) + v;
            if self
                .sum
                .compare_exchange_weak(current, new.to_bits(), Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }

        for (i, &bound) in self.buckets.iter().enumerate() {
            if v <= bound {
                self.bucket_counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Bucket bounds with their cumulative counts
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .zip(self.bucket_counts.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_default_buckets()
    }
}

/// Collection cycle metrics
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    pub cycles_success_total: Counter,
    pub cycles_failure_total: Counter,
    pub cycle_duration_seconds: Histogram,
    pub last_cycle_entities: Gauge,
    pub last_cycle_skipped: Gauge,
    pub last_cycle_samples: Gauge,
    pub last_success_timestamp: Gauge,
    /// 1 when the last cycle reached the gateway, 0 when it failed
    pub can_connect: Gauge,
}

impl CollectorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed cycle
    pub fn record_cycle_success(&self, duration_seconds: f64, summary: &CycleSummary) {
        self.cycles_success_total.inc();
        self.cycle_duration_seconds.observe(duration_seconds);
        self.last_cycle_entities.set(summary.entities as f64);
        self.last_cycle_skipped.set(summary.skipped as f64);
        self.last_cycle_samples.set(summary.samples as f64);
        self.last_success_timestamp.set_to_current_time();
        self.can_connect.set(1.0);
    }

    /// Record a cycle aborted by a connection error
    pub fn record_cycle_failure(&self, duration_seconds: f64) {
        self.cycles_failure_total.inc();
        self.cycle_duration_seconds.observe(duration_seconds);
        self.can_connect.set(0.0);
    }

    /// All collector metrics, labelled with `instance`
    pub fn to_prometheus_metrics(&self, instance: &str) -> Vec<PrometheusMetric> {
        let counter = |name: &str, value: u64, help: &str| {
            PrometheusMetric::new(name, value as f64)
                .with_type(MetricType::Counter)
                .with_help(help)
                .with_label(INSTANCE_LABEL, instance)
        };
        let gauge = |name: &str, value: f64, help: &str| {
            PrometheusMetric::new(name, value)
                .with_type(MetricType::Gauge)
                .with_help(help)
                .with_label(INSTANCE_LABEL, instance)
        };

        let mut metrics = vec![
            counter(
                "vsphere_collector_cycles_success_total",
                self.cycles_success_total.get(),
                "Total number of completed collection cycles",
            ),
            counter(
                "vsphere_collector_cycles_failure_total",
                self.cycles_failure_total.get(),
                "Total number of aborted collection cycles",
            ),
        ];

        let histogram = &self.cycle_duration_seconds;
        for (bound, count) in histogram.get_buckets() {
            let le = if bound.is_infinite() {
                "+Inf".to_string()
            } else {
                format!("{}", bound)
            };
            metrics.push(
                gauge(
                    "vsphere_collector_cycle_duration_seconds_bucket",
                    count as f64,
                    "Histogram of collection cycle durations",
                )
                .with_label("le", le),
            );
        }
        metrics.push(gauge(
            "vsphere_collector_cycle_duration_seconds_sum",
            histogram.get_sum(),
            "Total sum of collection cycle durations",
        ));
        metrics.push(gauge(
            "vsphere_collector_cycle_duration_seconds_count",
            histogram.get_count() as f64,
            "Total count of collection cycles",
        ));

        metrics.push(gauge(
            "vsphere_collector_last_cycle_entities",
            self.last_cycle_entities.get(),
            "Entities collected by the last completed cycle",
        ));
        metrics.push(gauge(
            "vsphere_collector_last_cycle_skipped",
            self.last_cycle_skipped.get(),
            "Objects skipped by the last completed cycle",
        ));
        metrics.push(gauge(
            "vsphere_collector_last_cycle_samples",
            self.last_cycle_samples.get(),
            "Samples reported by the last completed cycle",
        ));
        metrics.push(gauge(
            "vsphere_collector_last_success_timestamp",
            self.last_success_timestamp.get(),
            "Unix timestamp of the last completed cycle",
        ));
        metrics.push(gauge(
            "vsphere_collector_can_connect",
            self.can_connect.get(),
            "Whether the last collection cycle reached the vCenter gateway",
        ));

        metrics
    }

    /// Render collector metrics in Prometheus exposition format
    pub fn format_prometheus(&self, instance: &str) -> String {
        PrometheusFormatter::new().format(&self.to_prometheus_metrics(instance))
    }
}

static COLLECTOR_METRICS: std::sync::OnceLock<CollectorMetrics> = std::sync::OnceLock::new();

/// Get the global collector metrics instance
pub fn collector_metrics() -> &'static CollectorMetrics {
    COLLECTOR_METRICS.get_or_init(CollectorMetrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_gauge() {
        let counter = Counter::new();
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);

        let gauge = Gauge::new();
        assert_eq!(gauge.get(), 0.0);
        gauge.set(42.5);
        assert_eq!(gauge.get(), 42.5);
    }

    #[test]
    fn test_histogram_operations() {
        let histogram = Histogram::new(&[0.1, 0.5, 1.0]);

        histogram.observe(0.05);
        histogram.observe(0.3);
        histogram.observe(0.8);
        histogram.observe(2.0);

        assert_eq!(histogram.get_count(), 4);

        let buckets = histogram.get_buckets();
        assert_eq!(buckets[0], (0.1, 1));
        assert_eq!(buckets[1], (0.5, 2));
        assert_eq!(buckets[2], (1.0, 3));
        assert_eq!(buckets[3].1, 4);
        assert!(buckets[3].0.is_infinite());
    }

    #[test]
    fn test_record_cycles() {
        let metrics = CollectorMetrics::new();
        let summary = CycleSummary {
            entities: 12,
            skipped: 3,
            samples: 140,
        };

        metrics.record_cycle_success(1.5, &summary);
        metrics.record_cycle_failure(0.2);

        assert_eq!(metrics.cycles_success_total.get(), 1);
        assert_eq!(metrics.cycles_failure_total.get(), 1);
        assert_eq!(metrics.cycle_duration_seconds.get_count(), 2);
        assert_eq!(metrics.last_cycle_entities.get(), 12.0);
        assert_eq!(metrics.last_cycle_samples.get(), 140.0);
        assert!(metrics.last_success_timestamp.get() > 0.0);
    }

    #[test]
    fn test_failure_keeps_last_summary() {
        let metrics = CollectorMetrics::new();
        metrics.record_cycle_success(
            1.0,
            &CycleSummary {
                entities: 4,
                skipped: 0,
                samples: 8,
            },
        );
        metrics.record_cycle_failure(0.1);
        assert_eq!(metrics.last_cycle_entities.get(), 4.0);
    }

    #[test]
    fn test_can_connect_follows_last_cycle() {
        let metrics = CollectorMetrics::new();
        metrics.record_cycle_success(0.2, &CycleSummary::default());
        assert_eq!(metrics.can_connect.get(), 1.0);

        metrics.record_cycle_failure(0.1);
        assert_eq!(metrics.can_connect.get(), 0.0);
        assert!(metrics
            .format_prometheus("vc1")
            .contains("vsphere_collector_can_connect{vcenter_server=\"vc1\"} 0"));

        metrics.record_cycle_success(0.2, &CycleSummary::default());
        assert_eq!(metrics.can_connect.get(), 1.0);
    }

    #[test]
    fn test_format_prometheus() {
        let metrics = CollectorMetrics::new();
        metrics.record_cycle_success(0.3, &CycleSummary::default());

        let output = metrics.format_prometheus("vc1");

        assert!(output.contains("# TYPE vsphere_collector_cycles_success_total counter"));
        assert!(
            output.contains("vsphere_collector_cycles_success_total{vcenter_server=\"vc1\"} 1")
        );
        assert!(output.contains(
            "vsphere_collector_cycle_duration_seconds_bucket{le=\"0.5\",vcenter_server=\"vc1\"} 1"
        ));
        assert!(output.contains(
            "vsphere_collector_cycle_duration_seconds_bucket{le=\"+Inf\",vcenter_server=\"vc1\"} 1"
        ));
        assert_eq!(
            output
                .matches("# TYPE vsphere_collector_cycle_duration_seconds_bucket")
                .count(),
            1
        );
    }
}
