//! Metric reporting
//!
//! A collection cycle emits everything through the [`Reporter`] trait.
//! [`BufferedReporter`] keeps one cycle's output in memory so the HTTP
//! server and the `--once` CLI mode can render it afterwards.

pub mod formatter;

use std::collections::{BTreeMap, HashMap};

use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

pub use formatter::{MetricType, PrometheusFormatter, PrometheusMetric};

/// Namespace under which external host tags are published
pub const EXTERNAL_TAGS_SOURCE: &str = "vsphere";

/// Sink for collected metrics
pub trait Reporter {
    /// Record a point-in-time value
    fn gauge(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>);

    /// Record an occurrence count
    fn count(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>);

    /// Publish the host to tags association for this cycle
    fn set_external_tags(&mut self, tags: Vec<ExternalHostTags>);
}

/// Tags published for one reporting hostname
///
/// Serializes as `[hostname, {"vsphere": [tags...]}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalHostTags {
    pub hostname: String,
    pub tags: Vec<String>,
}

impl ExternalHostTags {
    pub fn new(hostname: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            hostname: hostname.into(),
            tags,
        }
    }
}

impl Serialize for ExternalHostTags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut sources = BTreeMap::new();
        sources.insert(EXTERNAL_TAGS_SOURCE, &self.tags);

        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.hostname)?;
        tuple.serialize_element(&sources)?;
        tuple.end()
    }
}

/// Kind of a reported value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Gauge,
    Count,
}

/// One reporter call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportedMetric {
    pub kind: ReportKind,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub hostname: Option<String>,
}

/// In-memory reporter for a single cycle
#[derive(Debug, Clone, Default)]
pub struct BufferedReporter {
    metrics: Vec<ReportedMetric>,
    external_tags: Vec<ExternalHostTags>,
}

impl BufferedReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        kind: ReportKind,
        name: &str,
        value: f64,
        tags: &[String],
        hostname: Option<&str>,
    ) {
        self.metrics.push(ReportedMetric {
            kind,
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            hostname: hostname.map(str::to_string),
        });
    }

    pub fn metrics(&self) -> &[ReportedMetric] {
        &self.metrics
    }

    pub fn gauges(&self) -> impl Iterator<Item = &ReportedMetric> {
        self.metrics.iter().filter(|m| m.kind == ReportKind::Gauge)
    }

    pub fn counts(&self) -> impl Iterator<Item = &ReportedMetric> {
        self.metrics.iter().filter(|m| m.kind == ReportKind::Count)
    }

    pub fn external_tags(&self) -> &[ExternalHostTags] {
        &self.external_tags
    }

    pub fn into_external_tags(self) -> Vec<ExternalHostTags> {
        self.external_tags
    }

    /// Convert buffered calls into Prometheus samples
    ///
    /// Counts with the same name and labels are summed into one gauge.
    pub fn to_prometheus_metrics(&self) -> Vec<PrometheusMetric> {
        let mut out = Vec::with_capacity(self.metrics.len());
        let mut count_index: HashMap<(String, Vec<(String, String)>), usize> = HashMap::new();

        for metric in &self.metrics {
            let converted = PrometheusMetric::from_reported(metric);
            match metric.kind {
                ReportKind::Gauge => out.push(converted),
                ReportKind::Count => {
                    let key = (converted.name.clone(), converted.sorted_labels());
                    match count_index.get(&key) {
                        Some(&i) => out[i].value += converted.value,
                        None => {
                            count_index.insert(key, out.len());
                            out.push(converted);
                        }
                    }
                }
            }
        }

        out
    }

    /// Render the buffer in Prometheus exposition format
    pub fn format_prometheus(&self) -> String {
        PrometheusFormatter::new().format(&self.to_prometheus_metrics())
    }
}

impl Reporter for BufferedReporter {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.push(ReportKind::Gauge, name, value, tags, hostname);
    }

    fn count(&mut self, name: &str, value: f64, tags: &[String], hostname: Option<&str>) {
        self.push(ReportKind::Count, name, value, tags, hostname);
    }

    fn set_external_tags(&mut self, tags: Vec<ExternalHostTags>) {
        self.external_tags = tags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_external_tags_serialization() {
        let entry = ExternalHostTags::new("esx1", tags(&["vsphere_cluster:c1"]));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["esx1", {"vsphere": ["vsphere_cluster:c1"]}])
        );
    }

    #[test]
    fn test_buffered_reporter_records_calls() {
        let mut reporter = BufferedReporter::new();
        reporter.gauge("vsphere.cpu.usage.avg", 0.5, &tags(&["a:b"]), Some("vm1"));
        reporter.count("vsphere.vm.count", 1.0, &[], None);
        reporter.set_external_tags(vec![ExternalHostTags::new("vm1", vec![])]);

        assert_eq!(reporter.gauges().count(), 1);
        assert_eq!(reporter.counts().count(), 1);
        assert_eq!(reporter.external_tags().len(), 1);
        assert_eq!(reporter.metrics()[0].hostname.as_deref(), Some("vm1"));
    }

    #[test]
    fn test_counts_are_summed_for_exposition() {
        let mut reporter = BufferedReporter::new();
        let base = tags(&["vcenter_server:vc1"]);
        reporter.count("vsphere.vm.count", 1.0, &base, None);
        reporter.count("vsphere.vm.count", 1.0, &base, None);
        reporter.count("vsphere.host.count", 1.0, &base, None);

        let metrics = reporter.to_prometheus_metrics();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].name, "vsphere_vm_count");
        assert_eq!(metrics[0].value, 2.0);
        assert_eq!(metrics[1].value, 1.0);

        let output = reporter.format_prometheus();
        assert!(output.contains("vsphere_vm_count{vcenter_server=\"vc1\"} 2"));
    }
}
