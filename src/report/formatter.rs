//! Prometheus exposition format output
//!
//! Renders reported metrics in the text exposition format (version 0.0.4).
//! Dotted metric names become underscored, `key:value` tags become labels
//! and the reporting hostname becomes the `host` label.
//!
//! ```text
//! # TYPE vsphere_cpu_usage_avg gauge
//! vsphere_cpu_usage_avg{host="web-01",vcenter_server="vc1"} 0.42
//! ```

use std::collections::{HashMap, HashSet};

use super::{ReportKind, ReportedMetric};

/// Label carrying the reporting hostname
pub const HOSTNAME_LABEL: &str = "host";

/// Label a `host` tag moves to when the metric also carries a hostname
pub const EXPORTED_HOST_LABEL: &str = "exported_host";

/// Prometheus metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricType {
    Gauge,
    Counter,
    #[default]
    Untyped,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Untyped => "untyped",
        }
    }
}

/// A single exposition sample
#[derive(Debug, Clone, PartialEq)]
pub struct PrometheusMetric {
    pub name: String,
    pub metric_type: MetricType,
    pub help: Option<String>,
    pub labels: HashMap<String, String>,
    pub value: f64,
}

impl PrometheusMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            metric_type: MetricType::Untyped,
            help: None,
            labels: HashMap::new(),
            value,
        }
    }

    pub fn with_type(mut self, metric_type: MetricType) -> Self {
        self.metric_type = metric_type;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Labels sorted by key
    pub fn sorted_labels(&self) -> Vec<(String, String)> {
        let mut labels: Vec<(String, String)> = self
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.sort();
        labels
    }

    /// Convert a reporter call
    ///
    /// A tag without `:` becomes a label with an empty value. Repeated keys
    /// keep every value, comma separated, in tag order. The hostname owns the
    /// `host` label; a `host` tag on the same metric is renamed to
    /// `exported_host`.
    pub fn from_reported(metric: &ReportedMetric) -> Self {
        let mut out = PrometheusMetric::new(sanitize_name(&metric.name), metric.value)
            .with_type(match metric.kind {
                ReportKind::Gauge | ReportKind::Count => MetricType::Gauge,
            });

        for tag in &metric.tags {
            let (key, value) = tag.split_once(':').unwrap_or((tag.as_str(), ""));
            let key = sanitize_name(key);
            out.labels
                .entry(key)
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        if let Some(hostname) = &metric.hostname {
            let previous = out
                .labels
                .insert(HOSTNAME_LABEL.to_string(), hostname.clone());
            if let Some(tag_value) = previous {
                out.labels.insert(EXPORTED_HOST_LABEL.to_string(), tag_value);
            }
        }

        out
    }
}

/// Replace characters outside `[a-zA-Z0-9_]`, prefixing a leading digit
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        out.push('_');
    }
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

/// Prometheus exposition format formatter
#[derive(Debug, Clone, Default)]
pub struct PrometheusFormatter;

impl PrometheusFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Format metrics into Prometheus exposition format
    ///
    /// - HELP and TYPE lines are emitted once per unique metric name
    /// - Labels are sorted alphabetically for deterministic output
    /// - Metrics with the same name are grouped together
    pub fn format(&self, metrics: &[PrometheusMetric]) -> String {
        if metrics.is_empty() {
            return String::new();
        }

        let mut output = String::with_capacity(metrics.len() * 100);
        let mut seen_metrics: HashSet<String> = HashSet::new();

        for (name, group) in Self::group_by_name(metrics) {
            if seen_metrics.insert(name.clone()) {
                if let Some(help) = &group[0].help {
                    output.push_str(&format!("# HELP {} {}\n", name, Self::escape_help(help)));
                }
                output.push_str(&format!(
                    "# TYPE {} {}\n",
                    name,
                    group[0].metric_type.as_str()
                ));
            }

            for metric in group {
                output.push_str(&Self::format_metric_line(metric));
                output.push('\n');
            }
        }

        output
    }

    /// Group metrics by name, preserving order of first occurrence
    fn group_by_name(metrics: &[PrometheusMetric]) -> Vec<(String, Vec<&PrometheusMetric>)> {
        let mut groups: HashMap<String, Vec<&PrometheusMetric>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for metric in metrics {
            if !groups.contains_key(&metric.name) {
                order.push(metric.name.clone());
            }
            groups.entry(metric.name.clone()).or_default().push(metric);
        }

        order
            .into_iter()
            .filter_map(|name| groups.remove(&name).map(|g| (name, g)))
            .collect()
    }

    fn format_metric_line(metric: &PrometheusMetric) -> String {
        let mut line = metric.name.clone();

        if !metric.labels.is_empty() {
            let label_pairs: Vec<String> = metric
                .sorted_labels()
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, Self::escape_label_value(v)))
                .collect();

            line.push('{');
            line.push_str(&label_pairs.join(","));
            line.push('}');
        }

        line.push(' ');
        line.push_str(&Self::format_value(metric.value));
        line
    }

    /// Format a numeric value
    ///
    /// NaN and infinities use their Prometheus spellings; whole numbers are
    /// written without a decimal point.
    fn format_value(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value.is_sign_positive() {
                "+Inf".to_string()
            } else {
                "-Inf".to_string()
            }
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            format!("{}", value)
        }
    }

    fn escape_help(help: &str) -> String {
        help.replace('\\', "\\\\").replace('\n', "\\n")
    }

    fn escape_label_value(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '\\' => escaped.push_str("\\\\"),
                '"' => escaped.push_str("\\\""),
                '\n' => escaped.push_str("\\n"),
                _ => escaped.push(c),
            }
        }
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(name: &str, tags: &[&str], hostname: Option<&str>) -> ReportedMetric {
        ReportedMetric {
            kind: ReportKind::Gauge,
            name: name.to_string(),
            value: 0.25,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            hostname: hostname.map(str::to_string),
        }
    }

    #[test]
    fn test_from_reported_maps_tags_and_hostname() {
        let metric = PrometheusMetric::from_reported(&reported(
            "vsphere.cpu.usage.avg",
            &["vcenter_server:vc1", "cpu_core:0", "env:prod", "env:blue", "standalone"],
            Some("web-01"),
        ));

        assert_eq!(metric.name, "vsphere_cpu_usage_avg");
        assert_eq!(metric.metric_type, MetricType::Gauge);
        assert_eq!(metric.labels["vcenter_server"], "vc1");
        assert_eq!(metric.labels["cpu_core"], "0");
        assert_eq!(metric.labels["env"], "prod,blue");
        assert_eq!(metric.labels["standalone"], "");
        assert_eq!(metric.labels[HOSTNAME_LABEL], "web-01");
    }

    #[test]
    fn test_host_tag_moves_aside_for_hostname() {
        let metric = PrometheusMetric::from_reported(&reported(
            "vsphere.cpu.usage.avg",
            &["host:esx1", "env:prod"],
            Some("web-01"),
        ));
        assert_eq!(metric.labels[HOSTNAME_LABEL], "web-01");
        assert_eq!(metric.labels[EXPORTED_HOST_LABEL], "esx1");

        // without a hostname the tag keeps its own key
        let metric = PrometheusMetric::from_reported(&reported("m", &["host:esx1"], None));
        assert_eq!(metric.labels[HOSTNAME_LABEL], "esx1");
        assert!(!metric.labels.contains_key(EXPORTED_HOST_LABEL));
    }

    #[test]
    fn test_tag_value_keeps_later_colons() {
        let metric = PrometheusMetric::from_reported(&reported("m", &["url:http://x:1"], None));
        assert_eq!(metric.labels["url"], "http://x:1");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("vsphere.disk.read.avg"), "vsphere_disk_read_avg");
        assert_eq!(sanitize_name("vsphere-host"), "vsphere_host");
        assert_eq!(sanitize_name("9lives"), "_9lives");
    }

    #[test]
    fn test_format_metric_with_labels() {
        let metrics = vec![PrometheusMetric::new("vsphere_mem_usage_avg", 12.5)
            .with_type(MetricType::Gauge)
            .with_label("vsphere_type", "vm")
            .with_label("host", "web-01")];

        let output = PrometheusFormatter::new().format(&metrics);

        assert!(output.contains("# TYPE vsphere_mem_usage_avg gauge"));
        assert!(output.contains("vsphere_mem_usage_avg{host=\"web-01\",vsphere_type=\"vm\"} 12.5"));
    }

    #[test]
    fn test_format_groups_same_name() {
        let metrics = vec![
            PrometheusMetric::new("vsphere_cpu_usage_avg", 1.0)
                .with_type(MetricType::Gauge)
                .with_help("CPU usage")
                .with_label("host", "a"),
            PrometheusMetric::new("vsphere_mem_usage_avg", 3.0).with_type(MetricType::Gauge),
            PrometheusMetric::new("vsphere_cpu_usage_avg", 2.0)
                .with_type(MetricType::Gauge)
                .with_label("host", "b"),
        ];

        let output = PrometheusFormatter::new().format(&metrics);

        assert_eq!(output.matches("# TYPE vsphere_cpu_usage_avg").count(), 1);
        assert_eq!(output.matches("# HELP vsphere_cpu_usage_avg").count(), 1);
        let a = output.find("host=\"a\"").unwrap();
        let b = output.find("host=\"b\"").unwrap();
        let mem = output.find("vsphere_mem_usage_avg 3").unwrap();
        assert!(a < b && b < mem);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(PrometheusFormatter::format_value(f64::NAN), "NaN");
        assert_eq!(PrometheusFormatter::format_value(f64::INFINITY), "+Inf");
        assert_eq!(PrometheusFormatter::format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(PrometheusFormatter::format_value(42.0), "42");
        assert_eq!(PrometheusFormatter::format_value(0.42), "0.42");
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(
            PrometheusFormatter::escape_label_value("all\"\\\n"),
            "all\\\"\\\\\\n"
        );
    }

    #[test]
    fn test_format_empty_metrics() {
        assert!(PrometheusFormatter::new().format(&[]).is_empty());
    }
}
