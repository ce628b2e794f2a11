//! Sample selection and emission
//!
//! A counter collected per instance comes back as one aggregate sample plus
//! one sample per sub-resource. Reporting both would count the same quantity
//! twice, so selection keeps exactly one side per counter.

use std::collections::HashSet;

use tracing::debug;

use super::counters::CounterMap;
use super::Entity;
use crate::connection::{MetricId, Sample};
use crate::report::Reporter;

/// Prefix of emitted metric names
pub const METRIC_PREFIX: &str = "vsphere";

/// Tag key used for instances of counters without a specific mapping
pub const DEFAULT_INSTANCE_TAG: &str = "instance";

const INSTANCE_TAG_KEYS: &[(&str, &str)] = &[
    ("cpu.", "cpu_core"),
    ("datastore.", "vmware_datastore"),
    ("disk.", "vmware_disk"),
    ("gpu.", "gpu"),
    ("net.", "nic"),
    ("storageAdapter.", "storage_adapter"),
    ("storagePath.", "storage_path"),
    ("sys.", "system_resource"),
    ("virtualDisk.", "virtual_disk"),
];

/// Tag key for instance samples of `full_name`
pub fn instance_tag_key(full_name: &str) -> &'static str {
    INSTANCE_TAG_KEYS
        .iter()
        .find(|(prefix, _)| full_name.starts_with(prefix))
        .map(|(_, key)| *key)
        .unwrap_or(DEFAULT_INSTANCE_TAG)
}

/// A sample that survived selection, ready to report
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSample {
    pub counter_id: u32,
    pub full_name: String,
    pub value: f64,
    /// Rendered `key:instance` tag for instance samples
    pub instance_tag: Option<String>,
}

impl SelectedSample {
    pub fn metric_name(&self) -> String {
        format!("{}.{}", METRIC_PREFIX, self.full_name)
    }
}

/// Pick the samples to report from one query result
///
/// For counters requested with every instance, instance samples replace the
/// aggregate when at least one was returned. Everything else reports the
/// aggregate only. Empty samples, samples whose latest value is negative and
/// counters outside `counters` are skipped.
pub fn select_samples(
    samples: &[Sample],
    counters: &CounterMap,
    metric_ids: &[MetricId],
) -> Vec<SelectedSample> {
    let per_instance: HashSet<u32> = metric_ids
        .iter()
        .filter(|id| id.is_all_instances())
        .map(|id| id.counter_id)
        .collect();

    let has_instance_sample: HashSet<u32> = samples
        .iter()
        .filter(|s| !s.is_aggregate())
        .map(|s| s.counter_id)
        .collect();

    let mut selected = Vec::with_capacity(samples.len());

    for sample in samples {
        let Some(counter) = counters.get(&sample.counter_id) else {
            debug!(counter_id = sample.counter_id, "Skipping sample for unresolved counter");
            continue;
        };

        let use_instances = per_instance.contains(&sample.counter_id)
            && has_instance_sample.contains(&sample.counter_id);

        // instance samples or the aggregate, never both
        if use_instances == sample.is_aggregate() {
            continue;
        }

        let Some(&latest) = sample.values.last() else {
            debug!(
                counter = %counter.full_name,
                instance = %sample.instance,
                "Skipping empty sample"
            );
            continue;
        };

        if latest < 0.0 {
            debug!(
                counter = %counter.full_name,
                instance = %sample.instance,
                value = latest,
                "Skipping sample that is not available yet"
            );
            continue;
        }

        let value = if counter.is_percent() {
            latest / 100.0
        } else {
            latest
        };

        let instance_tag = (!sample.is_aggregate())
            .then(|| format!("{}:{}", instance_tag_key(&counter.full_name), sample.instance));

        selected.push(SelectedSample {
            counter_id: sample.counter_id,
            full_name: counter.full_name.clone(),
            value,
            instance_tag,
        });
    }

    selected
}

/// Report the selected samples of `entity`, returning how many were emitted
pub fn collect<R: Reporter + ?Sized>(
    entity: &Entity,
    samples: &[Sample],
    metric_ids: &[MetricId],
    counters: &CounterMap,
    reporter: &mut R,
) -> usize {
    let selected = select_samples(samples, counters, metric_ids);

    for sample in &selected {
        let mut tags = entity.metric_tags.clone();
        if let Some(instance_tag) = &sample.instance_tag {
            tags.push(instance_tag.clone());
        }
        reporter.gauge(
            &sample.metric_name(),
            sample.value,
            &tags,
            entity.hostname.as_deref(),
        );
    }

    selected.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::counters::CounterDescriptor;
    use crate::inventory::ResourceType;

    fn counters() -> CounterMap {
        [
            (2, "cpu.usage.avg", "percent"),
            (6, "cpu.usagemhz.avg", "megaHertz"),
            (150, "net.received.avg", "kiloBytesPerSecond"),
            (300, "made.up.latest", "number"),
        ]
        .into_iter()
        .map(|(id, name, unit)| {
            (
                id,
                CounterDescriptor {
                    counter_id: id,
                    full_name: name.to_string(),
                    resource_type: ResourceType::Vm,
                    unit: unit.to_string(),
                },
            )
        })
        .collect()
    }

    fn sample(counter_id: u32, instance: &str, values: &[f64]) -> Sample {
        Sample {
            counter_id,
            instance: instance.to_string(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_instance_tag_key() {
        assert_eq!(instance_tag_key("cpu.usage.avg"), "cpu_core");
        assert_eq!(instance_tag_key("net.received.avg"), "nic");
        assert_eq!(instance_tag_key("mem.usage.avg"), DEFAULT_INSTANCE_TAG);
    }

    #[test]
    fn test_per_instance_drops_aggregate() {
        let ids = vec![MetricId::all_instances(6)];
        let samples = vec![
            sample(6, "", &[300.0]),
            sample(6, "0", &[100.0]),
            sample(6, "1", &[200.0]),
        ];

        let selected = select_samples(&samples, &counters(), &ids);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|s| s.instance_tag.is_some()));
        assert_eq!(selected[0].instance_tag.as_deref(), Some("cpu_core:0"));
        assert_eq!(selected[1].value, 200.0);
    }

    #[test]
    fn test_per_instance_without_instance_samples_uses_aggregate() {
        let ids = vec![MetricId::all_instances(150)];
        let samples = vec![sample(150, "", &[5.0])];

        let selected = select_samples(&samples, &counters(), &ids);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].instance_tag, None);
    }

    #[test]
    fn test_non_per_instance_emits_only_aggregate() {
        let ids = vec![MetricId::aggregate(150)];
        let samples = vec![sample(150, "vmnic0", &[1.0]), sample(150, "", &[7.0])];

        let selected = select_samples(&samples, &counters(), &ids);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].value, 7.0);
        assert_eq!(selected[0].instance_tag, None);
    }

    #[test]
    fn test_negative_latest_is_skipped() {
        let ids = vec![MetricId::aggregate(6)];
        let selected = select_samples(&[sample(6, "", &[-1.0])], &counters(), &ids);
        assert!(selected.is_empty());

        // only the latest value matters
        let selected = select_samples(&[sample(6, "", &[-1.0, 4.0])], &counters(), &ids);
        assert_eq!(selected[0].value, 4.0);
        let selected = select_samples(&[sample(6, "", &[4.0, -1.0])], &counters(), &ids);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_empty_and_unknown_samples_are_skipped() {
        let ids = vec![MetricId::aggregate(6), MetricId::aggregate(999)];
        let samples = vec![sample(6, "", &[]), sample(999, "", &[1.0])];
        assert!(select_samples(&samples, &counters(), &ids).is_empty());
    }

    #[test]
    fn test_percent_is_scaled() {
        let ids = vec![MetricId::aggregate(2)];
        let selected = select_samples(&[sample(2, "", &[10.0, 4250.0])], &counters(), &ids);
        assert_eq!(selected[0].value, 42.5);
        assert_eq!(selected[0].metric_name(), "vsphere.cpu.usage.avg");
    }

    #[test]
    fn test_default_instance_tag() {
        let ids = vec![MetricId::all_instances(300)];
        let selected = select_samples(&[sample(300, "x", &[1.0])], &counters(), &ids);
        assert_eq!(selected[0].instance_tag.as_deref(), Some("instance:x"));
    }
}
