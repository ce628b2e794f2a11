//! vSphere collection cycle
//!
//! One cycle fetches the inventory and counter catalogue, then for every
//! collectable entity resolves its tags and counters, queries the latest
//! samples and reports them. External host tags are published once at the
//! end of the cycle.
//!
//! # Example
//!
//! ```ignore
//! use vsphere_collector::check::VSphereCheck;
//! use vsphere_collector::connection::HttpConnection;
//! use vsphere_collector::report::BufferedReporter;
//!
//! let check = VSphereCheck::new(&config.check);
//! let conn = HttpConnection::new(&config.gateway.url, config.gateway.timeout_ms)?;
//! let mut reporter = BufferedReporter::new();
//! let summary = check.run(&conn, &mut reporter).await?;
//! ```

pub mod counters;
pub mod filters;
pub mod samples;
pub mod tags;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CheckConfig;
use crate::connection::Connection;
use crate::error::{ConnectionResult, TagError};
use crate::inventory::{Inventory, ObjectHandle, ResourceType, POWERED_ON};
use crate::report::{ExternalHostTags, Reporter};

pub use counters::{
    available_counters_for, metric_ids_for, CounterDescriptor, CounterMap, PatternMap,
    REFERENCE_METRIC,
};
pub use filters::{is_collected, FilterKind, FilterProperty, FilterSet, ResourceFilter};
pub use samples::{select_samples, SelectedSample};
pub use tags::{resolve_tags, Tag, TagKey};

/// One collectable object for the current cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub handle: ObjectHandle,
    pub resource_type: ResourceType,
    /// Reporting hostname; `None` for historical resources
    pub hostname: Option<String>,
    /// Every tag describing the entity
    pub tags: Vec<String>,
    /// Tags published as external host tags for `hostname`
    pub host_tags: Vec<String>,
    /// Tags attached to each metric of the entity
    pub metric_tags: Vec<String>,
}

/// Outcome of one collection cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Entities collected
    pub entities: usize,
    /// Objects skipped by filters, power state or tag errors
    pub skipped: usize,
    /// Gauges reported
    pub samples: usize,
}

/// Active configuration as seen by the engine
#[derive(Debug, Clone, Serialize)]
pub struct CheckPlan {
    pub instance: String,
    pub resource_types: Vec<ResourceType>,
    pub resource_filters: Vec<FilterPlan>,
    pub metric_filters: BTreeMap<String, Vec<String>>,
    pub collect_per_instance_filters: BTreeMap<String, Vec<String>>,
    pub excluded_host_tags: Vec<String>,
}

/// One active resource filter
#[derive(Debug, Clone, Serialize)]
pub struct FilterPlan {
    pub resource: ResourceType,
    pub property: FilterProperty,
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub patterns: Vec<String>,
}

/// A configured vCenter instance
#[derive(Debug, Clone)]
pub struct VSphereCheck {
    name: String,
    user_tags: Vec<String>,
    filters: FilterSet,
    metric_filters: PatternMap,
    per_instance_filters: PatternMap,
    excluded_host_tags: HashSet<String>,
    use_guest_hostname: bool,
    collection_level: u8,
    tag_prefix: String,
    resource_types: Vec<ResourceType>,
}

impl VSphereCheck {
    /// Build the check, dropping invalid filter definitions with a warning
    pub fn new(config: &CheckConfig) -> Self {
        let mut resource_types = ResourceType::REALTIME.to_vec();
        if config.collect_historical {
            resource_types.extend(ResourceType::HISTORICAL);
        }

        Self {
            name: config.name.clone(),
            user_tags: config.tags.clone(),
            filters: FilterSet::from_config(&config.resource_filters),
            metric_filters: PatternMap::compile("metric_filters", &config.metric_filters),
            per_instance_filters: PatternMap::compile(
                "collect_per_instance_filters",
                &config.collect_per_instance_filters,
            ),
            excluded_host_tags: config.excluded_host_tags.iter().cloned().collect(),
            use_guest_hostname: config.use_guest_hostname,
            collection_level: config.collection_level,
            tag_prefix: config.tag_prefix.clone(),
            resource_types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn resource_types(&self) -> &[ResourceType] {
        &self.resource_types
    }

    fn instance_tag(&self) -> String {
        format!("vcenter_server:{}", self.name)
    }

    /// Tags on every `<type>.count` metric
    fn count_tags(&self) -> Vec<String> {
        let mut tags = vec![self.instance_tag()];
        tags.extend(self.user_tags.iter().cloned());
        tags
    }

    fn is_excluded_host_tag(&self, tag: &str) -> bool {
        let key = tag.split_once(':').map_or(tag, |(k, _)| k);
        self.excluded_host_tags.contains(key)
    }

    /// Summary of the active configuration
    pub fn plan(&self) -> CheckPlan {
        let sources = |map: &PatternMap| -> BTreeMap<String, Vec<String>> {
            ResourceType::ALL
                .iter()
                .map(|rt| (rt.to_string(), map.sources(*rt)))
                .filter(|(_, patterns)| !patterns.is_empty())
                .collect()
        };

        let mut excluded_host_tags: Vec<String> = self.excluded_host_tags.iter().cloned().collect();
        excluded_host_tags.sort();

        CheckPlan {
            instance: self.name.clone(),
            resource_types: self.resource_types.clone(),
            resource_filters: self
                .filters
                .filters()
                .iter()
                .map(|f| FilterPlan {
                    resource: f.resource_type(),
                    property: f.property(),
                    kind: f.kind(),
                    patterns: f.patterns().to_vec(),
                })
                .collect(),
            metric_filters: sources(&self.metric_filters),
            collect_per_instance_filters: sources(&self.per_instance_filters),
            excluded_host_tags,
        }
    }

    /// Whether `handle` takes part in this cycle
    pub fn should_collect(
        &self,
        handle: &ObjectHandle,
        resource_type: ResourceType,
        inventory: &Inventory,
    ) -> bool {
        if resource_type == ResourceType::Vm {
            let power_state = inventory.get(handle).and_then(|p| p.power_state());
            if power_state != Some(POWERED_ON) {
                debug!(
                    object = %handle,
                    power_state = ?power_state,
                    "Skipping VM that is not powered on"
                );
                return false;
            }
        }

        if !self.filters.is_collected(handle, resource_type, inventory) {
            debug!(object = %handle, resource_type = %resource_type, "Object filtered out");
            return false;
        }

        true
    }

    /// Resolve hostname and tags for `handle`
    ///
    /// Returns `Ok(None)` when the object has no name yet.
    pub fn build_entity(
        &self,
        handle: &ObjectHandle,
        resource_type: ResourceType,
        inventory: &Inventory,
    ) -> Result<Option<Entity>, TagError> {
        let Some(properties) = inventory.get(handle) else {
            return Ok(None);
        };
        let Some(name) = properties.name() else {
            debug!(object = %handle, "Skipping object without a name");
            return Ok(None);
        };

        let hostname = match resource_type {
            ResourceType::Vm => Some(
                properties
                    .guest_hostname()
                    .filter(|h| self.use_guest_hostname && !h.is_empty())
                    .unwrap_or(name)
                    .to_string(),
            ),
            ResourceType::Host => Some(name.to_string()),
            _ => None,
        };

        let mut hierarchy = resolve_tags(handle, inventory, None)?;

        if resource_type == ResourceType::Vm {
            let host_name = properties
                .runtime_host()
                .and_then(|h| inventory.name_of(h))
                .unwrap_or(tags::UNKNOWN_NAME);
            hierarchy.push(Tag::new(TagKey::Host, host_name));

            if let Some(host) = properties.runtime_host() {
                let only_cluster: HashSet<TagKey> = [TagKey::Cluster].into_iter().collect();
                hierarchy.extend(resolve_tags(host, inventory, Some(&only_cluster))?);
            }
        }

        // historical resources carry their own name as well
        let self_key = match resource_type {
            ResourceType::Datastore => Some(TagKey::Datastore),
            ResourceType::Datacenter => Some(TagKey::Datacenter),
            ResourceType::Cluster => Some(TagKey::Cluster),
            ResourceType::Vm | ResourceType::Host => None,
        };
        if let Some(key) = self_key {
            hierarchy.push(Tag::new(key, name));
        }

        hierarchy.push(Tag::new(TagKey::Type, resource_type.as_str()));

        let mut tags = vec![self.instance_tag()];
        tags.extend(hierarchy.iter().map(|t| t.render(&self.tag_prefix)));

        let (host_tags, mut metric_tags) = if hostname.is_some() {
            let (excluded, published): (Vec<String>, Vec<String>) =
                tags.iter().cloned().partition(|t| self.is_excluded_host_tag(t));
            (published, excluded)
        } else {
            (Vec::new(), tags.clone())
        };
        metric_tags.extend(self.user_tags.iter().cloned());

        Ok(Some(Entity {
            handle: handle.clone(),
            resource_type,
            hostname,
            tags,
            host_tags,
            metric_tags,
        }))
    }

    /// Run one collection cycle
    ///
    /// # Errors
    /// Any connection failure aborts the cycle. Filter and data problems
    /// only skip the affected object or sample.
    pub async fn run<C, R>(&self, conn: &C, reporter: &mut R) -> ConnectionResult<CycleSummary>
    where
        C: Connection + Sync,
        R: Reporter + Send,
    {
        let inventory = conn.fetch_inventory().await?;
        let catalogue = conn.fetch_counters(self.collection_level).await?;
        let count_tags = self.count_tags();

        let mut summary = CycleSummary::default();
        let mut external_tags = Vec::new();

        for &resource_type in &self.resource_types {
            let counters = available_counters_for(
                resource_type,
                &catalogue,
                self.metric_filters.get(resource_type),
            );

            for handle in inventory.handles_of(resource_type.kind()) {
                if !self.should_collect(handle, resource_type, &inventory) {
                    summary.skipped += 1;
                    continue;
                }

                let entity = match self.build_entity(handle, resource_type, &inventory) {
                    Ok(Some(entity)) => entity,
                    Ok(None) => {
                        summary.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            object = %handle,
                            error = %e,
                            "Skipping object with invalid ancestry"
                        );
                        summary.skipped += 1;
                        continue;
                    }
                };

                reporter.count(
                    &format!("{}.{}.count", samples::METRIC_PREFIX, resource_type),
                    1.0,
                    &count_tags,
                    None,
                );
                summary.entities += 1;

                if let Some(hostname) = &entity.hostname {
                    external_tags.push(ExternalHostTags::new(
                        hostname.clone(),
                        entity.host_tags.clone(),
                    ));
                }

                let available = conn.query_available_metrics(handle).await?;
                let metric_ids = metric_ids_for(
                    &counters,
                    &available,
                    self.per_instance_filters.get(resource_type),
                );
                if metric_ids.is_empty() {
                    debug!(object = %handle, "No queryable counters");
                    continue;
                }

                let results = conn.query_performance(handle, &metric_ids).await?;
                summary.samples +=
                    samples::collect(&entity, &results, &metric_ids, &counters, reporter);
            }
        }

        reporter.set_external_tags(external_tags);

        info!(
            instance = %self.name,
            entities = summary.entities,
            skipped = summary.skipped,
            samples = summary.samples,
            "Collection cycle complete"
        );

        Ok(summary)
    }
}
