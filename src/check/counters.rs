//! Counter resolution
//!
//! Narrows the server counter catalogue to the counters each resource type
//! reports, applies the configured metric filters, and intersects the
//! result with what a given entity can actually serve.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::connection::{CounterInfo, MetricId};
use crate::inventory::ResourceType;

/// Counter every entity reports regardless of metric filters
pub const REFERENCE_METRIC: &str = "cpu.usage.avg";

const VM_COUNTERS: &[&str] = &[
    "cpu.costop.sum",
    "cpu.demand.avg",
    "cpu.idle.sum",
    "cpu.latency.avg",
    "cpu.ready.sum",
    "cpu.run.sum",
    "cpu.swapwait.sum",
    "cpu.usage.avg",
    "cpu.usagemhz.avg",
    "cpu.used.sum",
    "cpu.wait.sum",
    "datastore.numberReadAveraged.avg",
    "datastore.numberWriteAveraged.avg",
    "datastore.read.avg",
    "datastore.totalReadLatency.avg",
    "datastore.totalWriteLatency.avg",
    "datastore.write.avg",
    "disk.maxTotalLatency.latest",
    "disk.read.avg",
    "disk.usage.avg",
    "disk.write.avg",
    "mem.active.avg",
    "mem.balloon.avg",
    "mem.compressed.avg",
    "mem.consumed.avg",
    "mem.granted.avg",
    "mem.overhead.avg",
    "mem.shared.avg",
    "mem.swapin.avg",
    "mem.swapout.avg",
    "mem.swapped.avg",
    "mem.usage.avg",
    "mem.vmmemctl.avg",
    "net.bytesRx.avg",
    "net.bytesTx.avg",
    "net.droppedRx.sum",
    "net.droppedTx.sum",
    "net.packetsRx.sum",
    "net.packetsTx.sum",
    "net.received.avg",
    "net.transmitted.avg",
    "net.usage.avg",
    "sys.heartbeat.latest",
    "sys.osUptime.latest",
    "sys.uptime.latest",
    "virtualDisk.read.avg",
    "virtualDisk.totalReadLatency.avg",
    "virtualDisk.totalWriteLatency.avg",
    "virtualDisk.write.avg",
];

const HOST_COUNTERS: &[&str] = &[
    "cpu.coreUtilization.avg",
    "cpu.costop.sum",
    "cpu.demand.avg",
    "cpu.idle.sum",
    "cpu.latency.avg",
    "cpu.ready.sum",
    "cpu.reservedCapacity.avg",
    "cpu.totalCapacity.avg",
    "cpu.usage.avg",
    "cpu.usagemhz.avg",
    "cpu.used.sum",
    "cpu.utilization.avg",
    "cpu.wait.sum",
    "datastore.datastoreIops.avg",
    "datastore.read.avg",
    "datastore.totalReadLatency.avg",
    "datastore.totalWriteLatency.avg",
    "datastore.write.avg",
    "disk.deviceLatency.avg",
    "disk.kernelLatency.avg",
    "disk.maxTotalLatency.latest",
    "disk.queueLatency.avg",
    "disk.read.avg",
    "disk.totalLatency.avg",
    "disk.usage.avg",
    "disk.write.avg",
    "gpu.mem.usage.avg",
    "gpu.utilization.avg",
    "mem.active.avg",
    "mem.balloon.avg",
    "mem.consumed.avg",
    "mem.granted.avg",
    "mem.heap.avg",
    "mem.overhead.avg",
    "mem.shared.avg",
    "mem.swapin.avg",
    "mem.swapout.avg",
    "mem.swapused.avg",
    "mem.totalCapacity.avg",
    "mem.usage.avg",
    "mem.vmmemctl.avg",
    "net.bytesRx.avg",
    "net.bytesTx.avg",
    "net.droppedRx.sum",
    "net.droppedTx.sum",
    "net.errorsRx.sum",
    "net.errorsTx.sum",
    "net.packetsRx.sum",
    "net.packetsTx.sum",
    "net.received.avg",
    "net.transmitted.avg",
    "net.usage.avg",
    "power.power.avg",
    "storageAdapter.read.avg",
    "storageAdapter.totalReadLatency.avg",
    "storageAdapter.totalWriteLatency.avg",
    "storageAdapter.write.avg",
    "storagePath.read.avg",
    "storagePath.write.avg",
    "sys.uptime.latest",
];

const DATASTORE_COUNTERS: &[&str] = &[
    "datastore.busResets.sum",
    "datastore.commandsAborted.sum",
    "datastore.numberReadAveraged.avg",
    "datastore.numberWriteAveraged.avg",
    "disk.capacity.latest",
    "disk.capacity.contention.avg",
    "disk.capacity.provisioned.avg",
    "disk.capacity.usage.avg",
    "disk.numberReadAveraged.avg",
    "disk.numberWriteAveraged.avg",
    "disk.provisioned.latest",
    "disk.unshared.latest",
    "disk.used.latest",
];

const DATACENTER_COUNTERS: &[&str] = &[
    "vmop.numChangeDS.latest",
    "vmop.numChangeHost.latest",
    "vmop.numChangeHostDS.latest",
    "vmop.numClone.latest",
    "vmop.numCreate.latest",
    "vmop.numDeploy.latest",
    "vmop.numDestroy.latest",
    "vmop.numPoweroff.latest",
    "vmop.numPoweron.latest",
    "vmop.numRebootGuest.latest",
    "vmop.numReconfigure.latest",
    "vmop.numRegister.latest",
    "vmop.numReset.latest",
    "vmop.numSVMotion.latest",
    "vmop.numShutdownGuest.latest",
    "vmop.numStandbyGuest.latest",
    "vmop.numSuspend.latest",
    "vmop.numUnregister.latest",
    "vmop.numVMotion.latest",
    "vmop.numXVMotion.latest",
];

const CLUSTER_COUNTERS: &[&str] = &[
    "clusterServices.cpufairness.latest",
    "clusterServices.effectivecpu.avg",
    "clusterServices.effectivemem.avg",
    "clusterServices.failover.latest",
    "clusterServices.memfairness.latest",
    "cpu.totalmhz.avg",
    "cpu.usage.avg",
    "cpu.usagemhz.avg",
    "mem.consumed.avg",
    "mem.overhead.avg",
    "mem.totalmb.avg",
    "mem.usage.avg",
    "mem.vmmemctl.avg",
    "vmop.numChangeDS.latest",
    "vmop.numChangeHost.latest",
    "vmop.numClone.latest",
    "vmop.numCreate.latest",
    "vmop.numDestroy.latest",
    "vmop.numPoweroff.latest",
    "vmop.numPoweron.latest",
    "vmop.numVMotion.latest",
];

static ALLOWED_COUNTERS: Lazy<HashMap<ResourceType, HashSet<&'static str>>> = Lazy::new(|| {
    [
        (ResourceType::Vm, VM_COUNTERS),
        (ResourceType::Host, HOST_COUNTERS),
        (ResourceType::Datastore, DATASTORE_COUNTERS),
        (ResourceType::Datacenter, DATACENTER_COUNTERS),
        (ResourceType::Cluster, CLUSTER_COUNTERS),
    ]
    .into_iter()
    .map(|(rt, names)| (rt, names.iter().copied().collect()))
    .collect()
});

/// Whether `full_name` is a recognised counter for `resource_type`
pub fn is_allowed(resource_type: ResourceType, full_name: &str) -> bool {
    ALLOWED_COUNTERS
        .get(&resource_type)
        .is_some_and(|names| names.contains(full_name))
}

/// A catalogue counter visible to one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct CounterDescriptor {
    pub counter_id: u32,
    pub full_name: String,
    pub resource_type: ResourceType,
    pub unit: String,
}

impl CounterDescriptor {
    /// Percent counters are reported by the server in hundredths
    pub fn is_percent(&self) -> bool {
        self.unit == "percent"
    }
}

/// Counter id to descriptor, ordered by id
pub type CounterMap = BTreeMap<u32, CounterDescriptor>;

/// Counters from `catalogue` reported for `resource_type`
///
/// A counter is kept when it is in the type's allow-list and no pattern in
/// `metric_filters` matches its full name. [`REFERENCE_METRIC`] ignores the
/// filters.
pub fn available_counters_for(
    resource_type: ResourceType,
    catalogue: &[CounterInfo],
    metric_filters: &[Regex],
) -> CounterMap {
    let mut counters = CounterMap::new();

    for counter in catalogue {
        let full_name = counter.full_name();
        if !is_allowed(resource_type, &full_name) {
            continue;
        }

        if full_name != REFERENCE_METRIC
            && metric_filters.iter().any(|re| re.is_match(&full_name))
        {
            debug!(
                resource_type = %resource_type,
                counter = %full_name,
                "Counter excluded by metric filter"
            );
            continue;
        }

        counters.insert(
            counter.key,
            CounterDescriptor {
                counter_id: counter.key,
                full_name,
                resource_type,
                unit: counter.unit.clone(),
            },
        );
    }

    counters
}

/// Metric ids to query for one entity
///
/// Only counters the entity reports as available are requested. Counters
/// matching `per_instance` ask for every instance, the others for the
/// aggregate only.
pub fn metric_ids_for(
    counters: &CounterMap,
    available: &[u32],
    per_instance: &[Regex],
) -> Vec<MetricId> {
    let available: HashSet<u32> = available.iter().copied().collect();

    counters
        .values()
        .filter(|c| available.contains(&c.counter_id))
        .map(|c| {
            if per_instance.iter().any(|re| re.is_match(&c.full_name)) {
                MetricId::all_instances(c.counter_id)
            } else {
                MetricId::aggregate(c.counter_id)
            }
        })
        .collect()
}

/// Compiled regexes keyed by resource type
#[derive(Debug, Clone, Default)]
pub struct PatternMap {
    patterns: HashMap<ResourceType, Vec<Regex>>,
}

impl PatternMap {
    /// Compile a `resource type -> patterns` config map
    ///
    /// Unknown resource types and invalid patterns are logged and skipped.
    pub fn compile(option: &str, raw: &HashMap<String, Vec<String>>) -> Self {
        let mut patterns: HashMap<ResourceType, Vec<Regex>> = HashMap::new();

        for (resource, list) in raw {
            let Ok(resource_type) = resource.parse::<ResourceType>() else {
                warn!(
                    option,
                    resource = %resource,
                    "Ignoring patterns for unsupported resource type"
                );
                continue;
            };

            let compiled = patterns.entry(resource_type).or_default();
            for pattern in list {
                match Regex::new(pattern) {
                    Ok(re) => compiled.push(re),
                    Err(e) => warn!(
                        option,
                        resource = %resource,
                        pattern = %pattern,
                        error = %e,
                        "Ignoring invalid pattern"
                    ),
                }
            }
        }

        Self { patterns }
    }

    pub fn get(&self, resource_type: ResourceType) -> &[Regex] {
        self.patterns
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Source text of the patterns for `resource_type`
    pub fn sources(&self, resource_type: ResourceType) -> Vec<String> {
        self.get(resource_type)
            .iter()
            .map(|re| re.as_str().to_string())
            .collect()
    }
}
