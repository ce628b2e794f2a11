//! Access to the vCenter inventory and performance manager
//!
//! [`Connection`] is the seam between the collection engine and the remote
//! API. [`HttpConnection`] talks to a JSON gateway in front of vCenter; tests
//! plug in their own in-memory implementation.
//!
//! # Example
//!
//! ```ignore
//! use vsphere_collector::connection::{Connection, HttpConnection};
//!
//! let conn = HttpConnection::new("http://localhost:8989/api", 5000)?;
//! let inventory = conn.fetch_inventory().await?;
//! ```

mod client;
mod parser;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::ConnectionResult;
use crate::inventory::{Inventory, ObjectHandle};

pub use client::HttpConnection;
pub use parser::{parse_available, parse_counters, parse_inventory, parse_samples};

/// Instance selector requesting only the aggregate value
pub const AGGREGATE_INSTANCE: &str = "";
/// Instance selector requesting every sub-resource instance
pub const ALL_INSTANCES: &str = "*";

/// Counter rollup type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupType {
    Average,
    Summation,
    Maximum,
    Minimum,
    Latest,
    None,
}

impl RollupType {
    /// Short form used in counter full names
    pub fn short_name(&self) -> &'static str {
        match self {
            RollupType::Average => "avg",
            RollupType::Summation => "sum",
            RollupType::Maximum => "max",
            RollupType::Minimum => "min",
            RollupType::Latest => "latest",
            RollupType::None => "raw",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "average" => Some(RollupType::Average),
            "summation" => Some(RollupType::Summation),
            "maximum" => Some(RollupType::Maximum),
            "minimum" => Some(RollupType::Minimum),
            "latest" => Some(RollupType::Latest),
            "none" => Some(RollupType::None),
            _ => None,
        }
    }
}

/// One entry of the server counter catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterInfo {
    pub key: u32,
    pub group: String,
    pub name: String,
    pub rollup: RollupType,
    pub unit: String,
}

impl CounterInfo {
    /// Dotted `group.name.rollup` identity, e.g. `cpu.usage.avg`
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.group, self.name, self.rollup.short_name())
    }
}

/// Counter to query for an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricId {
    pub counter_id: u32,
    pub instance: String,
}

impl MetricId {
    pub fn aggregate(counter_id: u32) -> Self {
        Self {
            counter_id,
            instance: AGGREGATE_INSTANCE.to_string(),
        }
    }

    pub fn all_instances(counter_id: u32) -> Self {
        Self {
            counter_id,
            instance: ALL_INSTANCES.to_string(),
        }
    }

    pub fn is_all_instances(&self) -> bool {
        self.instance == ALL_INSTANCES
    }
}

/// Values returned for one counter and instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub counter_id: u32,
    /// Empty for the aggregate value
    #[serde(default)]
    pub instance: String,
    /// Oldest first
    #[serde(default)]
    pub values: Vec<f64>,
}

impl Sample {
    pub fn is_aggregate(&self) -> bool {
        self.instance.is_empty()
    }
}

/// Remote API used by a collection cycle
///
/// Implementations own timeouts and transport concerns. Any error returned
/// here aborts the cycle.
pub trait Connection {
    /// Every managed object with its properties
    fn fetch_inventory(&self) -> impl Future<Output = ConnectionResult<Inventory>> + Send;

    /// Counter catalogue at the given collection level
    fn fetch_counters(
        &self,
        level: u8,
    ) -> impl Future<Output = ConnectionResult<Vec<CounterInfo>>> + Send;

    /// Counter ids the server can report for `entity`
    fn query_available_metrics(
        &self,
        entity: &ObjectHandle,
    ) -> impl Future<Output = ConnectionResult<Vec<u32>>> + Send;

    /// Latest samples for `metric_ids` on `entity`
    fn query_performance(
        &self,
        entity: &ObjectHandle,
        metric_ids: &[MetricId],
    ) -> impl Future<Output = ConnectionResult<Vec<Sample>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_uses_short_rollup() {
        let counter = CounterInfo {
            key: 2,
            group: "cpu".to_string(),
            name: "usage".to_string(),
            rollup: RollupType::Average,
            unit: "percent".to_string(),
        };
        assert_eq!(counter.full_name(), "cpu.usage.avg");

        let raw = CounterInfo {
            rollup: RollupType::None,
            ..counter
        };
        assert_eq!(raw.full_name(), "cpu.usage.raw");
    }

    #[test]
    fn test_rollup_from_wire() {
        assert_eq!(RollupType::from_wire("summation"), Some(RollupType::Summation));
        assert_eq!(RollupType::from_wire("median"), None);
    }

    #[test]
    fn test_metric_id_selectors() {
        assert!(MetricId::all_instances(5).is_all_instances());
        assert!(!MetricId::aggregate(5).is_all_instances());
        assert_eq!(MetricId::aggregate(5).instance, "");
    }
}
