//! Gateway JSON response parser
//!
//! Converts the gateway's JSON bodies into inventory and counter types.
//! Entries the model does not know about (object kinds, rollups) are
//! skipped at debug level rather than failing the whole response.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{CounterInfo, RollupType, Sample};
use crate::error::{ConnectionError, ConnectionResult};
use crate::inventory::{Inventory, ManagedObjectKind, ObjectHandle, PropertyBag, PropertyValue};

#[derive(Deserialize)]
struct RawInventoryResponse {
    objects: Vec<RawObject>,
}

#[derive(Deserialize)]
struct RawObject {
    obj: RawHandle,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
struct RawHandle {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Deserialize)]
struct RawCountersResponse {
    counters: Vec<RawCounter>,
}

#[derive(Deserialize)]
struct RawCounter {
    key: u32,
    group: String,
    name: String,
    rollup: String,
    #[serde(default)]
    unit: String,
}

#[derive(Deserialize)]
struct RawAvailableResponse {
    counter_ids: Vec<u32>,
}

#[derive(Deserialize)]
struct RawSamplesResponse {
    samples: Vec<Sample>,
}

fn decode<'a, T: Deserialize<'a>>(json: &'a str) -> ConnectionResult<T> {
    serde_json::from_str(json).map_err(|e| ConnectionError::Decode(e.to_string()))
}

/// Parse an `inventory` response
pub fn parse_inventory(json: &str) -> ConnectionResult<Inventory> {
    let raw: RawInventoryResponse = decode(json)?;
    let mut inventory = Inventory::new();

    for object in raw.objects {
        let Some(kind) = ManagedObjectKind::from_wire(&object.obj.kind) else {
            debug!(
                kind = %object.obj.kind,
                id = %object.obj.id,
                "Skipping unsupported object kind"
            );
            continue;
        };

        let mut bag = PropertyBag::new();
        for (key, value) in object.properties {
            match convert_property(value) {
                Some(v) => bag.insert(key, v),
                None => debug!(property = %key, id = %object.obj.id, "Dropping unset property"),
            }
        }

        inventory.insert(ObjectHandle::new(kind, object.obj.id), bag);
    }

    Ok(inventory)
}

fn convert_property(value: Value) -> Option<PropertyValue> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(PropertyValue::Text(s)),
        Value::Bool(b) => Some(PropertyValue::Text(b.to_string())),
        Value::Number(n) => Some(PropertyValue::Text(n.to_string())),
        Value::Object(_) => {
            let handle: RawHandle = serde_json::from_value(value).ok()?;
            // References to kinds outside the model are dropped, which ends
            // a parent walk at that point.
            let kind = ManagedObjectKind::from_wire(&handle.kind)?;
            Some(PropertyValue::Handle(ObjectHandle::new(kind, handle.id)))
        }
        Value::Array(_) => None,
    }
}

/// Parse a `counters` response
pub fn parse_counters(json: &str) -> ConnectionResult<Vec<CounterInfo>> {
    let raw: RawCountersResponse = decode(json)?;

    Ok(raw
        .counters
        .into_iter()
        .filter_map(|c| match RollupType::from_wire(&c.rollup) {
            Some(rollup) => Some(CounterInfo {
                key: c.key,
                group: c.group,
                name: c.name,
                rollup,
                unit: c.unit,
            }),
            None => {
                debug!(key = c.key, rollup = %c.rollup, "Skipping counter with unknown rollup");
                None
            }
        })
        .collect())
}

/// Parse an `available` response
pub fn parse_available(json: &str) -> ConnectionResult<Vec<u32>> {
    let raw: RawAvailableResponse = decode(json)?;
    Ok(raw.counter_ids)
}

/// Parse a `query` response
pub fn parse_samples(json: &str) -> ConnectionResult<Vec<Sample>> {
    let raw: RawSamplesResponse = decode(json)?;
    Ok(raw.samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inventory() {
        let json = r#"{
            "objects": [
                {
                    "obj": {"type": "VirtualMachine", "id": "vm-1"},
                    "properties": {
                        "name": "web-01",
                        "parent": {"type": "Folder", "id": "group-v3"},
                        "runtime.host": {"type": "HostSystem", "id": "host-9"},
                        "runtime.powerState": "poweredOn",
                        "guest.hostName": null
                    }
                },
                {
                    "obj": {"type": "Network", "id": "network-1"},
                    "properties": {"name": "VM Network"}
                }
            ]
        }"#;

        let inventory = parse_inventory(json).unwrap();
        assert_eq!(inventory.len(), 1);

        let vm = ObjectHandle::new(ManagedObjectKind::VirtualMachine, "vm-1");
        let bag = inventory.get(&vm).unwrap();
        assert_eq!(bag.name(), Some("web-01"));
        assert_eq!(
            bag.parent(),
            Some(&ObjectHandle::new(ManagedObjectKind::Folder, "group-v3"))
        );
        assert_eq!(
            bag.runtime_host(),
            Some(&ObjectHandle::new(ManagedObjectKind::HostSystem, "host-9"))
        );
        assert_eq!(bag.guest_hostname(), None);
    }

    #[test]
    fn test_parse_inventory_numeric_property() {
        let json = r#"{"objects": [{"obj": {"type": "HostSystem", "id": "host-1"},
            "properties": {"name": "esx1", "summary.hardware.numCpuCores": 16}}]}"#;
        let inventory = parse_inventory(json).unwrap();
        let host = ObjectHandle::new(ManagedObjectKind::HostSystem, "host-1");
        assert_eq!(
            inventory.get(&host).unwrap().text("summary.hardware.numCpuCores"),
            Some("16")
        );
    }

    #[test]
    fn test_parse_counters_skips_unknown_rollup() {
        let json = r#"{"counters": [
            {"key": 2, "group": "cpu", "name": "usage", "rollup": "average", "unit": "percent"},
            {"key": 3, "group": "cpu", "name": "odd", "rollup": "median", "unit": "number"}
        ]}"#;
        let counters = parse_counters(json).unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].full_name(), "cpu.usage.avg");
        assert_eq!(counters[0].unit, "percent");
    }

    #[test]
    fn test_parse_samples() {
        let json = r#"{"samples": [
            {"counter_id": 2, "instance": "", "values": [10, 20]},
            {"counter_id": 2, "instance": "0", "values": []},
            {"counter_id": 7}
        ]}"#;
        let samples = parse_samples(json).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples[0].is_aggregate());
        assert_eq!(samples[0].values, vec![10.0, 20.0]);
        assert_eq!(samples[1].instance, "0");
        assert!(samples[2].values.is_empty());
    }

    #[test]
    fn test_parse_available() {
        assert_eq!(parse_available(r#"{"counter_ids": [1, 2, 3]}"#).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_inventory("{not json"),
            Err(ConnectionError::Decode(_))
        ));
        assert!(matches!(
            parse_counters(r#"{"objects": []}"#),
            Err(ConnectionError::Decode(_))
        ));
    }
}
