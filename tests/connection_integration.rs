//! Gateway client integration tests
//!
//! HTTP mocking with wiremock

use serde_json::json;
use std::time::Duration;
use vsphere_collector::connection::{Connection, HttpConnection, MetricId, RollupType};
use vsphere_collector::error::ConnectionError;
use vsphere_collector::inventory::{ManagedObjectKind, ObjectHandle};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn vm1() -> ObjectHandle {
    ObjectHandle::new(ManagedObjectKind::VirtualMachine, "vm-1")
}

#[tokio::test]
async fn test_fetch_inventory() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objects": [
                {
                    "obj": {"type": "HostSystem", "id": "host-1"},
                    "properties": {"name": "esx1", "parent": {"type": "ClusterComputeResource", "id": "domain-c7"}}
                },
                {
                    "obj": {"type": "ClusterComputeResource", "id": "domain-c7"},
                    "properties": {"name": "cluster1"}
                },
                {
                    "obj": {"type": "VirtualMachine", "id": "vm-1"},
                    "properties": {
                        "name": "web-01",
                        "runtime.host": {"type": "HostSystem", "id": "host-1"},
                        "runtime.powerState": "poweredOn"
                    }
                }
            ]
        })))
        .mount(&mock_server)
        .await;

    let conn = HttpConnection::new(&format!("{}/api", mock_server.uri()), 5000).unwrap();
    let inventory = conn.fetch_inventory().await.unwrap();

    assert_eq!(inventory.len(), 3);
    let bag = inventory.get(&vm1()).unwrap();
    assert_eq!(bag.power_state(), Some("poweredOn"));
    let host = bag.runtime_host().unwrap();
    assert_eq!(inventory.name_of(host), Some("esx1"));
    assert_eq!(inventory.handles_of(ManagedObjectKind::HostSystem).len(), 1);
}

#[tokio::test]
async fn test_fetch_counters_sends_level() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/counters"))
        .and(body_json(json!({"level": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "counters": [
                {"key": 2, "group": "cpu", "name": "usage", "rollup": "average", "unit": "percent"},
                {"key": 12, "group": "cpu", "name": "ready", "rollup": "summation", "unit": "millisecond"}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let conn = HttpConnection::new(&format!("{}/api", mock_server.uri()), 5000).unwrap();
    let counters = conn.fetch_counters(3).await.unwrap();

    assert_eq!(counters.len(), 2);
    assert_eq!(counters[0].full_name(), "cpu.usage.avg");
    assert_eq!(counters[1].rollup, RollupType::Summation);
    assert_eq!(counters[1].full_name(), "cpu.ready.sum");
}

#[tokio::test]
async fn test_query_available_metrics() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/available"))
        .and(body_json(json!({"entity": {"type": "VirtualMachine", "id": "vm-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"counter_ids": [2, 6, 24]})))
        .mount(&mock_server)
        .await;

    let conn = HttpConnection::new(&format!("{}/api", mock_server.uri()), 5000).unwrap();
    let available = conn.query_available_metrics(&vm1()).await.unwrap();
    assert_eq!(available, vec![2, 6, 24]);
}

#[tokio::test]
async fn test_query_performance() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/query"))
        .and(body_json(json!({
            "entity": {"type": "VirtualMachine", "id": "vm-1"},
            "metric_ids": [
                {"counter_id": 2, "instance": ""},
                {"counter_id": 6, "instance": "*"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "samples": [
                {"counter_id": 2, "instance": "", "values": [1200, 1500]},
                {"counter_id": 6, "instance": "0", "values": [800]},
                {"counter_id": 6, "values": []}
            ]
        })))
        .mount(&mock_server)
        .await;

    let conn = HttpConnection::new(&format!("{}/api", mock_server.uri()), 5000).unwrap();
    let samples = conn
        .query_performance(&vm1(), &[MetricId::aggregate(2), MetricId::all_instances(6)])
        .await
        .unwrap();

    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].values, vec![1200.0, 1500.0]);
    assert_eq!(samples[1].instance, "0");
    assert!(samples[2].is_aggregate());
    assert!(samples[2].values.is_empty());
}

#[tokio::test]
async fn test_http_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/inventory"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let conn = HttpConnection::new(&format!("{}/api", mock_server.uri()), 5000).unwrap();
    let err = conn.fetch_inventory().await.unwrap_err();
    assert_eq!(err.http_status(), Some(503));
}

#[tokio::test]
async fn test_malformed_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/counters"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let conn = HttpConnection::new(&format!("{}/api", mock_server.uri()), 5000).unwrap();
    let err = conn.fetch_counters(1).await.unwrap_err();
    assert!(matches!(err, ConnectionError::Decode(_)));
}

#[tokio::test]
async fn test_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/inventory"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"objects": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let conn = HttpConnection::new(&format!("{}/api", mock_server.uri()), 100).unwrap();
    let err = conn.fetch_inventory().await.unwrap_err();
    assert!(matches!(err, ConnectionError::Timeout(Some(100))));
}
