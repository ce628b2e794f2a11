//! Gateway HTTP client
//!
//! Async client with connection pooling and a per-request timeout. Every
//! operation is a JSON POST to `<base_url>/<operation>`.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use tracing::{debug, instrument};

use super::parser::{parse_available, parse_counters, parse_inventory, parse_samples};
use super::{Connection, CounterInfo, MetricId, Sample};
use crate::error::{ConnectionError, ConnectionResult};
use crate::inventory::{Inventory, ObjectHandle};

/// [`Connection`] backed by the JSON gateway
#[derive(Clone)]
pub struct HttpConnection {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct CountersRequest {
    level: u8,
}

#[derive(Serialize)]
struct AvailableRequest<'a> {
    entity: &'a ObjectHandle,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    entity: &'a ObjectHandle,
    metric_ids: &'a [MetricId],
}

impl HttpConnection {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Gateway base URL (e.g. "http://localhost:8989/api")
    /// * `timeout_ms` - Per-request timeout in milliseconds
    pub fn new(base_url: &str, timeout_ms: u64) -> ConnectionResult<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(ConnectionError::HttpClientInit)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        body: &B,
    ) -> ConnectionResult<String> {
        let url = format!("{}/{}", self.base_url, operation);
        debug!(url = %url, "Sending gateway request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectionError::HttpStatus(status.as_u16()));
        }

        response.text().await.map_err(ConnectionError::HttpResponse)
    }

    fn map_send_error(&self, err: reqwest::Error) -> ConnectionError {
        if err.is_timeout() {
            ConnectionError::Timeout(Some(self.timeout_ms))
        } else {
            ConnectionError::from(err)
        }
    }
}

impl Connection for HttpConnection {
    #[instrument(skip(self), fields(gateway = %self.base_url))]
    async fn fetch_inventory(&self) -> ConnectionResult<Inventory> {
        let body = self.post("inventory", &serde_json::json!({})).await?;
        let inventory = parse_inventory(&body)?;
        debug!(objects = inventory.len(), "Fetched inventory");
        Ok(inventory)
    }

    #[instrument(skip(self), fields(gateway = %self.base_url))]
    async fn fetch_counters(&self, level: u8) -> ConnectionResult<Vec<CounterInfo>> {
        let body = self.post("counters", &CountersRequest { level }).await?;
        let counters = parse_counters(&body)?;
        debug!(counters = counters.len(), "Fetched counter catalogue");
        Ok(counters)
    }

    #[instrument(skip(self), fields(entity = %entity))]
    async fn query_available_metrics(&self, entity: &ObjectHandle) -> ConnectionResult<Vec<u32>> {
        let body = self.post("available", &AvailableRequest { entity }).await?;
        parse_available(&body)
    }

    #[instrument(skip(self, metric_ids), fields(entity = %entity, metric_count = metric_ids.len()))]
    async fn query_performance(
        &self,
        entity: &ObjectHandle,
        metric_ids: &[MetricId],
    ) -> ConnectionResult<Vec<Sample>> {
        let body = self
            .post("query", &QueryRequest { entity, metric_ids })
            .await?;
        parse_samples(&body)
    }
}
