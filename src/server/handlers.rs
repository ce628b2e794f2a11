//! HTTP request handlers

use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use serde::Serialize;
use tracing::{debug, instrument};

use super::AppState;
use crate::connection::Connection;
use crate::error::AppResult;
use crate::metrics::collector_metrics;
use crate::report::{BufferedReporter, ExternalHostTags};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Root endpoint - displays basic info
pub async fn root<C>(State(state): State<AppState<C>>) -> Html<String> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>vsphere-collector</title>
</head>
<body>
    <h1>vsphere-collector</h1>
    <p>Version: {}</p>
    <p>vCenter: {}</p>
    <ul>
        <li><a href="/health">Health Check</a></li>
        <li><a href="{}">Metrics</a></li>
        <li><a href="/external_tags">External Host Tags</a></li>
    </ul>
</body>
</html>"#,
        env!("CARGO_PKG_VERSION"),
        state.check.name(),
        state.config.server.path
    );
    Html(html)
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// External host tags published by the last completed cycle
pub async fn external_tags<C>(State(state): State<AppState<C>>) -> Json<Vec<ExternalHostTags>> {
    Json(state.external_tags.read().await.clone())
}

/// Metrics endpoint - runs one collection cycle and returns Prometheus format
///
/// A connection failure aborts the cycle and answers 502; the previous
/// external host tags are kept.
#[instrument(skip(state), name = "metrics_handler")]
pub async fn metrics<C>(State(state): State<AppState<C>>) -> AppResult<impl IntoResponse>
where
    C: Connection + Send + Sync + 'static,
{
    let start = Instant::now();
    let mut reporter = BufferedReporter::new();

    let result = state.check.run(state.connection.as_ref(), &mut reporter).await;
    let duration = start.elapsed().as_secs_f64();

    let summary = match result {
        Ok(summary) => {
            collector_metrics().record_cycle_success(duration, &summary);
            summary
        }
        Err(e) => {
            collector_metrics().record_cycle_failure(duration);
            return Err(e.into());
        }
    };

    let mut output = reporter.format_prometheus();
    *state.external_tags.write().await = reporter.into_external_tags();

    output.push_str(&format!(
        r#"# HELP vsphere_collector_info vsphere-collector information
# TYPE vsphere_collector_info gauge
vsphere_collector_info{{version="{}"}} 1
# HELP vsphere_collector_scrape_duration_seconds Time spent collecting metrics
# TYPE vsphere_collector_scrape_duration_seconds gauge
vsphere_collector_scrape_duration_seconds {}
"#,
        env!("CARGO_PKG_VERSION"),
        duration,
    ));
    output.push_str(&collector_metrics().format_prometheus(state.check.name()));

    debug!(
        duration_ms = start.elapsed().as_millis() as u64,
        entities = summary.entities,
        samples = summary.samples,
        "Metrics collection complete"
    );

    Ok((
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        output,
    ))
}
