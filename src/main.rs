//! vsphere-collector - vSphere inventory and performance metrics collector
//!
//! Serves a Prometheus-compatible metrics endpoint backed by a JSON gateway
//! in front of the vCenter API.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use vsphere_collector::check::{CheckPlan, CycleSummary, FilterSet, VSphereCheck};
use vsphere_collector::cli::{Cli, LogFormat, OutputFormat};
use vsphere_collector::config::Config;
use vsphere_collector::connection::HttpConnection;
use vsphere_collector::report::{BufferedReporter, ExternalHostTags, ReportedMetric};
use vsphere_collector::server;

#[derive(Serialize)]
struct ValidationReport {
    valid: bool,
    resource_filters: usize,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct CycleOutput<'a> {
    summary: &'a CycleSummary,
    metrics: &'a [ReportedMetric],
    external_tags: &'a [ExternalHostTags],
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref bind_address) = cli.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(ref path) = cli.metrics_path {
        config.server.path = path.clone();
    }
    if let Some(ref url) = cli.gateway_url {
        config.gateway.url = url.clone();
    }
    if let Some(timeout) = cli.gateway_timeout {
        config.gateway.timeout_ms = timeout;
    }
}

/// Structured output; text rendering is done by each mode
fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json | OutputFormat::Text => serde_json::to_string_pretty(value)?,
    })
}

/// `--validate`: invalid resource filters fail validation here, while a
/// running collector only warns and drops them
fn validate(config: &Config, format: OutputFormat) -> Result<()> {
    let (filters, errors) = FilterSet::build(&config.check.resource_filters);
    let report = ValidationReport {
        valid: errors.is_empty(),
        resource_filters: filters.len(),
        errors: errors.iter().map(ToString::to_string).collect(),
    };

    match format {
        OutputFormat::Text => {
            if report.valid {
                println!("Configuration is valid");
                println!("  Resource filters: {}", report.resource_filters);
            } else {
                println!("Configuration is invalid");
                for error in &report.errors {
                    println!("  - {}", error);
                }
            }
        }
        _ => println!("{}", render(&report, format)?),
    }

    if !report.valid {
        anyhow::bail!("{} invalid resource filter(s)", report.errors.len());
    }
    Ok(())
}

fn format_plan_text(plan: &CheckPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!("Instance: {}\n", plan.instance));

    let types: Vec<&str> = plan.resource_types.iter().map(|rt| rt.as_str()).collect();
    out.push_str(&format!("Resource types: {}\n", types.join(", ")));

    out.push_str(&format!("Resource filters ({}):\n", plan.resource_filters.len()));
    for filter in &plan.resource_filters {
        out.push_str(&format!(
            "  {} {} {}: {}\n",
            filter.resource,
            filter.property.as_str(),
            filter.kind.as_str(),
            filter.patterns.join(", ")
        ));
    }

    let section = |out: &mut String, title: &str, map: &BTreeMap<String, Vec<String>>| {
        out.push_str(&format!("{}:\n", title));
        if map.is_empty() {
            out.push_str("  (none)\n");
        }
        for (resource, patterns) in map {
            out.push_str(&format!("  {}: {}\n", resource, patterns.join(", ")));
        }
    };
    section(&mut out, "Metric filters", &plan.metric_filters);
    section(&mut out, "Per-instance filters", &plan.collect_per_instance_filters);

    if !plan.excluded_host_tags.is_empty() {
        out.push_str(&format!(
            "Excluded host tags: {}\n",
            plan.excluded_host_tags.join(", ")
        ));
    }
    out
}

/// `--dry-run`: show what a cycle would collect without contacting the gateway
fn dry_run(config: &Config, format: OutputFormat) -> Result<()> {
    let plan = VSphereCheck::new(&config.check).plan();
    match format {
        OutputFormat::Text => print!("{}", format_plan_text(&plan)),
        _ => println!("{}", render(&plan, format)?),
    }
    Ok(())
}

/// `--once`: run a single cycle and print the result
async fn run_once(config: &Config, format: OutputFormat) -> Result<()> {
    let check = VSphereCheck::new(&config.check);
    let connection = HttpConnection::new(&config.gateway.url, config.gateway.timeout_ms)?;
    let mut reporter = BufferedReporter::new();

    let summary = check
        .run(&connection, &mut reporter)
        .await
        .context("Collection cycle failed")?;

    match format {
        OutputFormat::Text => print!("{}", reporter.format_prometheus()),
        _ => {
            let output = CycleOutput {
                summary: &summary,
                metrics: reporter.metrics(),
                external_tags: reporter.external_tags(),
            };
            println!("{}", render(&output, format)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    vsphere_collector::init_logging(&cli.log_level.to_string(), cli.log_format == LogFormat::Json)?;

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    if cli.validate {
        return validate(&config, cli.output_format);
    }

    if cli.dry_run {
        return dry_run(&config, cli.output_format);
    }

    if cli.once {
        return run_once(&config, cli.output_format).await;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        instance = %config.check.name,
        gateway = %config.gateway.url,
        "Starting vsphere-collector"
    );

    let port = config.server.port;
    server::run(config, port).await?;

    Ok(())
}
