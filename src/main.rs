#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Level, info, warn};

use rayprobe::cli::Args;
use rayprobe::config::{DEFAULT_HTTP_PORT, DEFAULT_SOCKS_PORT, effective_port};
use rayprobe::launcher::ProcessLauncher;
use rayprobe::parser::{ConnectionDescriptor, ProtocolRegistry};
use rayprobe::probe::{ProbeConfig, ProbeEngine, ProbeResult};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let is_verbose = args.verbose;
    tracing_subscriber::fmt()
        .with_max_level(if is_verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// One line of the ranked probe report.
#[derive(Serialize)]
struct ReportEntry {
    uri: String,
    protocol: String,
    address: String,
    port: u16,
    #[serde(flatten)]
    result: ProbeResult,
}

async fn run(args: Args) -> anyhow::Result<()> {
    let engine = ProbeEngine::new(ProbeConfig {
        http_port: effective_port(args.http_port, DEFAULT_HTTP_PORT),
        socks_port: effective_port(args.socks_port, DEFAULT_SOCKS_PORT),
        ..Default::default()
    });

    // TTFB-only health check against an already-running listener
    if let Some(port) = args.ttfb_port {
        let measurement = engine.measure_ttfb(port).await;
        emit(&serde_json::to_string_pretty(&measurement)?, args.output.as_deref())?;
        return Ok(());
    }

    let input = args
        .input
        .as_deref()
        .context("expected a share link or a link-list file (or --ttfb-port)")?;
    let content = if Path::new(input).is_file() {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read link list from {input}"))?
    } else {
        input.to_string()
    };

    let registry = ProtocolRegistry::with_builtin_parsers();
    let descriptors = registry.parse_uri_list_lossy(&content);
    if descriptors.is_empty() {
        bail!("no valid share links found in input");
    }
    info!("Probing {} endpoint(s)", descriptors.len());

    let mut entries = if args.full {
        probe_full(&engine, descriptors, &args).await
    } else {
        probe_quick(Arc::new(engine), descriptors).await?
    };

    // Best first
    entries.sort_by(|a, b| {
        b.result
            .score
            .partial_cmp(&a.result.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let reachable = entries.iter().filter(|e| e.result.success).count();
    info!("Probing complete: {}/{} reachable", reachable, entries.len());

    emit(&serde_json::to_string_pretty(&entries)?, args.output.as_deref())?;
    Ok(())
}

/// Quick probes fan out concurrently, bounded by the engine's concurrency
/// cap.
async fn probe_quick(
    engine: Arc<ProbeEngine>,
    descriptors: Vec<ConnectionDescriptor>,
) -> anyhow::Result<Vec<ReportEntry>> {
    let semaphore = Arc::new(Semaphore::new(engine.config().max_concurrent_probes));
    let mut join_set = JoinSet::new();

    for descriptor in descriptors {
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .context("probe semaphore closed")?;
            let result = engine.quick_probe(&descriptor).await;
            Ok::<_, anyhow::Error>(to_entry(descriptor, result))
        });
    }

    let mut entries = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        entries.push(joined.context("probe task panicked")??);
    }
    Ok(entries)
}

/// Full probes share the local inbound ports, so they run serially.
async fn probe_full(
    engine: &ProbeEngine,
    descriptors: Vec<ConnectionDescriptor>,
    args: &Args,
) -> Vec<ReportEntry> {
    let launcher = ProcessLauncher::new(&args.proxy_bin);
    let mut entries = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let result = engine.full_probe(&descriptor, &launcher, args.attempts).await;
        if !result.success {
            warn!(
                "Probe failed for {}:{} ({})",
                descriptor.address, descriptor.port, result.error_kind
            );
        }
        entries.push(to_entry(descriptor, result));
    }
    entries
}

fn to_entry(descriptor: ConnectionDescriptor, result: ProbeResult) -> ReportEntry {
    ReportEntry {
        uri: descriptor.raw_uri,
        protocol: descriptor.protocol.to_string(),
        address: descriptor.address,
        port: descriptor.port,
        result,
    }
}

fn emit(report: &str, output: Option<&str>) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, report)
            .with_context(|| format!("Failed to write report to {path}")),
        None => {
            println!("{report}");
            Ok(())
        }
    }
}
