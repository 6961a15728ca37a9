//! Offload routing trace replayer
//!
//! Drives an [`OffloadRouter`] on a manual clock from a JSON-lines trace of
//! batches, write commits, host reads and clock advances, then prints how
//! each batch was split together with the router's counters.

mod trace;

use anyhow::{Context, Result};
use clap::Parser;
use kvoffload_common::{Config, IntraBatchOrdering};
use kvoffload_router::{ManualClock, OffloadRouter, PrometheusExporter, TracingSink};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use trace::{ReplayOptions, ReplaySummary, replay};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// kvoffload trace replayer
#[derive(Parser, Debug)]
#[command(name = "kvoffload-replay")]
#[command(about = "Replay a request trace through the offload router")]
#[command(version)]
struct Args {
    /// Trace file (JSON lines), or "-" for stdin
    trace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override location TTL in milliseconds
    #[arg(long)]
    ttl_ms: Option<u64>,

    /// Disable version comparison on write commits
    #[arg(long)]
    no_versioning: bool,

    /// Route GETs that follow a write to the same key to the host
    #[arg(long)]
    shadow_writes: bool,

    /// Treat host-executed GETs as host reads and evict their keys
    #[arg(long)]
    feedback: bool,

    /// Print a JSON summary instead of text
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(long, default_value = "warn", env = "KVOFFLOAD_LOG")]
    log_level: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    replay: &'a ReplaySummary,
    stats: kvoffload_router::StatsSnapshot,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => Config::default(),
    };

    // CLI overrides
    if let Some(ttl_ms) = args.ttl_ms {
        config.cache.ttl_ms = ttl_ms;
    }
    if args.no_versioning {
        config.cache.versioning = false;
    }
    if args.shadow_writes {
        config.routing.intra_batch = IntraBatchOrdering::WritesShadowReads;
    }

    config.validate()?;
    Ok(config)
}

fn print_text(summary: &ReplaySummary, router: &OffloadRouter) {
    for batch in &summary.batches {
        println!(
            "batch {}: {} offloaded, {} host, {} forwarded",
            batch.index,
            batch.offloaded.len(),
            batch.host.len(),
            batch.forwarded
        );
        for (request, op) in &batch.offloaded {
            println!("  offload {request} -> {op}");
        }
        for request in &batch.host {
            println!("  host    {request}");
        }
    }
    println!(
        "commits: {} applied, {} stale, {} rejected; evicted {}; purged {}",
        summary.commits_applied,
        summary.commits_stale,
        summary.commits_rejected,
        summary.evicted,
        summary.purged
    );
    println!();
    print!("{}", PrometheusExporter::default().export(&router.stats()));
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = load_config(&args)?;
    let clock = Arc::new(ManualClock::new());
    let router = OffloadRouter::with_parts(&config, clock.clone(), Arc::new(TracingSink))?;
    let options = ReplayOptions {
        read_feedback: args.feedback,
    };

    info!(trace = %args.trace.display(), "replaying trace");
    let summary = if args.trace.as_os_str() == "-" {
        replay(&router, &clock, io::stdin().lock(), options)?
    } else {
        let file = File::open(&args.trace)
            .with_context(|| format!("failed to open trace {}", args.trace.display()))?;
        replay(&router, &clock, BufReader::new(file), options)?
    };

    if args.json {
        let report = JsonReport {
            replay: &summary,
            stats: router.stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&summary, &router);
    }

    Ok(())
}
