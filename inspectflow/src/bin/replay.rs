//! Replays a recorded detection script through one procedure run and prints
//! the resulting run record.
//!
//! Exit status: 0 when every step passed, 1 when a step failed or went
//! unchecked, 2 when the run was cancelled.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use inspectflow::catalog::{Catalog, RuntimeConfig};
use inspectflow::events::{BackpressureAwareEventSink, EventSink, LoggingEventSink};
use inspectflow::observability::{init_tracing, LogFormat};
use inspectflow::orchestrator::Orchestrator;
use inspectflow::persistence::JsonLinesRunStore;
use inspectflow::replay::{replay, ReplayControls, ReplayScript};

#[derive(Parser, Debug)]
#[command(name = "inspectflow-replay")]
#[command(about = "Replay recorded detections through an inspection procedure")]
#[command(version)]
struct Args {
    /// Procedure to run
    #[arg(long, short)]
    procedure: String,

    /// JSON-lines detection script
    #[arg(long, short)]
    script: PathBuf,

    /// Runtime configuration file
    #[arg(long, env = "INSPECTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog file (overrides the configuration)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Run store file (overrides the configuration)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Request cancellation at this script time (seconds)
    #[arg(long)]
    cancel_at: Option<f64>,

    /// Skip the active step at a script time, as SECS or SECS=JUSTIFICATION
    #[arg(long, value_parser = parse_skip)]
    skip_at: Vec<(f64, String)>,
}

fn parse_skip(raw: &str) -> Result<(f64, String), String> {
    let (at, justification) = raw.split_once('=').unwrap_or((raw, "skipped during replay"));
    let at = at
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid skip time '{at}': {e}"))?;
    Ok((at, justification.trim().to_string()))
}

fn load_config(args: &Args) -> Result<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_path(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => RuntimeConfig::new(),
    }
    .with_env_overrides();
    if let Some(path) = &args.catalog {
        config.catalog_path.clone_from(path);
    }
    if let Some(path) = &args.store {
        config.store_path.clone_from(path);
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(config.log_format);

    let catalog = Catalog::from_path(&config.catalog_path)
        .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;
    let text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let script = ReplayScript::parse(&text)?;
    info!(
        procedure = %args.procedure,
        frames = script.lines().len(),
        store = %config.store_path.display(),
        "Starting replay"
    );

    let events = BackpressureAwareEventSink::new(Arc::new(LoggingEventSink::default()), config.event_queue_capacity);
    events.start();
    let sink: Arc<dyn EventSink> = events.clone();

    let (output, mut viewer) = config.frame_output();
    let output = Arc::new(output);
    let viewer = tokio::spawn(async move {
        let mut streamed = 0_u64;
        while let Some(frame) = viewer.recv().await {
            streamed += 1;
            debug!(source = %frame.frame.source_id, t = frame.frame.captured_at, "Annotated frame");
        }
        streamed
    });

    let mut orchestrator = Orchestrator::builder(Arc::new(catalog), Arc::new(script.detectors()))
        .with_source(config.frame_source())
        .with_output(output.clone())
        .with_sink(sink)
        .with_store(Arc::new(JsonLinesRunStore::new(&config.store_path)))
        .with_frame_side(config.frame_side)
        .build();
    orchestrator.start(&args.procedure)?;

    let controls = ReplayControls {
        cancel_at: args.cancel_at,
        skips: args.skip_at.clone(),
    };
    let outcome = replay(&mut orchestrator, &script, &controls, config.frame_side);
    drop(orchestrator);
    let output_metrics = output.metrics().to_json();
    drop(output);
    let streamed = viewer.await.unwrap_or_default();
    info!(streamed, metrics = %output_metrics, "Annotated output closed");

    events.shutdown(Duration::from_secs(1)).await;
    if events.metrics().dropped() > 0 {
        warn!(metrics = %events.metrics().to_json(), "Events dropped during replay");
    }

    let Some(outcome) = outcome else {
        anyhow::bail!("replay ended without a run outcome");
    };
    println!("{}", serde_json::to_string_pretty(outcome.run())?);
    info!(outcome = %outcome, "Replay finished");

    Ok(if outcome.is_cancelled() {
        ExitCode::from(2)
    } else if outcome.run().passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
