use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;
use webfilter_engine::config::{config_path_from_env, load_config};
use webfilter_engine::{reconstruct, EventContext, FilterEngine, FilterError, NoopEntityStore};
use webfilter_lms::{event_spec, EVENTS};

#[derive(Parser)]
#[command(
    name = "webfilter-probe",
    about = "Send an event context to the configured subscribers and print what they would do"
)]
struct Cli {
    /// Path to config TOML file (defaults to $WEBFILTER_CONFIG or ./config/webfilter.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event name, e.g. StudentLoginRequested
    #[arg(long)]
    event: String,

    /// JSON file holding the event context as an object; each top-level key
    /// is one context entry
    #[arg(long)]
    context: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn read_context(path: Option<&PathBuf>) -> Result<Map<String, Value>> {
    let Some(path) = path else {
        return Ok(Map::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file: {}", path.display()))?;
    match serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse context file: {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("Context file must hold a JSON object: {}", path.display()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let Some(spec) = event_spec(&cli.event) else {
        let known: Vec<&str> = EVENTS.iter().map(|s| s.name).collect();
        bail!("Unknown event {:?}. Known events: {}", cli.event, known.join(", "));
    };

    let config_path = cli.config.clone().unwrap_or_else(config_path_from_env);
    tracing::info!(config = %config_path.display(), event = spec.name, "Loading config");
    let config = load_config(&config_path)?;

    let engine = FilterEngine::from_config(&config, Arc::new(NoopEntityStore))?;

    let values = read_context(cli.context.as_ref())?;
    let mut ctx = EventContext::new();
    for (name, value) in &values {
        ctx.insert(name.clone(), value);
    }

    let started = Instant::now();
    let outcome = engine.exchange(spec.name, &ctx, spec.primary).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let report = match outcome {
        Ok(exchange) => {
            let halt = reconstruct(&exchange.halts, spec.halts);
            json!({
                "event": spec.name,
                "patch": exchange.patch.as_map(),
                "halt_requests": exchange.halts.as_map(),
                "halt": halt,
                "elapsed_ms": elapsed_ms,
            })
        }
        Err(FilterError::Halt(signal)) => json!({
            "event": spec.name,
            "patch": {},
            "halt_requests": {},
            "halt": signal,
            "elapsed_ms": elapsed_ms,
        }),
        Err(e) => return Err(e).context("Exchange failed"),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
