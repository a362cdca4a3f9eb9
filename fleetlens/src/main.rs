//! fleetlens - print what every agent in the fleet is doing
//!
//! Reads the fleet's own files (session logs, run registry, cron state) and
//! prints query results as JSON. With `--watch` the query is repeated on an
//! interval and printed whenever the result changes, ignoring fields that
//! only move with the clock (relative times, durations, scan timestamps).
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/fleetlens/fleetlens.<date>.log (~/.local/state/fleetlens/)
//! - Config: $XDG_CONFIG_HOME/fleetlens/config.toml (~/.config/fleetlens/config.toml)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleetlens_core::{Config, Telemetry};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Output keys whose values change with the clock alone
const CLOCK_DERIVED_KEYS: &[&str] = &[
    "lastSeen",
    "lastSeenRelative",
    "lastActive",
    "nextRunRelative",
    "lastRunRelative",
    "durationMs",
    "uptime",
    "meta",
];

#[derive(Parser)]
#[command(name = "fleetlens")]
#[command(about = "Show what every agent in the fleet is doing")]
#[command(version)]
struct Args {
    /// Fleet data root (defaults to ~/.openclaw or $OPENCLAW_HOME)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print JSON on one line
    #[arg(long, global = true)]
    compact: bool,

    /// Watch mode - repeat the query instead of one-shot
    #[arg(short, long, global = true)]
    watch: bool,

    /// Poll interval in milliseconds (only with --watch)
    #[arg(long, default_value = "2000", global = true)]
    poll: u64,

    /// Stop after this many polls (only with --watch)
    #[arg(long, global = true)]
    count: Option<u64>,

    #[command(subcommand)]
    command: Query,
}

#[derive(Subcommand, Clone, Debug)]
enum Query {
    /// Reconciled agents, sub-agent runs and events
    Sessions,
    /// Cron jobs with owners and last results
    Crons,
    /// Fleet-wide counters
    Metrics,
    /// Sub-agent runs that have not finished
    Runs,
    /// Counters for one agent
    Agent {
        /// Agent id (e.g. kira, forge)
        id: String,
    },
    /// Recent chat turns of a session
    Transcript {
        /// Session key (`agent:main:main`, `agent:<dir>` or a run's child session key)
        #[arg(default_value = "")]
        key: String,

        /// Number of turns to show
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Everything at once, freshly read
    Snapshot,
}

impl Query {
    fn name(&self) -> &'static str {
        match self {
            Query::Sessions => "sessions",
            Query::Crons => "crons",
            Query::Metrics => "metrics",
            Query::Runs => "runs",
            Query::Agent { .. } => "agent",
            Query::Transcript { .. } => "transcript",
            Query::Snapshot => "snapshot",
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(root) = &args.root {
        config.sources.root = Some(root.clone());
    }

    // Initialize logging (to file, stdout carries the JSON)
    let _log_guard =
        fleetlens_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(query = args.command.name(), "fleetlens starting");

    let telemetry = Telemetry::new(config);
    if !telemetry.is_available() {
        eprintln!("No fleet data root found; results will be empty. Use --root to choose one.");
    }

    if args.watch {
        run_watch_mode(&telemetry, &args)
    } else {
        let value = run_query(&telemetry, &args.command)?;
        println!("{}", render(&value, args.compact)?);
        Ok(())
    }
}

/// Answer one query as JSON
fn run_query(telemetry: &Telemetry, query: &Query) -> Result<serde_json::Value> {
    let value = match query {
        Query::Sessions => serde_json::to_value(telemetry.sessions()),
        Query::Crons => serde_json::to_value(telemetry.crons()),
        Query::Metrics => serde_json::to_value(telemetry.metrics()),
        Query::Runs => serde_json::to_value(telemetry.active_runs()),
        Query::Agent { id } => serde_json::to_value(telemetry.agent_metrics(id)),
        Query::Transcript { key, limit } => {
            let limit = limit.unwrap_or(telemetry.config().scan.transcript_limit);
            serde_json::to_value(telemetry.transcript(key, limit))
        }
        Query::Snapshot => serde_json::to_value(telemetry.snapshot()),
    };
    value.context("failed to serialize query result")
}

fn render(value: &serde_json::Value, compact: bool) -> Result<String> {
    let rendered = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.context("failed to render JSON")
}

/// `value` without [`CLOCK_DERIVED_KEYS`], at any depth
fn without_clock_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .filter(|(key, _)| !CLOCK_DERIVED_KEYS.contains(&key.as_str()))
            .map(|(key, v)| (key.clone(), without_clock_fields(v)))
            .collect(),
        serde_json::Value::Array(items) => items.iter().map(without_clock_fields).collect(),
        other => other.clone(),
    }
}

/// Run continuous watch mode
fn run_watch_mode(telemetry: &Telemetry, args: &Args) -> Result<()> {
    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let poll_duration = Duration::from_millis(args.poll);
    eprintln!(
        "Watch mode active (poll every {}ms). Press Ctrl+C to stop.",
        args.poll
    );

    let mut iteration = 0u64;
    let mut last_seen_state: Option<serde_json::Value> = None;

    while running.load(Ordering::SeqCst) {
        iteration += 1;

        let value = run_query(telemetry, &args.command)?;

        // Only print when something besides the clock changed
        let state = without_clock_fields(&value);
        if last_seen_state.as_ref() != Some(&state) {
            println!("{}", render(&value, args.compact)?);
            tracing::info!(iteration, query = args.command.name(), "watch result changed");
            last_seen_state = Some(state);
        }

        if args.count.is_some_and(|count| iteration >= count) {
            break;
        }

        thread::sleep(poll_duration);
    }

    tracing::info!("fleetlens watch mode stopped");
    Ok(())
}
