//! The query facade: the only entry point callers need.
//!
//! Every query is answered from the cache when fresh, otherwise by running
//! the scan pipeline:
//!
//! ```text
//! Telemetry::sessions()
//!     │
//!     ├─ cache hit ──────────────────────────────► SessionsSnapshot
//!     │
//!     └─ miss ─┬─ [thread] SessionDirScanner ─┐
//!              └─ [thread] RunRegistryScanner ┴─► reconcile ─► cache
//! ```
//!
//! Queries never fail. Without a data root they return empty values (the
//! sessions view still lists every roster agent as offline).

use crate::cache::TelemetryCache;
use crate::config::Config;
use crate::format::format_elapsed;
use crate::ingest::summary::SessionSummarizer;
use crate::ingest::transcript::{read_transcript, resolve_session_file};
use crate::reconcile;
use crate::roster::Roster;
use crate::scan::{CronScanner, RunRegistryScanner, SessionDirScanner, SessionScan};
use crate::tail::TailReader;
use crate::types::{
    ActiveRun, AgentMetrics, AgentStatus, CronView, FleetMetrics, FleetSnapshot, RunRecord,
    RunStatus, SessionsSnapshot, SnapshotMeta, TranscriptTurn,
};
use chrono::Utc;
use std::path::{Path, PathBuf};

const KEY_SESSIONS: &str = "sessions";
const KEY_CRONS: &str = "crons";
const KEY_METRICS: &str = "metrics";
const KEY_ACTIVE_RUNS: &str = "active_runs";

/// Success rate reported while no cron job has failed
const NO_FAILURE_SUCCESS_RATE: f64 = 0.99;
/// Lowest success rate reported
const MIN_SUCCESS_RATE: f64 = 0.9;

/// Read-only view of a fleet's telemetry
#[derive(Debug)]
pub struct Telemetry {
    root: Option<PathBuf>,
    config: Config,
    roster: Roster,
    reader: TailReader,
    cache: TelemetryCache,
}

impl Telemetry {
    /// Facade over the data root resolved from `config`.
    pub fn new(config: Config) -> Self {
        let root = config.data_root();
        Self::with_root(root, config)
    }

    /// Facade over an explicit data root (or none).
    pub fn with_root(root: Option<PathBuf>, config: Config) -> Self {
        match &root {
            Some(root) => tracing::info!(root = %root.display(), "Telemetry data root"),
            None => tracing::info!("No telemetry data root found"),
        }

        Self {
            reader: TailReader::from_config(&config.scan),
            root,
            config,
            roster: Roster::default(),
            cache: TelemetryCache::new(),
        }
    }

    /// Replace the cache, e.g. with one on a manual clock.
    pub fn with_cache(mut self, cache: TelemetryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a data root was resolved
    pub fn is_available(&self) -> bool {
        self.root.is_some()
    }

    /// Drop every cached result.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Reconciled agents, recent runs and derived events
    pub fn sessions(&self) -> SessionsSnapshot {
        self.cache
            .get(KEY_SESSIONS, self.config.cache.ttl(), || self.compute_sessions())
    }

    pub fn crons(&self) -> Vec<CronView> {
        self.cache.get(KEY_CRONS, self.config.cache.ttl(), || {
            let Some(root) = self.root() else {
                return Vec::new();
            };
            CronScanner::new(root, &self.roster).scan(Utc::now())
        })
    }

    /// Fleet-wide counters, derived from `sessions()` and `crons()` only
    pub fn metrics(&self) -> FleetMetrics {
        self.cache
            .get(KEY_METRICS, self.config.cache.ttl(), || self.compute_metrics())
    }

    /// Runs without an outcome, longest-running first
    pub fn active_runs(&self) -> Vec<ActiveRun> {
        self.cache.get(KEY_ACTIVE_RUNS, self.config.cache.ttl(), || {
            let runs = self.scan_runs();
            reconcile::active_runs(&self.roster, &runs, Utc::now())
        })
    }

    /// Last `limit` chat turns of the session named by `key`
    pub fn transcript(&self, key: &str, limit: usize) -> Vec<TranscriptTurn> {
        let cache_key = format!("transcript:{}:{}", key, limit);
        self.cache.get(&cache_key, self.config.cache.ttl(), || {
            let Some(root) = self.root() else {
                return Vec::new();
            };
            let main_dir = self
                .roster
                .session_dirs
                .first()
                .map(|r| r.dir.as_str())
                .unwrap_or("main");

            match resolve_session_file(root, main_dir, key) {
                Some(path) => read_transcript(&self.reader, &path, limit),
                None => {
                    tracing::debug!(key, "No session file for transcript key");
                    Vec::new()
                }
            }
        })
    }

    /// One agent's slice of the metrics; unknown ids read as offline
    pub fn agent_metrics(&self, agent_id: &str) -> AgentMetrics {
        self.sessions()
            .agents
            .iter()
            .find(|a| a.id == agent_id)
            .map(|a| AgentMetrics {
                agent_id: a.id.clone(),
                tokens: a.tokens_used,
                api_calls: a.api_calls,
                last_active: a.last_seen_relative.clone(),
                status: a.status,
                model_used: a.model_used.clone(),
            })
            .unwrap_or_else(|| AgentMetrics {
                agent_id: agent_id.to_string(),
                tokens: 0,
                api_calls: 0,
                last_active: "never".to_string(),
                status: AgentStatus::Offline,
                model_used: String::new(),
            })
    }

    /// Every query, freshly computed
    pub fn snapshot(&self) -> FleetSnapshot {
        self.invalidate();

        let sessions = self.sessions();
        FleetSnapshot {
            crons: self.crons(),
            active_runs: self.active_runs(),
            metrics: self.metrics(),
            agents: sessions.agents,
            subagents: sessions.subagents,
            events: sessions.events,
            meta: SnapshotMeta {
                mode: "live".to_string(),
                root: self.root.clone(),
                timestamp: Utc::now(),
            },
        }
    }

    fn scan_runs(&self) -> Vec<RunRecord> {
        match self.root() {
            Some(root) => RunRegistryScanner::new(root).scan(),
            None => Vec::new(),
        }
    }

    fn compute_sessions(&self) -> SessionsSnapshot {
        let now = Utc::now();

        let (scan, runs) = match self.root() {
            Some(root) => self.scan_sources(root),
            None => (SessionScan::default(), Vec::new()),
        };

        reconcile::sessions_snapshot(
            &self.roster,
            scan,
            &runs,
            now,
            &self.config.status,
            &self.config.defaults,
        )
    }

    /// Session directories and run registry, scanned side by side
    fn scan_sources(&self, root: &Path) -> (SessionScan, Vec<RunRecord>) {
        let summarizer = SessionSummarizer::new(self.reader.clone());
        let sessions = SessionDirScanner::new(root, &self.roster, summarizer, self.config.scan.tail_lines);
        let runs = RunRegistryScanner::new(root);

        std::thread::scope(|s| {
            let session_handle = s.spawn(|| sessions.scan());
            let run_handle = s.spawn(|| runs.scan());

            let scan = session_handle.join().unwrap_or_else(|_| {
                tracing::warn!("Session scan panicked, treating as empty");
                SessionScan::default()
            });
            let records = run_handle.join().unwrap_or_else(|_| {
                tracing::warn!("Run registry scan panicked, treating as empty");
                Vec::new()
            });
            (scan, records)
        })
    }

    fn compute_metrics(&self) -> FleetMetrics {
        let now = Utc::now();
        let sessions = self.sessions();
        let crons = self.crons();

        let count = |status: AgentStatus| sessions.agents.iter().filter(|a| a.status == status).count();

        let total_crons = crons.len();
        let failed_crons = crons.iter().filter(|c| c.last_status == "error").count();
        let success_rate = if failed_crons == 0 {
            NO_FAILURE_SUCCESS_RATE
        } else {
            (1.0 - failed_crons as f64 / total_crons.max(1) as f64).max(MIN_SUCCESS_RATE)
        };

        FleetMetrics {
            tokens_total: sessions.agents.iter().map(|a| a.tokens_used).sum(),
            api_calls_total: sessions.agents.iter().map(|a| a.api_calls).sum(),
            session_files: sessions.sources.session_files,
            active_agents: count(AgentStatus::Active) + count(AgentStatus::Running),
            idle_agents: count(AgentStatus::Idle),
            offline_agents: count(AgentStatus::Offline),
            running_subagents: sessions
                .subagents
                .iter()
                .filter(|s| s.status == RunStatus::Running)
                .count(),
            agent_breakdown: sessions
                .agents
                .iter()
                .map(|a| AgentMetrics {
                    agent_id: a.id.clone(),
                    tokens: a.tokens_used,
                    api_calls: a.api_calls,
                    last_active: a.last_seen_relative.clone(),
                    status: a.status,
                    model_used: a.model_used.clone(),
                })
                .collect(),
            uptime: sessions
                .sources
                .boot_started_at
                .map(|boot| format_elapsed(boot, now))
                .unwrap_or_else(|| "unknown".to_string()),
            active_crons: crons.iter().filter(|c| c.enabled).count(),
            total_crons,
            failed_crons,
            success_rate,
        }
    }
}
