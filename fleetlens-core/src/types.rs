//! Core domain types for fleetlens
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Agent** | A long-lived member of the fleet, known ahead of time (see [`crate::roster`]) |
//! | **Session log** | Append-only JSONL file recording one agent's conversation and tool use |
//! | **Run** | An ephemeral sub-agent execution tracked in the run registry |
//! | **Cron job** | A scheduled prompt, owned by one agent |
//! | **Fact** | One source's claim about an agent, merged by [`crate::reconcile`] |
//!
//! Types in the "Query results" section are what callers receive. They
//! serialize with camelCase keys because the consumer is a JavaScript UI.

use crate::config::StatusConfig;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

// ============================================
// Timestamps
// ============================================

/// Decode a timestamp written either as an RFC 3339 string or as epoch
/// milliseconds. Anything else is treated as absent.
pub fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

/// Serde adapter for optional timestamps in either encoding.
pub(crate) fn deserialize_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

/// Counters are sometimes written as floats or null; negatives read as zero.
pub(crate) fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| if f > 0.0 { f as u64 } else { 0 }))
            .unwrap_or(0),
        _ => 0,
    })
}

/// JSON `null` reads as the type's default value.
pub(crate) fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Truthiness of a JSON value: `null`, `false`, `0` and `""` are false.
pub(crate) fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    })
}

// ============================================
// Agent Status
// ============================================

/// Discrete liveness of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Seen within the active threshold
    Active,
    /// Seen within the idle threshold
    Idle,
    /// Not seen recently, or never
    Offline,
    /// Has a sub-agent run without an outcome
    Running,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
            AgentStatus::Offline => "offline",
            AgentStatus::Running => "running",
        }
    }

    /// Whether the agent counts as doing something right now
    pub fn is_live(&self) -> bool {
        matches!(self, AgentStatus::Active | AgentStatus::Running)
    }

    /// Infer status from the time an agent was last seen
    pub fn from_last_seen(
        last_seen: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        thresholds: &StatusConfig,
    ) -> Self {
        let Some(last) = last_seen else {
            return AgentStatus::Offline;
        };

        let minutes = now.signed_duration_since(last).num_minutes();

        if minutes < thresholds.active_minutes {
            AgentStatus::Active
        } else if minutes < thresholds.idle_minutes {
            AgentStatus::Idle
        } else {
            AgentStatus::Offline
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AgentStatus::Active),
            "idle" => Ok(AgentStatus::Idle),
            "offline" => Ok(AgentStatus::Offline),
            "running" => Ok(AgentStatus::Running),
            _ => Err(format!("unknown agent status: {}", s)),
        }
    }
}

// ============================================
// Session Summaries
// ============================================

/// What the tail of one session file says about its agent.
///
/// Built fresh per scan and never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTailSummary {
    /// Latest timestamp in the tail (max, not last)
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Short description of the current task, at most 100 chars
    pub last_task: String,
    /// Most recent model identifier, empty if none was seen
    pub model_used: String,
    /// Input tokens, including cache reads
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Assistant messages seen
    pub api_calls: u64,
}

impl SessionTailSummary {
    pub fn tokens_total(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

// ============================================
// Run Registry
// ============================================

/// Completion state of a sub-agent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }

    /// Display progress: half-way while running, full when completed
    pub fn progress(&self) -> f64 {
        match self {
            RunStatus::Running => 0.5,
            RunStatus::Completed => 1.0,
            RunStatus::Error => 0.0,
        }
    }
}

/// Outcome recorded when a run finishes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunOutcome {
    pub status: Option<String>,
}

/// One entry of the run registry.
///
/// `outcome == None` is the only liveness signal: there is no heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunRecord {
    /// Registry key; filled in by the scanner
    #[serde(skip)]
    pub run_id: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub label: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub child_session_key: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub task: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
}

impl RunRecord {
    pub fn is_running(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn status(&self) -> RunStatus {
        match &self.outcome {
            None => RunStatus::Running,
            Some(outcome) if outcome.status.as_deref() == Some("ok") => RunStatus::Completed,
            Some(_) => RunStatus::Error,
        }
    }

    /// Elapsed time for a running run, total time for a finished one
    pub fn duration_ms(&self, now: DateTime<Utc>) -> i64 {
        let Some(created) = self.created_at else {
            return 0;
        };
        let end = if self.is_running() {
            now
        } else {
            self.ended_at.unwrap_or(created)
        };
        end.signed_duration_since(created).num_milliseconds().max(0)
    }

    /// First eight characters of the run id
    pub fn short_id(&self) -> &str {
        match self.run_id.char_indices().nth(8) {
            Some((idx, _)) => &self.run_id[..idx],
            None => &self.run_id,
        }
    }
}

// ============================================
// Cron State
// ============================================

/// Schedule and runtime state of one cron job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CronJobState {
    pub expr: String,
    pub timezone: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub last_duration_ms: u64,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    pub enabled: bool,
}

// ============================================
// Query results
// ============================================

/// A reconciled fleet member
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: String,
    pub emoji: String,
    pub status: AgentStatus,
    pub current_task: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_seen_relative: String,
    pub model_used: String,
    pub tokens_used: u64,
    pub api_calls: u64,
    pub session_id: String,
    pub label: Option<String>,
}

/// A sub-agent run as shown in the fleet view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: String,
    pub name: String,
    pub parent_agent: String,
    pub task: String,
    pub status: RunStatus,
    pub progress: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub session_id: String,
    pub tokens_used: u64,
    pub label: String,
    pub duration_ms: i64,
}

/// A run that has not finished yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRun {
    pub id: String,
    pub label: String,
    pub start_time: Option<DateTime<Utc>>,
    pub parent_agent: String,
    pub duration_ms: i64,
}

/// Kind of synthesized fleet event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FleetEventKind {
    #[serde(rename = "agent:status")]
    AgentStatus,
    #[serde(rename = "subagent:spawn")]
    SubagentSpawn,
}

/// Event derived from the current snapshot (there is no event log)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FleetEventKind,
    pub timestamp: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

/// Facts about the main session directory that metrics need
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    /// Live (not soft-deleted) session files
    pub session_files: usize,
    /// Start of the newest boot session
    pub boot_started_at: Option<DateTime<Utc>>,
}

/// Result of `sessions()`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsSnapshot {
    pub agents: Vec<Agent>,
    pub subagents: Vec<RunSummary>,
    pub events: Vec<FleetEvent>,
    pub sources: SourceStats,
}

/// A cron job as shown in the fleet view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: String,
    pub timezone: String,
    pub next_run: Option<DateTime<Utc>>,
    pub next_run_relative: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_relative: String,
    pub last_status: String,
    pub last_duration_ms: u64,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    /// "active" or "disabled"
    pub status: String,
    pub enabled: bool,
    pub owner: String,
    pub model: String,
}

/// Per-agent slice of the fleet metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub agent_id: String,
    pub tokens: u64,
    pub api_calls: u64,
    pub last_active: String,
    pub status: AgentStatus,
    pub model_used: String,
}

/// Result of `metrics()`; derived from `sessions()` and `crons()` only
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetMetrics {
    pub tokens_total: u64,
    pub api_calls_total: u64,
    pub session_files: usize,
    pub active_agents: usize,
    pub idle_agents: usize,
    pub offline_agents: usize,
    pub running_subagents: usize,
    pub agent_breakdown: Vec<AgentMetrics>,
    pub uptime: String,
    pub active_crons: usize,
    pub total_crons: usize,
    pub failed_crons: usize,
    pub success_rate: f64,
}

/// One chat turn of a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptTurn {
    pub role: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub model: Option<String>,
}

/// Where a snapshot came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub mode: String,
    pub root: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

/// Result of `snapshot()`: every query, freshly computed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub agents: Vec<Agent>,
    pub subagents: Vec<RunSummary>,
    pub events: Vec<FleetEvent>,
    pub crons: Vec<CronView>,
    pub active_runs: Vec<ActiveRun>,
    pub metrics: FleetMetrics,
    pub meta: SnapshotMeta,
}
