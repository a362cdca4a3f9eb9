//! Cron-state scanner
//!
//! `<root>/cron/jobs.json` holds `{"jobs": [...]}` with the scheduler's view
//! of each job: schedule, last/next run and error streak.

use crate::error::{Error, Result};
use crate::format::{format_relative_time_opt, format_time_until, truncate_chars};
use crate::roster::Roster;
use crate::types::{
    deserialize_count, deserialize_flag, deserialize_null_default, deserialize_timestamp,
    CronJobState, CronView,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const MAX_DESCRIPTION_CHARS: usize = 120;
const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CronFile {
    jobs: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawCronJob {
    #[serde(deserialize_with = "deserialize_null_default")]
    id: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    name: String,
    agent_id: Option<String>,
    #[serde(deserialize_with = "deserialize_null_default")]
    schedule: RawSchedule,
    #[serde(deserialize_with = "deserialize_null_default")]
    state: RawCronState,
    #[serde(deserialize_with = "deserialize_flag")]
    enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    payload: RawPayload,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawSchedule {
    #[serde(deserialize_with = "deserialize_null_default")]
    expr: String,
    tz: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawCronState {
    #[serde(deserialize_with = "deserialize_timestamp")]
    next_run_at_ms: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    last_run_at_ms: Option<DateTime<Utc>>,
    last_status: Option<String>,
    #[serde(deserialize_with = "deserialize_count")]
    last_duration_ms: u64,
    last_error: Option<String>,
    #[serde(deserialize_with = "deserialize_count")]
    consecutive_errors: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawPayload {
    message: Option<String>,
    model: Option<String>,
}

/// A scheduled job and its runtime state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    /// Owner declared by the job itself
    pub agent_id: Option<String>,
    /// Prompt sent on each run
    pub message: Option<String>,
    pub model: Option<String>,
    pub state: CronJobState,
}

impl From<RawCronJob> for CronJob {
    fn from(raw: RawCronJob) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            agent_id: raw.agent_id,
            message: raw.payload.message,
            model: raw.payload.model,
            state: CronJobState {
                expr: raw.schedule.expr,
                timezone: raw
                    .schedule
                    .tz
                    .filter(|tz| !tz.is_empty())
                    .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
                last_run_at: raw.state.last_run_at_ms,
                next_run_at: raw.state.next_run_at_ms,
                last_status: raw.state.last_status,
                last_duration_ms: raw.state.last_duration_ms,
                last_error: raw.state.last_error,
                consecutive_errors: u32::try_from(raw.state.consecutive_errors).unwrap_or(u32::MAX),
                enabled: raw.enabled,
            },
        }
    }
}

impl CronJob {
    pub fn view(&self, roster: &Roster, now: DateTime<Utc>) -> CronView {
        let state = &self.state;
        let description = self
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(|m| truncate_chars(m, MAX_DESCRIPTION_CHARS))
            .unwrap_or_else(|| self.name.clone());

        CronView {
            id: self.id.clone(),
            name: self.name.clone(),
            description,
            schedule: state.expr.clone(),
            timezone: state.timezone.clone(),
            next_run: state.next_run_at,
            next_run_relative: state
                .next_run_at
                .map(|ts| format_time_until(ts, now))
                .unwrap_or_else(|| "never".to_string()),
            last_run: state.last_run_at,
            last_run_relative: format_relative_time_opt(state.last_run_at, now, "never"),
            last_status: state
                .last_status
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            last_duration_ms: state.last_duration_ms,
            last_error: state.last_error.clone(),
            consecutive_errors: state.consecutive_errors,
            status: if state.enabled { "active" } else { "disabled" }.to_string(),
            enabled: state.enabled,
            owner: roster.cron_owner(self.agent_id.as_deref(), &self.name),
            model: self.model.clone().unwrap_or_default(),
        }
    }
}

/// `<root>/cron/jobs.json`
pub fn jobs_path(root: &Path) -> PathBuf {
    root.join("cron").join("jobs.json")
}

/// Read every well-formed job in file order. Bad entries are skipped.
pub fn read_jobs(path: &Path) -> Result<Vec<CronJob>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::SourceUnavailable {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let file: CronFile = serde_json::from_str(&content).map_err(|e| Error::MalformedRecord {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(file
        .jobs
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<RawCronJob>(value) {
            Ok(raw) => Some(CronJob::from(raw)),
            Err(e) => {
                tracing::warn!(path = %path.display(), index, error = %e, "Skipping malformed cron job");
                None
            }
        })
        .collect())
}

/// Scans the cron state under a data root.
pub struct CronScanner<'a> {
    root: &'a Path,
    roster: &'a Roster,
}

impl<'a> CronScanner<'a> {
    pub fn new(root: &'a Path, roster: &'a Roster) -> Self {
        Self { root, roster }
    }

    pub fn scan(&self, now: DateTime<Utc>) -> Vec<CronView> {
        let path = jobs_path(self.root);
        match read_jobs(&path) {
            Ok(jobs) => {
                tracing::debug!(path = %path.display(), jobs = jobs.len(), "Scanned cron jobs");
                jobs.iter().map(|job| job.view(self.roster, now)).collect()
            }
            Err(e) => {
                super::log_source_error(&path, &e);
                Vec::new()
            }
        }
    }
}
