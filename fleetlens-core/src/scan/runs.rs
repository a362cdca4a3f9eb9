//! Run-registry scanner
//!
//! `<root>/subagents/runs.json` holds `{"runs": {"<id>": RunRecord}}`. The
//! registry is rewritten in place by the runner, so a read can observe a
//! truncated document; that reads as "no runs".

use crate::error::{Error, Result};
use crate::format::truncate_chars;
use crate::roster::Roster;
use crate::types::{ActiveRun, RunRecord, RunSummary};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Task text shown for unlabeled runs is cut to this many chars
const MAX_RUN_TASK_CHARS: usize = 80;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RunRegistryFile {
    runs: serde_json::Map<String, serde_json::Value>,
}

/// `<root>/subagents/runs.json`
pub fn runs_path(root: &Path) -> PathBuf {
    root.join("subagents").join("runs.json")
}

/// Read every well-formed run, newest `created_at` first.
///
/// Individual entries that fail to decode are skipped.
pub fn read_runs(path: &Path) -> Result<Vec<RunRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::SourceUnavailable {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let registry: RunRegistryFile =
        serde_json::from_str(&content).map_err(|e| Error::MalformedRecord {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut runs: Vec<RunRecord> = registry
        .runs
        .into_iter()
        .filter_map(|(run_id, value)| match serde_json::from_value::<RunRecord>(value) {
            Ok(mut run) => {
                run.run_id = run_id;
                Some(run)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), run_id = %run_id, error = %e, "Skipping malformed run");
                None
            }
        })
        .collect();

    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
    Ok(runs)
}

/// Scans the run registry under a data root.
pub struct RunRegistryScanner<'a> {
    root: &'a Path,
}

impl<'a> RunRegistryScanner<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    /// All runs; a missing or malformed registry yields none.
    pub fn scan(&self) -> Vec<RunRecord> {
        let path = runs_path(self.root);
        match read_runs(&path) {
            Ok(runs) => {
                tracing::debug!(
                    path = %path.display(),
                    runs = runs.len(),
                    running = runs.iter().filter(|r| r.is_running()).count(),
                    "Scanned run registry"
                );
                runs
            }
            Err(e) => {
                super::log_source_error(&path, &e);
                Vec::new()
            }
        }
    }
}

/// Agent a run is shown under: its label's agent or the default owner
pub fn parent_agent(run: &RunRecord, roster: &Roster) -> String {
    roster
        .agent_for_label(&run.label)
        .map(|a| a.id.clone())
        .unwrap_or_else(|| roster.default_owner().to_string())
}

pub fn run_summary(run: &RunRecord, roster: &Roster, now: DateTime<Utc>) -> RunSummary {
    let short_id = run.short_id();
    let status = run.status();

    RunSummary {
        id: format!("sa-{}", short_id),
        name: if run.label.is_empty() {
            format!("run-{}", short_id)
        } else {
            run.label.clone()
        },
        parent_agent: parent_agent(run, roster),
        task: if run.label.is_empty() {
            truncate_chars(&run.task, MAX_RUN_TASK_CHARS)
        } else {
            run.label.clone()
        },
        status,
        progress: status.progress(),
        start_time: run.created_at,
        end_time: run.ended_at,
        session_id: run.child_session_key.clone(),
        tokens_used: 0,
        label: run.label.clone(),
        duration_ms: run.duration_ms(now),
    }
}

/// `None` for runs that already have an outcome
pub fn active_run(run: &RunRecord, roster: &Roster, now: DateTime<Utc>) -> Option<ActiveRun> {
    run.is_running().then(|| ActiveRun {
        id: run.run_id.clone(),
        label: run.label.clone(),
        start_time: run.created_at,
        parent_agent: parent_agent(run, roster),
        duration_ms: run.duration_ms(now),
    })
}
