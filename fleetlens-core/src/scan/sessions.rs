//! Session-directory scanner
//!
//! Each agent directory holds JSONL session logs under
//! `<root>/agents/<dir>/sessions/`. Soft-deleted logs keep their content but
//! gain a `.deleted.` marker in the file name and are ignored.

use crate::error::{Error, Result};
use crate::ingest::summary::{is_session_header, SessionSummarizer};
use crate::roster::{Roster, SessionDirRule};
use crate::types::{SessionTailSummary, SourceStats};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// File-name marker of soft-deleted session logs
const DELETED_MARKER: &str = ".deleted.";

const BOOT_PREFIX: &str = "boot-";
const BOOT_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
/// Length of `YYYY-MM-DD_HH-MM-SS`
const BOOT_TIME_LEN: usize = 19;

/// A live session log on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
}

impl SessionFile {
    pub fn is_boot(&self) -> bool {
        self.name.starts_with(BOOT_PREFIX)
    }
}

/// One summarized session file, attributed to an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFact {
    pub agent: String,
    pub session_key: String,
    pub path: PathBuf,
    pub summary: SessionTailSummary,
}

/// Everything the session scan produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionScan {
    pub facts: Vec<SessionFact>,
    /// Stats of the main agent's directory
    pub stats: SourceStats,
}

/// `<root>/agents/<dir>/sessions`
pub fn sessions_dir(root: &Path, dir: &str) -> PathBuf {
    root.join("agents").join(dir).join("sessions")
}

/// List live `*.jsonl` files in `dir`, newest modification first.
///
/// Files that vanish while listing are skipped.
pub fn list_session_files(dir: &Path) -> Result<Vec<SessionFile>> {
    if !dir.is_dir() {
        return Err(Error::SourceUnavailable {
            path: dir.to_path_buf(),
        });
    }

    let pattern = format!(
        "{}/*.jsonl",
        glob::Pattern::escape(&dir.to_string_lossy())
    );

    let mut files = Vec::new();
    for path in glob::glob(&pattern)?.flatten() {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.contains(DELETED_MARKER) {
            continue;
        }
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        files.push(SessionFile {
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            path,
            name,
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(files)
}

/// Newest boot session by name (names embed the boot time)
pub fn newest_boot_file(files: &[SessionFile]) -> Option<&SessionFile> {
    files
        .iter()
        .filter(|f| f.is_boot())
        .max_by(|a, b| a.name.cmp(&b.name))
}

/// Boot time from a name like `boot-2026-02-18_18-17-20-040-xxx.jsonl` (UTC)
pub fn parse_boot_time(file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name.strip_prefix(BOOT_PREFIX)?.get(..BOOT_TIME_LEN)?;
    NaiveDateTime::parse_from_str(stamp, BOOT_TIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Scans every session directory the roster knows about.
pub struct SessionDirScanner<'a> {
    root: &'a Path,
    roster: &'a Roster,
    summarizer: SessionSummarizer,
    tail_lines: usize,
}

impl<'a> SessionDirScanner<'a> {
    pub fn new(
        root: &'a Path,
        roster: &'a Roster,
        summarizer: SessionSummarizer,
        tail_lines: usize,
    ) -> Self {
        Self {
            root,
            roster,
            summarizer,
            tail_lines,
        }
    }

    /// Scan all directories. Missing or unreadable directories contribute nothing.
    pub fn scan(&self) -> SessionScan {
        let mut scan = SessionScan::default();
        let main_dir = self.roster.session_dirs.first().map(|r| r.dir.as_str());

        for rule in &self.roster.session_dirs {
            let dir = sessions_dir(self.root, &rule.dir);
            let files = match list_session_files(&dir) {
                Ok(files) => files,
                Err(e) => {
                    super::log_source_error(&dir, &e);
                    continue;
                }
            };

            if Some(rule.dir.as_str()) == main_dir {
                scan.stats = SourceStats {
                    session_files: files.len(),
                    boot_started_at: newest_boot_file(&files).and_then(|f| parse_boot_time(&f.name)),
                };
            }

            let facts = self.summarize_dir(rule, &files);
            tracing::debug!(
                dir = %dir.display(),
                files = files.len(),
                facts = facts.len(),
                "Scanned session directory"
            );
            scan.facts.extend(facts);
        }

        scan
    }

    fn summarize_dir(&self, rule: &SessionDirRule, files: &[SessionFile]) -> Vec<SessionFact> {
        files
            .iter()
            .take(rule.max_files)
            .filter(|f| !rule.require_header || is_session_header(&f.path))
            .map(|f| SessionFact {
                agent: rule.agent.clone(),
                session_key: rule.session_key.clone(),
                path: f.path.clone(),
                summary: self.summarizer.summarize(&f.path, self.tail_lines),
            })
            .collect()
    }
}
