//! Folding a session tail into a [`SessionTailSummary`].

use super::record::{decode_line, is_header_line, ParsedEvent, Role, MODEL_SNAPSHOT};
use crate::format::truncate_chars;
use crate::tail::TailReader;
use crate::types::SessionTailSummary;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Longest task description kept
pub const MAX_TASK_CHARS: usize = 100;

/// User text must be strictly longer than this to count as a task
const MIN_TASK_CHARS: usize = 10;

/// User text must be strictly shorter than this to count as a task
const MAX_USER_TASK_CHARS: usize = 200;

/// Header lines are short; anything longer is not worth reading
const MAX_HEADER_BYTES: u64 = 64 * 1024;

/// Summarizes the tail of a session file.
#[derive(Debug, Clone, Default)]
pub struct SessionSummarizer {
    reader: TailReader,
}

impl SessionSummarizer {
    pub fn new(reader: TailReader) -> Self {
        Self { reader }
    }

    /// Summarize the last `n` records of `path`.
    ///
    /// Unreadable files summarize to the default (empty) summary.
    pub fn summarize(&self, path: &Path, n: usize) -> SessionTailSummary {
        let lines = self.reader.read_last_lines(path, n);
        let summary = summarize_lines(&lines);
        tracing::trace!(
            path = %path.display(),
            lines = lines.len(),
            api_calls = summary.api_calls,
            "Summarized session tail"
        );
        summary
    }
}

/// Summarize the last `n` records of `path` with default tail settings.
pub fn summarize_tail(path: &Path, n: usize) -> SessionTailSummary {
    SessionSummarizer::default().summarize(path, n)
}

/// Fold raw lines, oldest first, into a summary. Undecodable lines are skipped.
pub fn summarize_lines<S: AsRef<str>>(lines: &[S]) -> SessionTailSummary {
    let mut summary = SessionTailSummary::default();
    let mut last_assistant_text: Option<String> = None;

    for line in lines {
        let Some(record) = decode_line(line.as_ref()) else {
            continue;
        };

        if let Some(ts) = record.timestamp {
            if summary.last_timestamp.map_or(true, |last| ts > last) {
                summary.last_timestamp = Some(ts);
            }
        }

        match record.event {
            ParsedEvent::Message {
                role: Role::Assistant,
                content,
                usage,
                model,
            } => {
                summary.api_calls += 1;
                if let Some(text) = content.first_text() {
                    last_assistant_text = Some(text.to_string());
                }
                if let Some(usage) = usage {
                    summary.tokens_in = summary
                        .tokens_in
                        .saturating_add(usage.input)
                        .saturating_add(usage.cache_read);
                    summary.tokens_out = summary.tokens_out.saturating_add(usage.output);
                }
                if let Some(model) = model.filter(|m| !m.is_empty()) {
                    summary.model_used = model;
                }
            }
            ParsedEvent::Message {
                role: Role::User,
                content,
                ..
            } => {
                let text = content.concatenated_text();
                let len = text.chars().count();
                if len > MIN_TASK_CHARS && len < MAX_USER_TASK_CHARS {
                    summary.last_task = truncate_chars(&text, MAX_TASK_CHARS);
                }
            }
            ParsedEvent::ModelChange { model_id } if !model_id.is_empty() => {
                summary.model_used = model_id;
            }
            ParsedEvent::CustomSnapshot {
                kind,
                model_id: Some(model_id),
            } if kind == MODEL_SNAPSHOT && !model_id.is_empty() => {
                summary.model_used = model_id;
            }
            _ => {}
        }
    }

    if summary.last_task.is_empty() {
        if let Some(text) = last_assistant_text {
            summary.last_task = first_sentence(&text).unwrap_or_default();
        }
    }

    summary
}

/// First sentence (up to `.` or newline) if it is long enough to be useful
fn first_sentence(text: &str) -> Option<String> {
    let sentence = text.split(|c: char| c == '.' || c == '\n').next().unwrap_or("");
    (sentence.chars().count() > MIN_TASK_CHARS).then(|| truncate_chars(sentence, MAX_TASK_CHARS))
}

/// Whether the first line of `path` is a session header.
///
/// Only the first line is read. Unreadable files are not headers.
pub fn is_session_header(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };

    let mut first = String::new();
    let mut reader = BufReader::new(file.take(MAX_HEADER_BYTES));
    match reader.read_line(&mut first) {
        Ok(0) => false,
        Ok(_) => is_header_line(first.trim_end()),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to read session header");
            false
        }
    }
}
