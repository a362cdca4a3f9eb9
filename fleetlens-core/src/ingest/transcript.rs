//! Chat transcripts for display.
//!
//! A session key names a session log:
//!
//! | Key | File |
//! |-----|------|
//! | empty or `agent:main:main` | newest `boot-*.jsonl` of the main agent |
//! | `...<uuid>` (36 chars of `[0-9a-f-]`) | `<uuid>.jsonl` of the main agent |
//! | `agent:<dir>` | newest live log in `agents/<dir>/sessions` |

use super::record::{decode_line, ParsedEvent};
use crate::format::truncate_chars;
use crate::scan::sessions::{list_session_files, newest_boot_file, sessions_dir};
use crate::tail::TailReader;
use crate::types::TranscriptTurn;
use std::path::{Path, PathBuf};

/// Longest text kept per turn
pub const MAX_TURN_CHARS: usize = 2_000;

/// Lines read per requested turn; tool records sit between messages
const LINES_PER_TURN: usize = 3;

const MAIN_SESSION_KEY: &str = "agent:main:main";
const UUID_LEN: usize = 36;

/// Map a session key to its log file under `root`. The main agent's
/// directory is `main_dir`.
pub fn resolve_session_file(root: &Path, main_dir: &str, key: &str) -> Option<PathBuf> {
    let main = sessions_dir(root, main_dir);

    if key.is_empty() || key == MAIN_SESSION_KEY {
        let files = list_session_files(&main).ok()?;
        return newest_boot_file(&files).map(|f| f.path.clone());
    }

    if let Some(uuid) = trailing_uuid(key) {
        let candidate = main.join(format!("{}.jsonl", uuid));
        return candidate.is_file().then_some(candidate);
    }

    let dir = key.strip_prefix("agent:")?;
    if dir.is_empty() || dir.contains(|c: char| matches!(c, '/' | '\\' | ':')) || dir == ".." {
        return None;
    }
    list_session_files(&sessions_dir(root, dir))
        .ok()?
        .into_iter()
        .next()
        .map(|f| f.path)
}

fn trailing_uuid(key: &str) -> Option<&str> {
    let start = key.len().checked_sub(UUID_LEN)?;
    let tail = key.get(start..)?;
    tail.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b) || b == b'-')
        .then_some(tail)
}

/// Last `limit` chat turns of a session log. Missing files give no turns.
pub fn read_transcript(reader: &TailReader, path: &Path, limit: usize) -> Vec<TranscriptTurn> {
    let lines = reader.read_last_lines(path, limit.saturating_mul(LINES_PER_TURN));
    turns_from_lines(&lines, limit)
}

/// Message lines with text, oldest first, keeping the last `limit`.
pub fn turns_from_lines<S: AsRef<str>>(lines: &[S], limit: usize) -> Vec<TranscriptTurn> {
    let mut turns: Vec<TranscriptTurn> = lines
        .iter()
        .filter_map(|line| decode_line(line.as_ref()))
        .filter_map(|record| match record.event {
            ParsedEvent::Message {
                role,
                content,
                model,
                ..
            } => {
                let text = content.display_text();
                (!text.is_empty()).then(|| TranscriptTurn {
                    role: role.as_str().to_string(),
                    text: truncate_chars(&text, MAX_TURN_CHARS),
                    timestamp: record.timestamp,
                    model,
                })
            }
            _ => None,
        })
        .collect();

    if turns.len() > limit {
        turns.drain(..turns.len() - limit);
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const UUID: &str = "0f8e2a7c-1b3d-4e5f-9a6b-7c8d9e0f1a2b";

    fn setup_root() -> tempfile::TempDir {
        let temp = tempfile::tempdir().unwrap();
        let main = sessions_dir(temp.path(), "main");
        fs::create_dir_all(&main).unwrap();
        fs::write(main.join("boot-2026-02-17_08-00-00.jsonl"), "{}\n").unwrap();
        fs::write(main.join("boot-2026-02-18_08-00-00.jsonl"), "{}\n").unwrap();
        fs::write(main.join(format!("{UUID}.jsonl")), "{}\n").unwrap();

        let hunter = sessions_dir(temp.path(), "hunter");
        fs::create_dir_all(&hunter).unwrap();
        fs::write(hunter.join("h1.jsonl"), "{}\n").unwrap();
        temp
    }

    #[test]
    fn test_resolve_keys() {
        let temp = setup_root();
        let root = temp.path();

        let main = resolve_session_file(root, "main", "agent:main:main").unwrap();
        assert!(main.ends_with("boot-2026-02-18_08-00-00.jsonl"));
        assert_eq!(resolve_session_file(root, "main", ""), Some(main));

        let sub = resolve_session_file(root, "main", &format!("agent:main:subagent:{UUID}")).unwrap();
        assert!(sub.ends_with(format!("{UUID}.jsonl")));

        let hunter = resolve_session_file(root, "main", "agent:hunter").unwrap();
        assert!(hunter.ends_with("h1.jsonl"));
    }

    #[test]
    fn test_unknown_keys_resolve_to_nothing() {
        let temp = setup_root();
        let root = temp.path();
        let missing_uuid = "agent:main:subagent:ffffffff-ffff-ffff-ffff-ffffffffffff";
        assert!(resolve_session_file(root, "main", missing_uuid).is_none());
        assert!(resolve_session_file(root, "main", "agent:nobody").is_none());
        assert!(resolve_session_file(root, "main", "agent:../main").is_none());
        assert!(resolve_session_file(root, "main", "garbage").is_none());
    }

    #[test]
    fn test_turns_from_both_line_shapes() {
        let lines = [
            r#"{"type":"session"}"#,
            r#"{"type":"message","timestamp":"2026-02-18T18:00:00Z","message":{"role":"user","content":"hello"}}"#,
            r#"{"type":"message","message":{"role":"assistant","content":[{"type":"text","text":"a"},{"type":"tool_use"},{"type":"text","text":"b"}],"model":"m1"}}"#,
            r#"{"role":"assistant","content":"flat reply","model":"m2"}"#,
            r#"{"type":"message","message":{"role":"assistant","content":[{"type":"tool_use"}]}}"#,
            "not json",
        ];

        let turns = turns_from_lines(&lines, 50);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, "user");
        assert!(turns[0].timestamp.is_some());
        assert_eq!(turns[1].text, "a\nb");
        assert_eq!(turns[1].model.as_deref(), Some("m1"));
        assert_eq!(turns[2].text, "flat reply");

        let last = turns_from_lines(&lines, 1);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].text, "flat reply");
    }

    #[test]
    fn test_long_turns_are_truncated() {
        let line = serde_json::json!({"role": "user", "content": "q".repeat(5_000)}).to_string();
        let turns = turns_from_lines(&[line], 5);
        assert_eq!(turns[0].text.chars().count(), MAX_TURN_CHARS);
    }

    #[test]
    fn test_read_transcript_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("s.jsonl");
        let body: String = (0..20)
            .map(|i| format!("{{\"role\":\"user\",\"content\":\"turn {i}\"}}\n"))
            .collect();
        fs::write(&path, body).unwrap();

        let turns = read_transcript(&TailReader::default(), &path, 4);
        let texts: Vec<_> = turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["turn 16", "turn 17", "turn 18", "turn 19"]);
        assert!(read_transcript(&TailReader::default(), &temp.path().join("none"), 4).is_empty());
    }
}
