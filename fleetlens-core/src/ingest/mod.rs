//! Ingestion of session logs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────────┐
//! │  Session log    │ ──► │   TailReader     │ ──► │ record::decode_line │
//! │ (*.jsonl)       │     │ (last N lines)   │     │ (one ParsedEvent)   │
//! └─────────────────┘     └──────────────────┘     └─────────────────────┘
//!                                                        │
//!                                   ┌────────────────────┴──────────────┐
//!                                   ▼                                   ▼
//!                        ┌──────────────────────┐           ┌──────────────────────┐
//!                        │ summary              │           │ transcript           │
//!                        │ SessionTailSummary   │           │ Vec<TranscriptTurn>  │
//!                        └──────────────────────┘           └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetlens_core::ingest::summarize_tail;
//!
//! let summary = summarize_tail(&path, 50);
//! println!("{} calls, model {}", summary.api_calls, summary.model_used);
//! ```

pub mod record;
pub mod summary;
pub mod transcript;

pub use record::{decode_line, Content, LogRecord, ParsedEvent, Role, Usage};
pub use summary::{is_session_header, summarize_lines, summarize_tail, SessionSummarizer};
pub use transcript::{read_transcript, resolve_session_file, turns_from_lines};
