//! # fleetlens-core
//!
//! Core library for fleetlens - a live view of what every agent in a fleet
//! is doing, rebuilt from the files the agents leave on disk.
//!
//! This library provides:
//! - Bounded tail reading of append-only session logs
//! - Scanners for session directories, the run registry and cron state
//! - Reconciliation of overlapping sources into one status per agent
//! - A short-TTL query cache and the [`Telemetry`] query facade
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Sources:** files written by the fleet (never modified here)
//! - **Facts:** per-file summaries and run records, rebuilt on every scan
//! - **Views:** reconciled agents, crons and metrics, cached briefly
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleetlens_core::{Config, Telemetry};
//!
//! let config = Config::load().expect("failed to load config");
//! let telemetry = Telemetry::new(config);
//!
//! for agent in telemetry.sessions().agents {
//!     println!("{} {} {}", agent.emoji, agent.name, agent.status);
//! }
//! ```

// Re-export commonly used items at the crate root
pub use cache::{Clock, ManualClock, SystemClock, TelemetryCache};
pub use config::Config;
pub use error::{Error, Result};
pub use roster::Roster;
pub use tail::{read_last_lines, TailReader};
pub use telemetry::Telemetry;
pub use types::*;

// Public modules
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod reconcile;
pub mod roster;
pub mod scan;
pub mod tail;
pub mod telemetry;
pub mod types;
