//! Source scanners
//!
//! Each scanner reads one kind of source under the data root and never fails:
//! a missing source is logged at debug level, a broken one as a warning, and
//! both contribute no data. Scanners share no state and can run concurrently.

pub mod cron;
pub mod runs;
pub mod sessions;

pub use cron::{CronJob, CronScanner};
pub use runs::RunRegistryScanner;
pub use sessions::{SessionDirScanner, SessionFact, SessionFile, SessionScan};

use crate::error::Error;
use std::path::Path;

fn log_source_error(path: &Path, error: &Error) {
    if error.is_unavailable() {
        tracing::debug!(path = %path.display(), "Source not present");
    } else {
        tracing::warn!(path = %path.display(), error = %error, "Source unreadable, ignoring");
    }
}
