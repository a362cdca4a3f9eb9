//! Reading the end of append-only files.
//!
//! Session logs grow without bound while an external writer appends to them,
//! so only the last few records are ever read. Small files are read whole;
//! large ones are read from a byte window at the end. The window is sized
//! from an estimated line length and doubled (up to a ceiling) when it turns
//! out to hold fewer lines than requested.
//!
//! Every I/O failure yields an empty result: a file may vanish or be
//! truncated between `stat` and `read`.

use crate::config::ScanConfig;
use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Reads the last `n` non-blank lines of a file.
#[derive(Debug, Clone)]
pub struct TailReader {
    small_file_threshold: u64,
    bytes_per_line: u64,
    max_window_bytes: u64,
}

impl Default for TailReader {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl TailReader {
    pub fn new(small_file_threshold: u64, bytes_per_line: u64, max_window_bytes: u64) -> Self {
        Self {
            small_file_threshold,
            bytes_per_line: bytes_per_line.max(1),
            max_window_bytes,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.small_file_threshold,
            config.bytes_per_line,
            config.max_window_bytes,
        )
    }

    /// Last `n` non-blank lines of `path`, most recent last.
    ///
    /// Never returns more than `n` lines and never fails: unreadable files
    /// produce an empty vector.
    pub fn read_last_lines(&self, path: &Path, n: usize) -> Vec<String> {
        if n == 0 {
            return Vec::new();
        }

        match self.try_read_last_lines(path, n) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Tail read failed");
                Vec::new()
            }
        }
    }

    fn try_read_last_lines(&self, path: &Path, n: usize) -> Result<Vec<String>> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        if size == 0 {
            return Ok(Vec::new());
        }

        if size < self.small_file_threshold {
            let mut buf = Vec::with_capacity(size as usize);
            file.read_to_end(&mut buf)?;
            return Ok(last_lines(&String::from_utf8_lossy(&buf), n));
        }

        let mut window = (n as u64).saturating_mul(self.bytes_per_line);
        loop {
            let span = window.min(size);
            let lines = read_suffix(&mut file, size, span, n)?;

            if lines.len() >= n || span >= size || window >= self.max_window_bytes {
                return Ok(lines);
            }

            tracing::trace!(
                path = %path.display(),
                window,
                got = lines.len(),
                wanted = n,
                "Tail window too small, growing"
            );
            window = window.saturating_mul(2).min(self.max_window_bytes);
        }
    }
}

/// Convenience wrapper using the default thresholds.
pub fn read_last_lines(path: &Path, n: usize) -> Vec<String> {
    TailReader::default().read_last_lines(path, n)
}

/// Read the last `span` bytes of a `size`-byte file and return its last `n`
/// complete lines.
///
/// One extra byte before the window is read: if it is not a newline, the
/// window starts mid-line and that leading fragment is dropped.
fn read_suffix(file: &mut File, size: u64, span: u64, n: usize) -> Result<Vec<String>> {
    let start = size - span;
    let read_from = start.saturating_sub(1);

    file.seek(SeekFrom::Start(read_from))?;
    let mut buf = Vec::with_capacity((size - read_from) as usize);
    file.by_ref().take(size - read_from).read_to_end(&mut buf)?;

    let body: &[u8] = if start == 0 {
        &buf
    } else {
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => &buf[pos + 1..],
            None => &[],
        }
    };

    Ok(last_lines(&String::from_utf8_lossy(body), n))
}

fn last_lines(text: &str, n: usize) -> Vec<String> {
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect();

    if lines.len() > n {
        lines.drain(..lines.len() - n);
    }
    lines
}
