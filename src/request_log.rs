//! Per-request audit log.
//!
//! Each call appends one record: the given lines followed by a separator line.
//! The target file is chosen once at process start and never changes. Write
//! failures are swallowed; they must never affect the response.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeZone};
use tracing::debug;

/// Marker repeated to form the line that closes each record.
const SEPARATOR_MARK: char = '*';
const SEPARATOR_WIDTH: usize = 15;

/// Sink for request records.
pub trait RequestLog: Send + Sync {
    fn record(&self, lines: &[&str]);
}

/// Discards everything.
pub struct NoopRequestLog;

impl RequestLog for NoopRequestLog {
    fn record(&self, _lines: &[&str]) {}
}

/// Appends records to a single text file.
pub struct FileRequestLog {
    path: PathBuf,
    // Held for the whole append so records never interleave.
    lock: Mutex<()>,
}

impl FileRequestLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Log file in `dir`, named after the process start time.
    pub fn at_startup<Tz: TimeZone>(dir: &Path, started: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self::new(dir.join(log_file_name(started)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, lines: &[&str]) -> io::Result<()> {
        let record = format_record(lines);

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(record.as_bytes())?;
        file.sync_data()
    }
}

impl RequestLog for FileRequestLog {
    fn record(&self, lines: &[&str]) {
        if let Err(err) = self.append(lines) {
            debug!("request log write to {} failed: {}", self.path.display(), err);
        }
    }
}

/// `logger_` plus the start time as `Mon Jan  2 15:04:05 2006`, spaces as `_`.
pub fn log_file_name<Tz: TimeZone>(started: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("logger_{}", started.format("%a %b %e %H:%M:%S %Y")).replace(' ', "_")
}

/// Line breaks inside a line are written as `\n` / `\r` so a client-supplied
/// value can never start a new line or forge a separator.
fn format_record(lines: &[&str]) -> String {
    let mut record = String::new();
    for line in lines {
        for c in line.chars() {
            match c {
                '\n' => record.push_str("\\n"),
                '\r' => record.push_str("\\r"),
                c => record.push(c),
            }
        }
        record.push('\n');
    }
    record.extend(std::iter::repeat_n(SEPARATOR_MARK, SEPARATOR_WIDTH));
    record.push('\n');
    record
}
