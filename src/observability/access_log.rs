//! Access log: one line per completed request.
//!
//! ```text
//! 127.0.0.1 -- [19/10/2026:14:03:11] GET /index 200 curl/8.5.0
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::Local;

const DATE_FORMAT: &str = "%d/%m/%Y:%H:%M:%S";

/// Fields recorded for a completed request.
#[derive(Debug, Clone, Copy)]
pub struct AccessRecord<'a> {
    pub client: IpAddr,
    pub method: &'a str,
    pub path: &'a str,
    pub status: u16,
    pub user_agent: Option<&'a str>,
}

impl AccessRecord<'_> {
    /// Render the record as a log line stamped with `timestamp`.
    pub fn line(&self, timestamp: &str) -> String {
        format!(
            "{} -- [{}] {} {} {} {}\n",
            self.client,
            timestamp,
            self.method,
            self.path,
            self.status,
            self.user_agent.unwrap_or("-")
        )
    }
}

/// Append-only sink for access records.
pub trait AccessLog: Send + Sync {
    fn record(&self, record: &AccessRecord<'_>) -> io::Result<()>;
}

/// Appends records to a file, flushing after each one.
#[derive(Debug)]
pub struct FileAccessLog {
    file: Mutex<File>,
}

impl FileAccessLog {
    /// Open (or create) `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AccessLog for FileAccessLog {
    fn record(&self, record: &AccessRecord<'_>) -> io::Result<()> {
        let timestamp = Local::now().format(DATE_FORMAT).to_string();
        let line = record.line(&timestamp);

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}
