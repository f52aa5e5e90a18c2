//! Reading store backed by a JSON Lines file.
//!
//! An external ingest process appends one JSON object per line:
//!
//! ```text
//! {"timestamp":"2024-01-01T00:00:00Z","temperature":21.4,"humidity":48.0}
//! ```
//!
//! The store remembers how far into the file it has read and only decodes
//! newly appended complete lines on each access, so polling for freshness
//! does not rescan the log.
//!
//! A line that cannot be accepted (malformed JSON, non-finite values, a
//! timestamp that does not advance) stops the log there. Lines before it stay
//! loaded, and every access reports the same error with the same line number
//! until the file is repaired or truncated. Readings after a bad line are never
//! served, since skipping it could hide a gap or reorder the series.

use crate::core::reading::{Reading, TimeRange};
use crate::store::{check_append, slice_range, ReadingStore, StoreError};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct LoadedLog {
    /// Byte offset just past the last complete line consumed
    offset: u64,
    /// Number of lines consumed so far
    lines: usize,
    readings: Vec<Reading>,
}

/// Append-only JSON Lines reading store.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    log: Mutex<LoadedLog>,
}

impl JsonlStore {
    /// Open a store over the given file. The file is read lazily.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            log: Mutex::new(LoadedLog::default()),
        }
    }

    /// Bring the cached log up to date with the file and run `f` on it.
    fn with_log<T>(&self, f: impl FnOnce(&LoadedLog) -> T) -> Result<T, StoreError> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        self.refresh(&mut log)?;
        Ok(f(&log))
    }

    fn refresh(&self, log: &mut LoadedLog) -> Result<(), StoreError> {
        let mut file = File::open(&self.path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {e}", self.path.display()))
        })?;

        let len = file
            .metadata()
            .map_err(|e| StoreError::Io(e.to_string()))?
            .len();

        if len < log.offset {
            // The file shrank: it was truncated or replaced. Start over.
            tracing::warn!(
                "Reading log {} shrank from {} to {} bytes, reloading",
                self.path.display(),
                log.offset,
                len
            );
            *log = LoadedLog::default();
        }
        if len == log.offset {
            return Ok(());
        }

        file.seek(SeekFrom::Start(log.offset))
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let mut buf = Vec::with_capacity((len - log.offset) as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        // Leave a trailing partial line for the next refresh.
        let Some(end) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(());
        };
        let complete = &buf[..=end];

        let mut fresh = Vec::new();
        let mut consumed = 0usize;
        let mut line_no = log.lines;
        let mut failure = None;
        for raw in complete.split_inclusive(|&b| b == b'\n') {
            match parse_line(raw, line_no + 1, fresh.last().or(log.readings.last())) {
                Ok(reading) => {
                    fresh.extend(reading);
                    consumed += raw.len();
                    line_no += 1;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        tracing::debug!(
            "Loaded {} new readings from {}",
            fresh.len(),
            self.path.display()
        );

        log.offset += consumed as u64;
        log.lines = line_no;
        log.readings.extend(fresh);

        match failure {
            Some(e) => {
                tracing::warn!("Reading log {} stalled: {}", self.path.display(), e);
                Err(e)
            }
            None => Ok(()),
        }
    }
}

/// Decode one complete line; blank lines yield no reading.
fn parse_line(
    raw: &[u8],
    line_no: usize,
    last: Option<&Reading>,
) -> Result<Option<Reading>, StoreError> {
    let corrupt = |message: String| StoreError::Corrupt {
        line: line_no,
        message,
    };
    let line = std::str::from_utf8(raw)
        .map_err(|e| corrupt(e.to_string()))?
        .trim();
    if line.is_empty() {
        return Ok(None);
    }
    let reading: Reading = serde_json::from_str(line).map_err(|e| corrupt(e.to_string()))?;
    check_append(last, &reading)?;
    Ok(Some(reading))
}

impl ReadingStore for JsonlStore {
    fn readings_in(&self, range: Option<&TimeRange>) -> Result<Vec<Reading>, StoreError> {
        self.with_log(|log| slice_range(&log.readings, range).to_vec())
    }

    fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.with_log(|log| log.readings.last().map(|r| r.timestamp))
    }
}
