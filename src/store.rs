//! Reading persistence.
//!
//! The acquisition cycle only appends; readers (status output, any request
//! serving code) query through their own handle. [`SharedStore`] gives both
//! sides one bounded in-memory history behind a mutex, and
//! [`JsonLinesStore`] appends to a file for long-term retention.

use crate::reading::{Reading, SensorType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A reading as persisted, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: u64,
    #[serde(flatten)]
    pub reading: Reading,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingQuery {
    pub sensor_type: Option<SensorType>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Append-only sink for readings.
pub trait ReadingStore {
    fn append(&mut self, reading: &Reading) -> Result<StoredReading, StoreError>;
}

#[derive(Debug)]
pub struct MemoryStore {
    readings: VecDeque<StoredReading>,
    capacity: usize,
    next_id: u64,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Matching readings, newest first.
    pub fn query(&self, query: &ReadingQuery) -> alloc::vec::Vec<StoredReading> {
        self.readings
            .iter()
            .rev()
            .filter(|stored| query.sensor_type.map_or(true, |t| stored.reading.sensor_type == t))
            .filter(|stored| query.since.map_or(true, |since| stored.reading.timestamp >= since))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Keep a reading that was already assigned an id elsewhere.
    pub fn record(&mut self, stored: StoredReading) {
        self.next_id = self.next_id.max(stored.id + 1);
        if self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(stored);
    }

    pub fn latest(&self, sensor_type: SensorType) -> Option<&StoredReading> {
        self.readings
            .iter()
            .rev()
            .find(|stored| stored.reading.sensor_type == sensor_type)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ReadingStore for MemoryStore {
    fn append(&mut self, reading: &Reading) -> Result<StoredReading, StoreError> {
        let stored = StoredReading {
            id: self.next_id,
            reading: reading.clone(),
        };
        self.record(stored.clone());
        Ok(stored)
    }
}

/// In-memory history shared between the cycle and readers.
pub type SharedStore = Arc<Mutex<MemoryStore>>;

pub fn shared_store(capacity: usize) -> SharedStore {
    Arc::new(Mutex::new(MemoryStore::new(capacity)))
}

impl ReadingStore for SharedStore {
    fn append(&mut self, reading: &Reading) -> Result<StoredReading, StoreError> {
        self.lock().unwrap_or_else(PoisonError::into_inner).append(reading)
    }
}

/// Newline-delimited JSON file, one stored reading per line.
///
/// A record only counts once its trailing newline is on disk. `open` drops a
/// partial record left by an interrupted write, and `append` undoes its own
/// partial write before reporting the error.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    file: File,
    next_id: u64,
}

impl JsonLinesStore {
    /// Open (or create) `path`, continuing the id sequence of existing lines.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let last_id = Self::recover(&mut file, &path)?;

        Ok(Self {
            path,
            file,
            next_id: last_id + 1,
        })
    }

    /// Scan existing records for the highest id and repair the tail.
    fn recover(file: &mut File, path: &Path) -> Result<u64, StoreError> {
        let mut contents = alloc::vec::Vec::new();
        file.read_to_end(&mut contents)?;

        let complete = contents
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |newline| newline + 1);

        let mut last = 0;
        for (index, line) in contents[..complete].split(|&b| b == b'\n').enumerate() {
            match parse_line(line) {
                Some(Ok(stored)) => last = last.max(stored.id),
                Some(Err(e)) => {
                    warn!("Skipping unreadable line {} of {}: {}", index + 1, path.display(), e)
                }
                None => {}
            }
        }

        match parse_line(&contents[complete..]) {
            Some(Ok(stored)) => {
                // Record made it but its newline did not
                last = last.max(stored.id);
                file.write_all(b"\n")?;
            }
            Some(Err(e)) => {
                warn!(
                    "Dropping {} byte partial record at the end of {}: {}",
                    contents.len() - complete,
                    path.display(),
                    e
                );
                file.set_len(complete as u64)?;
            }
            None => {}
        }
        Ok(last)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored reading back, oldest first. Unreadable lines are
    /// skipped.
    pub fn load_all(&self) -> Result<alloc::vec::Vec<StoredReading>, StoreError> {
        let mut readings = alloc::vec::Vec::new();
        for line in BufReader::new(File::open(&self.path)?).split(b'\n') {
            match parse_line(&line?) {
                Some(Ok(stored)) => readings.push(stored),
                Some(Err(e)) => {
                    debug!("Skipping unreadable line in {}: {}", self.path.display(), e)
                }
                None => {}
            }
        }
        Ok(readings)
    }
}

/// `None` for blank lines.
fn parse_line(line: &[u8]) -> Option<Result<StoredReading, serde_json::Error>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(serde_json::from_slice(line))
}

/// What appending needs from the backing file.
trait RecordFile: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl RecordFile for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write one whole record or leave the file as it was.
fn append_record<F: RecordFile>(file: &mut F, record: &[u8]) -> io::Result<()> {
    let len = file.current_len()?;
    if let Err(e) = file.write_all(record).and_then(|()| file.flush()) {
        if let Err(undo) = file.truncate_to(len) {
            warn!("Could not roll back partial record: {}", undo);
        }
        return Err(e);
    }
    Ok(())
}

impl ReadingStore for JsonLinesStore {
    fn append(&mut self, reading: &Reading) -> Result<StoredReading, StoreError> {
        let stored = StoredReading {
            id: self.next_id,
            reading: reading.clone(),
        };
        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');
        append_record(&mut self.file, line.as_bytes())?;
        self.next_id += 1;
        Ok(stored)
    }
}

/// The station's sink: shared in-memory history, optionally backed by a
/// JSON lines file that then owns id assignment.
#[derive(Debug)]
pub struct StationStore {
    history: SharedStore,
    file: Option<JsonLinesStore>,
}

impl StationStore {
    pub fn new(history: SharedStore, file: Option<JsonLinesStore>) -> Self {
        Self { history, file }
    }

    pub fn history(&self) -> &SharedStore {
        &self.history
    }
}

impl ReadingStore for StationStore {
    fn append(&mut self, reading: &Reading) -> Result<StoredReading, StoreError> {
        match self.file.as_mut() {
            Some(file) => {
                let stored = file.append(reading)?;
                self.history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(stored.clone());
                Ok(stored)
            }
            None => self.history.append(reading),
        }
    }
}
