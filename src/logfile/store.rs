//! # Log Store
//!
//! Manages a directory of numbered log files: choosing the next file ID,
//! framing the header, appending records, flushing, rotation and deletion.
//!
//! File IDs are `max(existing, highest issued by this store) + 1`, so an ID
//! is never handed out twice by one store even after its file was deleted.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::format::{encode_header, file_path, parse_file_id};
use super::hexdump::hexdump;
use super::reader::DecodedLog;
use super::storage::Storage;
use crate::error::{Result, TelemetryError};
use crate::record::Schema;

/// An open log file being written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHandle {
    id: u32,
    path: PathBuf,
    record_size: Option<usize>,
}

impl LogHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the header has been written
    pub fn has_header(&self) -> bool {
        self.record_size.is_some()
    }

    /// The same file, treated as having no header so appends are refused
    pub(crate) fn without_header(&self) -> LogHandle {
        LogHandle {
            id: self.id,
            path: self.path.clone(),
            record_size: None,
        }
    }
}

/// A stored log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFileInfo {
    pub id: u32,
    pub size: u64,
}

/// Directory of numbered log files on a [`Storage`] provider
pub struct LogStore<S: Storage> {
    storage: S,
    dir: PathBuf,
    last_issued: Option<u32>,
}

impl<S: Storage> std::fmt::Debug for LogStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("dir", &self.dir)
            .field("last_issued", &self.last_issued)
            .finish_non_exhaustive()
    }
}

impl<S: Storage> LogStore<S> {
    pub fn new(storage: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            dir: dir.into(),
            last_issued: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log files in the directory, sorted by ID
    ///
    /// Files not matching the `NNNN.bin` pattern are ignored.
    pub fn list(&mut self) -> Result<Vec<LogFileInfo>> {
        let mut logs: Vec<LogFileInfo> = self
            .storage
            .list(&self.dir)?
            .into_iter()
            .filter_map(|file| {
                parse_file_id(&file.name).map(|id| LogFileInfo {
                    id,
                    size: file.size,
                })
            })
            .collect();
        logs.sort_by_key(|log| log.id);
        Ok(logs)
    }

    /// Total bytes used by log files
    pub fn total_size(&mut self) -> Result<u64> {
        Ok(self.list()?.iter().map(|log| log.size).sum())
    }

    fn next_id(&mut self) -> Result<u32> {
        let highest_stored = self.list()?.last().map(|log| log.id);
        let highest = highest_stored.max(self.last_issued);

        match highest {
            None => Ok(0),
            Some(id) => id.checked_add(1).ok_or_else(|| {
                TelemetryError::StorageFailure(io::Error::new(
                    io::ErrorKind::Other,
                    "log file IDs exhausted",
                ))
            }),
        }
    }

    /// Create the next numbered log file
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::StorageFailure`] if the directory cannot be
    /// scanned or the file cannot be created.
    pub fn open_next(&mut self) -> Result<LogHandle> {
        let id = self.next_id()?;
        let path = file_path(&self.dir, id);
        self.storage.create(&path)?;
        self.last_issued = Some(id);

        info!("Opened log file {}", path.display());
        Ok(LogHandle {
            id,
            path,
            record_size: None,
        })
    }

    /// Write the header and embedded schema; exactly once per file
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::IncompatibleFormat`] if the header was already written
    /// - [`TelemetryError::StorageFailure`] if the write fails
    pub fn write_header(&mut self, handle: &mut LogHandle, schema: &Schema) -> Result<()> {
        if handle.has_header() {
            return Err(TelemetryError::IncompatibleFormat(format!(
                "header already written to {}",
                handle.path.display()
            )));
        }

        let header = encode_header(schema);
        self.storage.append(&handle.path, &header)?;
        handle.record_size = Some(schema.record_size());

        debug!(
            "Wrote {} byte header to {} ({} fields)",
            header.len(),
            handle.path.display(),
            schema.len()
        );
        Ok(())
    }

    /// Append one record verbatim
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::IncompatibleFormat`] before the header is written
    /// - [`TelemetryError::RawLength`] if `record` is not one record long
    /// - [`TelemetryError::StorageFailure`] if the write fails
    pub fn append_record(&mut self, handle: &LogHandle, record: &[u8]) -> Result<()> {
        let record_size = handle.record_size.ok_or_else(|| {
            TelemetryError::IncompatibleFormat(format!(
                "no header written to {}",
                handle.path.display()
            ))
        })?;

        if record.len() != record_size {
            return Err(TelemetryError::RawLength {
                field: "record".to_string(),
                expected: record_size,
                got: record.len(),
            });
        }

        self.storage.append(&handle.path, record)?;
        Ok(())
    }

    /// Force buffered writes of a log file to durable storage
    pub fn flush(&mut self, handle: &LogHandle) -> Result<()> {
        self.storage.flush(&handle.path)?;
        Ok(())
    }

    /// Close `current`, delete every log file and open a fresh one
    ///
    /// This is destructive; callers must confirm it with the operator.
    pub fn rotate(&mut self, current: Option<LogHandle>) -> Result<LogHandle> {
        if let Some(handle) = current {
            if let Err(e) = self.storage.flush(&handle.path) {
                warn!("Failed to flush {} before rotation: {}", handle.path.display(), e);
            }
        }

        self.clear()?;
        self.open_next()
    }

    /// Delete every log file, returning how many were removed
    pub fn clear(&mut self) -> Result<usize> {
        let logs = self.list()?;
        for log in &logs {
            self.storage.delete(&file_path(&self.dir, log.id))?;
        }
        info!("Deleted {} log files from {}", logs.len(), self.dir.display());
        Ok(logs.len())
    }

    /// Delete one log file, returning whether it existed
    pub fn delete(&mut self, id: u32) -> Result<bool> {
        let existed = self.storage.delete(&file_path(&self.dir, id))?;
        if existed {
            info!("Deleted log file {}", id);
        }
        Ok(existed)
    }

    /// Raw bytes of a log file
    pub fn read(&mut self, id: u32) -> Result<Vec<u8>> {
        Ok(self.storage.read(&file_path(&self.dir, id))?)
    }

    /// Replay a log file as CSV, returning the number of rows
    pub fn dump_csv<W: Write>(&mut self, id: u32, out: &mut W) -> Result<usize> {
        let bytes = self.read(id)?;
        DecodedLog::parse(&bytes)?.write_csv(out)
    }

    /// Replay every log file as CSV, skipping files that cannot be decoded
    ///
    /// Returns the IDs that were dumped.
    pub fn dump_all_csv<W: Write>(&mut self, out: &mut W) -> Result<Vec<u32>> {
        let mut dumped = Vec::new();
        for log in self.list()? {
            match self.dump_csv(log.id, out) {
                Ok(rows) => {
                    debug!("Dumped {} rows from log {}", rows, log.id);
                    dumped.push(log.id);
                }
                Err(e @ TelemetryError::IncompatibleFormat(_)) => {
                    warn!("Skipping log {}: {}", log.id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(dumped)
    }

    /// Hex view of a whole log file
    pub fn hexdump(&mut self, id: u32) -> Result<String> {
        let bytes = self.read(id)?;
        Ok(hexdump(&bytes, 0, true))
    }
}
