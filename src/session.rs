//! # Recording Session
//!
//! Owns everything needed to record one run: the schema, the record buffer
//! that sampling code fills, the log store with its current file, and an
//! optional downlink.
//!
//! ## Commit Semantics
//!
//! [`Session::commit`] transmits the record first, then appends it to the
//! current log file. Both halves are always attempted and neither is rolled
//! back if the other fails; the returned [`CommitReport`] carries each
//! outcome. Records are flushed to storage on an interval, not per commit.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::logfile::{LogHandle, LogStore, Storage};
use crate::record::{FieldKey, RecordBuffer, Schema};
use crate::transport::{TransportQueue, MAX_PAYLOAD};

/// Default interval between storage flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of both halves of a commit
#[derive(Debug)]
#[must_use]
pub struct CommitReport {
    /// `None` when the session has no transport
    pub transmit: Option<Result<()>>,
    pub persist: Result<()>,
}

impl CommitReport {
    /// Whether every attempted half succeeded
    pub fn is_complete(&self) -> bool {
        self.persist.is_ok() && !matches!(self.transmit, Some(Err(_)))
    }
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub commits: u64,
    pub records_persisted: u64,
    pub records_transmitted: u64,
    pub persist_failures: u64,
    pub transmit_failures: u64,
    pub flushes: u64,
}

/// One recording run
pub struct Session<S: Storage> {
    schema: Arc<Schema>,
    record: RecordBuffer,
    store: LogStore<S>,
    log: LogHandle,
    transport: Option<TransportQueue>,
    flush_interval: Duration,
    last_flush: Instant,
    unflushed: bool,
    stats: SessionStats,
}

impl<S: Storage> Session<S> {
    /// Open the next log file and write its header
    ///
    /// # Arguments
    ///
    /// * `schema` - Finalized record layout
    /// * `store` - Log directory to record into
    /// * `transport` - Optional downlink; must be a sender to transmit
    /// * `flush_interval` - Minimum time between storage flushes
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::StorageFailure`] if the log file cannot be
    /// created or its header written.
    pub fn start(
        schema: Arc<Schema>,
        mut store: LogStore<S>,
        transport: Option<TransportQueue>,
        flush_interval: Duration,
    ) -> Result<Self> {
        if transport.is_some() && schema.record_size() > MAX_PAYLOAD {
            warn!(
                "Record size {} exceeds {} byte packets; transmits will fail",
                schema.record_size(),
                MAX_PAYLOAD
            );
        }

        let mut log = store.open_next()?;
        store.write_header(&mut log, &schema)?;

        info!(
            "Recording session started: log {}, {} fields, {} byte records",
            log.id(),
            schema.len(),
            schema.record_size()
        );

        Ok(Self {
            record: RecordBuffer::new(Arc::clone(&schema)),
            schema,
            store,
            log,
            transport,
            flush_interval,
            last_flush: Instant::now(),
            unflushed: false,
            stats: SessionStats::default(),
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Record being assembled for the next commit
    pub fn record(&self) -> &RecordBuffer {
        &self.record
    }

    pub fn current_log_id(&self) -> u32 {
        self.log.id()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn set_value<K: FieldKey>(&mut self, key: K, values: &[f64]) -> Result<()> {
        self.record.set_value(key, values)
    }

    pub fn set_raw<K: FieldKey>(&mut self, key: K, bytes: &[u8]) -> Result<()> {
        self.record.set_raw(key, bytes)
    }

    /// Transmit then persist the current record
    ///
    /// The buffer is cleared once the record is persisted, and kept when
    /// persisting fails so the caller may retry.
    pub fn commit(&mut self) -> CommitReport {
        self.stats.commits += 1;
        let bytes = self.record.as_bytes();

        let transmit = self.transport.as_ref().map(|transport| transport.send(bytes));
        match &transmit {
            Some(Ok(())) => self.stats.records_transmitted += 1,
            Some(Err(e)) => {
                self.stats.transmit_failures += 1;
                warn!("Record transmit failed: {}", e);
            }
            None => {}
        }

        let persist = self.store.append_record(&self.log, bytes);
        match &persist {
            Ok(()) => {
                self.stats.records_persisted += 1;
                self.unflushed = true;
                self.record.clear();
            }
            Err(e) => {
                self.stats.persist_failures += 1;
                warn!("Record persist to log {} failed: {}", self.log.id(), e);
            }
        }

        CommitReport { transmit, persist }
    }

    /// Flush if records are pending and the flush interval has elapsed
    ///
    /// Returns whether a flush happened.
    pub fn maybe_flush(&mut self, now: Instant) -> Result<bool> {
        if !self.unflushed || now.saturating_duration_since(self.last_flush) < self.flush_interval {
            return Ok(false);
        }
        self.flush_at(now)?;
        Ok(true)
    }

    /// Flush pending records now
    pub fn flush(&mut self) -> Result<()> {
        self.flush_at(Instant::now())
    }

    fn flush_at(&mut self, now: Instant) -> Result<()> {
        self.store.flush(&self.log)?;
        self.last_flush = now;
        self.unflushed = false;
        self.stats.flushes += 1;
        debug!("Flushed log {}", self.log.id());
        Ok(())
    }

    /// Delete every log file and continue recording into a fresh one
    ///
    /// Returns the new log ID. Destructive; confirm with the operator first.
    ///
    /// # Errors
    ///
    /// On failure the session keeps no usable log, so every later commit
    /// reports a persist error until a rotation succeeds.
    pub fn rotate(&mut self) -> Result<u32> {
        let retired = self.log.without_header();
        let previous = std::mem::replace(&mut self.log, retired);
        self.log = self.store.rotate(Some(previous))?;
        self.store.write_header(&mut self.log, &self.schema)?;
        self.last_flush = Instant::now();
        self.unflushed = false;
        Ok(self.log.id())
    }

    /// Delete a finished log file, returning whether it existed
    ///
    /// # Errors
    ///
    /// Refuses to delete the log currently being written.
    pub fn delete(&mut self, id: u32) -> Result<bool> {
        if id == self.log.id() {
            return Err(TelemetryError::StorageFailure(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log {} is being recorded", id),
            )));
        }
        self.store.delete(id)
    }
}

impl<S: Storage> Drop for Session<S> {
    fn drop(&mut self) {
        if self.unflushed {
            if let Err(e) = self.flush() {
                warn!("Final flush of log {} failed: {}", self.log.id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::storage::mocks::MockStorage;
    use crate::logfile::DecodedLog;
    use crate::record::{FieldDef, FieldType};
    use crate::transport::link::MockLink;
    use crate::transport::MacAddress;
    use std::path::Path;
    use std::sync::Mutex;

    fn example_schema() -> Arc<Schema> {
        Arc::new(
            Schema::finalize(vec![
                FieldDef::new(FieldType::U32, "t", 1.0),
                FieldDef::new(FieldType::I16, "h", 10.0),
            ])
            .unwrap(),
        )
    }

    fn recording_link(sent: Arc<Mutex<Vec<Vec<u8>>>>) -> TransportQueue {
        let mut link = MockLink::new();
        link.expect_send().returning(move |_, payload| {
            sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        });
        TransportQueue::sender(Box::new(link), MacAddress::BROADCAST)
    }

    fn failing_link() -> TransportQueue {
        let mut link = MockLink::new();
        link.expect_send()
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::WouldBlock, "busy")));
        TransportQueue::sender(Box::new(link), MacAddress::BROADCAST)
    }

    fn start(storage: &MockStorage, transport: Option<TransportQueue>) -> Session<MockStorage> {
        let store = LogStore::new(storage.clone(), "/telem");
        Session::start(example_schema(), store, transport, DEFAULT_FLUSH_INTERVAL).unwrap()
    }

    fn log_bytes(storage: &MockStorage, id: u32) -> Vec<u8> {
        storage
            .file(&Path::new("/telem").join(format!("{:04}.bin", id)))
            .unwrap()
    }

    #[test]
    fn test_start_writes_header() {
        let storage = MockStorage::new();
        let session = start(&storage, None);
        assert_eq!(session.current_log_id(), 0);
        assert_eq!(log_bytes(&storage, 0).len(), 48);
    }

    #[test]
    fn test_commit_transmits_and_persists() {
        let storage = MockStorage::new();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut session = start(&storage, Some(recording_link(Arc::clone(&sent))));

        session.set_value("t", &[1000.0]).unwrap();
        session.set_value("h", &[12.3]).unwrap();
        let report = session.commit();
        assert!(report.is_complete());

        let expected = vec![0xE8, 0x03, 0x00, 0x00, 0x7B, 0x00];
        assert_eq!(*sent.lock().unwrap(), vec![expected.clone()]);
        assert_eq!(&log_bytes(&storage, 0)[48..], expected.as_slice());
        assert_eq!(session.record().as_bytes(), &[0; 6]);
    }

    #[test]
    fn test_transmit_failure_still_persists() {
        let storage = MockStorage::new();
        let mut session = start(&storage, Some(failing_link()));

        session.set_value("t", &[5.0]).unwrap();
        let report = session.commit();
        assert!(matches!(
            report.transmit,
            Some(Err(TelemetryError::TransportFailure(_)))
        ));
        assert!(report.persist.is_ok());
        assert!(!report.is_complete());
        assert_eq!(log_bytes(&storage, 0).len(), 48 + 6);

        let stats = session.stats();
        assert_eq!(stats.transmit_failures, 1);
        assert_eq!(stats.records_persisted, 1);
    }

    #[test]
    fn test_persist_failure_still_transmits() {
        let storage = MockStorage::new();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut session = start(&storage, Some(recording_link(Arc::clone(&sent))));

        storage.set_append_error(Some(io::ErrorKind::Other));
        session.set_value("t", &[7.0]).unwrap();
        let report = session.commit();

        assert!(matches!(report.transmit, Some(Ok(()))));
        assert!(matches!(
            report.persist,
            Err(TelemetryError::StorageFailure(_))
        ));
        assert_eq!(sent.lock().unwrap().len(), 1);
        // Kept for retry
        assert_eq!(session.record().get_value("t").unwrap(), 7.0);
        assert_eq!(log_bytes(&storage, 0).len(), 48);

        storage.set_append_error(None);
        assert!(session.commit().is_complete());
        assert_eq!(log_bytes(&storage, 0).len(), 48 + 6);
    }

    #[test]
    fn test_without_transport() {
        let storage = MockStorage::new();
        let mut session = start(&storage, None);
        let report = session.commit();
        assert!(report.transmit.is_none());
        assert!(report.is_complete());
    }

    #[test]
    fn test_flush_on_interval_only() {
        let storage = MockStorage::new();
        let mut session = start(&storage, None);
        let t0 = Instant::now();

        // Nothing pending
        assert!(!session.maybe_flush(t0 + Duration::from_secs(1)).unwrap());

        assert!(session.commit().is_complete());
        let t1 = session.last_flush + Duration::from_millis(100);
        assert!(!session.maybe_flush(t1).unwrap());

        let t2 = session.last_flush + DEFAULT_FLUSH_INTERVAL;
        assert!(session.maybe_flush(t2).unwrap());
        assert_eq!(storage.flush_count(), 1);

        // Flushed, nothing new committed
        assert!(!session.maybe_flush(t2 + DEFAULT_FLUSH_INTERVAL).unwrap());
        assert_eq!(session.stats().flushes, 1);
    }

    #[test]
    fn test_flush_error_surfaces() {
        let storage = MockStorage::new();
        let mut session = start(&storage, None);
        assert!(session.commit().is_complete());

        storage.set_flush_error(Some(io::ErrorKind::Other));
        assert!(matches!(
            session.flush(),
            Err(TelemetryError::StorageFailure(_))
        ));
        storage.set_flush_error(None);
    }

    #[test]
    fn test_rotate_continues_in_fresh_file() {
        let storage = MockStorage::new();
        let mut session = start(&storage, None);
        session.set_value("t", &[1.0]).unwrap();
        assert!(session.commit().is_complete());

        let id = session.rotate().unwrap();
        assert_eq!(id, 1);
        assert!(storage
            .file(Path::new("/telem/0000.bin"))
            .is_none());

        session.set_value("t", &[2.0]).unwrap();
        assert!(session.commit().is_complete());

        let bytes = log_bytes(&storage, 1);
        let log = DecodedLog::parse(&bytes).unwrap();
        assert_eq!(log.record_count(), 1);
        let record = log.records().next().unwrap();
        assert_eq!(log.schema().decode_value(record, "t").unwrap(), 2.0);
    }

    #[test]
    fn test_failed_rotate_refuses_commits_until_next_rotate() {
        let storage = MockStorage::new();
        let mut session = start(&storage, None);
        session.set_value("t", &[1.0]).unwrap();
        assert!(session.commit().is_complete());

        storage.set_append_error(Some(io::ErrorKind::Other));
        assert!(session.rotate().is_err());
        storage.set_append_error(None);

        session.set_value("t", &[2.0]).unwrap();
        let report = session.commit();
        assert!(report.persist.is_err());
        assert!(!report.is_complete());
        assert!(storage.file(Path::new("/telem/0000.bin")).is_none());
        assert_eq!(storage.file(Path::new("/telem/0001.bin")), Some(Vec::new()));

        assert_eq!(session.rotate().unwrap(), 2);
        session.set_value("t", &[3.0]).unwrap();
        assert!(session.commit().is_complete());

        let bytes = log_bytes(&storage, 2);
        let log = DecodedLog::parse(&bytes).unwrap();
        assert_eq!(log.record_count(), 1);
        let record = log.records().next().unwrap();
        assert_eq!(log.schema().decode_value(record, "t").unwrap(), 3.0);
    }

    #[test]
    fn test_delete() {
        let storage = MockStorage::new();
        storage.insert(Path::new("/telem/0004.bin"), &[0; 10]);
        let mut session = start(&storage, None);
        assert_eq!(session.current_log_id(), 5);

        assert!(session.delete(4).unwrap());
        assert!(!session.delete(4).unwrap());
        assert!(session.delete(5).is_err());
    }

    #[test]
    fn test_recorded_values_read_back() {
        let storage = MockStorage::new();
        let mut session = start(&storage, None);

        let samples: Vec<(f64, f64)> = (0..50)
            .map(|i| (i as f64 * 20.0, (i as f64 * 1.37) - 30.0))
            .collect();
        for &(t, h) in &samples {
            session.set_value("t", &[t]).unwrap();
            session.set_value("h", &[h]).unwrap();
            assert!(session.commit().is_complete());
        }
        drop(session);
        assert_eq!(storage.flush_count(), 1);

        let bytes = log_bytes(&storage, 0);
        let log = DecodedLog::parse(&bytes).unwrap();
        assert_eq!(log.record_count(), samples.len());
        for (record, &(t, h)) in log.records().zip(&samples) {
            assert_eq!(log.schema().decode_value(record, "t").unwrap(), t);
            assert!((log.schema().decode_value(record, "h").unwrap() - h).abs() <= 0.05 + 1e-9);
        }
    }
}
