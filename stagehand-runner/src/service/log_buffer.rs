//! Log buffer service
//!
//! Collects log records in memory until the forwarder drains them to the
//! log channel. The buffer is bounded: when the log channel is down for a
//! while, new records are dropped instead of growing memory without limit.

use stagehand_core::domain::monitor::LogRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Service for managing log buffers
///
/// Writers add records from any thread (the tracing layer runs inside
/// whatever task logged); a single forwarder drains them.
pub trait LogBufferService: Send + Sync {
    /// Adds a log record to the buffer
    ///
    /// Never blocks on I/O and never fails; a full buffer drops the record.
    fn add_entry(&self, entry: LogRecord);

    /// Drains all buffered records, oldest first
    fn drain(&self) -> Vec<LogRecord>;
}

/// Bounded in-memory implementation of LogBufferService
#[derive(Clone)]
pub struct InMemoryLogBuffer {
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl InMemoryLogBuffer {
    /// Creates a buffer holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records dropped because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogRecord>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for InMemoryLogBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl LogBufferService for InMemoryLogBuffer {
    fn add_entry(&self, entry: LogRecord) {
        let mut buffer = self.lock();
        if buffer.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        buffer.push_back(entry);
    }

    fn drain(&self) -> Vec<LogRecord> {
        self.lock().drain(..).collect()
    }
}
