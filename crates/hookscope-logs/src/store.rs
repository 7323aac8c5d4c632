use std::sync::Arc;

use parking_lot::RwLock;

use hookscope_types::{ArcLogRecord, LogRecord};

/// Ordered record sequence shared between the session and its readers.
///
/// Clones share storage; Arc clones of the records themselves keep reads
/// cheap. The sequence only ever grows or is wholesale cleared, and the
/// session is the single writer.
#[derive(Clone, Default)]
pub struct LogStore {
    records: Arc<RwLock<Vec<ArcLogRecord>>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning the shared handle that was stored
    pub fn append(&self, record: LogRecord) -> ArcLogRecord {
        let record = Arc::new(record);
        self.records.write().push(Arc::clone(&record));
        record
    }

    /// Snapshot of the full sequence in arrival order
    pub fn all(&self) -> Vec<ArcLogRecord> {
        self.records.read().iter().cloned().collect()
    }

    /// Capture timestamp of the most recent record
    pub fn last_timestamp(&self) -> Option<i64> {
        self.records.read().last().map(|record| record.timestamp)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record
    pub fn clear(&self) {
        self.records.write().clear();
    }
}
