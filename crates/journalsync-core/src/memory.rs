//! In-memory journal
//!
//! Implements the same contract as the redb [`Journal`](crate::Journal)
//! without persistence. Useful for tests and for embedding the strategy in a
//! process that keeps its own durable store.

use parking_lot::RwLock;

use crate::error::{SyncError, SyncResult};
use crate::source::{FailureNotifier, RecordStore, SyncSource};
use crate::types::{
    FailureNotice, FailureReason, RecordId, RemoteServer, SourceId, StateLocation, SyncPoint,
    SyncRecord, SyncRecordState,
};

struct Inner {
    source_id: SourceId,
    /// Records with the journal position they were appended at
    entries: Vec<(SyncPoint, SyncRecord)>,
    head: SyncPoint,
    last_sync: SyncPoint,
    notices: Vec<FailureNotice>,
    updates: usize,
}

pub struct MemoryJournal {
    inner: RwLock<Inner>,
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                source_id: SourceId::new(),
                entries: Vec::new(),
                head: SyncPoint::ORIGIN,
                last_sync: SyncPoint::ORIGIN,
                notices: Vec::new(),
                updates: 0,
            }),
        }
    }

    /// Journal a record at the next position
    pub fn append(&self, record: SyncRecord) -> RecordId {
        let mut inner = self.inner.write();
        let position = inner.head.next();
        inner.head = position;
        let id = record.id;
        inner.entries.push((position, record));
        id
    }

    pub fn record(&self, id: &RecordId) -> Option<SyncRecord> {
        self.inner
            .read()
            .entries
            .iter()
            .find(|(_, r)| &r.id == id)
            .map(|(_, r)| r.clone())
    }

    /// All records in journal order
    pub fn records(&self) -> Vec<SyncRecord> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Overwrite a record's record-level state
    pub fn set_state(&self, id: &RecordId, state: SyncRecordState) -> SyncResult<()> {
        let mut inner = self.inner.write();
        let (_, record) = inner
            .entries
            .iter_mut()
            .find(|(_, r)| &r.id == id)
            .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))?;
        record.state = state;
        Ok(())
    }

    pub fn notices(&self) -> Vec<FailureNotice> {
        self.inner.read().notices.clone()
    }

    /// Number of successful [`RecordStore::update_record`] calls
    pub fn update_count(&self) -> usize {
        self.inner.read().updates
    }

    fn select(
        &self,
        filter: impl Fn(SyncPoint, &SyncRecord) -> bool,
        max: Option<usize>,
    ) -> Vec<SyncRecord> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|(position, record)| filter(*position, record))
            .take(max.unwrap_or(usize::MAX))
            .map(|(_, record)| record.clone())
            .collect()
    }
}

impl SyncSource for MemoryJournal {
    fn source_id(&self) -> SyncResult<SourceId> {
        Ok(self.inner.read().source_id)
    }

    fn last_sync_point(&self) -> SyncResult<SyncPoint> {
        Ok(self.inner.read().last_sync)
    }

    fn move_sync_point(&self) -> SyncResult<SyncPoint> {
        Ok(self.inner.read().head)
    }

    fn set_last_sync_point(&self, point: SyncPoint) -> SyncResult<()> {
        self.inner.write().last_sync = point;
        Ok(())
    }

    fn deleted_between(&self, from: SyncPoint, to: SyncPoint) -> SyncResult<Vec<SyncRecord>> {
        Ok(self.select(
            |position, record| {
                SyncPoint::window_contains(from, to, position) && record.is_deletion()
            },
            None,
        ))
    }

    fn changed_between(&self, from: SyncPoint, to: SyncPoint) -> SyncResult<Vec<SyncRecord>> {
        Ok(self.select(
            |position, record| {
                SyncPoint::window_contains(from, to, position) && !record.is_deletion()
            },
            None,
        ))
    }

    fn deleted(&self) -> SyncResult<Vec<SyncRecord>> {
        Ok(self.select(|_, record| record.is_pending_deletion(), None))
    }

    fn changed(&self, max_records: Option<usize>) -> SyncResult<Vec<SyncRecord>> {
        Ok(self.select(
            |_, record| record.is_pending_change(&StateLocation::Record),
            max_records,
        ))
    }

    fn changed_for(
        &self,
        server: &RemoteServer,
        max_records: Option<usize>,
    ) -> SyncResult<Vec<SyncRecord>> {
        let location = StateLocation::for_server(server);
        Ok(self.select(|_, record| record.is_pending_change(&location), max_records))
    }
}

impl RecordStore for MemoryJournal {
    fn update_record(&self, record: &SyncRecord) -> SyncResult<()> {
        let mut inner = self.inner.write();
        let (_, stored) = inner
            .entries
            .iter_mut()
            .find(|(_, r)| r.id == record.id)
            .ok_or_else(|| SyncError::RecordNotFound(record.id.to_string()))?;
        *stored = record.clone();
        inner.updates += 1;
        Ok(())
    }
}

impl FailureNotifier for MemoryJournal {
    fn send_failure_notice(
        &self,
        record: &SyncRecord,
        server: &RemoteServer,
        reason: &FailureReason,
    ) {
        self.inner
            .write()
            .notices
            .push(FailureNotice::new(record, server, reason.clone()));
    }
}
