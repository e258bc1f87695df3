//! Persistent journal using redb.
//!
//! This module provides ACID-compliant storage for:
//! - Sync records, keyed by their journal position
//! - The journal's identity and last committed sync point
//! - Remote servers and their send policies
//! - Failure notices raised by selection passes
//!
//! Record positions are assigned at append time and never reused, so a
//! position doubles as the journal's [`SyncPoint`].

use crate::error::{SyncError, SyncResult};
use crate::source::SyncSource;
use crate::types::{RemoteServer, SourceId, StateLocation, SyncPoint, SyncRecord};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

mod notices;
mod records;
mod servers;

use notices::NOTICES_TABLE;
use records::{RECORDS_TABLE, RECORD_INDEX};
use servers::SERVERS_TABLE;

/// Journal-wide values (source id, last sync point)
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const SOURCE_ID_KEY: &str = "source_id";
const LAST_SYNC_POINT_KEY: &str = "last_sync_point";

/// Journal backed by a redb database file
#[derive(Clone)]
pub struct Journal {
    db: Arc<RwLock<Database>>,
    source_id: SourceId,
}

impl Journal {
    /// Open the journal at `path`, creating it if needed.
    ///
    /// This will:
    /// - Create the parent directory if it doesn't exist
    /// - Create all required tables
    /// - Assign the journal a source id on first open
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        let source_id = {
            let _ = write_txn.open_table(RECORDS_TABLE)?;
            let _ = write_txn.open_table(RECORD_INDEX)?;
            let _ = write_txn.open_table(SERVERS_TABLE)?;
            let _ = write_txn.open_table(NOTICES_TABLE)?;
            let mut meta = write_txn.open_table(META_TABLE)?;

            let existing = match meta.get(SOURCE_ID_KEY)? {
                Some(v) => Some(decode_source_id(v.value())?),
                None => None,
            };
            match existing {
                Some(id) => id,
                None => {
                    let id = SourceId::new();
                    meta.insert(SOURCE_ID_KEY, id.to_string_repr().as_bytes())?;
                    id
                }
            }
        };
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), source = %source_id, "Opened journal");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            source_id,
        })
    }

    /// Get a reference to the shared database handle
    pub fn db_handle(&self) -> Arc<RwLock<Database>> {
        self.db.clone()
    }

    /// Position of the most recently appended record
    pub fn head(&self) -> SyncResult<SyncPoint> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        let head = table
            .last()?
            .map(|(k, _)| SyncPoint(k.value()))
            .unwrap_or(SyncPoint::ORIGIN);
        Ok(head)
    }

    /// Scan records in journal order, keeping those accepted by `filter`
    fn scan(
        &self,
        filter: impl Fn(SyncPoint, &SyncRecord) -> bool,
        max: Option<usize>,
    ) -> SyncResult<Vec<SyncRecord>> {
        let limit = max.unwrap_or(usize::MAX);
        let mut selected = Vec::new();
        for (position, record) in self.list_records()? {
            if selected.len() >= limit {
                break;
            }
            if filter(position, &record) {
                selected.push(record);
            }
        }
        Ok(selected)
    }
}

fn decode_source_id(bytes: &[u8]) -> SyncResult<SourceId> {
    let s = std::str::from_utf8(bytes)
        .map_err(|e| SyncError::Storage(format!("Invalid source id: {}", e)))?;
    SourceId::from_string(s).map_err(|e| SyncError::Storage(format!("Invalid source id: {}", e)))
}

impl SyncSource for Journal {
    fn source_id(&self) -> SyncResult<SourceId> {
        Ok(self.source_id)
    }

    fn last_sync_point(&self) -> SyncResult<SyncPoint> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;

        match table.get(LAST_SYNC_POINT_KEY)? {
            Some(v) => {
                let bytes: [u8; 8] = v.value().try_into().map_err(|_| {
                    SyncError::Storage("Invalid last sync point encoding".to_string())
                })?;
                Ok(SyncPoint(u64::from_be_bytes(bytes)))
            }
            None => Ok(SyncPoint::ORIGIN),
        }
    }

    fn move_sync_point(&self) -> SyncResult<SyncPoint> {
        self.head()
    }

    fn set_last_sync_point(&self, point: SyncPoint) -> SyncResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(META_TABLE)?;
            table.insert(LAST_SYNC_POINT_KEY, point.value().to_be_bytes().as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(point = %point, "Committed last sync point");
        Ok(())
    }

    fn deleted_between(&self, from: SyncPoint, to: SyncPoint) -> SyncResult<Vec<SyncRecord>> {
        self.scan(
            |position, record| {
                SyncPoint::window_contains(from, to, position) && record.is_deletion()
            },
            None,
        )
    }

    fn changed_between(&self, from: SyncPoint, to: SyncPoint) -> SyncResult<Vec<SyncRecord>> {
        self.scan(
            |position, record| {
                SyncPoint::window_contains(from, to, position) && !record.is_deletion()
            },
            None,
        )
    }

    fn deleted(&self) -> SyncResult<Vec<SyncRecord>> {
        self.scan(|_, record| record.is_pending_deletion(), None)
    }

    fn changed(&self, max_records: Option<usize>) -> SyncResult<Vec<SyncRecord>> {
        self.scan(
            |_, record| record.is_pending_change(&StateLocation::Record),
            max_records,
        )
    }

    fn changed_for(
        &self,
        server: &RemoteServer,
        max_records: Option<usize>,
    ) -> SyncResult<Vec<SyncRecord>> {
        let location = StateLocation::for_server(server);
        self.scan(|_, record| record.is_pending_change(&location), max_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SyncItem, SyncItemState, SyncRecordState};
    use tempfile::TempDir;

    fn create_test_journal() -> (Journal, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let journal = Journal::open(temp_dir.path().join("journal.redb")).unwrap();
        (journal, temp_dir)
    }

    fn record(state: SyncItemState) -> SyncRecord {
        SyncRecord::new(vec![SyncItem::new("org.openmrs.Obs", state, "o1", "{}")])
    }

    #[test]
    fn test_journal_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/path/journal.redb");
        assert!(Journal::open(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_source_id_is_stable_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.redb");

        let first = Journal::open(&path).unwrap().source_id().unwrap();
        let second = Journal::open(&path).unwrap().source_id().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sync_point_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.redb");

        {
            let journal = Journal::open(&path).unwrap();
            assert_eq!(journal.last_sync_point().unwrap(), SyncPoint::ORIGIN);
            journal.set_last_sync_point(SyncPoint(7)).unwrap();
        }

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.last_sync_point().unwrap(), SyncPoint(7));
    }

    #[test]
    fn test_window_is_exclusive_of_from() {
        let (journal, _temp) = create_test_journal();
        journal.append(&record(SyncItemState::New)).unwrap();
        journal.append(&record(SyncItemState::Deleted)).unwrap();
        journal.append(&record(SyncItemState::Updated)).unwrap();

        let head = journal.move_sync_point().unwrap();
        assert_eq!(head, SyncPoint(3));

        assert_eq!(journal.changed_between(SyncPoint(1), head).unwrap().len(), 1);
        assert_eq!(journal.deleted_between(SyncPoint(1), head).unwrap().len(), 1);
        assert!(journal.changed_between(head, head).unwrap().is_empty());
    }

    #[test]
    fn test_changed_respects_limit_and_state() {
        let (journal, _temp) = create_test_journal();
        journal
            .append(&record(SyncItemState::New).with_state(SyncRecordState::Committed))
            .unwrap();
        for _ in 0..3 {
            journal.append(&record(SyncItemState::New)).unwrap();
        }

        assert_eq!(journal.changed(None).unwrap().len(), 3);
        assert_eq!(journal.changed(Some(2)).unwrap().len(), 2);
    }
}
