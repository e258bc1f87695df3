//! Record storage
//!
//! - **Primary table**: `records` - keyed by journal position
//! - **Secondary index**: `record_index` - maps record id → position

use crate::error::{SyncError, SyncResult};
use crate::source::RecordStore;
use crate::types::{RecordId, StateLocation, SyncPoint, SyncRecord, SyncRecordState};
use redb::{ReadableTable, ReadableTableMetadata, TableDefinition};

use super::Journal;

/// Records by position (value: postcard-encoded SyncRecord)
pub(crate) const RECORDS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// Index for record id → position lookup
pub(crate) const RECORD_INDEX: TableDefinition<&str, u64> = TableDefinition::new("record_index");

fn encode(record: &SyncRecord) -> SyncResult<Vec<u8>> {
    postcard::to_allocvec(record).map_err(|e| SyncError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> SyncResult<SyncRecord> {
    postcard::from_bytes(bytes).map_err(|e| SyncError::Serialization(e.to_string()))
}

impl Journal {
    // ═══════════════════════════════════════════════════════════════════════
    // Record Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Append a record at the next journal position.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidOperation` if a record with the same id is
    /// already journaled.
    pub fn append(&self, record: &SyncRecord) -> SyncResult<SyncPoint> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let position = {
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let mut index = write_txn.open_table(RECORD_INDEX)?;

            let key = record.id.to_string_repr();
            if index.get(key.as_str())?.is_some() {
                return Err(SyncError::InvalidOperation(format!(
                    "record {} is already journaled",
                    record.id
                )));
            }

            let position = records
                .last()?
                .map(|(k, _)| SyncPoint(k.value()))
                .unwrap_or(SyncPoint::ORIGIN)
                .next();

            let data = encode(record)?;
            records.insert(position.value(), data.as_slice())?;
            index.insert(key.as_str(), position.value())?;
            position
        };
        write_txn.commit()?;

        tracing::debug!(record_id = %record.id, position = %position, "Appended record");
        Ok(position)
    }

    fn position_of(&self, id: &RecordId) -> SyncResult<Option<u64>> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let index = read_txn.open_table(RECORD_INDEX)?;

        let key = id.to_string_repr();
        Ok(index.get(key.as_str())?.map(|v| v.value()))
    }

    /// Load a record by id
    ///
    /// Returns `None` if no record with the given id exists.
    pub fn get_record(&self, id: &RecordId) -> SyncResult<Option<SyncRecord>> {
        let Some(position) = self.position_of(id)? else {
            return Ok(None);
        };

        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        match table.get(position)? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// All records with their positions, in journal order
    pub fn list_records(&self) -> SyncResult<Vec<(SyncPoint, SyncRecord)>> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            records.push((SyncPoint(key.value()), decode(value.value())?));
        }
        Ok(records)
    }

    pub fn record_count(&self) -> SyncResult<u64> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;
        Ok(table.len()?)
    }

    /// Overwrite the state at `location` for a journaled record.
    ///
    /// Used by operators to resolve or re-arm records by hand.
    pub fn set_record_state(
        &self,
        id: &RecordId,
        location: StateLocation,
        state: SyncRecordState,
    ) -> SyncResult<SyncRecord> {
        let mut record = self
            .get_record(id)?
            .ok_or_else(|| SyncError::RecordNotFound(id.to_string()))?;
        location.set_state(&mut record, state);
        self.update_record(&record)?;
        Ok(record)
    }
}

impl RecordStore for Journal {
    fn update_record(&self, record: &SyncRecord) -> SyncResult<()> {
        let position = self
            .position_of(&record.id)?
            .ok_or_else(|| SyncError::RecordNotFound(record.id.to_string()))?;

        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(RECORDS_TABLE)?;
            let data = encode(record)?;
            table.insert(position, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServerId, SyncItem, SyncItemState};
    use tempfile::TempDir;

    fn create_test_journal() -> (Journal, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let journal = Journal::open(temp_dir.path().join("journal.redb")).unwrap();
        (journal, temp_dir)
    }

    fn patient(key: &str) -> SyncRecord {
        SyncRecord::new(vec![SyncItem::new(
            "org.openmrs.Patient",
            SyncItemState::New,
            key,
            r#"{"name":"org.openmrs.Patient"}"#,
        )])
    }

    #[test]
    fn test_append_assigns_sequential_positions() {
        let (journal, _temp) = create_test_journal();

        assert_eq!(journal.append(&patient("u1")).unwrap(), SyncPoint(1));
        assert_eq!(journal.append(&patient("u2")).unwrap(), SyncPoint(2));
        assert_eq!(journal.record_count().unwrap(), 2);
    }

    #[test]
    fn test_append_rejects_duplicate_id() {
        let (journal, _temp) = create_test_journal();
        let record = patient("u1");

        journal.append(&record).unwrap();
        assert!(matches!(
            journal.append(&record),
            Err(SyncError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_get_record() {
        let (journal, _temp) = create_test_journal();
        let record = patient("u1");
        journal.append(&record).unwrap();

        assert_eq!(journal.get_record(&record.id).unwrap(), Some(record));
        assert!(journal.get_record(&RecordId::new()).unwrap().is_none());
    }

    #[test]
    fn test_update_keeps_position() {
        let (journal, _temp) = create_test_journal();
        let first = patient("u1");
        let second = patient("u2");
        journal.append(&first).unwrap();
        journal.append(&second).unwrap();

        let updated = first.clone().with_state(SyncRecordState::Sent);
        journal.update_record(&updated).unwrap();

        let records = journal.list_records().unwrap();
        assert_eq!(records[0], (SyncPoint(1), updated));
        assert_eq!(records[1].1.id, second.id);
    }

    #[test]
    fn test_update_unknown_record_fails() {
        let (journal, _temp) = create_test_journal();
        assert!(matches!(
            journal.update_record(&patient("u1")),
            Err(SyncError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_set_record_state_on_server_override() {
        let (journal, _temp) = create_test_journal();
        let record = patient("u1");
        journal.append(&record).unwrap();
        let server_id = ServerId::new();

        journal
            .set_record_state(
                &record.id,
                StateLocation::ServerRecord(server_id),
                SyncRecordState::FailedAndStopped,
            )
            .unwrap();

        let loaded = journal.get_record(&record.id).unwrap().unwrap();
        assert_eq!(loaded.state, SyncRecordState::New);
        assert_eq!(
            loaded.server_record(&server_id).map(|sr| sr.state),
            Some(SyncRecordState::FailedAndStopped)
        );
    }
}
