//! Failure notice storage
//!
//! Notices are append-only. The journal acts as its own
//! [`FailureNotifier`]: a notice is persisted here and logged, and operators
//! read them back with [`Journal::list_notices`].

use crate::error::{SyncError, SyncResult};
use crate::source::FailureNotifier;
use crate::types::{FailureNotice, FailureReason, RemoteServer, SyncRecord};
use redb::{ReadableTable, TableDefinition};
use tracing::{error, warn};

use super::Journal;

/// Table for failure notices (key: sequence number, value: JSON FailureNotice)
pub(crate) const NOTICES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("notices");

impl Journal {
    pub fn save_notice(&self, notice: &FailureNotice) -> SyncResult<()> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(NOTICES_TABLE)?;
            let next = table.last()?.map(|(k, _)| k.value() + 1).unwrap_or(1);
            let data =
                serde_json::to_vec(notice).map_err(|e| SyncError::Serialization(e.to_string()))?;
            table.insert(next, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All notices, oldest first
    pub fn list_notices(&self) -> SyncResult<Vec<FailureNotice>> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(NOTICES_TABLE)?;

        let mut notices = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let notice: FailureNotice = serde_json::from_slice(value.value())
                .map_err(|e| SyncError::Serialization(e.to_string()))?;
            notices.push(notice);
        }
        Ok(notices)
    }
}

impl FailureNotifier for Journal {
    fn send_failure_notice(
        &self,
        record: &SyncRecord,
        server: &RemoteServer,
        reason: &FailureReason,
    ) {
        error!(
            record_id = %record.id,
            server = %server.nickname,
            reason = %reason,
            "Record failed and stopped"
        );
        let notice = FailureNotice::new(record, server, reason.clone());
        if let Err(e) = self.save_notice(&notice) {
            warn!(record_id = %record.id, error = %e, "Failed to persist failure notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServerRole, SyncItem, SyncItemState};
    use tempfile::TempDir;

    #[test]
    fn test_notices_are_appended_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let journal = Journal::open(temp_dir.path().join("journal.redb")).unwrap();
        let server = RemoteServer::new("hq", ServerRole::Parent);
        let first = SyncRecord::new(vec![SyncItem::new(
            "org.openmrs.Patient",
            SyncItemState::New,
            "u1",
            "{}",
        )]);
        let second = SyncRecord::new(vec![]);

        journal.send_failure_notice(&first, &server, &FailureReason::MaxRetryCountReached);
        journal.send_failure_notice(&second, &server, &FailureReason::MaxRetryCountReached);

        let notices = journal.list_notices().unwrap();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].record_id, first.id);
        assert_eq!(notices[1].record_id, second.id);
        assert_eq!(notices[0].server_id, server.id);
    }
}
