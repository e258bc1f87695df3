//! Changeset selection
//!
//! Pulls deletions and other changes from a [`SyncSource`] and concatenates
//! them, deletions first. Nothing is filtered or re-stated here, and source
//! failures are returned as-is.

use tracing::debug;

use crate::error::SyncResult;
use crate::source::SyncSource;
use crate::types::{RemoteServer, SyncPoint, SyncRecord};

pub struct ChangesetSelector;

impl ChangesetSelector {
    /// Records journaled in the window `(from, to]`
    pub fn time_window<S: SyncSource + ?Sized>(
        source: &S,
        from: SyncPoint,
        to: SyncPoint,
    ) -> SyncResult<Vec<SyncRecord>> {
        let deleted = source.deleted_between(from, to)?;
        let changed = source.changed_between(from, to)?;
        debug!(
            %from,
            %to,
            deleted = deleted.len(),
            changed = changed.len(),
            "Selected time-window changeset"
        );
        Ok(merge(deleted, changed))
    }

    /// Records waiting to be sent to `server`.
    ///
    /// `max_records` bounds only the changed records; every pending deletion
    /// is included.
    pub fn state_based<S: SyncSource + ?Sized>(
        source: &S,
        server: &RemoteServer,
        max_records: Option<usize>,
    ) -> SyncResult<Vec<SyncRecord>> {
        let deleted = source.deleted()?;
        let changed = source.changed_for(server, max_records)?;
        debug!(
            server = %server.nickname,
            deleted = deleted.len(),
            changed = changed.len(),
            "Selected state-based changeset"
        );
        Ok(merge(deleted, changed))
    }

    /// Records waiting to be sent, without regard to a destination
    pub fn pending<S: SyncSource + ?Sized>(
        source: &S,
        max_records: Option<usize>,
    ) -> SyncResult<Vec<SyncRecord>> {
        let deleted = source.deleted()?;
        let changed = source.changed(max_records)?;
        Ok(merge(deleted, changed))
    }
}

fn merge(mut deleted: Vec<SyncRecord>, changed: Vec<SyncRecord>) -> Vec<SyncRecord> {
    deleted.extend(changed);
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryJournal;
    use crate::types::{ServerRole, SyncItem, SyncItemState};

    fn change(key: &str) -> SyncRecord {
        SyncRecord::new(vec![SyncItem::new(
            "org.openmrs.Patient",
            SyncItemState::Updated,
            key,
            "{}",
        )])
    }

    fn deletion(key: &str) -> SyncRecord {
        SyncRecord::new(vec![SyncItem::new(
            "org.openmrs.Patient",
            SyncItemState::Deleted,
            key,
            "{}",
        )])
    }

    #[test]
    fn test_deletions_come_first() {
        let journal = MemoryJournal::new();
        let c1 = journal.append(change("c1"));
        let d1 = journal.append(deletion("d1"));
        let c2 = journal.append(change("c2"));
        let d2 = journal.append(deletion("d2"));

        let server = RemoteServer::new("hq", ServerRole::Parent);
        let ids: Vec<_> = ChangesetSelector::state_based(&journal, &server, None)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec![d1, d2, c1, c2]);
    }

    #[test]
    fn test_max_records_bounds_only_changes() {
        let journal = MemoryJournal::new();
        for i in 0..3 {
            journal.append(deletion(&format!("d{}", i)));
        }
        for i in 0..5 {
            journal.append(change(&format!("c{}", i)));
        }

        let server = RemoteServer::new("hq", ServerRole::Parent);
        let changeset = ChangesetSelector::state_based(&journal, &server, Some(2)).unwrap();

        assert_eq!(changeset.len(), 5);
        assert_eq!(changeset.iter().filter(|r| r.is_deletion()).count(), 3);
    }

    #[test]
    fn test_time_window_is_half_open() {
        let journal = MemoryJournal::new();
        journal.append(change("before"));
        let from = journal.move_sync_point().unwrap();
        let inside = journal.append(change("inside"));
        let deleted = journal.append(deletion("gone"));
        let to = journal.move_sync_point().unwrap();
        journal.append(change("after"));

        let ids: Vec<_> = ChangesetSelector::time_window(&journal, from, to)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec![deleted, inside]);
    }

    #[test]
    fn test_pending_ignores_destination() {
        let journal = MemoryJournal::new();
        journal.append(change("c1"));
        journal.append(deletion("d1"));

        let changeset = ChangesetSelector::pending(&journal, None).unwrap();
        assert_eq!(changeset.len(), 2);
        assert!(changeset[0].is_deletion());
    }
}
