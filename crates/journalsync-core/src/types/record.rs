//! Sync records and items
//!
//! A [`SyncRecord`] is one unit of replicable change: an ordered list of
//! [`SyncItem`]s, each describing what happened to one entity, plus the
//! record's lifecycle state. Child-role destinations keep their own state for
//! a record in a [`ServerRecord`] override; [`StateLocation`] picks which of
//! the two a destination reads and writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::server::RemoteServer;
use super::{RecordId, ServerId, SyncItemState, SyncRecordState};

/// One entity-level change within a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Fully qualified entity type name (e.g. `org.openmrs.Patient`)
    pub contained_type: String,
    pub state: SyncItemState,
    /// Identity value of the entity, if it has one
    pub key: Option<String>,
    /// Serialized record document describing the entity's fields
    pub content: String,
}

impl SyncItem {
    pub fn new(
        contained_type: impl Into<String>,
        state: SyncItemState,
        key: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            contained_type: contained_type.into(),
            state,
            key: Some(key.into()),
            content: content.into(),
        }
    }

    /// Create an item whose entity has no identity value
    pub fn without_key(
        contained_type: impl Into<String>,
        state: SyncItemState,
        content: impl Into<String>,
    ) -> Self {
        Self {
            contained_type: contained_type.into(),
            state,
            key: None,
            content: content.into(),
        }
    }
}

/// Per-destination state of a record, used for child-role servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub server_id: ServerId,
    pub state: SyncRecordState,
    #[serde(default)]
    pub retry_count: u32,
}

impl ServerRecord {
    pub fn new(server_id: ServerId, state: SyncRecordState) -> Self {
        Self {
            server_id,
            state,
            retry_count: 0,
        }
    }
}

/// One unit of replicable local change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: RecordId,
    /// Unix timestamp of the local change
    pub timestamp: i64,
    pub state: SyncRecordState,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub items: Vec<SyncItem>,
    #[serde(default)]
    pub server_records: Vec<ServerRecord>,
}

impl SyncRecord {
    /// Create a new record in the `NEW` state
    pub fn new(items: Vec<SyncItem>) -> Self {
        Self {
            id: RecordId::new(),
            timestamp: chrono::Utc::now().timestamp(),
            state: SyncRecordState::New,
            retry_count: 0,
            items,
            server_records: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: SyncRecordState) -> Self {
        self.state = state;
        self
    }

    pub fn with_server_state(mut self, server_id: ServerId, state: SyncRecordState) -> Self {
        self.server_record_or_insert(&server_id).state = state;
        self
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Entity type names of every item in the record
    pub fn contained_types(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .map(|item| item.contained_type.clone())
            .collect()
    }

    /// A record is a deletion when it has items and every item deletes its
    /// entity.
    pub fn is_deletion(&self) -> bool {
        self.has_items()
            && self
                .items
                .iter()
                .all(|item| item.state == SyncItemState::Deleted)
    }

    /// Whether a journal should offer this record as a pending deletion
    pub fn is_pending_deletion(&self) -> bool {
        self.is_deletion() && self.state.is_outgoing()
    }

    /// Whether a journal should offer this record as a pending change, judged
    /// by the state at `location`
    pub fn is_pending_change(&self, location: &StateLocation) -> bool {
        !self.is_deletion() && location.state_of(self).is_outgoing()
    }

    pub fn server_record(&self, server_id: &ServerId) -> Option<&ServerRecord> {
        self.server_records
            .iter()
            .find(|sr| &sr.server_id == server_id)
    }

    /// Get the override for `server_id`, inserting one that mirrors the
    /// record-level state if none exists yet.
    pub fn server_record_or_insert(&mut self, server_id: &ServerId) -> &mut ServerRecord {
        let index = match self
            .server_records
            .iter()
            .position(|sr| &sr.server_id == server_id)
        {
            Some(index) => index,
            None => {
                self.server_records
                    .push(ServerRecord::new(*server_id, self.state));
                self.server_records.len() - 1
            }
        };
        &mut self.server_records[index]
    }
}

/// Where a destination's view of a record's state is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateLocation {
    /// The record-level state (parent-role destinations)
    Record,
    /// The record's per-server override (child-role destinations)
    ServerRecord(ServerId),
}

impl StateLocation {
    pub fn for_server(server: &RemoteServer) -> Self {
        if server.is_parent() {
            StateLocation::Record
        } else {
            StateLocation::ServerRecord(server.id)
        }
    }

    /// Read the state at this location.
    ///
    /// A missing override reads as the record-level state.
    pub fn state_of(&self, record: &SyncRecord) -> SyncRecordState {
        match self {
            StateLocation::Record => record.state,
            StateLocation::ServerRecord(server_id) => record
                .server_record(server_id)
                .map(|sr| sr.state)
                .unwrap_or(record.state),
        }
    }

    /// Write the state at this location.
    ///
    /// A child-role destination without an override gets one, seeded from
    /// the record-level state, so the record-level state is never touched on
    /// its behalf.
    pub fn set_state(&self, record: &mut SyncRecord, state: SyncRecordState) {
        match self {
            StateLocation::Record => record.state = state,
            StateLocation::ServerRecord(server_id) => {
                record.server_record_or_insert(server_id).state = state
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::server::ServerRole;

    fn item(state: SyncItemState) -> SyncItem {
        SyncItem::new("org.openmrs.Obs", state, "obs-1", "{}")
    }

    #[test]
    fn test_new_record_is_new() {
        let record = SyncRecord::new(vec![item(SyncItemState::New)]);
        assert_eq!(record.state, SyncRecordState::New);
        assert!(record.has_items());
        assert!(record.server_records.is_empty());
    }

    #[test]
    fn test_contained_types_are_deduplicated() {
        let record = SyncRecord::new(vec![
            SyncItem::new("org.openmrs.Obs", SyncItemState::New, "a", "{}"),
            SyncItem::new("org.openmrs.Obs", SyncItemState::New, "b", "{}"),
            SyncItem::new("org.openmrs.Encounter", SyncItemState::Updated, "c", "{}"),
        ]);
        let types: Vec<_> = record.contained_types().into_iter().collect();
        assert_eq!(types, vec!["org.openmrs.Encounter", "org.openmrs.Obs"]);
    }

    #[test]
    fn test_is_deletion() {
        assert!(SyncRecord::new(vec![item(SyncItemState::Deleted)]).is_deletion());
        assert!(!SyncRecord::new(vec![
            item(SyncItemState::Deleted),
            item(SyncItemState::Updated)
        ])
        .is_deletion());
        assert!(!SyncRecord::new(vec![]).is_deletion());
    }

    #[test]
    fn test_parent_location_uses_record_state() {
        let server = RemoteServer::new("hq", ServerRole::Parent);
        let location = StateLocation::for_server(&server);
        let mut record = SyncRecord::new(vec![item(SyncItemState::New)]);

        location.set_state(&mut record, SyncRecordState::NotSupposedToSync);

        assert_eq!(record.state, SyncRecordState::NotSupposedToSync);
        assert!(record.server_records.is_empty());
        assert_eq!(location.state_of(&record), SyncRecordState::NotSupposedToSync);
    }

    #[test]
    fn test_child_location_uses_override() {
        let server = RemoteServer::new("clinic", ServerRole::Child);
        let location = StateLocation::for_server(&server);
        let mut record = SyncRecord::new(vec![item(SyncItemState::New)]);

        // No override yet: falls back to record state
        assert_eq!(location.state_of(&record), SyncRecordState::New);

        location.set_state(&mut record, SyncRecordState::DependsOnFailedAndStopped);

        assert_eq!(record.state, SyncRecordState::New);
        assert_eq!(
            location.state_of(&record),
            SyncRecordState::DependsOnFailedAndStopped
        );
        assert_eq!(record.server_records.len(), 1);
    }

    #[test]
    fn test_server_record_or_insert_is_idempotent() {
        let server_id = ServerId::new();
        let mut record = SyncRecord::new(vec![]).with_state(SyncRecordState::Sent);

        record.server_record_or_insert(&server_id).state = SyncRecordState::Failed;
        let sr = record.server_record_or_insert(&server_id);

        assert_eq!(sr.state, SyncRecordState::Failed);
        assert_eq!(record.server_records.len(), 1);
    }
}
