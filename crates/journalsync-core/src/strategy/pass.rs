//! Classification of one changeset for one destination
//!
//! A [`SelectionPass`] walks the changeset front to back, single-threaded.
//! The order matters: a record can only be held back by failed-and-stopped
//! records that came before it in the same pass.

use serde::Serialize;
use tracing::{debug, warn};

use crate::document::EntityNamespace;
use crate::types::{RemoteServer, StateLocation, SyncRecord, SyncRecordState};

use super::dependency::DependencyTracker;

/// Outcome of classifying one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Goes into the transmission unchanged
    Include,
    /// Failed-and-stopped; excluded and indexed as a dependency anchor
    Stopped,
    /// Rejected by the destination's send policy; re-stated
    NotSupposedToSync,
    /// Already marked as depending on a failed-and-stopped record
    AlreadyDependent,
    /// References an entity of an earlier failed-and-stopped record; re-stated
    DependsOnStopped,
}

impl Decision {
    pub fn is_included(&self) -> bool {
        matches!(self, Decision::Include)
    }

    /// Whether the record's destination-scoped state was changed and must be
    /// persisted
    pub fn restates(&self) -> bool {
        matches!(self, Decision::NotSupposedToSync | Decision::DependsOnStopped)
    }
}

/// Per-decision counts for a finished pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub included: usize,
    pub stopped: usize,
    pub not_supposed_to_sync: usize,
    pub already_dependent: usize,
    pub depends_on_stopped: usize,
}

impl PassSummary {
    fn tally(&mut self, decision: Decision) {
        match decision {
            Decision::Include => self.included += 1,
            Decision::Stopped => self.stopped += 1,
            Decision::NotSupposedToSync => self.not_supposed_to_sync += 1,
            Decision::AlreadyDependent => self.already_dependent += 1,
            Decision::DependsOnStopped => self.depends_on_stopped += 1,
        }
    }

    pub fn excluded(&self) -> usize {
        self.stopped + self.not_supposed_to_sync + self.already_dependent + self.depends_on_stopped
    }

    pub fn total(&self) -> usize {
        self.included + self.excluded()
    }
}

/// State of one selection pass against one destination
pub struct SelectionPass<'a> {
    server: &'a RemoteServer,
    location: StateLocation,
    tracker: DependencyTracker,
    first_stopped: Option<SyncRecord>,
    summary: PassSummary,
}

impl<'a> SelectionPass<'a> {
    pub fn new(server: &'a RemoteServer, namespace: EntityNamespace) -> Self {
        Self {
            server,
            location: StateLocation::for_server(server),
            tracker: DependencyTracker::new(namespace),
            first_stopped: None,
            summary: PassSummary::default(),
        }
    }

    /// Classify the next record of the changeset.
    ///
    /// Re-stated records have their destination-scoped state updated in
    /// place; persisting them is the caller's job.
    pub fn classify(&mut self, record: &mut SyncRecord) -> Decision {
        let state = self.location.state_of(record);

        let decision = if state == SyncRecordState::FailedAndStopped {
            self.tracker.record(record);
            if self.first_stopped.is_none() {
                self.first_stopped = Some(record.clone());
            }
            Decision::Stopped
        } else if !self.server.should_send(record) {
            self.location
                .set_state(record, SyncRecordState::NotSupposedToSync);
            warn!(
                record_id = %record.id,
                server = %self.server.nickname,
                types = ?record.contained_types(),
                "Not adding record to transmission, server does not accept all contained types"
            );
            Decision::NotSupposedToSync
        } else if state == SyncRecordState::DependsOnFailedAndStopped {
            Decision::AlreadyDependent
        } else if self.first_stopped.is_some() && self.tracker.depends_on_stopped(record) {
            self.location
                .set_state(record, SyncRecordState::DependsOnFailedAndStopped);
            warn!(
                record_id = %record.id,
                server = %self.server.nickname,
                "Not adding record to transmission, it depends on a failed-and-stopped record"
            );
            Decision::DependsOnStopped
        } else {
            Decision::Include
        };

        debug!(record_id = %record.id, ?decision, "Classified record");
        self.summary.tally(decision);
        decision
    }

    /// The first failed-and-stopped record seen in this pass
    pub fn first_stopped(&self) -> Option<&SyncRecord> {
        self.first_stopped.as_ref()
    }

    pub fn summary(&self) -> PassSummary {
        self.summary
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    pub fn location(&self) -> StateLocation {
        self.location
    }
}
