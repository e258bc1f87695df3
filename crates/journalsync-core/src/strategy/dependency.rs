//! Tracking of entities created by failed-and-stopped records
//!
//! When a record is failed-and-stopped, every entity it created never reaches
//! the destination. Any later record that references one of those entities
//! would fail on the destination too, so it is held back.
//!
//! The tracker is an index `entity type -> identities` filled from the
//! failed-and-stopped records seen so far in one selection pass. It is owned
//! by that pass and starts empty; nothing carries over between passes.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error};

use crate::document::{EntityNamespace, RecordDocument};
use crate::types::{SyncItemState, SyncRecord};

#[derive(Debug, Clone, Default)]
pub struct DependencyTracker {
    namespace: EntityNamespace,
    stopped: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyTracker {
    pub fn new(namespace: EntityNamespace) -> Self {
        Self {
            namespace,
            stopped: BTreeMap::new(),
        }
    }

    /// Index the entities created by a failed-and-stopped record.
    ///
    /// Only items that create an application entity become anchors.
    /// Collection wrappers have no identity of their own, and updates or
    /// deletes do not introduce an identity a later record could depend on.
    pub fn record(&mut self, stopped: &SyncRecord) {
        for item in &stopped.items {
            if self.namespace.is_collection(&item.contained_type) {
                continue;
            }
            if !self.namespace.is_entity(&item.contained_type) || item.state != SyncItemState::New
            {
                continue;
            }
            let Some(key) = item.key.as_ref() else {
                continue;
            };
            self.stopped
                .entry(item.contained_type.clone())
                .or_default()
                .insert(key.clone());
        }
        debug!(
            record_id = %stopped.id,
            anchors = self.anchor_count(),
            "Indexed failed-and-stopped record"
        );
    }

    /// Whether any item of `record` references an indexed entity.
    ///
    /// Items whose content cannot be parsed are logged and contribute no
    /// signal; the remaining items are still checked.
    pub fn depends_on_stopped(&self, record: &SyncRecord) -> bool {
        if self.stopped.is_empty() {
            return false;
        }

        for item in &record.items {
            let document = match RecordDocument::parse(&item.content) {
                Ok(document) => document,
                Err(e) => {
                    error!(
                        record_id = %record.id,
                        contained_type = %item.contained_type,
                        error = %e,
                        "Failed to parse sync item content"
                    );
                    continue;
                }
            };

            let hit = document
                .entity_references(&self.namespace)
                .into_iter()
                .find(|reference| self.contains(reference.entity_type(), reference.identity()));

            if let Some(reference) = hit {
                debug!(
                    record_id = %record.id,
                    entity_type = reference.entity_type(),
                    identity = reference.identity(),
                    "Record references entity of failed-and-stopped record"
                );
                return true;
            }
        }

        false
    }

    pub fn contains(&self, entity_type: &str, identity: &str) -> bool {
        self.stopped
            .get(entity_type)
            .is_some_and(|identities| identities.contains(identity))
    }

    pub fn is_empty(&self) -> bool {
        self.stopped.is_empty()
    }

    /// Total number of indexed identities
    pub fn anchor_count(&self) -> usize {
        self.stopped.values().map(BTreeSet::len).sum()
    }

    pub fn clear(&mut self) {
        self.stopped.clear();
    }
}
