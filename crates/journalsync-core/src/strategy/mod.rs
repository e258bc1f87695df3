//! Disconnected one-way sync strategy
//!
//! Turns the local journal into transmissions for remote servers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncSource (journal)                                           │
//! │      │                                                          │
//! │      ▼                                                          │
//! │  ChangesetSelector      deletions first, then other changes     │
//! │      │                                                          │
//! │      ▼                                                          │
//! │  SelectionPass          one per build, front to back            │
//! │  ├── StateLocation      record state or per-server override     │
//! │  ├── send policy        NOT_SUPPOSED_TO_SYNC                    │
//! │  └── DependencyTracker  DEPENDS_ON_FAILED_AND_STOPPED           │
//! │      │                                                          │
//! │      ▼                                                          │
//! │  RecordStore            persists re-stated records              │
//! │  FailureNotifier        one notice per pass                     │
//! │      │                                                          │
//! │      ▼                                                          │
//! │  Transmission           addressed, optionally written to disk   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! A build performs no locking. Callers must not run two builds against the
//! same journal and destination at once. Every build creates its own
//! [`SelectionPass`], so nothing is shared between builds.

pub mod changeset;
pub mod dependency;
pub mod pass;

pub use changeset::ChangesetSelector;
pub use dependency::DependencyTracker;
pub use pass::{Decision, PassSummary, SelectionPass};

use tracing::{debug, info};

use crate::config::{StrategyConfig, TransmissionOptions};
use crate::error::{SyncError, SyncResult};
use crate::source::{FailureNotifier, RecordStore, SyncSource};
use crate::transmission::Transmission;
use crate::types::{FailureReason, RemoteServer};

/// Builds transmissions from a journal
pub struct SyncStrategy<P, N> {
    store: P,
    notifier: N,
    config: StrategyConfig,
}

impl<P: RecordStore, N: FailureNotifier> SyncStrategy<P, N> {
    pub fn new(store: P, notifier: N, config: StrategyConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Export everything journaled since the last export, unfiltered.
    ///
    /// The new sync point is computed before the changeset is read and
    /// committed only after, so records journaled in between are picked up
    /// by the next export instead of being skipped. With `write_file` the
    /// transmission is written to the configured directory first; if that
    /// fails the sync point stays where it was.
    pub fn build_time_window_transmission<S: SyncSource + ?Sized>(
        &self,
        source: &S,
        write_file: bool,
    ) -> SyncResult<Transmission> {
        let last = source.last_sync_point()?;
        let next = source.move_sync_point()?;

        let changeset = ChangesetSelector::time_window(source, last, next)?;

        let transmission = Transmission::new(source.source_id()?, changeset, None);
        transmission.create(write_file, self.config.transmission_dir.as_deref())?;

        source.set_last_sync_point(next)?;

        info!(
            transmission = %transmission.id,
            from = %last,
            to = %next,
            records = transmission.len(),
            "Built time-window transmission"
        );
        Ok(transmission)
    }

    /// Build the transmission for one destination.
    ///
    /// Returns `Ok(None)` without touching anything when `server` is absent.
    /// Records are classified in the order the journal returns them; records
    /// the pass re-states are persisted through the [`RecordStore`] before the
    /// transmission is assembled. If any record was failed-and-stopped, one
    /// notice is sent for the first such record.
    pub fn build_state_based_transmission<S: SyncSource + ?Sized>(
        &self,
        source: &S,
        server: Option<&RemoteServer>,
        options: &TransmissionOptions,
    ) -> SyncResult<Option<Transmission>> {
        let Some(server) = server else {
            debug!("No destination given, skipping state-based transmission");
            return Ok(None);
        };

        if options.persist_locally && self.config.transmission_dir.is_none() {
            return Err(SyncError::InvalidOperation(
                "local persistence requested but no transmission directory configured".to_string(),
            ));
        }

        let changeset = ChangesetSelector::state_based(source, server, options.max_records)?;

        let mut pass = SelectionPass::new(server, self.config.namespace.clone());
        let mut filtered = Vec::with_capacity(changeset.len());

        for mut record in changeset {
            let decision = pass.classify(&mut record);
            if decision.is_included() {
                filtered.push(record);
            } else if decision.restates() {
                self.store.update_record(&record)?;
            }
        }

        if let Some(first) = pass.first_stopped() {
            self.notifier
                .send_failure_notice(first, server, &FailureReason::MaxRetryCountReached);
        }

        let summary = pass.summary();
        info!(
            server = %server.nickname,
            included = summary.included,
            stopped = summary.stopped,
            not_supposed_to_sync = summary.not_supposed_to_sync,
            already_dependent = summary.already_dependent,
            depends_on_stopped = summary.depends_on_stopped,
            "Selection pass complete"
        );

        let mut transmission = Transmission::new(source.source_id()?, filtered, Some(server.id));
        transmission.is_requesting_transmission = options.request_response;
        transmission.create(
            options.persist_locally,
            self.config.transmission_dir.as_deref(),
        )?;

        Ok(Some(transmission))
    }
}
