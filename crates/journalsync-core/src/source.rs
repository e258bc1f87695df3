//! Collaborator contracts consumed by the transmission builder
//!
//! - [`SyncSource`]: the local journal, queried by time window or by state
//! - [`RecordStore`]: durably persists re-stated records
//! - [`FailureNotifier`]: receives the once-per-pass failure diagnostic
//!
//! All methods are synchronous. Retrieval and persistence failures surface as
//! `Err` and are propagated unmodified by the core.

use tracing::error;

use crate::error::SyncResult;
use crate::types::{FailureReason, RemoteServer, SourceId, SyncPoint, SyncRecord};

/// Abstraction over the local change journal
pub trait SyncSource {
    /// Identifier of this journal, stamped on every transmission
    fn source_id(&self) -> SyncResult<SourceId>;

    /// Point up to which the journal was last exported
    fn last_sync_point(&self) -> SyncResult<SyncPoint>;

    /// Compute the point a new export will advance to.
    ///
    /// This does not commit anything; callers commit it with
    /// [`set_last_sync_point`](SyncSource::set_last_sync_point) once the
    /// changeset has been read.
    fn move_sync_point(&self) -> SyncResult<SyncPoint>;

    fn set_last_sync_point(&self, point: SyncPoint) -> SyncResult<()>;

    /// Deletion records journaled in `(from, to]`
    fn deleted_between(&self, from: SyncPoint, to: SyncPoint) -> SyncResult<Vec<SyncRecord>>;

    /// Non-deletion records journaled in `(from, to]`
    fn changed_between(&self, from: SyncPoint, to: SyncPoint) -> SyncResult<Vec<SyncRecord>>;

    /// Deletion records still waiting to be sent
    fn deleted(&self) -> SyncResult<Vec<SyncRecord>>;

    /// Non-deletion records still waiting to be sent, in journal order
    fn changed(&self, max_records: Option<usize>) -> SyncResult<Vec<SyncRecord>>;

    /// Non-deletion records waiting to be sent to `server`, judged by the
    /// server's view of each record's state, in journal order
    fn changed_for(
        &self,
        server: &RemoteServer,
        max_records: Option<usize>,
    ) -> SyncResult<Vec<SyncRecord>>;
}

/// Durable persistence of re-stated records
pub trait RecordStore {
    /// Persist a record's state and per-server overrides
    fn update_record(&self, record: &SyncRecord) -> SyncResult<()>;
}

/// Sink for diagnostic failure notices.
///
/// Delivery is fire-and-forget: implementations log their own failures.
pub trait FailureNotifier {
    fn send_failure_notice(
        &self,
        record: &SyncRecord,
        server: &RemoteServer,
        reason: &FailureReason,
    );
}

/// Notifier that only writes the notice to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn send_failure_notice(
        &self,
        record: &SyncRecord,
        server: &RemoteServer,
        reason: &FailureReason,
    ) {
        error!(
            record_id = %record.id,
            server = %server.nickname,
            %reason,
            "Sync record failed and stopped"
        );
    }
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn update_record(&self, record: &SyncRecord) -> SyncResult<()> {
        (**self).update_record(record)
    }
}

impl<T: FailureNotifier + ?Sized> FailureNotifier for &T {
    fn send_failure_notice(
        &self,
        record: &SyncRecord,
        server: &RemoteServer,
        reason: &FailureReason,
    ) {
        (**self).send_failure_notice(record, server, reason)
    }
}
