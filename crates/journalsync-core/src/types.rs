//! Core types for journalsync

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

pub mod record;
pub mod server;

pub use record::{ServerRecord, StateLocation, SyncItem, SyncRecord};
pub use server::{RemoteServer, SendPolicy, ServerRole};

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Create a new identifier with the current timestamp
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Get the underlying ULID
            pub fn as_ulid(&self) -> &Ulid {
                &self.0
            }

            /// Convert to string representation
            pub fn to_string_repr(&self) -> String {
                self.0.to_string()
            }

            /// Parse from string representation
            pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
                Ok(Self(Ulid::from_string(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

ulid_id!(
    /// Unique identifier for a sync record in the journal
    RecordId,
    "record"
);

ulid_id!(
    /// Unique identifier for a remote server (parent or child peer)
    ServerId,
    "server"
);

ulid_id!(
    /// Identifier of the local journal that produces transmissions
    SourceId,
    "source"
);

ulid_id!(
    /// Unique identifier for a packaged transmission
    TransmissionId,
    "tx"
);

/// Position in the journal.
///
/// Sync points are journal sequence numbers: every appended record gets the
/// next one. A time-window query between two points selects the records
/// appended after `from` up to and including `to`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SyncPoint(pub u64);

impl SyncPoint {
    /// The point before any record was journaled
    pub const ORIGIN: SyncPoint = SyncPoint(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The point immediately after this one
    pub fn next(&self) -> Self {
        SyncPoint(self.0 + 1)
    }

    /// Whether a record at `position` falls in the window `(from, to]`
    pub fn window_contains(from: SyncPoint, to: SyncPoint, position: SyncPoint) -> bool {
        position > from && position <= to
    }
}

impl std::fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Lifecycle state of a sync record, either for the record as a whole or for
/// one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRecordState {
    /// Recorded locally, never sent
    #[default]
    New,
    /// Queued for the next transmission
    PendingSend,
    /// Sent, no acknowledgement yet
    Sent,
    /// Sending failed, will be retried
    SendFailed,
    /// Received from a peer and stored
    Ingested,
    /// Peer reported a failure applying the record
    Failed,
    /// Peer applied the record
    Committed,
    /// Sent more than once
    SentAgain,
    /// Retry budget exhausted; never sent again until resolved
    FailedAndStopped,
    /// Peer already had the record
    AlreadyCommitted,
    /// Destination policy excludes the record
    NotSupposedToSync,
    /// Peer refused the record
    Rejected,
    /// Record references an entity created by a failed-and-stopped record
    DependsOnFailedAndStopped,
}

impl SyncRecordState {
    /// All states, in declaration order
    pub const ALL: [SyncRecordState; 13] = [
        SyncRecordState::New,
        SyncRecordState::PendingSend,
        SyncRecordState::Sent,
        SyncRecordState::SendFailed,
        SyncRecordState::Ingested,
        SyncRecordState::Failed,
        SyncRecordState::Committed,
        SyncRecordState::SentAgain,
        SyncRecordState::FailedAndStopped,
        SyncRecordState::AlreadyCommitted,
        SyncRecordState::NotSupposedToSync,
        SyncRecordState::Rejected,
        SyncRecordState::DependsOnFailedAndStopped,
    ];

    /// States in which the journal offers a record for sending.
    ///
    /// Failed-and-stopped and dependent records are offered too: the
    /// transmission builder needs to see them to gate later records.
    pub fn is_outgoing(&self) -> bool {
        matches!(
            self,
            SyncRecordState::New
                | SyncRecordState::PendingSend
                | SyncRecordState::Sent
                | SyncRecordState::SendFailed
                | SyncRecordState::SentAgain
                | SyncRecordState::Failed
                | SyncRecordState::FailedAndStopped
                | SyncRecordState::DependsOnFailedAndStopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRecordState::New => "NEW",
            SyncRecordState::PendingSend => "PENDING_SEND",
            SyncRecordState::Sent => "SENT",
            SyncRecordState::SendFailed => "SEND_FAILED",
            SyncRecordState::Ingested => "INGESTED",
            SyncRecordState::Failed => "FAILED",
            SyncRecordState::Committed => "COMMITTED",
            SyncRecordState::SentAgain => "SENT_AGAIN",
            SyncRecordState::FailedAndStopped => "FAILED_AND_STOPPED",
            SyncRecordState::AlreadyCommitted => "ALREADY_COMMITTED",
            SyncRecordState::NotSupposedToSync => "NOT_SUPPOSED_TO_SYNC",
            SyncRecordState::Rejected => "REJECTED",
            SyncRecordState::DependsOnFailedAndStopped => "DEPENDS_ON_FAILED_AND_STOPPED",
        }
    }
}

impl std::fmt::Display for SyncRecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncRecordState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        SyncRecordState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("unknown sync record state '{}'", s))
    }
}

/// What a single item did to its entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncItemState {
    /// Entity was created
    New,
    /// Entity was modified
    Updated,
    /// Entity was removed
    Deleted,
    #[default]
    Unknown,
}

impl std::fmt::Display for SyncItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncItemState::New => write!(f, "NEW"),
            SyncItemState::Updated => write!(f, "UPDATED"),
            SyncItemState::Deleted => write!(f, "DELETED"),
            SyncItemState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Why a failure notice was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// A record exhausted its retry budget and is now failed-and-stopped
    MaxRetryCountReached,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::MaxRetryCountReached => write!(f, "Reached maximum retry count"),
        }
    }
}

/// Diagnostic raised once per selection pass when a destination has a
/// failed-and-stopped record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    pub record_id: RecordId,
    pub server_id: ServerId,
    pub server_nickname: String,
    pub reason: FailureReason,
    /// Unix timestamp the notice was raised at
    pub raised_at: i64,
}

impl FailureNotice {
    pub fn new(record: &SyncRecord, server: &RemoteServer, reason: FailureReason) -> Self {
        Self {
            record_id: record.id,
            server_id: server.id,
            server_nickname: server.nickname.clone(),
            reason,
            raised_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_new() {
        let id1 = RecordId::new();
        let id2 = RecordId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_record_id_display() {
        let id = RecordId::new();
        assert!(format!("{}", id).starts_with("record_"));
        assert!(format!("{}", ServerId::new()).starts_with("server_"));
    }

    #[test]
    fn test_record_id_string_roundtrip() {
        let id = RecordId::new();
        let parsed = RecordId::from_string(&id.to_string_repr()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_sync_point_window() {
        let from = SyncPoint(2);
        let to = SyncPoint(5);
        assert!(!SyncPoint::window_contains(from, to, SyncPoint(2)));
        assert!(SyncPoint::window_contains(from, to, SyncPoint(3)));
        assert!(SyncPoint::window_contains(from, to, SyncPoint(5)));
        assert!(!SyncPoint::window_contains(from, to, SyncPoint(6)));
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(
            "failed-and-stopped".parse::<SyncRecordState>().unwrap(),
            SyncRecordState::FailedAndStopped
        );
        assert_eq!("NEW".parse::<SyncRecordState>().unwrap(), SyncRecordState::New);
        assert!("bogus".parse::<SyncRecordState>().is_err());
    }

    #[test]
    fn test_state_display_matches_parse() {
        for state in SyncRecordState::ALL {
            assert_eq!(state.to_string().parse::<SyncRecordState>().unwrap(), state);
        }
    }

    #[test]
    fn test_outgoing_states() {
        assert!(SyncRecordState::New.is_outgoing());
        assert!(SyncRecordState::FailedAndStopped.is_outgoing());
        assert!(SyncRecordState::DependsOnFailedAndStopped.is_outgoing());
        assert!(!SyncRecordState::NotSupposedToSync.is_outgoing());
        assert!(!SyncRecordState::Committed.is_outgoing());
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(
            FailureReason::MaxRetryCountReached.to_string(),
            "Reached maximum retry count"
        );
    }
}
