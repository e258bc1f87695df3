//! Journalsync Core Library
//!
//! Disconnected, journal-based, one-way replication.
//!
//! ## Overview
//!
//! Every local change is journaled as a [`SyncRecord`]. When a remote server
//! is due an update, the [`SyncStrategy`] selects the records it is owed,
//! withholds the ones it must not receive, and packages the rest into a
//! [`Transmission`] that can be carried to the server as a file.
//!
//! Records are withheld when:
//!
//! - the destination has given up on them (`FAILED_AND_STOPPED`)
//! - the destination's send policy excludes one of their entity types
//! - they reference an entity created by a withheld failed record
//!
//! ## Quick Start
//!
//! ```no_run
//! use journalsync_core::{
//!     Journal, RemoteServer, ServerRole, StrategyConfig, SyncStrategy, TransmissionOptions,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let journal = Journal::open("~/.journalsync/data/journal.redb")?;
//!     let server = RemoteServer::new("hq", ServerRole::Parent);
//!     journal.save_server(&server)?;
//!
//!     let strategy = SyncStrategy::new(&journal, &journal, StrategyConfig::default());
//!     if let Some(tx) =
//!         strategy.build_state_based_transmission(&journal, Some(&server), &TransmissionOptions::new())?
//!     {
//!         println!("{} records for {}", tx.len(), server.nickname);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod memory;
pub mod source;
pub mod storage;
pub mod strategy;
pub mod transmission;
pub mod types;

// Re-exports
pub use config::{StrategyConfig, TransmissionOptions};
pub use document::{DocumentNode, EntityNamespace, EntityReference, RecordDocument};
pub use error::{SyncError, SyncResult};
pub use memory::MemoryJournal;
pub use source::{FailureNotifier, LogNotifier, RecordStore, SyncSource};
pub use storage::Journal;
pub use strategy::{
    ChangesetSelector, Decision, DependencyTracker, PassSummary, SelectionPass, SyncStrategy,
};
pub use transmission::{Transmission, TRANSMISSION_VERSION};
pub use types::*;
