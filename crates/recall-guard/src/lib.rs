//! # Recall Guard
//!
//! Protects a small set of critical workspace files against destructive
//! external writes. Each file moves through a state machine: periodic
//! checks back it up when it has changed, verification at checkpoint
//! boundaries flags unexpected changes, and restore puts the latest valid
//! snapshot back and verifies the result.

mod error;
mod guard;
mod snapshot;
mod state;
mod store;

pub use error::GuardError;
pub use guard::{
    CheckReport, FailedFile, FileVerification, GuardOptions, RecoverOutcome, RestoreReport,
    SnapshotGuard, Verification,
};
pub use snapshot::{Snapshot, STAMP_FORMAT};
pub use state::{FileRecord, FileState, GuardState};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
