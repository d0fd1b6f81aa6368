//! Batch file exchange engine for fixed-width government files.
//!
//! This crate builds, sends, and reconciles the fixed-width files exchanged
//! with the federal student aid systems: e-Cert disbursement certificates,
//! SIN validation requests, and MSFAA agreement requests flow outbound, and
//! their feedback/response files plus disbursement receipts and federal
//! restriction files flow back in. A background daemon schedules both
//! directions; all domain state lives behind the [`storage::Storage`] trait.

pub mod builder;
pub mod codec;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod reconcile;
pub mod schema;
pub mod storage;
pub mod transfer;

// Re-export commonly used types
pub use builder::{BatchBuilder, BatchOutput, EncodingFailure};
pub use codec::Money;
pub use daemon::{DaemonConfig, ExchangeDaemon};
pub use domain::*;
pub use error::{FixedwireError, Result};
pub use reconcile::{FeedbackReconciler, ReconcileOutcome, ReconcileReport};
pub use storage::{MemoryStorage, SequenceAllocator, Storage};
pub use transfer::{FileTransfer, MockFileTransfer};

#[cfg(feature = "postgres")]
pub use storage::PostgresStorage;

/// Get the fixedwire database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
