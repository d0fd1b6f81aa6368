//! Batch bookkeeping for generated outbound files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file_type::FileType;

/// Unique identifier for a generated batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Record of one generated outbound file.
///
/// Created at file-generation time and immutable once the file is handed to
/// the transfer collaborator; feedback processing references it for
/// reconciliation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub file_type: FileType,
    /// Per-type batch sequence embedded in the header and file name.
    pub sequence_number: i64,
    pub file_name: String,
    pub generated_at: DateTime<Utc>,
    /// Number of detail records actually serialized.
    pub record_count: i64,
    /// Footer aggregate over the serialized set (SIN hash total for the
    /// exchanges that define one, total amount in minor units otherwise).
    pub aggregate_check: i64,
}
