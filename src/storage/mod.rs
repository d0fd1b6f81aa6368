//! Storage traits for the file exchange engine.
//!
//! This module defines the `SequenceAllocator` and `Storage` traits: the
//! persistence seam through which the batch builder and feedback reconciler
//! read candidates, allocate document numbers, record batches, and apply
//! reconciliation effects. Implementations must make the allocation atomic;
//! everything else is plain durable CRUD.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::codec::Money;
use crate::domain::{
    Batch, Disbursement, DocumentNumber, FileType, FundingType, MsfaaAgreement, OfferingIntensity,
    Restriction, SinCheck,
};
use crate::error::Result;
use crate::schema::msfaa::MsfaaOutcome;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;

/// Issues unique, strictly increasing integers per named sequence.
///
/// Concurrent callers for the same name never observe the same value twice;
/// gaps are allowed (an aborted caller consumes its value), duplicates never.
/// First use of a name creates the counter seeded so that the first allocated
/// value is 1.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    async fn next(&self, sequence_name: &str) -> Result<i64>;
}

/// Durable state behind the exchange engine.
///
/// The builder uses the candidate/batch/marking half; the reconciler uses the
/// feedback-file and domain-effect half. Effect methods return
/// [`crate::FixedwireError::UnknownDocument`] when the referenced record does
/// not exist, so callers can record the line as unmatched and continue.
#[async_trait]
pub trait Storage: SequenceAllocator {
    // Outbound candidates.

    /// Disbursements awaiting certification for the given intensity.
    async fn pending_disbursements(
        &self,
        intensity: OfferingIntensity,
    ) -> Result<Vec<Disbursement>>;

    /// SIN checks awaiting validation.
    async fn pending_sin_checks(&self) -> Result<Vec<SinCheck>>;

    /// MSFAA agreements awaiting submission.
    async fn pending_msfaa_agreements(&self) -> Result<Vec<MsfaaAgreement>>;

    // Batch bookkeeping.

    /// Persist the record of a generated batch. Batches are immutable.
    async fn record_batch(&self, batch: &Batch) -> Result<()>;

    /// List recorded batches, optionally filtered by file type.
    async fn list_batches(&self, file_type: Option<FileType>) -> Result<Vec<Batch>>;

    // Post-build marking.

    /// Mark a disbursement sent, attaching its allocated document number.
    async fn mark_disbursement_sent(
        &self,
        id: Uuid,
        document_number: DocumentNumber,
    ) -> Result<()>;

    /// Mark a SIN check sent, attaching its allocated reference index.
    async fn mark_sin_check_sent(&self, id: Uuid, document_number: DocumentNumber) -> Result<()>;

    /// Mark an MSFAA agreement sent, attaching its allocated MSFAA number.
    async fn mark_msfaa_sent(&self, id: Uuid, msfaa_number: DocumentNumber) -> Result<()>;

    // Feedback file idempotency state.

    /// Whether the named feedback file was already fully processed.
    async fn is_file_processed(&self, file_name: &str) -> Result<bool>;

    /// Register receipt of a feedback file (durable `processed = false` row;
    /// idempotent if the file was registered before).
    async fn register_feedback_file(
        &self,
        file_name: &str,
        file_type: FileType,
        received_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Mark a feedback file fully processed. Only called after every line of
    /// the file has been attempted.
    async fn mark_file_processed(&self, file_name: &str) -> Result<()>;

    // Domain effects applied by the reconciler.

    /// Apply e-Cert feedback: empty `error_codes` accepts the disbursement,
    /// otherwise it is rejected with the codes recorded.
    async fn apply_disbursement_feedback(
        &self,
        document_number: DocumentNumber,
        error_codes: &[String],
    ) -> Result<()>;

    /// Record a disbursement receipt against a certified disbursement.
    async fn apply_receipt(
        &self,
        document_number: DocumentNumber,
        funding_type: FundingType,
        amount: Money,
    ) -> Result<()>;

    /// Apply a SIN validation verdict to the originating check.
    async fn apply_sin_status(&self, reference: DocumentNumber, is_valid: bool) -> Result<()>;

    /// Apply an MSFAA response (signed or cancelled) to the agreement.
    async fn apply_msfaa_response(
        &self,
        msfaa_number: DocumentNumber,
        outcome: &MsfaaOutcome,
    ) -> Result<()>;

    /// Create or refresh a restriction imported from the federal file.
    async fn upsert_restriction(&self, restriction: &Restriction) -> Result<()>;

    /// Look up a disbursement by its allocated document number.
    async fn find_disbursement(
        &self,
        document_number: DocumentNumber,
    ) -> Result<Option<Disbursement>>;
}
