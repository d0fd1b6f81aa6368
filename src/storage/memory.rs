//! In-memory Storage implementation.
//!
//! Backs tests and local runs without a database. State lives behind a single
//! `parking_lot::Mutex`; locks are never held across an await. The mutation
//! counter records every domain effect applied, which lets tests assert that a
//! reprocessed feedback file performs zero mutations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::codec::Money;
use crate::domain::{
    Batch, Disbursement, DisbursementStatus, DocumentNumber, FileType, FundingType,
    MsfaaAgreement, MsfaaStatus, OfferingIntensity, Restriction, SinCheck, SinCheckStatus,
};
use crate::error::{FixedwireError, Result};
use crate::schema::msfaa::MsfaaOutcome;
use crate::storage::{SequenceAllocator, Storage};

#[derive(Debug, Clone)]
struct FeedbackFileRow {
    #[allow(dead_code)]
    file_type: FileType,
    #[allow(dead_code)]
    received_at: DateTime<Utc>,
    processed: bool,
}

#[derive(Default)]
struct Inner {
    sequences: HashMap<String, i64>,
    disbursements: Vec<Disbursement>,
    sin_checks: Vec<SinCheck>,
    msfaa_agreements: Vec<MsfaaAgreement>,
    batches: Vec<Batch>,
    feedback_files: HashMap<String, FeedbackFileRow>,
    restrictions: Vec<Restriction>,
    mutations: u64,
}

/// In-memory implementation of [`Storage`].
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding and inspection helpers for tests and local runs.

    pub fn insert_disbursement(&self, disbursement: Disbursement) {
        self.inner.lock().disbursements.push(disbursement);
    }

    pub fn insert_sin_check(&self, check: SinCheck) {
        self.inner.lock().sin_checks.push(check);
    }

    pub fn insert_msfaa_agreement(&self, agreement: MsfaaAgreement) {
        self.inner.lock().msfaa_agreements.push(agreement);
    }

    pub fn disbursement(&self, id: Uuid) -> Option<Disbursement> {
        self.inner
            .lock()
            .disbursements
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    pub fn sin_check(&self, id: Uuid) -> Option<SinCheck> {
        self.inner
            .lock()
            .sin_checks
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn msfaa_agreement(&self, id: Uuid) -> Option<MsfaaAgreement> {
        self.inner
            .lock()
            .msfaa_agreements
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub fn restrictions(&self) -> Vec<Restriction> {
        self.inner.lock().restrictions.clone()
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.inner.lock().batches.clone()
    }

    /// Number of domain effects applied so far (feedback applications,
    /// restriction upserts). Batch bookkeeping and sent-markings don't count.
    pub fn registered_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().feedback_files.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn mutation_count(&self) -> u64 {
        self.inner.lock().mutations
    }
}

#[async_trait]
impl SequenceAllocator for MemoryStorage {
    async fn next(&self, sequence_name: &str) -> Result<i64> {
        let mut inner = self.inner.lock();
        let value = inner
            .sequences
            .entry(sequence_name.to_string())
            .and_modify(|v| *v += 1)
            .or_insert(1);
        Ok(*value)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn pending_disbursements(
        &self,
        intensity: OfferingIntensity,
    ) -> Result<Vec<Disbursement>> {
        Ok(self
            .inner
            .lock()
            .disbursements
            .iter()
            .filter(|d| d.intensity == intensity && d.status == DisbursementStatus::Pending)
            .cloned()
            .collect())
    }

    async fn pending_sin_checks(&self) -> Result<Vec<SinCheck>> {
        Ok(self
            .inner
            .lock()
            .sin_checks
            .iter()
            .filter(|c| c.status == SinCheckStatus::Pending)
            .cloned()
            .collect())
    }

    async fn pending_msfaa_agreements(&self) -> Result<Vec<MsfaaAgreement>> {
        Ok(self
            .inner
            .lock()
            .msfaa_agreements
            .iter()
            .filter(|a| a.status == MsfaaStatus::Pending)
            .cloned()
            .collect())
    }

    async fn record_batch(&self, batch: &Batch) -> Result<()> {
        self.inner.lock().batches.push(batch.clone());
        Ok(())
    }

    async fn list_batches(&self, file_type: Option<FileType>) -> Result<Vec<Batch>> {
        Ok(self
            .inner
            .lock()
            .batches
            .iter()
            .filter(|b| file_type.is_none() || file_type == Some(b.file_type))
            .cloned()
            .collect())
    }

    async fn mark_disbursement_sent(
        &self,
        id: Uuid,
        document_number: DocumentNumber,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let disbursement = inner
            .disbursements
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow::anyhow!("No disbursement with id {}", id))?;
        disbursement.document_number = Some(document_number);
        disbursement.status = DisbursementStatus::Sent;
        disbursement.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_sin_check_sent(&self, id: Uuid, document_number: DocumentNumber) -> Result<()> {
        let mut inner = self.inner.lock();
        let check = inner
            .sin_checks
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("No SIN check with id {}", id))?;
        check.document_number = Some(document_number);
        check.status = SinCheckStatus::Sent;
        check.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_msfaa_sent(&self, id: Uuid, msfaa_number: DocumentNumber) -> Result<()> {
        let mut inner = self.inner.lock();
        let agreement = inner
            .msfaa_agreements
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow::anyhow!("No MSFAA agreement with id {}", id))?;
        agreement.msfaa_number = Some(msfaa_number);
        agreement.status = MsfaaStatus::Sent;
        agreement.updated_at = Utc::now();
        Ok(())
    }

    async fn is_file_processed(&self, file_name: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .feedback_files
            .get(file_name)
            .map(|row| row.processed)
            .unwrap_or(false))
    }

    async fn register_feedback_file(
        &self,
        file_name: &str,
        file_type: FileType,
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .lock()
            .feedback_files
            .entry(file_name.to_string())
            .or_insert(FeedbackFileRow {
                file_type,
                received_at,
                processed: false,
            });
        Ok(())
    }

    async fn mark_file_processed(&self, file_name: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let row = inner
            .feedback_files
            .get_mut(file_name)
            .ok_or_else(|| anyhow::anyhow!("Feedback file '{}' was never registered", file_name))?;
        row.processed = true;
        Ok(())
    }

    async fn apply_disbursement_feedback(
        &self,
        document_number: DocumentNumber,
        error_codes: &[String],
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let disbursement = inner
            .disbursements
            .iter_mut()
            .find(|d| d.document_number == Some(document_number))
            .ok_or(FixedwireError::UnknownDocument(document_number))?;
        disbursement.status = if error_codes.is_empty() {
            DisbursementStatus::Accepted
        } else {
            DisbursementStatus::Rejected
        };
        disbursement.feedback_errors = error_codes.to_vec();
        disbursement.updated_at = Utc::now();
        inner.mutations += 1;
        Ok(())
    }

    async fn apply_receipt(
        &self,
        document_number: DocumentNumber,
        _funding_type: FundingType,
        amount: Money,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let disbursement = inner
            .disbursements
            .iter_mut()
            .find(|d| d.document_number == Some(document_number))
            .ok_or(FixedwireError::UnknownDocument(document_number))?;
        disbursement.receipted_amount = Some(amount);
        disbursement.status = DisbursementStatus::Receipted;
        disbursement.updated_at = Utc::now();
        inner.mutations += 1;
        Ok(())
    }

    async fn apply_sin_status(&self, reference: DocumentNumber, is_valid: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let check = inner
            .sin_checks
            .iter_mut()
            .find(|c| c.document_number == Some(reference))
            .ok_or(FixedwireError::UnknownDocument(reference))?;
        check.status = if is_valid {
            SinCheckStatus::Valid
        } else {
            SinCheckStatus::Invalid
        };
        check.updated_at = Utc::now();
        inner.mutations += 1;
        Ok(())
    }

    async fn apply_msfaa_response(
        &self,
        msfaa_number: DocumentNumber,
        outcome: &MsfaaOutcome,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let agreement = inner
            .msfaa_agreements
            .iter_mut()
            .find(|a| a.msfaa_number == Some(msfaa_number))
            .ok_or(FixedwireError::UnknownDocument(msfaa_number))?;
        match outcome {
            MsfaaOutcome::Received { signed_date } => {
                agreement.status = MsfaaStatus::Signed;
                agreement.status_date = Some(*signed_date);
                agreement.cancel_reason = None;
            }
            MsfaaOutcome::Cancelled {
                cancel_date,
                reason,
            } => {
                agreement.status = MsfaaStatus::Cancelled;
                agreement.status_date = Some(*cancel_date);
                agreement.cancel_reason = Some(reason.clone());
            }
        }
        agreement.updated_at = Utc::now();
        inner.mutations += 1;
        Ok(())
    }

    async fn upsert_restriction(&self, restriction: &Restriction) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner
            .restrictions
            .iter_mut()
            .find(|r| r.sin == restriction.sin && r.code == restriction.code)
        {
            Some(existing) => *existing = restriction.clone(),
            None => inner.restrictions.push(restriction.clone()),
        }
        inner.mutations += 1;
        Ok(())
    }

    async fn find_disbursement(
        &self,
        document_number: DocumentNumber,
    ) -> Result<Option<Disbursement>> {
        Ok(self
            .inner
            .lock()
            .disbursements
            .iter()
            .find(|d| d.document_number == Some(document_number))
            .cloned())
    }
}
