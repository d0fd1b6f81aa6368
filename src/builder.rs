//! Outbound batch construction and dispatch.
//!
//! A batch is built from the currently pending work for one file type:
//! each surviving record gets a freshly allocated document number, the
//! footer is computed over the records that actually serialized, and the
//! whole file is rendered as newline-terminated fixed-width lines. Records
//! that fail to encode are reported and skipped; the batch ships without
//! them. Sequences are only touched once a record is proven encodable, so
//! a batch that aborts with nothing shippable consumes no values.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Batch, BatchId, Disbursement, DocumentNumber, EnvironmentCode, FileType, MsfaaAgreement,
    OfferingIntensity, SinCheck,
};
use crate::error::{FixedwireError, Result};
use crate::schema::ecert::{EcertDetail, EcertFooter, EcertHeader};
use crate::schema::join_frames;
use crate::schema::msfaa::{MsfaaFooter, MsfaaHeader, MsfaaRequestRecord};
use crate::schema::sin_validation::{SinFooter, SinHeader, SinRequestRecord};
use crate::storage::Storage;
use crate::transfer::FileTransfer;

/// A record that could not be encoded into its fixed-width line.
#[derive(Debug, Clone)]
pub struct EncodingFailure {
    /// Internal id of the rejected record.
    pub id: Uuid,
    pub reason: String,
}

/// A fully rendered outbound batch, ready to upload.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub batch: Batch,
    /// Full file body, newline-terminated including the footer line.
    pub body: String,
    /// Document numbers assigned to the records that made it into the file.
    pub assigned: Vec<(Uuid, DocumentNumber)>,
    /// Records dropped from the batch with the reason each was dropped.
    pub rejected: Vec<EncodingFailure>,
}

/// Builds and dispatches outbound files against a [`Storage`] backend and a
/// [`FileTransfer`] endpoint.
pub struct BatchBuilder<S: ?Sized, T: ?Sized> {
    storage: Arc<S>,
    transfer: Arc<T>,
    environment: EnvironmentCode,
}

impl<S, T> BatchBuilder<S, T>
where
    S: Storage + ?Sized,
    T: FileTransfer + ?Sized,
{
    pub fn new(storage: Arc<S>, transfer: Arc<T>, environment: EnvironmentCode) -> Self {
        Self {
            storage,
            transfer,
            environment,
        }
    }

    /// Build an e-Cert file over the given candidate disbursements.
    ///
    /// Fails with [`FixedwireError::EmptyBatch`] when there are no candidates
    /// or none of them survive encoding; no file exists in that case.
    pub async fn build_ecert(
        &self,
        intensity: OfferingIntensity,
        candidates: &[Disbursement],
    ) -> Result<BatchOutput> {
        let file_type = match intensity {
            OfferingIntensity::FullTime => FileType::EcertFullTime,
            OfferingIntensity::PartTime => FileType::EcertPartTime,
        };
        // Encode with a placeholder number first; sequences are allocated
        // only once a record is proven shippable, so an aborted batch
        // consumes no values.
        let ecert_detail = |candidate: &Disbursement, document_number| EcertDetail {
            intensity,
            document_number,
            sin: candidate.sin.clone(),
            institution_code: candidate.institution_code.clone(),
            award_amount: candidate.award_amount,
            disbursement_date: candidate.disbursement_date,
            student_birth_date: candidate.student_birth_date,
            student_last_name: candidate.student_last_name.clone(),
        };
        let mut survivors = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for candidate in candidates {
            match ecert_detail(candidate, DocumentNumber(0)).to_line() {
                Ok(_) => survivors.push(candidate),
                Err(e) => {
                    warn!(
                        disbursement_id = %candidate.id,
                        error = %e,
                        "Disbursement dropped from e-Cert batch"
                    );
                    rejected.push(EncodingFailure {
                        id: candidate.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if survivors.is_empty() {
            return Err(FixedwireError::EmptyBatch(file_type));
        }

        let sequence = self.storage.next(&file_type.batch_sequence_name()).await?;
        let generated_at = Utc::now();

        let mut details = Vec::with_capacity(survivors.len());
        let mut assigned = Vec::with_capacity(survivors.len());
        let mut lines = Vec::with_capacity(survivors.len());
        for candidate in survivors {
            let document_number =
                DocumentNumber(self.storage.next(file_type.sequence_name()).await?);
            let detail = ecert_detail(candidate, document_number);
            lines.push(detail.to_line()?);
            assigned.push((candidate.id, document_number));
            details.push(detail);
        }

        let header = EcertHeader {
            intensity,
            environment: self.environment.marker(),
            created: generated_at.naive_utc(),
            sequence,
        };
        let footer = EcertFooter::compute(intensity, &details)?;
        let body = join_frames(header.to_line()?, &lines, footer.to_line()?);
        let file_name =
            file_type.outbound_file_name(self.environment, generated_at.date_naive(), sequence);

        Ok(BatchOutput {
            batch: Batch {
                id: BatchId(Uuid::new_v4()),
                file_type,
                sequence_number: sequence,
                file_name,
                generated_at,
                record_count: footer.record_count,
                aggregate_check: footer.sin_hash_total,
            },
            body,
            assigned,
            rejected,
        })
    }

    /// Build a SIN validation request file over the given checks.
    pub async fn build_sin_validation(&self, candidates: &[SinCheck]) -> Result<BatchOutput> {
        let file_type = FileType::SinValidation;
        if candidates.is_empty() {
            return Err(FixedwireError::EmptyBatch(file_type));
        }

        let sin_record = |candidate: &SinCheck, reference_index| SinRequestRecord {
            reference_index,
            sin: candidate.sin.clone(),
            last_name: candidate.last_name.clone(),
            given_name: candidate.given_name.clone(),
            birth_date: candidate.birth_date,
            gender: candidate.gender,
        };
        let mut survivors = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for candidate in candidates {
            match sin_record(candidate, DocumentNumber(0)).to_line() {
                Ok(_) => survivors.push(candidate),
                Err(e) => {
                    warn!(
                        sin_check_id = %candidate.id,
                        error = %e,
                        "SIN check dropped from validation batch"
                    );
                    rejected.push(EncodingFailure {
                        id: candidate.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if survivors.is_empty() {
            return Err(FixedwireError::EmptyBatch(file_type));
        }

        let sequence = self.storage.next(&file_type.batch_sequence_name()).await?;
        let generated_at = Utc::now();

        let mut records = Vec::with_capacity(survivors.len());
        let mut assigned = Vec::with_capacity(survivors.len());
        let mut lines = Vec::with_capacity(survivors.len());
        for candidate in survivors {
            let reference_index =
                DocumentNumber(self.storage.next(file_type.sequence_name()).await?);
            let record = sin_record(candidate, reference_index);
            lines.push(record.to_line()?);
            assigned.push((candidate.id, reference_index));
            records.push(record);
        }

        let header = SinHeader {
            created: generated_at.naive_utc(),
            sequence,
        };
        let footer = SinFooter::compute_over(records.iter().map(|r| r.sin.value()));
        let body = join_frames(header.to_line()?, &lines, footer.to_line()?);
        let file_name =
            file_type.outbound_file_name(self.environment, generated_at.date_naive(), sequence);

        Ok(BatchOutput {
            batch: Batch {
                id: BatchId(Uuid::new_v4()),
                file_type,
                sequence_number: sequence,
                file_name,
                generated_at,
                record_count: footer.record_count,
                aggregate_check: footer.sin_hash_total,
            },
            body,
            assigned,
            rejected,
        })
    }

    /// Build an MSFAA request file over the given agreements.
    pub async fn build_msfaa(&self, candidates: &[MsfaaAgreement]) -> Result<BatchOutput> {
        let file_type = FileType::Msfaa;
        if candidates.is_empty() {
            return Err(FixedwireError::EmptyBatch(file_type));
        }

        let msfaa_record = |candidate: &MsfaaAgreement, msfaa_number| MsfaaRequestRecord {
            msfaa_number,
            sin: candidate.sin.clone(),
            birth_date: candidate.birth_date,
            last_name: candidate.last_name.clone(),
            given_name: candidate.given_name.clone(),
            intensity: candidate.intensity,
        };
        let mut survivors = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for candidate in candidates {
            match msfaa_record(candidate, DocumentNumber(0)).to_line() {
                Ok(_) => survivors.push(candidate),
                Err(e) => {
                    warn!(
                        msfaa_id = %candidate.id,
                        error = %e,
                        "Agreement dropped from MSFAA batch"
                    );
                    rejected.push(EncodingFailure {
                        id: candidate.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if survivors.is_empty() {
            return Err(FixedwireError::EmptyBatch(file_type));
        }

        let sequence = self.storage.next(&file_type.batch_sequence_name()).await?;
        let generated_at = Utc::now();

        let mut records = Vec::with_capacity(survivors.len());
        let mut assigned = Vec::with_capacity(survivors.len());
        let mut lines = Vec::with_capacity(survivors.len());
        for candidate in survivors {
            let msfaa_number =
                DocumentNumber(self.storage.next(file_type.sequence_name()).await?);
            let record = msfaa_record(candidate, msfaa_number);
            lines.push(record.to_line()?);
            assigned.push((candidate.id, msfaa_number));
            records.push(record);
        }

        let header = MsfaaHeader {
            created: generated_at.naive_utc(),
            sequence,
        };
        let footer = MsfaaFooter::compute_over(records.iter().map(|r| r.sin.value()));
        let body = join_frames(header.to_line()?, &lines, footer.to_line()?);
        let file_name =
            file_type.outbound_file_name(self.environment, generated_at.date_naive(), sequence);

        Ok(BatchOutput {
            batch: Batch {
                id: BatchId(Uuid::new_v4()),
                file_type,
                sequence_number: sequence,
                file_name,
                generated_at,
                record_count: footer.record_count,
                aggregate_check: footer.sin_hash_total,
            },
            body,
            assigned,
            rejected,
        })
    }

    /// Build, upload, and record the next e-Cert batch for one intensity.
    ///
    /// Returns `Ok(None)` when nothing is pending. After the upload succeeds
    /// the batch is recorded and every shipped disbursement is marked sent
    /// with its assigned document number.
    #[instrument(skip(self), fields(intensity = %intensity))]
    pub async fn send_ecert(&self, intensity: OfferingIntensity) -> Result<Option<BatchOutput>> {
        let pending = self.storage.pending_disbursements(intensity).await?;
        if pending.is_empty() {
            return Ok(None);
        }
        let output = self.build_ecert(intensity, &pending).await?;
        self.dispatch(&output).await?;
        futures::future::try_join_all(
            output
                .assigned
                .iter()
                .map(|(id, doc)| self.storage.mark_disbursement_sent(*id, *doc)),
        )
        .await?;
        Ok(Some(output))
    }

    /// Build, upload, and record the next SIN validation request batch.
    #[instrument(skip(self))]
    pub async fn send_sin_validation(&self) -> Result<Option<BatchOutput>> {
        let pending = self.storage.pending_sin_checks().await?;
        if pending.is_empty() {
            return Ok(None);
        }
        let output = self.build_sin_validation(&pending).await?;
        self.dispatch(&output).await?;
        futures::future::try_join_all(
            output
                .assigned
                .iter()
                .map(|(id, reference)| self.storage.mark_sin_check_sent(*id, *reference)),
        )
        .await?;
        Ok(Some(output))
    }

    /// Build, upload, and record the next MSFAA request batch.
    #[instrument(skip(self))]
    pub async fn send_msfaa(&self) -> Result<Option<BatchOutput>> {
        let pending = self.storage.pending_msfaa_agreements().await?;
        if pending.is_empty() {
            return Ok(None);
        }
        let output = self.build_msfaa(&pending).await?;
        self.dispatch(&output).await?;
        futures::future::try_join_all(
            output
                .assigned
                .iter()
                .map(|(id, number)| self.storage.mark_msfaa_sent(*id, *number)),
        )
        .await?;
        Ok(Some(output))
    }

    async fn dispatch(&self, output: &BatchOutput) -> Result<()> {
        self.transfer
            .upload(&output.batch.file_name, &output.body)
            .await?;
        self.storage.record_batch(&output.batch).await?;
        counter!(
            "fixedwire_batches_sent_total",
            "file_type" => output.batch.file_type.to_string()
        )
        .increment(1);
        counter!(
            "fixedwire_records_sent_total",
            "file_type" => output.batch.file_type.to_string()
        )
        .increment(output.batch.record_count as u64);
        if !output.rejected.is_empty() {
            counter!(
                "fixedwire_records_rejected_total",
                "file_type" => output.batch.file_type.to_string()
            )
            .increment(output.rejected.len() as u64);
        }
        info!(
            file_name = %output.batch.file_name,
            record_count = output.batch.record_count,
            rejected = output.rejected.len(),
            "Batch uploaded"
        );
        Ok(())
    }
}
