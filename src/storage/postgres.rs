//! PostgreSQL implementation of the Storage trait.
//!
//! Sequence allocation uses a single atomic upsert-returning statement on the
//! counter row, which takes a row-level lock for the duration of the
//! statement: concurrent allocators for the same name serialize on that lock
//! and can never observe the same value twice, even across process instances.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::codec::Money;
use crate::domain::{
    Batch, BatchId, Disbursement, DisbursementStatus, DocumentNumber, FileType, FundingType,
    MsfaaAgreement, MsfaaStatus, OfferingIntensity, Restriction, Sin, SinCheck, SinCheckStatus,
};
use crate::error::{FixedwireError, Result};
use crate::schema::msfaa::MsfaaOutcome;
use crate::storage::{SequenceAllocator, Storage};

/// PostgreSQL implementation of [`Storage`].
///
/// # Example
/// ```ignore
/// let pool = PgPool::connect("postgresql://localhost/fixedwire").await?;
/// fixedwire::migrator().run(&pool).await?;
/// let storage = PostgresStorage::new(pool);
/// ```
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn storage_err(context: &str, e: sqlx::Error) -> FixedwireError {
    FixedwireError::Other(anyhow!("{}: {}", context, e))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|e: String| FixedwireError::Other(anyhow!(e)))
}

fn row_to_disbursement(row: &sqlx::postgres::PgRow) -> Result<Disbursement> {
    let sin: String = row.try_get("sin").map_err(|e| storage_err("sin", e))?;
    Ok(Disbursement {
        id: row.try_get("id").map_err(|e| storage_err("id", e))?,
        intensity: parse_enum(
            row.try_get::<String, _>("intensity")
                .map_err(|e| storage_err("intensity", e))?
                .as_str(),
        )?,
        sin: Sin::new(&sin).map_err(|e| FixedwireError::Other(anyhow!(e)))?,
        institution_code: row
            .try_get("institution_code")
            .map_err(|e| storage_err("institution_code", e))?,
        award_amount: Money::from_minor(
            row.try_get("award_amount")
                .map_err(|e| storage_err("award_amount", e))?,
        ),
        disbursement_date: row
            .try_get("disbursement_date")
            .map_err(|e| storage_err("disbursement_date", e))?,
        student_last_name: row
            .try_get("student_last_name")
            .map_err(|e| storage_err("student_last_name", e))?,
        student_birth_date: row
            .try_get("student_birth_date")
            .map_err(|e| storage_err("student_birth_date", e))?,
        document_number: row
            .try_get::<Option<i64>, _>("document_number")
            .map_err(|e| storage_err("document_number", e))?
            .map(DocumentNumber),
        status: parse_enum(
            row.try_get::<String, _>("status")
                .map_err(|e| storage_err("status", e))?
                .as_str(),
        )?,
        feedback_errors: row
            .try_get("feedback_errors")
            .map_err(|e| storage_err("feedback_errors", e))?,
        receipted_amount: row
            .try_get::<Option<i64>, _>("receipted_amount")
            .map_err(|e| storage_err("receipted_amount", e))?
            .map(Money::from_minor),
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| storage_err("updated_at", e))?,
    })
}

fn row_to_sin_check(row: &sqlx::postgres::PgRow) -> Result<SinCheck> {
    let sin: String = row.try_get("sin").map_err(|e| storage_err("sin", e))?;
    let gender: Option<String> = row.try_get("gender").map_err(|e| storage_err("gender", e))?;
    Ok(SinCheck {
        id: row.try_get("id").map_err(|e| storage_err("id", e))?,
        sin: Sin::new(&sin).map_err(|e| FixedwireError::Other(anyhow!(e)))?,
        last_name: row
            .try_get("last_name")
            .map_err(|e| storage_err("last_name", e))?,
        given_name: row
            .try_get("given_name")
            .map_err(|e| storage_err("given_name", e))?,
        birth_date: row
            .try_get("birth_date")
            .map_err(|e| storage_err("birth_date", e))?,
        gender: gender.and_then(|g| g.chars().next()),
        document_number: row
            .try_get::<Option<i64>, _>("document_number")
            .map_err(|e| storage_err("document_number", e))?
            .map(DocumentNumber),
        status: parse_enum(
            row.try_get::<String, _>("status")
                .map_err(|e| storage_err("status", e))?
                .as_str(),
        )?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| storage_err("updated_at", e))?,
    })
}

fn row_to_msfaa(row: &sqlx::postgres::PgRow) -> Result<MsfaaAgreement> {
    let sin: String = row.try_get("sin").map_err(|e| storage_err("sin", e))?;
    Ok(MsfaaAgreement {
        id: row.try_get("id").map_err(|e| storage_err("id", e))?,
        sin: Sin::new(&sin).map_err(|e| FixedwireError::Other(anyhow!(e)))?,
        birth_date: row
            .try_get("birth_date")
            .map_err(|e| storage_err("birth_date", e))?,
        last_name: row
            .try_get("last_name")
            .map_err(|e| storage_err("last_name", e))?,
        given_name: row
            .try_get("given_name")
            .map_err(|e| storage_err("given_name", e))?,
        intensity: parse_enum(
            row.try_get::<String, _>("intensity")
                .map_err(|e| storage_err("intensity", e))?
                .as_str(),
        )?,
        msfaa_number: row
            .try_get::<Option<i64>, _>("msfaa_number")
            .map_err(|e| storage_err("msfaa_number", e))?
            .map(DocumentNumber),
        status: parse_enum(
            row.try_get::<String, _>("status")
                .map_err(|e| storage_err("status", e))?
                .as_str(),
        )?,
        status_date: row
            .try_get::<Option<NaiveDate>, _>("status_date")
            .map_err(|e| storage_err("status_date", e))?,
        cancel_reason: row
            .try_get("cancel_reason")
            .map_err(|e| storage_err("cancel_reason", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| storage_err("updated_at", e))?,
    })
}

fn row_to_batch(row: &sqlx::postgres::PgRow) -> Result<Batch> {
    Ok(Batch {
        id: BatchId(row.try_get::<Uuid, _>("id").map_err(|e| storage_err("id", e))?),
        file_type: parse_enum(
            row.try_get::<String, _>("file_type")
                .map_err(|e| storage_err("file_type", e))?
                .as_str(),
        )?,
        sequence_number: row
            .try_get("sequence_number")
            .map_err(|e| storage_err("sequence_number", e))?,
        file_name: row
            .try_get("file_name")
            .map_err(|e| storage_err("file_name", e))?,
        generated_at: row
            .try_get("generated_at")
            .map_err(|e| storage_err("generated_at", e))?,
        record_count: row
            .try_get("record_count")
            .map_err(|e| storage_err("record_count", e))?,
        aggregate_check: row
            .try_get("aggregate_check")
            .map_err(|e| storage_err("aggregate_check", e))?,
    })
}

#[async_trait]
impl SequenceAllocator for PostgresStorage {
    async fn next(&self, sequence_name: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_numbers (name, value)
            VALUES ($1, 1)
            ON CONFLICT (name)
            DO UPDATE SET value = sequence_numbers.value + 1
            RETURNING value
            "#,
        )
        .bind(sequence_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to allocate sequence value", e))?;
        row.try_get("value")
            .map_err(|e| storage_err("Failed to read allocated value", e))
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn pending_disbursements(
        &self,
        intensity: OfferingIntensity,
    ) -> Result<Vec<Disbursement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, intensity, sin, institution_code, award_amount,
                   disbursement_date, student_last_name, student_birth_date,
                   document_number, status, feedback_errors, receipted_amount,
                   updated_at
            FROM disbursements
            WHERE status = 'pending' AND intensity = $1
            ORDER BY updated_at
            "#,
        )
        .bind(intensity.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to list pending disbursements", e))?;
        rows.iter().map(row_to_disbursement).collect()
    }

    async fn pending_sin_checks(&self) -> Result<Vec<SinCheck>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sin, last_name, given_name, birth_date, gender,
                   document_number, status, updated_at
            FROM sin_checks
            WHERE status = 'pending'
            ORDER BY updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to list pending SIN checks", e))?;
        rows.iter().map(row_to_sin_check).collect()
    }

    async fn pending_msfaa_agreements(&self) -> Result<Vec<MsfaaAgreement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sin, birth_date, last_name, given_name, intensity,
                   msfaa_number, status, status_date, cancel_reason, updated_at
            FROM msfaa_agreements
            WHERE status = 'pending'
            ORDER BY updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to list pending MSFAA agreements", e))?;
        rows.iter().map(row_to_msfaa).collect()
    }

    async fn record_batch(&self, batch: &Batch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batches
                (id, file_type, sequence_number, file_name, generated_at,
                 record_count, aggregate_check)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*batch.id)
        .bind(batch.file_type.to_string())
        .bind(batch.sequence_number)
        .bind(&batch.file_name)
        .bind(batch.generated_at)
        .bind(batch.record_count)
        .bind(batch.aggregate_check)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to record batch", e))?;
        Ok(())
    }

    async fn list_batches(&self, file_type: Option<FileType>) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_type, sequence_number, file_name, generated_at,
                   record_count, aggregate_check
            FROM batches
            WHERE ($1::TEXT IS NULL OR file_type = $1)
            ORDER BY generated_at
            "#,
        )
        .bind(file_type.map(|f| f.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to list batches", e))?;
        rows.iter().map(row_to_batch).collect()
    }

    async fn mark_disbursement_sent(
        &self,
        id: Uuid,
        document_number: DocumentNumber,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE disbursements
            SET document_number = $2, status = 'sent', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(*document_number)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to mark disbursement sent", e))?;
        Ok(())
    }

    async fn mark_sin_check_sent(&self, id: Uuid, document_number: DocumentNumber) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sin_checks
            SET document_number = $2, status = 'sent', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(*document_number)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to mark SIN check sent", e))?;
        Ok(())
    }

    async fn mark_msfaa_sent(&self, id: Uuid, msfaa_number: DocumentNumber) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE msfaa_agreements
            SET msfaa_number = $2, status = 'sent', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(*msfaa_number)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to mark MSFAA agreement sent", e))?;
        Ok(())
    }

    async fn is_file_processed(&self, file_name: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"SELECT processed FROM feedback_files WHERE file_name = $1"#,
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to query feedback file", e))?;
        match row {
            Some(row) => row
                .try_get("processed")
                .map_err(|e| storage_err("processed", e)),
            None => Ok(false),
        }
    }

    async fn register_feedback_file(
        &self,
        file_name: &str,
        file_type: FileType,
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback_files (file_name, file_type, received_at, processed)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (file_name) DO NOTHING
            "#,
        )
        .bind(file_name)
        .bind(file_type.to_string())
        .bind(received_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to register feedback file", e))?;
        Ok(())
    }

    async fn mark_file_processed(&self, file_name: &str) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE feedback_files SET processed = TRUE WHERE file_name = $1"#,
        )
        .bind(file_name)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to mark feedback file processed", e))?;
        if result.rows_affected() == 0 {
            return Err(FixedwireError::Other(anyhow!(
                "Feedback file '{}' was never registered",
                file_name
            )));
        }
        Ok(())
    }

    async fn apply_disbursement_feedback(
        &self,
        document_number: DocumentNumber,
        error_codes: &[String],
    ) -> Result<()> {
        let status = if error_codes.is_empty() {
            DisbursementStatus::Accepted
        } else {
            DisbursementStatus::Rejected
        };
        let row = sqlx::query(
            r#"
            UPDATE disbursements
            SET status = $2, feedback_errors = $3, updated_at = NOW()
            WHERE document_number = $1
            RETURNING id
            "#,
        )
        .bind(*document_number)
        .bind(status.to_string())
        .bind(error_codes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to apply disbursement feedback", e))?;
        row.map(|_| ())
            .ok_or(FixedwireError::UnknownDocument(document_number))
    }

    async fn apply_receipt(
        &self,
        document_number: DocumentNumber,
        _funding_type: FundingType,
        amount: Money,
    ) -> Result<()> {
        let row = sqlx::query(
            r#"
            UPDATE disbursements
            SET receipted_amount = $2, status = 'receipted', updated_at = NOW()
            WHERE document_number = $1
            RETURNING id
            "#,
        )
        .bind(*document_number)
        .bind(amount.minor())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to apply disbursement receipt", e))?;
        row.map(|_| ())
            .ok_or(FixedwireError::UnknownDocument(document_number))
    }

    async fn apply_sin_status(&self, reference: DocumentNumber, is_valid: bool) -> Result<()> {
        let status = if is_valid {
            SinCheckStatus::Valid
        } else {
            SinCheckStatus::Invalid
        };
        let row = sqlx::query(
            r#"
            UPDATE sin_checks
            SET status = $2, updated_at = NOW()
            WHERE document_number = $1
            RETURNING id
            "#,
        )
        .bind(*reference)
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to apply SIN validation status", e))?;
        row.map(|_| ())
            .ok_or(FixedwireError::UnknownDocument(reference))
    }

    async fn apply_msfaa_response(
        &self,
        msfaa_number: DocumentNumber,
        outcome: &MsfaaOutcome,
    ) -> Result<()> {
        let (status, status_date, cancel_reason) = match outcome {
            MsfaaOutcome::Received { signed_date } => {
                (MsfaaStatus::Signed, *signed_date, None)
            }
            MsfaaOutcome::Cancelled {
                cancel_date,
                reason,
            } => (MsfaaStatus::Cancelled, *cancel_date, Some(reason.clone())),
        };
        let row = sqlx::query(
            r#"
            UPDATE msfaa_agreements
            SET status = $2, status_date = $3, cancel_reason = $4, updated_at = NOW()
            WHERE msfaa_number = $1
            RETURNING id
            "#,
        )
        .bind(*msfaa_number)
        .bind(status.to_string())
        .bind(status_date)
        .bind(cancel_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to apply MSFAA response", e))?;
        row.map(|_| ())
            .ok_or(FixedwireError::UnknownDocument(msfaa_number))
    }

    async fn upsert_restriction(&self, restriction: &Restriction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO restrictions (sin, code, effective_date, received_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sin, code)
            DO UPDATE SET effective_date = EXCLUDED.effective_date,
                          received_at = EXCLUDED.received_at
            "#,
        )
        .bind(restriction.sin.as_str())
        .bind(&restriction.code)
        .bind(restriction.effective_date)
        .bind(restriction.received_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to upsert restriction", e))?;
        Ok(())
    }

    async fn find_disbursement(
        &self,
        document_number: DocumentNumber,
    ) -> Result<Option<Disbursement>> {
        let row = sqlx::query(
            r#"
            SELECT id, intensity, sin, institution_code, award_amount,
                   disbursement_date, student_last_name, student_birth_date,
                   document_number, status, feedback_errors, receipted_amount,
                   updated_at
            FROM disbursements
            WHERE document_number = $1
            "#,
        )
        .bind(*document_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to find disbursement", e))?;
        row.as_ref().map(row_to_disbursement).transpose()
    }
}
