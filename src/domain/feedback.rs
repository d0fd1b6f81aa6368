//! Feedback file state machine using the typestate pattern.
//!
//! An inbound feedback/response file moves through
//! `FeedbackFile<Received> -> parse() -> FeedbackFile<Parsed> -> apply() ->
//! FeedbackFile<Completed> | FeedbackFile<PartiallyFailed>`, with each state a
//! distinct type so that e.g. lines cannot be applied before the structural
//! guard has run.
//!
//! `parse` performs the structural validation: every line must have the
//! documented length and record-type code for the file's schema, the footer's
//! declared record count must match the number of detail lines actually
//! present, and its aggregate (SIN hash total, or amount total for receipts)
//! must match a recount over the decoded details. A structurally corrupt file
//! is rejected wholesale and no domain state is touched.
//!
//! `apply` walks the decoded lines sequentially, applying each outcome through
//! [`Storage`]. A line that fails (unknown document number, storage refusal)
//! is recorded and never rolls back lines already applied.

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::domain::file_type::{FileType, OfferingIntensity};
use crate::error::{FixedwireError, Result};
use crate::schema::ecert::{EcertFeedbackRecord, EcertFooter, EcertHeader};
use crate::schema::msfaa::{MsfaaFooter, MsfaaHeader, MsfaaResponseRecord};
use crate::schema::receipt::{ReceiptDetail, ReceiptFooter, ReceiptHeader};
use crate::schema::restriction::{RestrictionDetail, RestrictionFooter, RestrictionHeader};
use crate::schema::sin_validation::{SinFooter, SinHeader, SinResponseRecord};
use crate::schema::split_frames;
use crate::storage::Storage;

/// Identity of a feedback file, shared by every state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackData {
    pub file_name: String,
    pub file_type: FileType,
    pub received_at: DateTime<Utc>,
}

/// A feedback file in state `S`.
#[derive(Debug, Clone)]
pub struct FeedbackFile<S: FeedbackState> {
    pub data: FeedbackData,
    pub state: S,
}

/// Marker trait for feedback file states.
pub trait FeedbackState: Send {}

/// Downloaded but not yet validated.
#[derive(Debug, Clone)]
pub struct Received;

/// Structurally valid; detail lines decoded and ready to apply.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub lines: Vec<ParsedLine>,
    /// Lines that decoded badly in non-structural ways (e.g. an unparseable
    /// date); they are skipped at apply time and reported.
    pub failures: Vec<LineFailure>,
}

/// Every line applied.
#[derive(Debug, Clone)]
pub struct Completed {
    pub applied: usize,
}

/// Some lines could not be applied; the rest were, and stay applied.
#[derive(Debug, Clone)]
pub struct PartiallyFailed {
    pub applied: usize,
    pub failures: Vec<LineFailure>,
}

impl FeedbackState for Received {}
impl FeedbackState for Parsed {}
impl FeedbackState for Completed {}
impl FeedbackState for PartiallyFailed {}

/// One decoded detail line with its position in the file (1-based, counting
/// the header) for remediation reports.
#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub line_number: usize,
    pub record: FeedbackLine,
}

/// A decoded feedback detail, tagged per schema.
#[derive(Debug, Clone)]
pub enum FeedbackLine {
    Ecert(EcertFeedbackRecord),
    SinResponse(SinResponseRecord),
    MsfaaResponse(MsfaaResponseRecord),
    Receipt(ReceiptDetail),
    Restriction(RestrictionDetail),
}

/// A line that could not be decoded or applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFailure {
    pub line_number: usize,
    pub reason: String,
}

/// Result of applying a parsed feedback file.
pub enum AppliedFeedback {
    Completed(FeedbackFile<Completed>),
    PartiallyFailed(FeedbackFile<PartiallyFailed>),
}

impl FeedbackFile<Received> {
    pub fn new(file_name: String, file_type: FileType, received_at: DateTime<Utc>) -> Self {
        Self {
            data: FeedbackData {
                file_name,
                file_type,
                received_at,
            },
            state: Received,
        }
    }

    /// Validate the file structurally and decode its detail lines.
    ///
    /// Rejects the whole file on any structural error: missing framing, a
    /// wrong-length line, a foreign record-type code, or a footer whose
    /// declared record count or aggregate disagrees with the detail lines
    /// present.
    pub fn parse(self, body: &str) -> Result<FeedbackFile<Parsed>> {
        let (header, details, footer) = split_frames(&self.data.file_name, body)?;

        let (declared, aggregate) = match self.data.file_type {
            FileType::EcertFullTime => {
                self.parse_ecert_frames(&header, &footer, OfferingIntensity::FullTime)?
            }
            FileType::EcertPartTime => {
                self.parse_ecert_frames(&header, &footer, OfferingIntensity::PartTime)?
            }
            FileType::SinValidation => {
                SinHeader::from_line(&header)?;
                let footer = SinFooter::from_line(&footer)?;
                (
                    footer.record_count,
                    Some(("sin_hash_total", footer.sin_hash_total)),
                )
            }
            FileType::Msfaa => {
                MsfaaHeader::from_line(&header)?;
                let footer = MsfaaFooter::from_line(&footer)?;
                (
                    footer.record_count,
                    Some(("sin_hash_total", footer.sin_hash_total)),
                )
            }
            FileType::DisbursementReceipt => {
                ReceiptHeader::from_line(&header)?;
                let footer = ReceiptFooter::from_line(&footer)?;
                (
                    footer.record_count,
                    Some(("total_amount", footer.total_amount.minor())),
                )
            }
            FileType::FederalRestriction => {
                RestrictionHeader::from_line(&header)?;
                (RestrictionFooter::from_line(&footer)?.record_count, None)
            }
        };

        if declared != details.len() as i64 {
            return Err(FixedwireError::FooterMismatch {
                file_name: self.data.file_name.clone(),
                declared,
                actual: details.len() as i64,
            });
        }

        let mut lines = Vec::with_capacity(details.len());
        let mut failures = Vec::new();
        for (index, detail) in details.iter().enumerate() {
            // Header is line 1; details start at line 2.
            let line_number = index + 2;
            match self.decode_detail(detail) {
                Ok(record) => lines.push(ParsedLine {
                    line_number,
                    record,
                }),
                Err(e) if e.is_structural() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        file_name = %self.data.file_name,
                        line_number,
                        error = %e,
                        "Feedback line failed to decode"
                    );
                    failures.push(LineFailure {
                        line_number,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Footer aggregates can only be recounted once every detail decoded;
        // a file with decode failures already reports them per line.
        if failures.is_empty() {
            if let Some((field, declared_total)) = aggregate {
                let actual: i64 = lines
                    .iter()
                    .map(|l| aggregate_contribution(&l.record))
                    .sum();
                if actual != declared_total {
                    return Err(FixedwireError::AggregateMismatch {
                        file_name: self.data.file_name.clone(),
                        field,
                        declared: declared_total,
                        actual,
                    });
                }
            }
        }

        Ok(FeedbackFile {
            data: self.data,
            state: Parsed { lines, failures },
        })
    }

    fn parse_ecert_frames(
        &self,
        header: &str,
        footer: &str,
        intensity: OfferingIntensity,
    ) -> Result<(i64, Option<(&'static str, i64)>)> {
        EcertHeader::from_line(header, intensity)?;
        let footer = EcertFooter::from_line(footer, intensity)?;
        // Feedback details carry no amount column, so only the SIN hash is
        // recountable for e-Cert files.
        Ok((
            footer.record_count,
            Some(("sin_hash_total", footer.sin_hash_total)),
        ))
    }

    fn decode_detail(&self, line: &str) -> Result<FeedbackLine> {
        match self.data.file_type {
            FileType::EcertFullTime => Ok(FeedbackLine::Ecert(EcertFeedbackRecord::from_line(
                line,
                OfferingIntensity::FullTime,
            )?)),
            FileType::EcertPartTime => Ok(FeedbackLine::Ecert(EcertFeedbackRecord::from_line(
                line,
                OfferingIntensity::PartTime,
            )?)),
            FileType::SinValidation => Ok(FeedbackLine::SinResponse(SinResponseRecord::from_line(
                line,
            )?)),
            FileType::Msfaa => Ok(FeedbackLine::MsfaaResponse(MsfaaResponseRecord::from_line(
                line,
            )?)),
            FileType::DisbursementReceipt => {
                Ok(FeedbackLine::Receipt(ReceiptDetail::from_line(line)?))
            }
            FileType::FederalRestriction => Ok(FeedbackLine::Restriction(
                RestrictionDetail::from_line(line)?,
            )),
        }
    }
}

impl FeedbackFile<Parsed> {
    /// Apply every decoded line through storage, sequentially.
    ///
    /// A failing line is recorded and skipped; lines already applied stay
    /// applied. The file completes only if every line (including decode-time
    /// failures carried over from parsing) was applied.
    pub async fn apply<S: Storage + ?Sized>(self, storage: &S) -> AppliedFeedback {
        let mut applied = 0usize;
        let mut failures = self.state.failures.clone();

        for parsed in &self.state.lines {
            match apply_line(storage, &parsed.record).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    counter!(
                        "fixedwire_feedback_lines_failed_total",
                        "file_type" => self.data.file_type.to_string()
                    )
                    .increment(1);
                    tracing::warn!(
                        file_name = %self.data.file_name,
                        line_number = parsed.line_number,
                        error = %e,
                        "Feedback line failed to apply"
                    );
                    failures.push(LineFailure {
                        line_number: parsed.line_number,
                        reason: e.to_string(),
                    });
                }
            }
        }

        counter!(
            "fixedwire_feedback_lines_applied_total",
            "file_type" => self.data.file_type.to_string()
        )
        .increment(applied as u64);

        if failures.is_empty() {
            AppliedFeedback::Completed(FeedbackFile {
                data: self.data,
                state: Completed { applied },
            })
        } else {
            failures.sort_by_key(|f| f.line_number);
            AppliedFeedback::PartiallyFailed(FeedbackFile {
                data: self.data,
                state: PartiallyFailed { applied, failures },
            })
        }
    }
}

/// What one decoded detail contributes to its file's footer aggregate: the
/// 9-digit SIN value for the SIN-hashed exchanges, the amount in minor units
/// for receipts.
fn aggregate_contribution(record: &FeedbackLine) -> i64 {
    match record {
        FeedbackLine::Ecert(rec) => rec.sin.value(),
        FeedbackLine::SinResponse(rec) => rec.sin.value(),
        FeedbackLine::MsfaaResponse(rec) => rec.sin.value(),
        FeedbackLine::Receipt(rec) => rec.amount.minor(),
        FeedbackLine::Restriction(_) => 0,
    }
}

async fn apply_line<S: Storage + ?Sized>(storage: &S, record: &FeedbackLine) -> Result<()> {
    match record {
        FeedbackLine::Ecert(rec) => {
            storage
                .apply_disbursement_feedback(rec.document_number, &rec.error_codes)
                .await
        }
        FeedbackLine::SinResponse(rec) => {
            storage
                .apply_sin_status(rec.reference_index, rec.is_valid)
                .await
        }
        FeedbackLine::MsfaaResponse(rec) => {
            storage
                .apply_msfaa_response(rec.msfaa_number, &rec.outcome)
                .await
        }
        FeedbackLine::Receipt(rec) => {
            storage
                .apply_receipt(rec.document_number, rec.funding_type, rec.amount)
                .await
        }
        FeedbackLine::Restriction(rec) => {
            storage
                .upsert_restriction(&crate::domain::Restriction {
                    sin: rec.sin.clone(),
                    code: rec.restriction_code.clone(),
                    effective_date: rec.effective_date,
                    received_at: Utc::now(),
                })
                .await
        }
    }
}
