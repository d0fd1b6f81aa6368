//! e-Cert record schema: certification files authorizing release of
//! disbursement funds, full-time and part-time variants.
//!
//! The two variants share one column map and differ only in their record-type
//! codes, dispatched by [`OfferingIntensity`]. All lines are exactly
//! [`LINE_LENGTH`] characters.
//!
//! Column map (0-based, half-open):
//! - Header:  0..3 code | 3..4 env | 4..12 date | 12..18 time | 18..27 sequence | filler
//! - Detail:  0..3 code | 3..12 document number | 12..21 SIN | 21..25 institution
//!   | 25..34 amount (2 implied decimals) | 34..42 disbursement date
//!   | 42..50 birth date | 50..75 last name | filler
//! - Feedback detail: 0..3 code | 3..12 document number | 12..21 SIN
//!   | 21..51 error codes 1-3 (10 each) | filler
//! - Footer:  0..3 code | 3..12 record count | 12..27 total amount
//!   | 27..42 SIN hash total | filler

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::{LineBuilder, LineReader, Money, TIME_FORMAT};
use crate::domain::{DocumentNumber, OfferingIntensity, Sin};
use crate::error::{FixedwireError, Result};

/// Total line length for every e-Cert record kind.
pub const LINE_LENGTH: usize = 100;

pub fn header_code(intensity: OfferingIntensity) -> &'static str {
    match intensity {
        OfferingIntensity::FullTime => "100",
        OfferingIntensity::PartTime => "110",
    }
}

pub fn detail_code(intensity: OfferingIntensity) -> &'static str {
    match intensity {
        OfferingIntensity::FullTime => "200",
        OfferingIntensity::PartTime => "210",
    }
}

pub fn feedback_code(intensity: OfferingIntensity) -> &'static str {
    match intensity {
        OfferingIntensity::FullTime => "300",
        OfferingIntensity::PartTime => "310",
    }
}

pub fn footer_code(intensity: OfferingIntensity) -> &'static str {
    match intensity {
        OfferingIntensity::FullTime => "999",
        OfferingIntensity::PartTime => "910",
    }
}

/// e-Cert header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcertHeader {
    pub intensity: OfferingIntensity,
    /// Environment/zone marker, mirroring the file name.
    pub environment: char,
    pub created: NaiveDateTime,
    pub sequence: i64,
}

impl EcertHeader {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", header_code(self.intensity), 3, ' ')?
            .start_filled("environment", &self.environment.to_string(), 1, ' ')?
            .date("creation_date", self.created.date(), 8)?
            .start_filled(
                "creation_time",
                &self.created.format(TIME_FORMAT).to_string(),
                6,
                '0',
            )?
            .digits("sequence", self.sequence, 9)?
            .filler(' ', 73)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str, intensity: OfferingIntensity) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, header_code(intensity))?;
        let environment = reader.raw(3, 4).chars().next().unwrap_or(' ');
        let date = reader.date("creation_date", 4, 12)?;
        let time_raw = reader.raw(12, 18);
        let time = NaiveTime::parse_from_str(&time_raw, TIME_FORMAT).map_err(|_| {
            FixedwireError::InvalidField {
                field: "creation_time",
                reason: format!("'{}' is not a {} time", time_raw, TIME_FORMAT),
            }
        })?;
        Ok(Self {
            intensity,
            environment,
            created: date.and_time(time),
            sequence: reader.digits("sequence", 18, 27)?,
        })
    }
}

/// e-Cert detail record: one per disbursement being certified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcertDetail {
    pub intensity: OfferingIntensity,
    pub document_number: DocumentNumber,
    pub sin: Sin,
    pub institution_code: String,
    pub award_amount: Money,
    pub disbursement_date: NaiveDate,
    pub student_birth_date: NaiveDate,
    pub student_last_name: String,
}

impl EcertDetail {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", detail_code(self.intensity), 3, ' ')?
            .digits("document_number", *self.document_number, 9)?
            .start_filled("sin", self.sin.as_str(), 9, '0')?
            .end_filled("institution_code", &self.institution_code, 4, ' ')?
            .money("award_amount", self.award_amount, 9)?
            .date("disbursement_date", self.disbursement_date, 8)?
            .date("student_birth_date", self.student_birth_date, 8)?
            .end_filled("student_last_name", &self.student_last_name, 25, ' ')?
            .filler(' ', 25)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str, intensity: OfferingIntensity) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, detail_code(intensity))?;
        Ok(Self {
            intensity,
            document_number: DocumentNumber(reader.digits("document_number", 3, 12)?),
            sin: parse_sin(&reader, 12, 21)?,
            institution_code: reader.text(21, 25),
            award_amount: reader.money("award_amount", 25, 34)?,
            disbursement_date: reader.date("disbursement_date", 34, 42)?,
            student_birth_date: reader.date("student_birth_date", 42, 50)?,
            student_last_name: reader.text(50, 75),
        })
    }
}

/// e-Cert feedback detail: the external system's verdict on one previously
/// sent disbursement. No error codes means the record was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcertFeedbackRecord {
    pub intensity: OfferingIntensity,
    pub document_number: DocumentNumber,
    pub sin: Sin,
    /// Up to three error codes; empty when the record was accepted.
    pub error_codes: Vec<String>,
}

impl EcertFeedbackRecord {
    pub fn to_line(&self) -> Result<String> {
        if self.error_codes.len() > 3 {
            return Err(FixedwireError::InvalidField {
                field: "error_codes",
                reason: format!("{} codes exceed the 3 available columns", self.error_codes.len()),
            });
        }
        let mut builder = LineBuilder::new()
            .end_filled("record_code", feedback_code(self.intensity), 3, ' ')?
            .digits("document_number", *self.document_number, 9)?
            .start_filled("sin", self.sin.as_str(), 9, '0')?;
        for slot in 0..3 {
            let code = self.error_codes.get(slot).map(String::as_str).unwrap_or("");
            builder = builder.end_filled("error_code", code, 10, ' ')?;
        }
        builder.filler(' ', 49).finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str, intensity: OfferingIntensity) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, feedback_code(intensity))?;
        let mut error_codes = Vec::new();
        for slot in 0..3 {
            let start = 21 + slot * 10;
            let code = reader.text(start, start + 10);
            if !code.is_empty() {
                error_codes.push(code);
            }
        }
        Ok(Self {
            intensity,
            document_number: DocumentNumber(reader.digits("document_number", 3, 12)?),
            sin: parse_sin(&reader, 12, 21)?,
            error_codes,
        })
    }

    /// Whether the external system accepted the disbursement.
    pub fn is_accepted(&self) -> bool {
        self.error_codes.is_empty()
    }
}

/// e-Cert footer record carrying aggregates over the serialized detail set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcertFooter {
    pub intensity: OfferingIntensity,
    pub record_count: i64,
    pub total_amount: Money,
    /// Arithmetic sum of the 9-digit SIN values of the detail records.
    pub sin_hash_total: i64,
}

impl EcertFooter {
    /// Compute the footer over the actually-serialized detail set.
    ///
    /// Errs when the amount total overflows rather than shipping a footer
    /// that disagrees with its details.
    pub fn compute(intensity: OfferingIntensity, details: &[EcertDetail]) -> Result<Self> {
        let mut total_amount = Money::ZERO;
        for detail in details {
            total_amount = total_amount.checked_add(detail.award_amount).ok_or(
                FixedwireError::InvalidField {
                    field: "total_amount",
                    reason: "amount total overflows the footer column".to_string(),
                },
            )?;
        }
        Ok(Self {
            intensity,
            record_count: details.len() as i64,
            total_amount,
            sin_hash_total: details.iter().map(|d| d.sin.value()).sum(),
        })
    }

    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", footer_code(self.intensity), 3, ' ')?
            .digits("record_count", self.record_count, 9)?
            .money("total_amount", self.total_amount, 15)?
            .digits("sin_hash_total", self.sin_hash_total, 15)?
            .filler(' ', 58)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str, intensity: OfferingIntensity) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, footer_code(intensity))?;
        Ok(Self {
            intensity,
            record_count: reader.digits("record_count", 3, 12)?,
            total_amount: reader.money("total_amount", 12, 27)?,
            sin_hash_total: reader.digits("sin_hash_total", 27, 42)?,
        })
    }
}

pub(crate) fn parse_sin(reader: &LineReader<'_>, start: usize, end: usize) -> Result<Sin> {
    Sin::new(&reader.raw(start, end)).map_err(|reason| FixedwireError::InvalidField {
        field: "sin",
        reason,
    })
}
