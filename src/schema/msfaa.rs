//! MSFAA record schema: master student financial-aid agreement requests sent
//! to the federal system and the signed/cancelled response records returned.
//!
//! Column map (all lines exactly [`LINE_LENGTH`] characters):
//! - Header `100`:  0..3 code | 3..11 date | 11..17 time | 17..26 sequence | filler
//! - Request `200`: 0..3 code | 3..13 MSFAA number | 13..22 SIN | 22..30 birth date
//!   | 30..55 last name | 55..70 given name | 70..72 offering intensity | filler
//! - Response `300`: 0..3 code | 3..13 MSFAA number | 13..22 SIN | 22..23 status
//!   | 23..31 status date | 31..51 cancel reason | filler
//! - Footer `999`:  0..3 code | 3..12 record count | 12..27 SIN hash total | filler

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::{LineBuilder, LineReader, TIME_FORMAT};
use crate::domain::{DocumentNumber, OfferingIntensity, Sin};
use crate::error::{FixedwireError, Result};
use crate::schema::ecert::parse_sin;

pub const LINE_LENGTH: usize = 90;

pub const HEADER_CODE: &str = "100";
pub const REQUEST_CODE: &str = "200";
pub const RESPONSE_CODE: &str = "300";
pub const FOOTER_CODE: &str = "999";

/// MSFAA file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsfaaHeader {
    pub created: NaiveDateTime,
    pub sequence: i64,
}

impl MsfaaHeader {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", HEADER_CODE, 3, ' ')?
            .date("creation_date", self.created.date(), 8)?
            .start_filled(
                "creation_time",
                &self.created.format(TIME_FORMAT).to_string(),
                6,
                '0',
            )?
            .digits("sequence", self.sequence, 9)?
            .filler(' ', 64)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, HEADER_CODE)?;
        let date = reader.date("creation_date", 3, 11)?;
        let time_raw = reader.raw(11, 17);
        let time = NaiveTime::parse_from_str(&time_raw, TIME_FORMAT).map_err(|_| {
            FixedwireError::InvalidField {
                field: "creation_time",
                reason: format!("'{}' is not a {} time", time_raw, TIME_FORMAT),
            }
        })?;
        Ok(Self {
            created: date.and_time(time),
            sequence: reader.digits("sequence", 17, 26)?,
        })
    }
}

/// Outbound MSFAA request detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsfaaRequestRecord {
    /// Allocated MSFAA number correlating the eventual response.
    pub msfaa_number: DocumentNumber,
    pub sin: Sin,
    pub birth_date: NaiveDate,
    pub last_name: String,
    pub given_name: String,
    pub intensity: OfferingIntensity,
}

impl MsfaaRequestRecord {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", REQUEST_CODE, 3, ' ')?
            .digits("msfaa_number", *self.msfaa_number, 10)?
            .start_filled("sin", self.sin.as_str(), 9, '0')?
            .date("birth_date", self.birth_date, 8)?
            .end_filled("last_name", &self.last_name, 25, ' ')?
            .end_filled("given_name", &self.given_name, 15, ' ')?
            .end_filled("intensity", &self.intensity.to_string(), 2, ' ')?
            .filler(' ', 18)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, REQUEST_CODE)?;
        let intensity_raw = reader.raw(70, 72);
        let intensity =
            intensity_raw
                .parse::<OfferingIntensity>()
                .map_err(|reason| FixedwireError::InvalidField {
                    field: "intensity",
                    reason,
                })?;
        Ok(Self {
            msfaa_number: DocumentNumber(reader.digits("msfaa_number", 3, 13)?),
            sin: parse_sin(&reader, 13, 22)?,
            birth_date: reader.date("birth_date", 22, 30)?,
            last_name: reader.text(30, 55),
            given_name: reader.text(55, 70),
            intensity,
        })
    }
}

/// Outcome reported by an MSFAA response detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsfaaOutcome {
    /// Agreement received and signed on the given date.
    Received { signed_date: NaiveDate },
    /// Agreement cancelled on the given date with a reason.
    Cancelled {
        cancel_date: NaiveDate,
        reason: String,
    },
}

/// Inbound MSFAA response detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsfaaResponseRecord {
    pub msfaa_number: DocumentNumber,
    pub sin: Sin,
    pub outcome: MsfaaOutcome,
}

impl MsfaaResponseRecord {
    pub fn to_line(&self) -> Result<String> {
        let (status, date, reason) = match &self.outcome {
            MsfaaOutcome::Received { signed_date } => ('R', *signed_date, ""),
            MsfaaOutcome::Cancelled {
                cancel_date,
                reason,
            } => ('C', *cancel_date, reason.as_str()),
        };
        LineBuilder::new()
            .end_filled("record_code", RESPONSE_CODE, 3, ' ')?
            .digits("msfaa_number", *self.msfaa_number, 10)?
            .start_filled("sin", self.sin.as_str(), 9, '0')?
            .end_filled("status", &status.to_string(), 1, ' ')?
            .date("status_date", date, 8)?
            .end_filled("cancel_reason", reason, 20, ' ')?
            .filler(' ', 39)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, RESPONSE_CODE)?;
        let status = reader.raw(22, 23).chars().next().unwrap_or(' ');
        let date = reader.date("status_date", 23, 31)?;
        let outcome = match status {
            'R' => MsfaaOutcome::Received { signed_date: date },
            'C' => MsfaaOutcome::Cancelled {
                cancel_date: date,
                reason: reader.text(31, 51),
            },
            other => {
                return Err(FixedwireError::InvalidField {
                    field: "status",
                    reason: format!("'{}' is not a known MSFAA response status", other),
                });
            }
        };
        Ok(Self {
            msfaa_number: DocumentNumber(reader.digits("msfaa_number", 3, 13)?),
            sin: parse_sin(&reader, 13, 22)?,
            outcome,
        })
    }
}

/// MSFAA file footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsfaaFooter {
    pub record_count: i64,
    pub sin_hash_total: i64,
}

impl MsfaaFooter {
    pub fn compute_over(sins: impl Iterator<Item = i64>) -> Self {
        let mut count = 0i64;
        let mut total = 0i64;
        for value in sins {
            count += 1;
            total += value;
        }
        Self {
            record_count: count,
            sin_hash_total: total,
        }
    }

    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", FOOTER_CODE, 3, ' ')?
            .digits("record_count", self.record_count, 9)?
            .digits("sin_hash_total", self.sin_hash_total, 15)?
            .filler(' ', 63)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, FOOTER_CODE)?;
        Ok(Self {
            record_count: reader.digits("record_count", 3, 12)?,
            sin_hash_total: reader.digits("sin_hash_total", 12, 27)?,
        })
    }
}
