//! SIN validation record schema: request files asking the federal system to
//! validate personal identifiers, and the asynchronous response files.
//!
//! Column map (all lines exactly [`LINE_LENGTH`] characters):
//! - Header `001`:  0..3 code | 3..11 date | 11..17 time | 17..26 sequence | filler
//! - Request `002`: 0..3 code | 3..12 reference index | 12..21 SIN
//!   | 21..46 last name | 46..61 given name | 61..69 birth date | 69..70 gender | filler
//! - Response `003`: 0..3 code | 3..12 reference index | 12..21 SIN | 21..22 status | filler
//! - Footer `999`:  0..3 code | 3..12 record count | 12..27 SIN hash total | filler

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::{LineBuilder, LineReader, TIME_FORMAT};
use crate::domain::{DocumentNumber, Sin};
use crate::error::{FixedwireError, Result};
use crate::schema::ecert::parse_sin;

pub const LINE_LENGTH: usize = 90;

pub const HEADER_CODE: &str = "001";
pub const REQUEST_CODE: &str = "002";
pub const RESPONSE_CODE: &str = "003";
pub const FOOTER_CODE: &str = "999";

/// Response status column: `1` means the SIN validated, `2` means it did not.
pub const STATUS_VALID: char = '1';
pub const STATUS_INVALID: char = '2';

/// SIN validation file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinHeader {
    pub created: NaiveDateTime,
    pub sequence: i64,
}

impl SinHeader {
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

/// Outbound SIN validation request detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinRequestRecord {
    /// Allocated document number correlating the eventual response.
    pub reference_index: DocumentNumber,
    pub sin: Sin,
    pub last_name: String,
    pub given_name: String,
    pub birth_date: NaiveDate,
    /// `M`, `F`, or unspecified; encoded as a space when absent.
    pub gender: Option<char>,
}

impl SinRequestRecord {
    pub fn to_line(&self) -> Result<String> {
        let gender = self.gender.unwrap_or(' ');
        LineBuilder::new()
            .end_filled("record_code", REQUEST_CODE, 3, ' ')?
            .digits("reference_index", *self.reference_index, 9)?
            .start_filled("sin", self.sin.as_str(), 9, '0')?
            .end_filled("last_name", &self.last_name, 25, ' ')?
            .end_filled("given_name", &self.given_name, 15, ' ')?
            .date("birth_date", self.birth_date, 8)?
            .end_filled("gender", &gender.to_string(), 1, ' ')?
            .filler(' ', 20)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, REQUEST_CODE)?;
        let gender = match reader.raw(69, 70).chars().next() {
            Some(' ') | None => None,
            Some(c) => Some(c),
        };
        Ok(Self {
            reference_index: DocumentNumber(reader.digits("reference_index", 3, 12)?),
            sin: parse_sin(&reader, 12, 21)?,
            last_name: reader.text(21, 46),
            given_name: reader.text(46, 61),
            birth_date: reader.date("birth_date", 61, 69)?,
            gender,
        })
    }
}

/// Inbound SIN validation response detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinResponseRecord {
    pub reference_index: DocumentNumber,
    pub sin: Sin,
    pub is_valid: bool,
}

impl SinResponseRecord {
    pub fn to_line(&self) -> Result<String> {
        let status = if self.is_valid { STATUS_VALID } else { STATUS_INVALID };
        LineBuilder::new()
            .end_filled("record_code", RESPONSE_CODE, 3, ' ')?
            .digits("reference_index", *self.reference_index, 9)?
            .start_filled("sin", self.sin.as_str(), 9, '0')?
            .end_filled("status", &status.to_string(), 1, ' ')?
            .filler(' ', 68)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 3, RESPONSE_CODE)?;
        let status = reader.raw(21, 22).chars().next().unwrap_or(' ');
        let is_valid = match status {
            STATUS_VALID => true,
            STATUS_INVALID => false,
            other => {
                return Err(FixedwireError::InvalidField {
                    field: "status",
                    reason: format!("'{}' is not a known SIN validation status", other),
                });
            }
        };
        Ok(Self {
            reference_index: DocumentNumber(reader.digits("reference_index", 3, 12)?),
            sin: parse_sin(&reader, 12, 21)?,
            is_valid,
        })
    }
}

/// SIN validation file footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinFooter {
    pub record_count: i64,
    pub sin_hash_total: i64,
}

impl SinFooter {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> SinRequestRecord {
        SinRequestRecord {
            reference_index: DocumentNumber(77),
            sin: Sin::new("046454286").unwrap(),
            last_name: "DOE".to_string(),
            given_name: "JANE".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2001, 12, 31).unwrap(),
            gender: Some('F'),
        }
    }

    #[test]
    fn request_round_trips_and_is_exact_width() {
        let record = sample_request();
        let line = record.to_line().unwrap();
        assert_eq!(line.len(), LINE_LENGTH);
        assert_eq!(SinRequestRecord::from_line(&line).unwrap(), record);
    }

    #[test]
    fn absent_gender_encodes_as_space_filler() {
        let record = SinRequestRecord {
            gender: None,
            ..sample_request()
        };
        let line = record.to_line().unwrap();
        assert_eq!(&line[69..70], " ");
        assert_eq!(SinRequestRecord::from_line(&line).unwrap().gender, None);
    }

    #[test]
    fn response_round_trips_both_statuses() {
        for is_valid in [true, false] {
            let record = SinResponseRecord {
                reference_index: DocumentNumber(77),
                sin: Sin::new("046454286").unwrap(),
                is_valid,
            };
            let line = record.to_line().unwrap();
            assert_eq!(line.len(), LINE_LENGTH);
            assert_eq!(SinResponseRecord::from_line(&line).unwrap(), record);
        }
    }

    #[test]
    fn response_rejects_unknown_status() {
        let mut line = SinResponseRecord {
            reference_index: DocumentNumber(77),
            sin: Sin::new("046454286").unwrap(),
            is_valid: true,
        }
        .to_line()
        .unwrap();
        line.replace_range(21..22, "9");
        assert!(SinResponseRecord::from_line(&line).is_err());
    }

    #[test]
    fn footer_round_trips() {
        let footer = SinFooter::compute_over([46_454_286i64, 130_692_544].into_iter());
        assert_eq!(footer.record_count, 2);
        let line = footer.to_line().unwrap();
        assert_eq!(line.len(), LINE_LENGTH);
        assert_eq!(SinFooter::from_line(&line).unwrap(), footer);
    }

    #[test]
    fn header_round_trips() {
        let header = SinHeader {
            created: NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            sequence: 3,
        };
        let line = header.to_line().unwrap();
        assert_eq!(line.len(), LINE_LENGTH);
        assert_eq!(SinHeader::from_line(&line).unwrap(), header);
    }
}
