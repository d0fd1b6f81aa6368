//! Federal restriction record schema (inbound only): restrictions declared by
//! the federal system against individual identifiers, imported into domain
//! state. Matching is by SIN; this exchange carries no document numbers.
//!
//! Column map (2-character record codes, [`LINE_LENGTH`] = 60):
//! - Header `RH`: 0..2 code | 2..10 file date | filler
//! - Detail `RD`: 0..2 code | 2..11 SIN | 11..15 restriction code
//!   | 15..23 effective date | filler
//! - Footer `RT`: 0..2 code | 2..8 record count | filler

use chrono::NaiveDate;

use crate::codec::{LineBuilder, LineReader};
use crate::domain::Sin;
use crate::error::Result;
use crate::schema::ecert::parse_sin;

pub const LINE_LENGTH: usize = 60;

pub const HEADER_CODE: &str = "RH";
pub const DETAIL_CODE: &str = "RD";
pub const FOOTER_CODE: &str = "RT";

/// Restriction file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionHeader {
    pub file_date: NaiveDate,
}

impl RestrictionHeader {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", HEADER_CODE, 2, ' ')?
            .date("file_date", self.file_date, 8)?
            .filler(' ', 50)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 2, HEADER_CODE)?;
        Ok(Self {
            file_date: reader.date("file_date", 2, 10)?,
        })
    }
}

/// Restriction detail: one restriction declared against a SIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionDetail {
    pub sin: Sin,
    pub restriction_code: String,
    pub effective_date: NaiveDate,
}

impl RestrictionDetail {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", DETAIL_CODE, 2, ' ')?
            .start_filled("sin", self.sin.as_str(), 9, '0')?
            .end_filled("restriction_code", &self.restriction_code, 4, ' ')?
            .date("effective_date", self.effective_date, 8)?
            .filler(' ', 37)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 2, DETAIL_CODE)?;
        Ok(Self {
            sin: parse_sin(&reader, 2, 11)?,
            restriction_code: reader.text(11, 15),
            effective_date: reader.date("effective_date", 15, 23)?,
        })
    }
}

/// Restriction file footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionFooter {
    pub record_count: i64,
}

impl RestrictionFooter {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", FOOTER_CODE, 2, ' ')?
            .digits("record_count", self.record_count, 6)?
            .filler(' ', 52)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 2, FOOTER_CODE)?;
        Ok(Self {
            record_count: reader.digits("record_count", 2, 8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_round_trips_and_is_exact_width() {
        let detail = RestrictionDetail {
            sin: Sin::new("130692544").unwrap(),
            restriction_code: "B2".to_string(),
            effective_date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        };
        let line = detail.to_line().unwrap();
        assert_eq!(line.len(), LINE_LENGTH);
        assert_eq!(RestrictionDetail::from_line(&line).unwrap(), detail);
    }

    #[test]
    fn short_restriction_code_is_space_filled_not_omitted() {
        let line = RestrictionDetail {
            sin: Sin::new("130692544").unwrap(),
            restriction_code: "B2".to_string(),
            effective_date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        }
        .to_line()
        .unwrap();
        assert_eq!(&line[11..15], "B2  ");
    }

    #[test]
    fn header_and_footer_round_trip() {
        let header = RestrictionHeader {
            file_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        };
        let line = header.to_line().unwrap();
        assert_eq!(RestrictionHeader::from_line(&line).unwrap(), header);

        let footer = RestrictionFooter { record_count: 12 };
        let line = footer.to_line().unwrap();
        assert_eq!(RestrictionFooter::from_line(&line).unwrap(), footer);
    }
}
