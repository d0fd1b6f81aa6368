//! Disbursement receipt record schema (inbound only): the external system's
//! confirmation of funds released against previously certified disbursements.
//!
//! This exchange uses single-character record codes. All lines are exactly
//! [`LINE_LENGTH`] characters.
//!
//! Column map:
//! - Header `H`: 0..1 code | 1..9 batch date | filler
//! - Detail `D`: 0..1 code | 1..10 document number | 10..12 funding type
//!   | 12..21 amount (2 implied decimals) | filler
//! - Footer `T`: 0..1 code | 1..7 record count | 7..22 total amount | filler

use chrono::NaiveDate;

use crate::codec::{LineBuilder, LineReader, Money};
use crate::domain::{DocumentNumber, FundingType};
use crate::error::{FixedwireError, Result};

pub const LINE_LENGTH: usize = 80;

pub const HEADER_CODE: &str = "H";
pub const DETAIL_CODE: &str = "D";
pub const FOOTER_CODE: &str = "T";

/// Receipt file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHeader {
    pub batch_date: NaiveDate,
}

impl ReceiptHeader {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", HEADER_CODE, 1, ' ')?
            .date("batch_date", self.batch_date, 8)?
            .filler(' ', 71)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 1, HEADER_CODE)?;
        Ok(Self {
            batch_date: reader.date("batch_date", 1, 9)?,
        })
    }
}

/// Receipt detail: funds confirmed against one certified disbursement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptDetail {
    pub document_number: DocumentNumber,
    pub funding_type: FundingType,
    pub amount: Money,
}

impl ReceiptDetail {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", DETAIL_CODE, 1, ' ')?
            .digits("document_number", *self.document_number, 9)?
            .end_filled("funding_type", self.funding_type.code(), 2, ' ')?
            .money("amount", self.amount, 9)?
            .filler(' ', 59)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 1, DETAIL_CODE)?;
        let funding_raw = reader.raw(10, 12);
        let funding_type = FundingType::from_code(&funding_raw).map_err(|reason| {
            FixedwireError::InvalidField {
                field: "funding_type",
                reason,
            }
        })?;
        Ok(Self {
            document_number: DocumentNumber(reader.digits("document_number", 1, 10)?),
            funding_type,
            amount: reader.money("amount", 12, 21)?,
        })
    }
}

/// Receipt file footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptFooter {
    pub record_count: i64,
    pub total_amount: Money,
}

impl ReceiptFooter {
    pub fn to_line(&self) -> Result<String> {
        LineBuilder::new()
            .end_filled("record_code", FOOTER_CODE, 1, ' ')?
            .digits("record_count", self.record_count, 6)?
            .money("total_amount", self.total_amount, 15)?
            .filler(' ', 58)
            .finish(LINE_LENGTH)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let reader = LineReader::new(line, LINE_LENGTH)?;
        reader.code(0, 1, FOOTER_CODE)?;
        Ok(Self {
            record_count: reader.digits("record_count", 1, 7)?,
            total_amount: reader.money("total_amount", 7, 22)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_round_trips_both_funding_types() {
        for funding_type in [FundingType::Federal, FundingType::Provincial] {
            let detail = ReceiptDetail {
                document_number: DocumentNumber(1001),
                funding_type,
                amount: "250.00".parse().unwrap(),
            };
            let line = detail.to_line().unwrap();
            assert_eq!(line.len(), LINE_LENGTH);
            assert_eq!(ReceiptDetail::from_line(&line).unwrap(), detail);
        }
    }

    #[test]
    fn detail_rejects_unknown_funding_code() {
        let mut line = ReceiptDetail {
            document_number: DocumentNumber(1001),
            funding_type: FundingType::Federal,
            amount: Money::ZERO,
        }
        .to_line()
        .unwrap();
        line.replace_range(10..12, "XX");
        assert!(ReceiptDetail::from_line(&line).is_err());
    }

    #[test]
    fn header_and_footer_round_trip() {
        let header = ReceiptHeader {
            batch_date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
        };
        let line = header.to_line().unwrap();
        assert_eq!(line.len(), LINE_LENGTH);
        assert_eq!(ReceiptHeader::from_line(&line).unwrap(), header);

        let footer = ReceiptFooter {
            record_count: 2,
            total_amount: "500.00".parse().unwrap(),
        };
        let line = footer.to_line().unwrap();
        assert_eq!(line.len(), LINE_LENGTH);
        assert_eq!(ReceiptFooter::from_line(&line).unwrap(), footer);
    }
}
