//! Fixed-width codec primitives.
//!
//! This module converts typed values to and from exact-width text columns.
//! `LineBuilder` produces a line column by column; `LineReader` extracts typed
//! values from fixed character offsets. Both refuse to truncate: a value that
//! does not fit its column is an error, and a line whose length differs from
//! the schema's documented total is rejected outright.
//!
//! Monetary values never touch floating point. [`Money`] holds an i64 amount in
//! minor units (cents) and encodes as an unscaled, zero-padded digit string
//! with an implied number of decimal places.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FixedwireError, Result};

/// Date format used by every exchanged file type.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Time-of-day format used in file headers.
pub const TIME_FORMAT: &str = "%H%M%S";

/// Implied decimal places for monetary columns.
pub const MONEY_DECIMALS: u32 = 2;

/// An exact monetary amount in minor units (cents).
///
/// Encoded as an unscaled integer with [`MONEY_DECIMALS`] implied decimal
/// places: `Money::from_minor(123456)` displays as `1234.56` and serializes
/// into a 9-wide column as `"000123456"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Create from an amount already expressed in minor units.
    pub fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Amount in minor units (the unscaled encoded value).
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Checked sum, for footer aggregates over a serialized record set.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10i64.pow(MONEY_DECIMALS);
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / scale as u64,
            abs % scale as u64
        )
    }
}

impl FromStr for Money {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if frac.len() > MONEY_DECIMALS as usize {
            return Err(format!("too many decimal places in '{}'", s));
        }
        let whole: i64 = whole
            .parse()
            .map_err(|_| format!("invalid amount '{}'", s))?;
        let mut frac_minor = 0i64;
        if !frac.is_empty() {
            frac_minor = frac
                .parse()
                .map_err(|_| format!("invalid amount '{}'", s))?;
            frac_minor *= 10i64.pow(MONEY_DECIMALS - frac.len() as u32);
        }
        Ok(Money(sign * (whole * 10i64.pow(MONEY_DECIMALS) + frac_minor)))
    }
}

/// Builds a fixed-width line column by column.
///
/// Call `finish(expected_len)` to obtain the line; it fails unless the built
/// line is exactly the documented total width, which catches schema drift at
/// the point of encoding rather than at the receiving system.
#[derive(Debug, Default)]
pub struct LineBuilder {
    buf: String,
}

impl LineBuilder {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Right-align `value`, left-padding with `fill` to exactly `width` chars.
    ///
    /// Fails if the unpadded value already exceeds `width`.
    pub fn start_filled(
        mut self,
        field: &'static str,
        value: &str,
        width: usize,
        fill: char,
    ) -> Result<Self> {
        let len = value.chars().count();
        if len > width {
            return Err(FixedwireError::FieldTooWide {
                field,
                value: value.to_string(),
                width,
            });
        }
        for _ in len..width {
            self.buf.push(fill);
        }
        self.buf.push_str(value);
        Ok(self)
    }

    /// Left-align `value`, right-padding with `fill` to exactly `width` chars.
    pub fn end_filled(
        mut self,
        field: &'static str,
        value: &str,
        width: usize,
        fill: char,
    ) -> Result<Self> {
        let len = value.chars().count();
        if len > width {
            return Err(FixedwireError::FieldTooWide {
                field,
                value: value.to_string(),
                width,
            });
        }
        self.buf.push_str(value);
        for _ in len..width {
            self.buf.push(fill);
        }
        Ok(self)
    }

    /// Emit a filler run, used for reserved and trailing space blocks.
    pub fn filler(mut self, fill: char, count: usize) -> Self {
        for _ in 0..count {
            self.buf.push(fill);
        }
        self
    }

    /// Zero-padded unsigned integer column.
    pub fn digits(self, field: &'static str, value: i64, width: usize) -> Result<Self> {
        if value < 0 {
            return Err(FixedwireError::InvalidField {
                field,
                reason: format!("negative value {} in digit column", value),
            });
        }
        self.start_filled(field, &value.to_string(), width, '0')
    }

    /// Monetary column: unscaled minor units, zero-padded.
    pub fn money(self, field: &'static str, value: Money, width: usize) -> Result<Self> {
        if value.minor() < 0 {
            return Err(FixedwireError::InvalidField {
                field,
                reason: format!("negative amount {} in money column", value),
            });
        }
        self.start_filled(field, &value.minor().to_string(), width, '0')
    }

    /// Date column in [`DATE_FORMAT`].
    pub fn date(self, field: &'static str, value: NaiveDate, width: usize) -> Result<Self> {
        self.start_filled(field, &value.format(DATE_FORMAT).to_string(), width, '0')
    }

    /// Finish the line, validating the documented total width.
    pub fn finish(self, expected_len: usize) -> Result<String> {
        let actual = self.buf.chars().count();
        if actual != expected_len {
            return Err(FixedwireError::LineLength {
                expected: expected_len,
                actual,
            });
        }
        Ok(self.buf)
    }
}

/// Reads typed values from fixed character offsets of one line.
///
/// Construction rejects (never silently truncates) a line whose length does
/// not match the expected total. Offsets are 0-based, half-open char ranges.
pub struct LineReader<'a> {
    chars: Vec<char>,
    line: &'a str,
}

impl<'a> LineReader<'a> {
    pub fn new(line: &'a str, expected_len: usize) -> Result<Self> {
        let chars: Vec<char> = line.chars().collect();
        if chars.len() != expected_len {
            return Err(FixedwireError::LineLength {
                expected: expected_len,
                actual: chars.len(),
            });
        }
        Ok(Self { chars, line })
    }

    /// Raw column content, filler included.
    pub fn raw(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    /// Text column with trailing space filler trimmed.
    pub fn text(&self, start: usize, end: usize) -> String {
        self.raw(start, end).trim_end().to_string()
    }

    /// Validate the record-type code at a fixed leading column range.
    pub fn code(&self, start: usize, end: usize, expected: &'static str) -> Result<()> {
        let actual = self.raw(start, end);
        if actual != expected {
            return Err(FixedwireError::RecordCode { expected, actual });
        }
        Ok(())
    }

    /// Zero-padded integer column.
    pub fn digits(&self, field: &'static str, start: usize, end: usize) -> Result<i64> {
        let raw = self.raw(start, end);
        raw.parse().map_err(|_| FixedwireError::InvalidField {
            field,
            reason: format!("'{}' is not a number", raw),
        })
    }

    /// Monetary column: unscaled minor units with implied decimal places.
    pub fn money(&self, field: &'static str, start: usize, end: usize) -> Result<Money> {
        Ok(Money::from_minor(self.digits(field, start, end)?))
    }

    /// Date column in [`DATE_FORMAT`].
    pub fn date(&self, field: &'static str, start: usize, end: usize) -> Result<NaiveDate> {
        let raw = self.raw(start, end);
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|_| FixedwireError::InvalidField {
            field,
            reason: format!("'{}' is not a {} date", raw, DATE_FORMAT),
        })
    }

    /// The whole underlying line, for error reporting.
    pub fn line(&self) -> &str {
        self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_filled_right_aligns() {
        let line = LineBuilder::new()
            .start_filled("seq", "42", 5, '0')
            .unwrap()
            .finish(5)
            .unwrap();
        assert_eq!(line, "00042");
    }

    #[test]
    fn end_filled_left_aligns() {
        let line = LineBuilder::new()
            .end_filled("name", "DOE", 6, ' ')
            .unwrap()
            .finish(6)
            .unwrap();
        assert_eq!(line, "DOE   ");
    }

    #[test]
    fn overflow_is_an_error_not_a_truncation() {
        let err = LineBuilder::new()
            .start_filled("seq", "123456", 5, '0')
            .unwrap_err();
        assert!(matches!(
            err,
            FixedwireError::FieldTooWide { width: 5, .. }
        ));
    }

    #[test]
    fn finish_rejects_wrong_total_width() {
        let err = LineBuilder::new().filler(' ', 9).finish(10).unwrap_err();
        assert!(matches!(
            err,
            FixedwireError::LineLength {
                expected: 10,
                actual: 9
            }
        ));
    }

    #[test]
    fn reader_rejects_wrong_length_line() {
        assert!(LineReader::new("abc", 4).is_err());
    }

    #[test]
    fn reader_rejects_code_mismatch() {
        let reader = LineReader::new("200x", 4).unwrap();
        let err = reader.code(0, 3, "100").unwrap_err();
        assert!(matches!(err, FixedwireError::RecordCode { .. }));
    }

    #[test]
    fn money_encodes_unscaled_with_implied_decimals() {
        let amount: Money = "1234.56".parse().unwrap();
        let line = LineBuilder::new()
            .money("amount", amount, 9)
            .unwrap()
            .finish(9)
            .unwrap();
        assert_eq!(line, "000123456");

        let reader = LineReader::new(&line, 9).unwrap();
        let decoded = reader.money("amount", 0, 9).unwrap();
        assert_eq!(decoded, amount);
        assert_eq!(decoded.to_string(), "1234.56");
    }

    #[test]
    fn money_parse_handles_whole_and_single_decimal() {
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_minor(1200));
        assert_eq!("12.5".parse::<Money>().unwrap(), Money::from_minor(1250));
        assert_eq!("0.07".parse::<Money>().unwrap(), Money::from_minor(7));
        assert!("1.234".parse::<Money>().is_err());
    }

    #[test]
    fn text_trims_trailing_filler_only() {
        let reader = LineReader::new("AB  ", 4).unwrap();
        assert_eq!(reader.text(0, 4), "AB");
        assert_eq!(reader.raw(0, 4), "AB  ");
    }
}
