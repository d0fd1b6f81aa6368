//! Record schemas for the exchanged file types.
//!
//! One module per file type. Each defines the record-type code constants, the
//! fixed column map for its header/detail/footer records, and `to_line` /
//! `from_line` operations validated against the documented total line length.
//! Optional fields absent in the domain model encode as filler (spaces or
//! zeros per field convention), never omitted: column positions are fixed.

use anyhow::anyhow;

use crate::error::{FixedwireError, Result};

pub mod ecert;
pub mod msfaa;
pub mod receipt;
pub mod restriction;
pub mod sin_validation;

/// Split a file body into its header line, detail lines, and footer line.
///
/// Every exchanged file frames its details with exactly one header and one
/// footer; a body with fewer than two lines is structurally corrupt.
pub(crate) fn split_frames(file_name: &str, body: &str) -> Result<(String, Vec<String>, String)> {
    let mut lines: Vec<String> = body.lines().map(|l| l.to_string()).collect();
    if lines.len() < 2 {
        return Err(FixedwireError::MalformedFile {
            file_name: file_name.to_string(),
            reason: format!("expected header and footer, found {} line(s)", lines.len()),
        });
    }
    let footer = lines.pop().ok_or_else(|| anyhow!("unreachable: len >= 2"))?;
    let header = lines.remove(0);
    Ok((header, lines, footer))
}

/// Assemble a file body from serialized header, detail, and footer lines.
///
/// Lines are newline-terminated, including the footer, matching the layouts
/// published for the receiving systems.
pub(crate) fn join_frames(header: String, details: &[String], footer: String) -> String {
    let mut body = String::with_capacity(header.len() * (details.len() + 2) + details.len() + 2);
    body.push_str(&header);
    body.push('\n');
    for line in details {
        body.push_str(line);
        body.push('\n');
    }
    body.push_str(&footer);
    body.push('\n');
    body
}
