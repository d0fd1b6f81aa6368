//! Domain records that flow through the exchanged files.
//!
//! These are the engine's view of the owning domain entities: one struct per
//! exchanged subject (a disbursement, a SIN check, an MSFAA agreement, a
//! restriction) carrying the fixed-width payload fields, the allocated
//! document number, and the status driven by feedback reconciliation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::codec::Money;
use crate::domain::file_type::OfferingIntensity;

/// A document number allocated from a named sequence and embedded in each
/// outbound detail record for correlation with feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentNumber(pub i64);

impl From<i64> for DocumentNumber {
    fn from(value: i64) -> Self {
        DocumentNumber(value)
    }
}

impl std::ops::Deref for DocumentNumber {
    type Target = i64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A government-issued personal identifier: exactly nine digits.
///
/// The numeric value feeds the footer "SIN hash total" aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sin(String);

impl Sin {
    pub fn new(digits: &str) -> Result<Self, String> {
        if digits.len() != 9 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("SIN must be exactly 9 digits, got '{}'", digits));
        }
        Ok(Sin(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, used for footer hash totals.
    pub fn value(&self) -> i64 {
        // Nine ASCII digits always parse.
        self.0.parse().unwrap_or(0)
    }
}

impl fmt::Display for Sin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Sin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sin::new(s)
    }
}

/// Lifecycle of a disbursement through the e-Cert exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisbursementStatus {
    /// Awaiting inclusion in an e-Cert batch.
    Pending,
    /// Serialized into an e-Cert file and uploaded.
    Sent,
    /// Feedback arrived with no error codes.
    Accepted,
    /// Feedback arrived carrying error codes.
    Rejected,
    /// A disbursement receipt confirmed the funds.
    Receipted,
}

impl fmt::Display for DisbursementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisbursementStatus::Pending => "pending",
            DisbursementStatus::Sent => "sent",
            DisbursementStatus::Accepted => "accepted",
            DisbursementStatus::Rejected => "rejected",
            DisbursementStatus::Receipted => "receipted",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DisbursementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DisbursementStatus::Pending),
            "sent" => Ok(DisbursementStatus::Sent),
            "accepted" => Ok(DisbursementStatus::Accepted),
            "rejected" => Ok(DisbursementStatus::Rejected),
            "receipted" => Ok(DisbursementStatus::Receipted),
            _ => Err(format!("Invalid disbursement status: {}", s)),
        }
    }
}

/// A disbursement awaiting or undergoing certification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disbursement {
    pub id: Uuid,
    pub intensity: OfferingIntensity,
    pub sin: Sin,
    pub institution_code: String,
    pub award_amount: Money,
    pub disbursement_date: NaiveDate,
    pub student_last_name: String,
    pub student_birth_date: NaiveDate,
    /// Assigned when the disbursement is serialized into a batch.
    pub document_number: Option<DocumentNumber>,
    pub status: DisbursementStatus,
    /// Error codes reported by the most recent feedback, empty if accepted.
    pub feedback_errors: Vec<String>,
    /// Amount confirmed by a disbursement receipt, if one arrived.
    pub receipted_amount: Option<Money>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a SIN check through the validation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinCheckStatus {
    Pending,
    Sent,
    Valid,
    Invalid,
}

impl fmt::Display for SinCheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SinCheckStatus::Pending => "pending",
            SinCheckStatus::Sent => "sent",
            SinCheckStatus::Valid => "valid",
            SinCheckStatus::Invalid => "invalid",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SinCheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SinCheckStatus::Pending),
            "sent" => Ok(SinCheckStatus::Sent),
            "valid" => Ok(SinCheckStatus::Valid),
            "invalid" => Ok(SinCheckStatus::Invalid),
            _ => Err(format!("Invalid SIN check status: {}", s)),
        }
    }
}

/// A SIN pending validation by the external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinCheck {
    pub id: Uuid,
    pub sin: Sin,
    pub last_name: String,
    pub given_name: String,
    pub birth_date: NaiveDate,
    /// `M`, `F`, or unspecified; encoded as a space when absent.
    pub gender: Option<char>,
    /// Reference index assigned when the check is serialized into a batch.
    pub document_number: Option<DocumentNumber>,
    pub status: SinCheckStatus,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a master student financial-aid agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsfaaStatus {
    Pending,
    Sent,
    Signed,
    Cancelled,
}

impl fmt::Display for MsfaaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MsfaaStatus::Pending => "pending",
            MsfaaStatus::Sent => "sent",
            MsfaaStatus::Signed => "signed",
            MsfaaStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MsfaaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MsfaaStatus::Pending),
            "sent" => Ok(MsfaaStatus::Sent),
            "signed" => Ok(MsfaaStatus::Signed),
            "cancelled" => Ok(MsfaaStatus::Cancelled),
            _ => Err(format!("Invalid MSFAA status: {}", s)),
        }
    }
}

/// A master student financial-aid agreement exchanged with the federal system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsfaaAgreement {
    pub id: Uuid,
    pub sin: Sin,
    pub birth_date: NaiveDate,
    pub last_name: String,
    pub given_name: String,
    pub intensity: OfferingIntensity,
    /// MSFAA number assigned when the agreement is serialized into a batch.
    pub msfaa_number: Option<DocumentNumber>,
    pub status: MsfaaStatus,
    pub status_date: Option<NaiveDate>,
    pub cancel_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Funding source reported by a disbursement receipt detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingType {
    Federal,
    Provincial,
}

impl FundingType {
    pub fn code(&self) -> &'static str {
        match self {
            FundingType::Federal => "FE",
            FundingType::Provincial => "BC",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, String> {
        match code {
            "FE" => Ok(FundingType::Federal),
            "BC" => Ok(FundingType::Provincial),
            _ => Err(format!("Invalid funding type code: {}", code)),
        }
    }
}

/// A restriction imported from the federal restriction file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub sin: Sin,
    pub code: String,
    pub effective_date: NaiveDate,
    pub received_at: DateTime<Utc>,
}
