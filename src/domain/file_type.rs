//! Exchanged file types, environment markers, and deterministic file naming.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Study intensity, distinguishing the full-time and part-time e-Cert and
/// MSFAA exchanges. Drives record-type codes and sequence names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferingIntensity {
    FullTime,
    PartTime,
}

impl fmt::Display for OfferingIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferingIntensity::FullTime => write!(f, "FT"),
            OfferingIntensity::PartTime => write!(f, "PT"),
        }
    }
}

impl FromStr for OfferingIntensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FT" => Ok(OfferingIntensity::FullTime),
            "PT" => Ok(OfferingIntensity::PartTime),
            _ => Err(format!("Invalid offering intensity: {}", s)),
        }
    }
}

/// Environment/zone marker embedded in outbound file names so that files from
/// test and production zones can never be confused by the receiving system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentCode {
    Production,
    Test,
}

impl EnvironmentCode {
    pub fn marker(&self) -> char {
        match self {
            EnvironmentCode::Production => 'P',
            EnvironmentCode::Test => 'T',
        }
    }
}

/// The file types exchanged with the external government systems.
///
/// e-Cert, SIN validation, and MSFAA files flow outbound (with inbound
/// feedback/response counterparts); disbursement receipts and federal
/// restrictions are inbound only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    EcertFullTime,
    EcertPartTime,
    SinValidation,
    Msfaa,
    DisbursementReceipt,
    FederalRestriction,
}

impl FileType {
    /// All outbound file types, in daemon scheduling order.
    pub const OUTBOUND: [FileType; 4] = [
        FileType::EcertFullTime,
        FileType::EcertPartTime,
        FileType::SinValidation,
        FileType::Msfaa,
    ];

    /// Sequence name keying the document-number counter for this file type.
    pub fn sequence_name(&self) -> &'static str {
        match self {
            FileType::EcertFullTime => "ecert-ft",
            FileType::EcertPartTime => "ecert-pt",
            FileType::SinValidation => "sin-validation",
            FileType::Msfaa => "msfaa",
            FileType::DisbursementReceipt => "disbursement-receipt",
            FileType::FederalRestriction => "federal-restriction",
        }
    }

    /// Sequence name for the per-type batch (file) sequence.
    pub fn batch_sequence_name(&self) -> String {
        format!("{}-batch", self.sequence_name())
    }

    /// Outbound file name tag.
    fn tag(&self) -> &'static str {
        match self {
            FileType::EcertFullTime => "ECERT.FT",
            FileType::EcertPartTime => "ECERT.PT",
            FileType::SinValidation => "SINREQ",
            FileType::Msfaa => "MSFAAREQ",
            FileType::DisbursementReceipt => "RECEIPT",
            FileType::FederalRestriction => "RESTRICT",
        }
    }

    /// Deterministic outbound file name: environment marker, type tag,
    /// generation date, and batch sequence, unique across runs and readable
    /// for manual audit.
    pub fn outbound_file_name(
        &self,
        env: EnvironmentCode,
        date: NaiveDate,
        sequence: i64,
    ) -> String {
        format!(
            "{}BC.EDU.{}.{}.{:03}",
            env.marker(),
            self.tag(),
            date.format("%Y%m%d"),
            sequence
        )
    }

    /// Detect an inbound file's type from its published name tag.
    pub fn from_inbound_name(file_name: &str) -> Option<FileType> {
        if file_name.contains("ECERT.FT.FB") {
            Some(FileType::EcertFullTime)
        } else if file_name.contains("ECERT.PT.FB") {
            Some(FileType::EcertPartTime)
        } else if file_name.contains("SIN.RESP") {
            Some(FileType::SinValidation)
        } else if file_name.contains("MSFAA.RESP") {
            Some(FileType::Msfaa)
        } else if file_name.contains("RECEIPT") {
            Some(FileType::DisbursementReceipt)
        } else if file_name.contains("RESTRICT") {
            Some(FileType::FederalRestriction)
        } else {
            None
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::EcertFullTime => write!(f, "ecert_full_time"),
            FileType::EcertPartTime => write!(f, "ecert_part_time"),
            FileType::SinValidation => write!(f, "sin_validation"),
            FileType::Msfaa => write!(f, "msfaa"),
            FileType::DisbursementReceipt => write!(f, "disbursement_receipt"),
            FileType::FederalRestriction => write!(f, "federal_restriction"),
        }
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecert_full_time" => Ok(FileType::EcertFullTime),
            "ecert_part_time" => Ok(FileType::EcertPartTime),
            "sin_validation" => Ok(FileType::SinValidation),
            "msfaa" => Ok(FileType::Msfaa),
            "disbursement_receipt" => Ok(FileType::DisbursementReceipt),
            "federal_restriction" => Ok(FileType::FederalRestriction),
            _ => Err(format!("Invalid file type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_file_name_is_deterministic_and_audit_readable() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let name = FileType::EcertFullTime.outbound_file_name(EnvironmentCode::Production, date, 42);
        assert_eq!(name, "PBC.EDU.ECERT.FT.20240315.042");

        let name = FileType::SinValidation.outbound_file_name(EnvironmentCode::Test, date, 7);
        assert_eq!(name, "TBC.EDU.SINREQ.20240315.007");
    }

    #[test]
    fn inbound_name_detection() {
        assert_eq!(
            FileType::from_inbound_name("PBC.EDU.ECERT.FT.FB.20240316.001"),
            Some(FileType::EcertFullTime)
        );
        assert_eq!(
            FileType::from_inbound_name("PBC.EDU.MSFAA.RESP.20240316.002"),
            Some(FileType::Msfaa)
        );
        assert_eq!(
            FileType::from_inbound_name("PBC.EDU.RESTRICT.20240316.001"),
            Some(FileType::FederalRestriction)
        );
        assert_eq!(FileType::from_inbound_name("SOMETHING.ELSE"), None);
    }

    #[test]
    fn file_type_round_trips_through_display() {
        for ft in [
            FileType::EcertFullTime,
            FileType::EcertPartTime,
            FileType::SinValidation,
            FileType::Msfaa,
            FileType::DisbursementReceipt,
            FileType::FederalRestriction,
        ] {
            assert_eq!(ft.to_string().parse::<FileType>().unwrap(), ft);
        }
    }
}
