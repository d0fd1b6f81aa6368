//! Domain types for the file exchange engine.

pub mod batch;
pub mod feedback;
pub mod file_type;
pub mod records;

pub use batch::{Batch, BatchId};
pub use feedback::{
    AppliedFeedback, Completed, FeedbackData, FeedbackFile, FeedbackLine, LineFailure, Parsed,
    PartiallyFailed, Received,
};
pub use file_type::{EnvironmentCode, FileType, OfferingIntensity};
pub use records::{
    Disbursement, DisbursementStatus, DocumentNumber, FundingType, MsfaaAgreement, MsfaaStatus,
    Restriction, Sin, SinCheck, SinCheckStatus,
};
