//! Inbound feedback reconciliation.
//!
//! Polls the inbound directory, downloads each file, runs it through the
//! feedback state machine, and marks it processed once every line has been
//! attempted. Files are identified by name: a file already marked processed
//! is skipped wholesale, so re-delivering the same file is a no-op and a
//! second reconciliation run performs zero mutations.
//!
//! A structurally corrupt file (bad framing, wrong line widths, a footer
//! disagreeing with a recount of the detail lines) is rejected before it is
//! even registered, so a remediated re-delivery under the same name starts
//! from a clean slate.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{info, instrument, warn};

use crate::domain::{AppliedFeedback, FeedbackFile, FileType, LineFailure, Received};
use crate::error::{FixedwireError, Result};
use crate::storage::Storage;
use crate::transfer::FileTransfer;

/// How a single inbound file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every line applied.
    Completed,
    /// Some lines failed; the rest were applied and stay applied.
    PartiallyFailed,
    /// Already processed earlier; nothing was touched.
    Skipped,
    /// Structurally rejected before any line was applied; the file stays
    /// unprocessed so a corrected re-delivery is picked up.
    Rejected { reason: String },
}

/// Per-file reconciliation report.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub file_name: String,
    pub file_type: FileType,
    pub outcome: ReconcileOutcome,
    pub applied: usize,
    pub failures: Vec<LineFailure>,
}

/// Drives inbound files through download, validation, and application.
pub struct FeedbackReconciler<S: ?Sized, T: ?Sized> {
    storage: Arc<S>,
    transfer: Arc<T>,
}

impl<S, T> FeedbackReconciler<S, T>
where
    S: Storage + ?Sized,
    T: FileTransfer + ?Sized,
{
    pub fn new(storage: Arc<S>, transfer: Arc<T>) -> Self {
        Self { storage, transfer }
    }

    /// Reconcile every recognizable file currently in the inbound directory.
    ///
    /// Files whose names match no known inbound tag are logged and left
    /// alone. A file that fails reconciliation never stops the sweep; its
    /// report carries the rejection reason.
    #[instrument(skip(self))]
    pub async fn process_new_files(&self, directory: &str) -> Result<Vec<ReconcileReport>> {
        let names = self.transfer.list_files(directory).await?;
        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            let file_type = match FileType::from_inbound_name(&name) {
                Some(file_type) => file_type,
                None => {
                    warn!(file_name = %name, "Unrecognized inbound file left in place");
                    continue;
                }
            };
            match self.process_file(&name).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(file_name = %name, error = %e, "Inbound file rejected");
                    counter!(
                        "fixedwire_files_rejected_total",
                        "file_type" => file_type.to_string()
                    )
                    .increment(1);
                    reports.push(ReconcileReport {
                        file_name: name,
                        file_type,
                        outcome: ReconcileOutcome::Rejected {
                            reason: e.to_string(),
                        },
                        applied: 0,
                        failures: Vec::new(),
                    });
                }
            }
        }
        Ok(reports)
    }

    /// Reconcile one inbound file by name.
    ///
    /// Idempotent: a file already marked processed returns a skip report
    /// without downloading or touching anything.
    #[instrument(skip(self))]
    pub async fn process_file(&self, file_name: &str) -> Result<ReconcileReport> {
        let file_type = FileType::from_inbound_name(file_name)
            .ok_or_else(|| FixedwireError::UnknownFileType(file_name.to_string()))?;

        if self.storage.is_file_processed(file_name).await? {
            info!(file_name, "Feedback file already processed, skipping");
            counter!(
                "fixedwire_files_skipped_total",
                "file_type" => file_type.to_string()
            )
            .increment(1);
            return Ok(ReconcileReport {
                file_name: file_name.to_string(),
                file_type,
                outcome: ReconcileOutcome::Skipped,
                applied: 0,
                failures: Vec::new(),
            });
        }

        let received_at = Utc::now();
        let body = self.transfer.download(file_name).await?;

        let parsed =
            FeedbackFile::<Received>::new(file_name.to_string(), file_type, received_at)
                .parse(&body)?;

        // Registered only once structurally valid: a rejected file leaves no
        // trace and a corrected re-delivery starts clean.
        self.storage
            .register_feedback_file(file_name, file_type, received_at)
            .await?;
        let applied = parsed.apply(self.storage.as_ref()).await;

        // Every line was attempted, whatever the per-line outcomes; the file
        // itself is done and must never be re-applied.
        self.storage.mark_file_processed(file_name).await?;
        counter!(
            "fixedwire_files_processed_total",
            "file_type" => file_type.to_string()
        )
        .increment(1);

        let report = match applied {
            AppliedFeedback::Completed(file) => {
                info!(
                    file_name,
                    applied = file.state.applied,
                    "Feedback file applied cleanly"
                );
                ReconcileReport {
                    file_name: file_name.to_string(),
                    file_type,
                    outcome: ReconcileOutcome::Completed,
                    applied: file.state.applied,
                    failures: Vec::new(),
                }
            }
            AppliedFeedback::PartiallyFailed(file) => {
                warn!(
                    file_name,
                    applied = file.state.applied,
                    failed = file.state.failures.len(),
                    "Feedback file applied with line failures"
                );
                ReconcileReport {
                    file_name: file_name.to_string(),
                    file_type,
                    outcome: ReconcileOutcome::PartiallyFailed,
                    applied: file.state.applied,
                    failures: file.state.failures,
                }
            }
        };
        Ok(report)
    }
}
