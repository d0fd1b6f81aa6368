//! Scheduling daemon for the file exchange.
//!
//! Runs one periodic loop per outbound file type plus one inbound polling
//! loop, all tied to a shared shutdown token. Every iteration is
//! independent: a failed send or a rejected inbound file is logged and
//! counted, and the loop simply tries again next tick.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::builder::BatchBuilder;
use crate::domain::{EnvironmentCode, FileType, OfferingIntensity};
use crate::error::Result;
use crate::reconcile::FeedbackReconciler;
use crate::storage::Storage;
use crate::transfer::FileTransfer;

/// Configuration for the exchange daemon.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DaemonConfig {
    /// How often to look for pending full-time disbursements (milliseconds)
    pub ecert_ft_interval_ms: u64,

    /// How often to look for pending part-time disbursements (milliseconds)
    pub ecert_pt_interval_ms: u64,

    /// How often to look for pending SIN checks (milliseconds)
    pub sin_interval_ms: u64,

    /// How often to look for pending MSFAA agreements (milliseconds)
    pub msfaa_interval_ms: u64,

    /// How often to poll the inbound directory for new files (milliseconds)
    pub inbound_poll_interval_ms: u64,

    /// Remote directory polled for inbound feedback and response files
    pub inbound_directory: String,

    /// Environment marker stamped into every outbound file name and header
    pub environment: EnvironmentCode,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ecert_ft_interval_ms: 60000,
            ecert_pt_interval_ms: 60000,
            sin_interval_ms: 60000,
            msfaa_interval_ms: 60000,
            inbound_poll_interval_ms: 30000,
            inbound_directory: "inbound".to_string(),
            environment: EnvironmentCode::Production,
        }
    }
}

impl DaemonConfig {
    fn send_interval_ms(&self, file_type: FileType) -> u64 {
        match file_type {
            FileType::EcertFullTime => self.ecert_ft_interval_ms,
            FileType::EcertPartTime => self.ecert_pt_interval_ms,
            FileType::SinValidation => self.sin_interval_ms,
            FileType::Msfaa => self.msfaa_interval_ms,
            // Inbound-only types are polled, not sent.
            FileType::DisbursementReceipt | FileType::FederalRestriction => {
                self.inbound_poll_interval_ms
            }
        }
    }
}

/// Long-running driver for the exchange: sends due outbound batches and
/// reconciles arriving inbound files until shut down.
pub struct ExchangeDaemon<S: ?Sized, T: ?Sized> {
    storage: Arc<S>,
    transfer: Arc<T>,
    config: DaemonConfig,
    shutdown_token: CancellationToken,
}

impl<S, T> ExchangeDaemon<S, T>
where
    S: Storage + ?Sized + 'static,
    T: FileTransfer + ?Sized + 'static,
{
    pub fn new(
        storage: Arc<S>,
        transfer: Arc<T>,
        config: DaemonConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            storage,
            transfer,
            config,
            shutdown_token,
        }
    }

    /// Run every loop until the shutdown token fires, then wait for the
    /// loops to drain.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut join_set: JoinSet<()> = JoinSet::new();

        for file_type in FileType::OUTBOUND {
            let daemon = self.clone();
            join_set.spawn(async move {
                daemon.outbound_loop(file_type).await;
            });
        }

        let daemon = self.clone();
        join_set.spawn(async move {
            daemon.inbound_loop().await;
        });

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Daemon loop panicked");
            }
        }
        tracing::info!("Exchange daemon stopped");
        Ok(())
    }

    async fn outbound_loop(&self, file_type: FileType) {
        let builder = BatchBuilder::new(
            self.storage.clone(),
            self.transfer.clone(),
            self.config.environment,
        );
        let interval_ms = self.config.send_interval_ms(file_type);
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        tracing::info!(
            file_type = %file_type,
            interval_ms,
            "Outbound loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let sent = match file_type {
                        FileType::EcertFullTime => {
                            builder.send_ecert(OfferingIntensity::FullTime).await
                        }
                        FileType::EcertPartTime => {
                            builder.send_ecert(OfferingIntensity::PartTime).await
                        }
                        FileType::SinValidation => builder.send_sin_validation().await,
                        FileType::Msfaa => builder.send_msfaa().await,
                        FileType::DisbursementReceipt | FileType::FederalRestriction => {
                            continue;
                        }
                    };
                    match sent {
                        Ok(Some(output)) => {
                            tracing::info!(
                                file_type = %file_type,
                                file_name = %output.batch.file_name,
                                "Outbound batch sent"
                            );
                        }
                        Ok(None) => {}
                        Err(e) => {
                            counter!(
                                "fixedwire_send_errors_total",
                                "file_type" => file_type.to_string()
                            )
                            .increment(1);
                            tracing::error!(
                                file_type = %file_type,
                                error = %e,
                                "Outbound batch failed, will retry next tick"
                            );
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!(file_type = %file_type, "Shutting down outbound loop");
                    break;
                }
            }
        }
    }

    async fn inbound_loop(&self) {
        let reconciler = FeedbackReconciler::new(self.storage.clone(), self.transfer.clone());
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.inbound_poll_interval_ms));
        tracing::info!(
            interval_ms = self.config.inbound_poll_interval_ms,
            directory = %self.config.inbound_directory,
            "Inbound polling started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match reconciler.process_new_files(&self.config.inbound_directory).await {
                        Ok(reports) => {
                            if !reports.is_empty() {
                                tracing::info!(count = reports.len(), "Inbound sweep finished");
                            }
                        }
                        Err(e) => {
                            counter!("fixedwire_inbound_poll_errors_total").increment(1);
                            tracing::error!(
                                error = %e,
                                "Inbound sweep failed, will retry next tick"
                            );
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Shutting down inbound polling");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::transfer::MockFileTransfer;

    #[tokio::test]
    async fn daemon_stops_when_the_shutdown_token_fires() {
        let storage = Arc::new(MemoryStorage::new());
        let transfer = Arc::new(MockFileTransfer::new());
        let token = CancellationToken::new();
        let daemon = Arc::new(ExchangeDaemon::new(
            storage,
            transfer,
            DaemonConfig {
                ecert_ft_interval_ms: 10,
                ecert_pt_interval_ms: 10,
                sin_interval_ms: 10,
                msfaa_interval_ms: 10,
                inbound_poll_interval_ms: 10,
                ..DaemonConfig::default()
            },
            token.clone(),
        ));

        let handle = tokio::spawn(daemon.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("daemon should stop promptly")
            .expect("daemon task should not panic");
        assert!(result.is_ok());
    }
}
