//! File transfer abstraction.
//!
//! Outbound batch files are uploaded to the exchange endpoint and inbound
//! feedback files are listed and downloaded from it. The trait keeps the
//! engine independent of the actual transport (SFTP drop folder, object
//! store, shared mount) and lets tests substitute a recording mock.

use async_trait::async_trait;

use crate::error::Result;

/// Transport for exchanging files with the remote endpoint.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Upload an outbound file under the given name.
    async fn upload(&self, file_name: &str, body: &str) -> Result<()>;

    /// List the names of files currently available in a remote directory.
    async fn list_files(&self, directory: &str) -> Result<Vec<String>>;

    /// Download the full contents of a remote file.
    async fn download(&self, file_name: &str) -> Result<String>;
}

// ============================================================================
// Mock implementation for testing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCall {
    Upload { file_name: String },
    List { directory: String },
    Download { file_name: String },
}

#[derive(Default)]
struct MockState {
    /// Files uploaded through this mock, by name.
    uploaded: std::collections::HashMap<String, String>,
    /// Files seeded as available for download, by name.
    inbound: std::collections::HashMap<String, String>,
    calls: Vec<TransferCall>,
}

/// In-memory [`FileTransfer`] that records every call.
#[derive(Default)]
pub struct MockFileTransfer {
    state: parking_lot::Mutex<MockState>,
}

impl MockFileTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file that `list_files` and `download` will serve.
    pub fn seed_inbound(&self, file_name: &str, body: &str) {
        self.state
            .lock()
            .inbound
            .insert(file_name.to_string(), body.to_string());
    }

    /// The body of a file previously uploaded through this mock.
    pub fn uploaded(&self, file_name: &str) -> Option<String> {
        self.state.lock().uploaded.get(file_name).cloned()
    }

    pub fn uploaded_count(&self) -> usize {
        self.state.lock().uploaded.len()
    }

    pub fn calls(&self) -> Vec<TransferCall> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl FileTransfer for MockFileTransfer {
    async fn upload(&self, file_name: &str, body: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(TransferCall::Upload {
            file_name: file_name.to_string(),
        });
        state
            .uploaded
            .insert(file_name.to_string(), body.to_string());
        Ok(())
    }

    async fn list_files(&self, directory: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.calls.push(TransferCall::List {
            directory: directory.to_string(),
        });
        let mut names: Vec<String> = state.inbound.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn download(&self, file_name: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.calls.push(TransferCall::Download {
            file_name: file_name.to_string(),
        });
        state.inbound.get(file_name).cloned().ok_or_else(|| {
            crate::error::FixedwireError::MalformedFile {
                file_name: file_name.to_string(),
                reason: "file is not available for download".to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_uploads_and_serves_seeded_files() {
        let transfer = MockFileTransfer::new();
        transfer.seed_inbound("PBC.EDU.ECERT.FT.FB.20250101.001", "header\nfooter\n");

        transfer
            .upload("PBC.EDU.ECERT.FT.20250101.001", "body\n")
            .await
            .expect("upload should succeed");

        let listed = transfer
            .list_files("inbound")
            .await
            .expect("list should succeed");
        assert_eq!(listed, vec!["PBC.EDU.ECERT.FT.FB.20250101.001"]);

        let body = transfer
            .download("PBC.EDU.ECERT.FT.FB.20250101.001")
            .await
            .expect("download should succeed");
        assert_eq!(body, "header\nfooter\n");

        assert_eq!(
            transfer.uploaded("PBC.EDU.ECERT.FT.20250101.001").as_deref(),
            Some("body\n")
        );
        assert_eq!(transfer.calls().len(), 3);
    }

    #[tokio::test]
    async fn download_of_unknown_file_fails() {
        let transfer = MockFileTransfer::new();
        let err = transfer.download("missing").await;
        assert!(err.is_err());
    }
}
