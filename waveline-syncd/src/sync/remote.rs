use async_trait::async_trait;
use waveline_core::{UploadDescriptor, WavelineClient, WavelineError};

/// Server side of the sync: plans which files it wants and accepts uploads.
#[async_trait]
pub trait RemoteSyncService: Send + Sync {
    async fn plan_sync(
        &self,
        files: &[String],
        roots: &[String],
        separator: &str,
    ) -> Result<Vec<String>, WavelineError>;

    async fn upload_file(&self, descriptor: UploadDescriptor) -> Result<(), WavelineError>;
}

#[async_trait]
impl RemoteSyncService for WavelineClient {
    async fn plan_sync(
        &self,
        files: &[String],
        roots: &[String],
        separator: &str,
    ) -> Result<Vec<String>, WavelineError> {
        WavelineClient::plan_sync(self, files, roots, separator).await
    }

    async fn upload_file(&self, descriptor: UploadDescriptor) -> Result<(), WavelineError> {
        WavelineClient::upload_file(self, descriptor).await
    }
}
