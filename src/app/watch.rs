//! Storage status watch for one uploaded asset.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{
    AppError, AssetRepository, DatabaseError, FileStatusService, WatchProgress, Watched,
};

/// Copies the storage network's view of a file onto its asset record.
pub struct FileStatusWatch {
    content_hash: String,
    status_service: Arc<dyn FileStatusService>,
    assets: Arc<dyn AssetRepository>,
}

impl FileStatusWatch {
    #[must_use]
    pub fn new(
        content_hash: impl Into<String>,
        status_service: Arc<dyn FileStatusService>,
        assets: Arc<dyn AssetRepository>,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            status_service,
            assets,
        }
    }
}

#[async_trait]
impl Watched for FileStatusWatch {
    fn identity(&self) -> &str {
        &self.content_hash
    }

    async fn step(&self) -> Result<WatchProgress, AppError> {
        let meta = self.status_service.file_status(&self.content_hash).await?;

        match self
            .assets
            .update_file_status(&self.content_hash, meta.state)
            .await
        {
            Ok(()) => {}
            Err(AppError::Database(DatabaseError::NotFound(_))) => {
                info!(content_hash = %self.content_hash, "Asset deleted, dropping status watch");
                return Ok(WatchProgress::Terminal);
            }
            Err(e) => return Err(e),
        }

        debug!(content_hash = %self.content_hash, file_status = %meta.state, "File status recorded");
        if meta.state.is_terminal() {
            Ok(WatchProgress::Terminal)
        } else {
            Ok(WatchProgress::Pending)
        }
    }
}
