//! Domain traits defining contracts for external systems.

use async_trait::async_trait;

use super::error::AppError;
use super::types::{
    Activity, ActivityFilter, Asset, AssetFilter, FileMeta, FileStatus, NewActivity,
    TransactionId, WatchProgress,
};

/// Durable storage for asset records.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Check store connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    async fn asset_exists(&self, content_hash: &str) -> Result<bool, AppError>;

    /// Insert a new asset; fails with `DatabaseError::Duplicate` if the hash exists.
    async fn create_asset(&self, asset: &Asset) -> Result<(), AppError>;

    async fn get_asset(&self, content_hash: &str) -> Result<Option<Asset>, AppError>;

    async fn find_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, AppError>;

    /// Write lifecycle fields if the stored version still equals `asset.version`.
    ///
    /// Returns the stored asset with its bumped version, or
    /// `DatabaseError::StaleWrite` when another write got there first.
    async fn update_asset(&self, asset: &Asset) -> Result<Asset, AppError>;

    /// Record the storage network's file status without touching the version.
    async fn update_file_status(
        &self,
        content_hash: &str,
        status: FileStatus,
    ) -> Result<(), AppError>;

    async fn delete_asset(&self, content_hash: &str) -> Result<bool, AppError> {
        let _ = content_hash;
        Err(AppError::NotSupported(
            "delete_asset not implemented".to_string(),
        ))
    }
}

/// Durable storage for the activity log.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn create_activity(&self, activity: &NewActivity) -> Result<Activity, AppError>;

    /// Persist state, tx hash and end date of an existing activity.
    async fn update_activity(&self, activity: &Activity) -> Result<(), AppError>;

    /// Matching activities, newest first.
    async fn find_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError>;
}

/// Blockchain client trait for chain operations
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    /// Check blockchain RPC connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Broadcast a signed transaction and wait until it is included.
    ///
    /// Returns the transaction identifier, or a `BlockchainError::Timeout`
    /// once the client's confirmation window elapses.
    async fn submit_transaction(&self, signed_tx: &str) -> Result<TransactionId, AppError>;
}

/// Storage network endpoint reporting per-file status.
#[async_trait]
pub trait FileStatusService: Send + Sync {
    async fn file_status(&self, content_hash: &str) -> Result<FileMeta, AppError>;
}

/// Something the status poller keeps checking until it reaches a terminal state.
#[async_trait]
pub trait Watched: Send + Sync {
    /// Stable identity; its trailing hex digits select the poller shard.
    fn identity(&self) -> &str;

    /// Perform one status check.
    async fn step(&self) -> Result<WatchProgress, AppError>;
}
