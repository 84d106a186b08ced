//! Mock implementations for testing.
//!
//! These mocks provide in-memory implementations of domain traits
//! that can be configured to simulate various scenarios including
//! success, failure, and edge cases.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::{
    Activity, ActivityFilter, ActivityRepository, AppError, Asset, AssetFilter, AssetRepository,
    BlockchainClient, BlockchainError, DatabaseError, ExternalServiceError, FileMeta, FileStatus,
    FileStatusService, NewActivity, TransactionId,
};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If true, operations will fail.
    pub should_fail: bool,
    /// Custom error message for failures.
    pub error_message: Option<String>,
    /// Simulated latency in milliseconds.
    pub latency_ms: Option<u64>,
}

impl MockConfig {
    /// Creates a config that always succeeds.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a config that always fails.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
            latency_ms: None,
        }
    }

    /// Adds simulated latency.
    #[must_use]
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    async fn simulate_latency(&self) {
        if let Some(ms) = self.latency_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// In-memory asset and activity store.
///
/// Implements both repository traits, honours the asset version check and
/// can fail asset writes on their own to simulate a post-settlement
/// persistence failure.
///
/// # Example
///
/// ```
/// use asset_lifecycle::test_utils::{MockDatabaseClient, mocks::MockConfig};
///
/// // Create a mock that succeeds
/// let mock = MockDatabaseClient::new();
///
/// // Create a mock that fails
/// let failing_mock = MockDatabaseClient::with_config(MockConfig::failure("DB error"));
/// ```
pub struct MockDatabaseClient {
    assets: Arc<Mutex<HashMap<String, Asset>>>,
    activities: Arc<Mutex<Vec<Activity>>>,
    next_activity_id: AtomicI64,
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
    fail_asset_updates: AtomicBool,
}

impl MockDatabaseClient {
    /// Creates a new mock with default (success) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    /// Creates a new mock with the given configuration.
    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            assets: Arc::new(Mutex::new(HashMap::new())),
            activities: Arc::new(Mutex::new(Vec::new())),
            next_activity_id: AtomicI64::new(1),
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
            fail_asset_updates: AtomicBool::new(false),
        }
    }

    /// Creates a mock that always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Gets the number of times any method was called.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Makes `update_asset` fail while everything else keeps working.
    pub fn set_fail_asset_updates(&self, fail: bool) {
        self.fail_asset_updates.store(fail, Ordering::Relaxed);
    }

    /// Gets all stored assets.
    pub fn get_all_assets(&self) -> Vec<Asset> {
        self.assets.lock().unwrap().values().cloned().collect()
    }

    /// Gets all recorded activities in insertion order.
    pub fn get_all_activities(&self) -> Vec<Activity> {
        self.activities.lock().unwrap().clone()
    }

    fn increment_call_count(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock database error".to_string());
            return Err(AppError::Database(DatabaseError::Query(msg)));
        }
        Ok(())
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetRepository for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.increment_call_count();

        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Mock database unhealthy".to_string(),
            )));
        }

        self.check_should_fail()
    }

    async fn asset_exists(&self, content_hash: &str) -> Result<bool, AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        Ok(self.assets.lock().unwrap().contains_key(content_hash))
    }

    async fn create_asset(&self, asset: &Asset) -> Result<(), AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        let mut assets = self.assets.lock().unwrap();
        if assets.contains_key(&asset.content_hash) {
            return Err(AppError::Database(DatabaseError::Duplicate(format!(
                "asset {} already exists",
                asset.content_hash
            ))));
        }
        assets.insert(asset.content_hash.clone(), asset.clone());
        Ok(())
    }

    async fn get_asset(&self, content_hash: &str) -> Result<Option<Asset>, AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        Ok(self.assets.lock().unwrap().get(content_hash).cloned())
    }

    async fn find_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        let mut found: Vec<Asset> = self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        Ok(found)
    }

    async fn update_asset(&self, asset: &Asset) -> Result<Asset, AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        if self.fail_asset_updates.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Mock asset update failure".to_string(),
            )));
        }

        let mut assets = self.assets.lock().unwrap();
        let stored = assets.get_mut(&asset.content_hash).ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound(format!(
                "asset {} not found",
                asset.content_hash
            )))
        })?;

        if stored.version != asset.version {
            return Err(AppError::Database(DatabaseError::StaleWrite(format!(
                "asset {} is at version {}, write was based on {}",
                asset.content_hash, stored.version, asset.version
            ))));
        }

        stored.owner = asset.owner.clone();
        stored.nft_status = asset.nft_status;
        stored.price = asset.price.clone();
        stored.nft_token = asset.nft_token.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn update_file_status(
        &self,
        content_hash: &str,
        status: FileStatus,
    ) -> Result<(), AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        let mut assets = self.assets.lock().unwrap();
        match assets.get_mut(content_hash) {
            Some(stored) => {
                stored.file_status = status;
                stored.updated_at = Utc::now();
                Ok(())
            }
            None => Err(AppError::Database(DatabaseError::NotFound(format!(
                "asset {} not found",
                content_hash
            )))),
        }
    }

    async fn delete_asset(&self, content_hash: &str) -> Result<bool, AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        Ok(self.assets.lock().unwrap().remove(content_hash).is_some())
    }
}

#[async_trait]
impl ActivityRepository for MockDatabaseClient {
    async fn create_activity(&self, activity: &NewActivity) -> Result<Activity, AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        let id = self.next_activity_id.fetch_add(1, Ordering::Relaxed);
        let activity = activity.clone().into_activity(id);
        self.activities.lock().unwrap().push(activity.clone());
        Ok(activity)
    }

    async fn update_activity(&self, activity: &Activity) -> Result<(), AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        let mut activities = self.activities.lock().unwrap();
        let stored = activities
            .iter_mut()
            .find(|a| a.id == activity.id)
            .ok_or_else(|| {
                AppError::Database(DatabaseError::NotFound(format!(
                    "activity {} not found",
                    activity.id
                )))
            })?;
        stored.state = activity.state;
        stored.tx_hash = activity.tx_hash.clone();
        stored.end_date = activity.end_date;
        Ok(())
    }

    async fn find_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError> {
        self.increment_call_count();
        self.check_should_fail()?;

        let mut found: Vec<Activity> = self
            .activities
            .lock()
            .unwrap()
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(found)
    }
}

/// Mock blockchain client for testing.
///
/// Simulates blockchain operations without actual network calls.
///
/// # Example
///
/// ```
/// use asset_lifecycle::test_utils::{MockBlockchainClient, mocks::MockConfig};
///
/// // Create a mock that succeeds
/// let mock = MockBlockchainClient::new();
///
/// // Create a mock that fails
/// let failing_mock = MockBlockchainClient::with_config(MockConfig::failure("RPC error"));
/// ```
pub struct MockBlockchainClient {
    transactions: Arc<Mutex<Vec<String>>>,
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
    is_failing: AtomicBool,
}

impl MockBlockchainClient {
    /// Creates a new mock with default (success) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    /// Creates a new mock with the given configuration.
    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            transactions: Arc::new(Mutex::new(Vec::new())),
            is_failing: AtomicBool::new(config.should_fail),
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }

    /// Creates a mock that always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Gets the number of times any method was called.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Toggles transaction submission failures.
    pub fn set_failing(&self, failing: bool) {
        self.is_failing.store(failing, Ordering::Relaxed);
    }

    /// Gets all submitted transaction payloads.
    pub fn get_transactions(&self) -> Vec<String> {
        self.transactions.lock().unwrap().clone()
    }

    /// Clears all recorded transactions.
    pub fn clear_transactions(&self) {
        self.transactions.lock().unwrap().clear();
    }

    fn increment_call_count(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.is_failing.load(Ordering::Relaxed) {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock blockchain error".to_string());
            return Err(AppError::Blockchain(BlockchainError::TransactionFailed(msg)));
        }
        Ok(())
    }
}

impl Default for MockBlockchainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockchainClient for MockBlockchainClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.increment_call_count();

        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Blockchain(BlockchainError::Connection(
                "Mock blockchain unhealthy".to_string(),
            )));
        }

        Ok(())
    }

    async fn submit_transaction(&self, signed_tx: &str) -> Result<TransactionId, AppError> {
        self.increment_call_count();
        self.config.simulate_latency().await;
        self.check_should_fail()?;

        let mut transactions = self.transactions.lock().unwrap();
        transactions.push(signed_tx.to_string());

        Ok(format!("tx_{}_{}", transactions.len(), signed_tx))
    }
}

/// Mock storage-network status endpoint.
///
/// Reports `uploaded` for hashes without a scripted status.
pub struct MockStatusService {
    statuses: Arc<Mutex<HashMap<String, FileStatus>>>,
    config: MockConfig,
    call_count: AtomicU64,
    is_failing: AtomicBool,
}

impl MockStatusService {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            statuses: Arc::new(Mutex::new(HashMap::new())),
            is_failing: AtomicBool::new(config.should_fail),
            config,
            call_count: AtomicU64::new(0),
        }
    }

    /// Scripts the status reported for `content_hash`.
    pub fn set_status(&self, content_hash: &str, status: FileStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(content_hash.to_string(), status);
    }

    pub fn set_failing(&self, failing: bool) {
        self.is_failing.store(failing, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Default for MockStatusService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStatusService for MockStatusService {
    async fn file_status(&self, content_hash: &str) -> Result<FileMeta, AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.config.simulate_latency().await;

        if self.is_failing.load(Ordering::Relaxed) {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock status service error".to_string());
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                msg,
            )));
        }

        let state = self
            .statuses
            .lock()
            .unwrap()
            .get(content_hash)
            .copied()
            .unwrap_or(FileStatus::Uploaded);
        Ok(FileMeta { state, size: None })
    }
}
