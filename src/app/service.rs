//! Application service layer.
//!
//! `LifecycleService` enforces the asset state machine. Every settlement-bearing
//! operation validates synchronously, records a `Listening` activity, then hands
//! the chain submission and the asset write to the worker pool.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::inflight::{InFlight, InFlightGuard};
use super::poller::StatusPoller;
use super::pool::WorkerPool;
use super::settlement::Settlement;
use super::watch::FileStatusWatch;
use crate::domain::{
    Activity, ActivityFilter, ActivityRepository, ActivityState, AppError, Asset, AssetFilter,
    AssetMutation, AssetRepository, BlockchainClient, CreateAssetRequest, CreateAssetResponse,
    DatabaseError, EventResponse, EventType, FileStatus, FileStatusService, HealthResponse,
    HealthStatus, ListingAction, NewActivity, NftStatus, TxData, ValidationError, validate_price,
};

/// Accepted lifecycle operation.
#[derive(Debug)]
pub struct Submitted {
    /// Returned to the caller straight away, always in `Listening` state.
    pub event: EventResponse,
    /// Resolves to the activity's final state once settlement is done.
    pub settlement: JoinHandle<ActivityState>,
}

/// Drives assets through upload, mint, listing and ownership changes.
///
/// # Example
///
/// ```ignore
/// let pool = WorkerPool::new(64)?;
/// let poller = Arc::new(StatusPoller::new(PollerConfig::default(), pool.clone())?);
/// let service = LifecycleService::new(db.clone(), db, chain, status, poller, pool);
///
/// service.create_asset(&request).await?;
/// let submitted = service.mint(&request.content_hash, TxData::Signed(raw)).await?;
/// ```
pub struct LifecycleService {
    assets: Arc<dyn AssetRepository>,
    activities: Arc<dyn ActivityRepository>,
    chain: Arc<dyn BlockchainClient>,
    status_service: Arc<dyn FileStatusService>,
    poller: Arc<StatusPoller>,
    pool: WorkerPool,
    in_flight: InFlight,
}

impl LifecycleService {
    #[must_use]
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        activities: Arc<dyn ActivityRepository>,
        chain: Arc<dyn BlockchainClient>,
        status_service: Arc<dyn FileStatusService>,
        poller: Arc<StatusPoller>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            assets,
            activities,
            chain,
            status_service,
            poller,
            pool,
            in_flight: InFlight::new(),
        }
    }

    #[must_use]
    pub fn poller(&self) -> &Arc<StatusPoller> {
        &self.poller
    }

    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Registers a freshly uploaded file and starts watching its storage status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed request and
    /// `DatabaseError::Duplicate` if the content hash is already known.
    #[instrument(skip(self, request), fields(content_hash = %request.content_hash))]
    pub async fn create_asset(
        &self,
        request: &CreateAssetRequest,
    ) -> Result<CreateAssetResponse, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed for create asset request");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;

        if self.assets.asset_exists(&request.content_hash).await? {
            return Err(DatabaseError::Duplicate(format!(
                "asset {} already exists",
                request.content_hash
            ))
            .into());
        }

        let asset = Asset::from_request(request);
        self.assets.create_asset(&asset).await?;

        self.activities
            .create_activity(
                &NewActivity::completed(EventType::Upload, &asset.creator, &asset.content_hash)
                    .with_target(FileStatus::Uploaded.as_str()),
            )
            .await?;

        if let Err(e) = self.start_watching(&asset.content_hash).await {
            warn!(error = %e, "Could not register file status watch");
        }

        let created = self
            .activities
            .create_activity(
                &NewActivity::completed(EventType::Create, &asset.creator, &asset.content_hash)
                    .with_target(asset.creator.as_str()),
            )
            .await?;

        info!(creator = %asset.creator, "Asset created");
        Ok(CreateAssetResponse {
            creator: asset.creator,
            date: created.end_date.unwrap_or(created.start_date),
        })
    }

    /// Removes an asset that has not been minted yet.
    #[instrument(skip(self))]
    pub async fn delete_asset(&self, content_hash: &str) -> Result<(), AppError> {
        let _guard = self.in_flight.claim(content_hash)?;
        let asset = self.load_asset(content_hash).await?;
        if asset.nft_status != NftStatus::Created {
            return Err(ValidationError::InvalidState(format!(
                "asset {} is already {}",
                content_hash, asset.nft_status
            ))
            .into());
        }

        if !self.assets.delete_asset(content_hash).await? {
            return Err(DatabaseError::NotFound(format!("asset {}", content_hash)).into());
        }
        info!("Asset deleted");
        Ok(())
    }

    /// Mints the asset's token once its file is stored.
    #[instrument(skip(self, tx))]
    pub async fn mint(&self, content_hash: &str, tx: TxData) -> Result<Submitted, AppError> {
        let guard = self.in_flight.claim(content_hash)?;
        let asset = self.load_asset(content_hash).await?;

        if asset.nft_status != NftStatus::Created {
            return Err(ValidationError::InvalidState(format!(
                "asset {} is already minted",
                content_hash
            ))
            .into());
        }
        if asset.file_status != FileStatus::Stored {
            return Err(ValidationError::InvalidState(format!(
                "source file is {}, wait until it is stored and try again",
                asset.file_status
            ))
            .into());
        }

        let activity = NewActivity::listening(EventType::Mint, &asset.creator, content_hash)
            .with_target(asset.creator.as_str())
            .with_token(Some(content_hash.to_string()));
        let mutation = AssetMutation::Mint {
            token: content_hash.to_string(),
        };
        self.hand_off("mint", guard, asset, activity, tx, mutation).await
    }

    /// Buys a listed asset at its current price.
    #[instrument(skip(self, tx))]
    pub async fn purchase(
        &self,
        content_hash: &str,
        to: &str,
        tx: TxData,
    ) -> Result<Submitted, AppError> {
        require_party(to)?;
        let guard = self.in_flight.claim(content_hash)?;
        let asset = self.load_asset(content_hash).await?;

        if asset.nft_status != NftStatus::Listed || asset.price.is_none() {
            return Err(ValidationError::InvalidState(format!(
                "asset {} is not listed for sale",
                content_hash
            ))
            .into());
        }
        if asset.owner == to {
            return Err(ValidationError::InvalidField {
                field: "to".to_string(),
                message: "cannot purchase your own asset".to_string(),
            }
            .into());
        }

        let activity = NewActivity::listening(EventType::Purchase, to, content_hash)
            .with_source(Some(asset.owner.clone()))
            .with_target(to)
            .with_token(asset.nft_token.clone())
            .with_price(asset.price.clone());
        let mutation = AssetMutation::ChangeOwner { to: to.to_string() };
        self.hand_off("purchase", guard, asset, activity, tx, mutation)
            .await
    }

    /// Gives a minted, unlisted asset to another owner.
    #[instrument(skip(self, tx))]
    pub async fn transfer(
        &self,
        content_hash: &str,
        to: &str,
        tx: TxData,
    ) -> Result<Submitted, AppError> {
        require_party(to)?;
        let guard = self.in_flight.claim(content_hash)?;
        let asset = self.load_asset(content_hash).await?;

        if asset.nft_status != NftStatus::Minted {
            return Err(ValidationError::InvalidState(format!(
                "asset {} is {}, only minted assets can be transferred",
                content_hash, asset.nft_status
            ))
            .into());
        }
        if asset.owner == to {
            return Err(ValidationError::InvalidField {
                field: "to".to_string(),
                message: "cannot transfer an asset to its owner".to_string(),
            }
            .into());
        }

        let activity = NewActivity::listening(EventType::Transfer, &asset.owner, content_hash)
            .with_source(Some(asset.owner.clone()))
            .with_target(to)
            .with_token(asset.nft_token.clone());
        let mutation = AssetMutation::ChangeOwner { to: to.to_string() };
        self.hand_off("transfer", guard, asset, activity, tx, mutation)
            .await
    }

    /// Lists an asset for sale at `price`, or takes it off the market.
    ///
    /// `action` is `list` or `unlist`, case-insensitive.
    #[instrument(skip(self, tx))]
    pub async fn change_listing(
        &self,
        content_hash: &str,
        action: &str,
        price: Option<&str>,
        tx: TxData,
    ) -> Result<Submitted, AppError> {
        let action: ListingAction = action.parse()?;
        let price = match action {
            ListingAction::List => {
                let price =
                    price.ok_or_else(|| ValidationError::MissingField("price".to_string()))?;
                validate_price(price)?;
                Some(price.trim().to_string())
            }
            ListingAction::Unlist => None,
        };

        let guard = self.in_flight.claim(content_hash)?;
        let asset = self.load_asset(content_hash).await?;

        let (from, to) = (action.required_status(), action.target_status());
        if asset.nft_status != from {
            return Err(ValidationError::InvalidState(format!(
                "asset {} is {}, cannot move it to {}",
                content_hash, asset.nft_status, to
            ))
            .into());
        }

        let activity = NewActivity::listening(EventType::Alter, &asset.owner, content_hash)
            .with_source(Some(from.to_string()))
            .with_target(to.as_str())
            .with_token(asset.nft_token.clone())
            .with_price(price.clone());
        let mutation = AssetMutation::SetListing { status: to, price };
        self.hand_off("listing", guard, asset, activity, tx, mutation)
            .await
    }

    /// Re-prices a listed asset.
    #[instrument(skip(self, tx))]
    pub async fn change_price(
        &self,
        content_hash: &str,
        price: &str,
        tx: TxData,
    ) -> Result<Submitted, AppError> {
        validate_price(price)?;
        let price = price.trim().to_string();

        let guard = self.in_flight.claim(content_hash)?;
        let asset = self.load_asset(content_hash).await?;

        if asset.nft_status != NftStatus::Listed {
            return Err(ValidationError::InvalidState(format!(
                "asset {} is not listed",
                content_hash
            ))
            .into());
        }
        if asset.price.as_deref() == Some(price.as_str()) {
            return Err(ValidationError::InvalidField {
                field: "price".to_string(),
                message: "price is the same as before".to_string(),
            }
            .into());
        }

        let activity = NewActivity::listening(EventType::Alter, &asset.owner, content_hash)
            .with_source(asset.price.clone())
            .with_target(price.as_str())
            .with_token(asset.nft_token.clone())
            .with_price(Some(price.clone()));
        let mutation = AssetMutation::SetPrice { price };
        self.hand_off("price", guard, asset, activity, tx, mutation)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_asset(&self, content_hash: &str) -> Result<Option<Asset>, AppError> {
        self.assets.get_asset(content_hash).await
    }

    /// Activity log of one asset, newest first.
    #[instrument(skip(self))]
    pub async fn list_activities(&self, content_hash: &str) -> Result<Vec<Activity>, AppError> {
        self.activities
            .find_activities(&ActivityFilter::for_asset(content_hash))
            .await
    }

    /// Starts polling the storage network for this asset's file status.
    pub async fn start_watching(&self, content_hash: &str) -> Result<usize, AppError> {
        let watch = FileStatusWatch::new(
            content_hash,
            Arc::clone(&self.status_service),
            Arc::clone(&self.assets),
        );
        self.poller.watch(Arc::new(watch)).await
    }

    /// Re-registers watches for assets whose file status is not yet terminal.
    ///
    /// Returns how many watches were registered.
    #[instrument(skip(self))]
    pub async fn resume_watching(&self) -> Result<usize, AppError> {
        let pending = self
            .assets
            .find_assets(&AssetFilter::awaiting_storage())
            .await?;

        let mut resumed = 0;
        for asset in &pending {
            match self.start_watching(&asset.content_hash).await {
                Ok(_) => resumed += 1,
                Err(e) => warn!(
                    content_hash = %asset.content_hash,
                    error = %e,
                    "Could not resume file status watch"
                ),
            }
        }
        info!(resumed, pending = pending.len(), "Resumed file status watches");
        Ok(resumed)
    }

    /// Performs a health check on all dependencies.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.assets.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Database health check failed");
                HealthStatus::Unhealthy
            }
        };

        let blockchain_health = match self.chain.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Blockchain health check failed");
                HealthStatus::Unhealthy
            }
        };

        HealthResponse::new(db_health, blockchain_health, self.poller.tracked())
    }

    async fn load_asset(&self, content_hash: &str) -> Result<Asset, AppError> {
        self.assets.get_asset(content_hash).await?.ok_or_else(|| {
            DatabaseError::NotFound(format!("asset {} not found", content_hash)).into()
        })
    }

    async fn hand_off(
        &self,
        operation: &'static str,
        guard: InFlightGuard,
        asset: Asset,
        activity: NewActivity,
        tx: TxData,
        mutation: AssetMutation,
    ) -> Result<Submitted, AppError> {
        let mut activity = self.activities.create_activity(&activity).await?;
        activity.end_date = Some(Utc::now());
        let event = EventResponse::from(&activity);
        let mut rejected = activity.clone();

        let settlement = Settlement {
            assets: Arc::clone(&self.assets),
            activities: Arc::clone(&self.activities),
            chain: Arc::clone(&self.chain),
            operation,
            activity,
            asset,
            tx,
            mutation,
            _in_flight: guard,
        };

        match self.pool.submit(settlement.run()).await {
            Ok(handle) => {
                info!(operation, activity_id = rejected.id, "Settlement handed to worker pool");
                Ok(Submitted {
                    event,
                    settlement: handle,
                })
            }
            Err(e) => {
                rejected.state = ActivityState::Failed;
                if let Err(update_err) = self.activities.update_activity(&rejected).await {
                    warn!(error = %update_err, "Failed to mark rejected activity as failed");
                }
                Err(e)
            }
        }
    }
}

fn require_party(to: &str) -> Result<(), ValidationError> {
    if to.trim().is_empty() {
        return Err(ValidationError::MissingField("to".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::poller::PollerConfig;
    use crate::test_utils::mocks::MockConfig;
    use crate::test_utils::{MockBlockchainClient, MockDatabaseClient, MockStatusService};

    const HASH: &str = "0a1b2c3d4e5f6701";

    struct Harness {
        db: Arc<MockDatabaseClient>,
        chain: Arc<MockBlockchainClient>,
        status: Arc<MockStatusService>,
        service: LifecycleService,
    }

    fn harness_with_chain(chain: MockBlockchainClient) -> Harness {
        let db = Arc::new(MockDatabaseClient::new());
        let chain = Arc::new(chain);
        let status = Arc::new(MockStatusService::new());
        let pool = WorkerPool::new(4).unwrap();
        let config = PollerConfig {
            shard_bits: 1,
            ..PollerConfig::default()
        };
        let poller = Arc::new(StatusPoller::new(config, pool.clone()).unwrap());
        let service = LifecycleService::new(
            db.clone(),
            db.clone(),
            chain.clone(),
            status.clone(),
            poller,
            pool,
        );
        Harness {
            db,
            chain,
            status,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with_chain(MockBlockchainClient::new())
    }

    fn signed() -> TxData {
        TxData::Signed("3yZe7d".to_string())
    }

    async fn asset(h: &Harness) -> Asset {
        h.db.get_asset(HASH).await.unwrap().unwrap()
    }

    async fn created(h: &Harness) {
        h.service
            .create_asset(&CreateAssetRequest::new(HASH, "alice", "clip.mp4", 2048))
            .await
            .unwrap();
    }

    async fn minted(h: &Harness) {
        created(h).await;
        h.db.update_file_status(HASH, FileStatus::Stored).await.unwrap();
        let submitted = h.service.mint(HASH, signed()).await.unwrap();
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Success);
    }

    async fn listed(h: &Harness, price: &str) {
        minted(h).await;
        let submitted = h
            .service
            .change_listing(HASH, "list", Some(price), signed())
            .await
            .unwrap();
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Success);
    }

    #[tokio::test]
    async fn test_create_asset_records_activities_and_watch() {
        let h = harness();
        let response = h
            .service
            .create_asset(&CreateAssetRequest::new(HASH, "alice", "clip.mp4", 2048))
            .await
            .unwrap();
        assert_eq!(response.creator, "alice");

        let stored = asset(&h).await;
        assert_eq!(stored.owner, "alice");
        assert_eq!(stored.nft_status, NftStatus::Created);
        assert_eq!(stored.file_status, FileStatus::Uploaded);
        assert!(stored.price.is_none());

        let activities = h.service.list_activities(HASH).await.unwrap();
        let kinds: Vec<_> = activities.iter().map(|a| a.event_type).collect();
        assert_eq!(kinds, vec![EventType::Create, EventType::Upload]);
        assert!(activities.iter().all(|a| a.state == ActivityState::Success));
        assert_eq!(activities[1].target.as_deref(), Some("uploaded"));
        assert_eq!(activities[0].target.as_deref(), Some("alice"));

        assert_eq!(h.service.poller().tracked(), 1);
    }

    #[tokio::test]
    async fn test_create_asset_duplicate_rejected() {
        let h = harness();
        created(&h).await;

        let result = h
            .service
            .create_asset(&CreateAssetRequest::new(HASH, "bob", "other.mp4", 1))
            .await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::Duplicate(_)))
        ));
        assert!(h.db.asset_exists(HASH).await.unwrap());
        assert_eq!(asset(&h).await.creator, "alice");
    }

    #[tokio::test]
    async fn test_create_asset_validation_failure() {
        let h = harness();
        let mut request = CreateAssetRequest::new(HASH, "", "clip.mp4", 2048);
        request.file_size = 0;

        let result = h.service.create_asset(&request).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!h.db.asset_exists(HASH).await.unwrap());
        assert_eq!(h.service.poller().tracked(), 0);
    }

    #[tokio::test]
    async fn test_mint_waits_for_stored_file() {
        let h = harness();
        created(&h).await;

        let result = h.service.mint(HASH, signed()).await;
        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::InvalidState(_)))
        ));
        assert_eq!(h.service.list_activities(HASH).await.unwrap().len(), 2);

        h.status.set_status(HASH, FileStatus::Stored);
        let shard = h.service.poller().shard_for(HASH).unwrap();
        for handle in h.service.poller().run_pass(shard).await.dispatched {
            handle.await.unwrap();
        }
        assert_eq!(asset(&h).await.file_status, FileStatus::Stored);

        let submitted = h.service.mint(HASH, signed()).await.unwrap();
        assert_eq!(submitted.event.event_type, EventType::Mint);
        assert_eq!(submitted.event.state, ActivityState::Listening);
        assert!(submitted.event.end_date.is_some());
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Success);

        let stored = asset(&h).await;
        assert_eq!(stored.nft_status, NftStatus::Minted);
        assert_eq!(stored.nft_token.as_deref(), Some(HASH));
        assert_eq!(h.chain.get_transactions(), vec!["3yZe7d".to_string()]);
    }

    #[tokio::test]
    async fn test_mint_only_once() {
        let h = harness();
        minted(&h).await;

        let result = h.service.mint(HASH, signed()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_already_sent_skips_chain() {
        let h = harness();
        created(&h).await;
        h.db.update_file_status(HASH, FileStatus::Stored).await.unwrap();

        let submitted = h
            .service
            .mint(HASH, TxData::AlreadySent("0xfeed".to_string()))
            .await
            .unwrap();
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Success);

        assert!(h.chain.get_transactions().is_empty());
        let mint = &h.service.list_activities(HASH).await.unwrap()[0];
        assert_eq!(mint.tx_hash.as_deref(), Some("0xfeed"));
    }

    #[tokio::test]
    async fn test_list_then_purchase_changes_owner() {
        let h = harness();
        listed(&h, "10").await;
        assert_eq!(asset(&h).await.price.as_deref(), Some("10"));

        let submitted = h.service.purchase(HASH, "bob", signed()).await.unwrap();
        assert_eq!(submitted.event.source.as_deref(), Some("alice"));
        assert_eq!(submitted.event.target.as_deref(), Some("bob"));
        assert_eq!(submitted.event.price.as_deref(), Some("10"));
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Success);

        let stored = asset(&h).await;
        assert_eq!(stored.owner, "bob");
        assert!(stored.price.is_none());
        assert_eq!(stored.nft_status, NftStatus::Minted);
    }

    #[tokio::test]
    async fn test_self_purchase_rejected_without_activity() {
        let h = harness();
        listed(&h, "10").await;
        let before = h.service.list_activities(HASH).await.unwrap().len();

        let result = h.service.purchase(HASH, "alice", signed()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(h.service.list_activities(HASH).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn test_purchase_requires_listing() {
        let h = harness();
        minted(&h).await;

        let result = h.service.purchase(HASH, "bob", signed()).await;
        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_transfer_rules() {
        let h = harness();
        minted(&h).await;

        assert!(h.service.transfer(HASH, "alice", signed()).await.is_err());
        assert!(h.service.transfer(HASH, " ", signed()).await.is_err());

        let submitted = h.service.transfer(HASH, "carol", signed()).await.unwrap();
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Success);
        assert_eq!(asset(&h).await.owner, "carol");

        let listed = h
            .service
            .change_listing(HASH, "LIST", Some("5"), signed())
            .await
            .unwrap();
        listed.settlement.await.unwrap();
        let result = h.service.transfer(HASH, "dave", signed()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_listing_price_validation() {
        let h = harness();
        minted(&h).await;

        for bad in [Some("-1"), Some("ten"), Some("NaN"), None] {
            let result = h.service.change_listing(HASH, "list", bad, signed()).await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{:?}", bad);
        }
        let result = h.service.change_listing(HASH, "sell", Some("1"), signed()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        assert_eq!(asset(&h).await.nft_status, NftStatus::Minted);
    }

    #[tokio::test]
    async fn test_unlist_clears_price() {
        let h = harness();
        listed(&h, "7.5").await;

        let again = h.service.change_listing(HASH, "list", Some("8"), signed()).await;
        assert!(matches!(again, Err(AppError::Validation(_))));

        let submitted = h
            .service
            .change_listing(HASH, "unlist", None, signed())
            .await
            .unwrap();
        assert_eq!(submitted.event.source.as_deref(), Some("listed"));
        assert_eq!(submitted.event.target.as_deref(), Some("minted"));
        submitted.settlement.await.unwrap();

        let stored = asset(&h).await;
        assert_eq!(stored.nft_status, NftStatus::Minted);
        assert!(stored.price.is_none());
    }

    #[tokio::test]
    async fn test_change_price() {
        let h = harness();
        listed(&h, "10").await;

        let same = h.service.change_price(HASH, "10", signed()).await;
        assert!(matches!(same, Err(AppError::Validation(_))));

        let submitted = h.service.change_price(HASH, "12", signed()).await.unwrap();
        assert_eq!(submitted.event.source.as_deref(), Some("10"));
        assert_eq!(submitted.event.target.as_deref(), Some("12"));
        submitted.settlement.await.unwrap();
        assert_eq!(asset(&h).await.price.as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_change_price_requires_listing() {
        let h = harness();
        minted(&h).await;

        let result = h.service.change_price(HASH, "3", signed()).await;
        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_chain_failure_leaves_asset_unchanged() {
        let h = harness_with_chain(MockBlockchainClient::new());
        minted(&h).await;
        let before = asset(&h).await;

        h.chain.set_failing(true);
        let submitted = h.service.transfer(HASH, "bob", signed()).await.unwrap();
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Failed);

        assert_eq!(asset(&h).await, before);
        let transfer = &h.service.list_activities(HASH).await.unwrap()[0];
        assert_eq!(transfer.event_type, EventType::Transfer);
        assert_eq!(transfer.state, ActivityState::Failed);
        assert!(transfer.tx_hash.is_none());
    }

    #[tokio::test]
    async fn test_asset_write_failure_marks_activity_failed() {
        let h = harness();
        minted(&h).await;

        h.db.set_fail_asset_updates(true);
        let submitted = h.service.transfer(HASH, "bob", signed()).await.unwrap();
        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Failed);

        let transfer = &h.service.list_activities(HASH).await.unwrap()[0];
        assert_eq!(transfer.state, ActivityState::Failed);
        assert!(transfer.tx_hash.is_some());
        assert_eq!(asset(&h).await.owner, "alice");
    }

    #[tokio::test]
    async fn test_concurrent_operation_conflicts() {
        let h = harness_with_chain(MockBlockchainClient::with_config(
            MockConfig::success().with_latency(50),
        ));
        minted(&h).await;

        let first = h.service.transfer(HASH, "bob", signed()).await.unwrap();
        let second = h.service.transfer(HASH, "carol", signed()).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        assert_eq!(first.settlement.await.unwrap(), ActivityState::Success);
        assert_eq!(asset(&h).await.owner, "bob");

        let next = h.service.transfer(HASH, "carol", signed()).await.unwrap();
        assert_eq!(next.settlement.await.unwrap(), ActivityState::Success);
    }

    #[tokio::test]
    async fn test_stale_write_fails_settlement() {
        let h = harness_with_chain(MockBlockchainClient::with_config(
            MockConfig::success().with_latency(50),
        ));
        minted(&h).await;

        let submitted = h.service.transfer(HASH, "bob", signed()).await.unwrap();
        let mut concurrent = asset(&h).await;
        concurrent.owner = "mallory".to_string();
        h.db.update_asset(&concurrent).await.unwrap();

        assert_eq!(submitted.settlement.await.unwrap(), ActivityState::Failed);
        assert_eq!(asset(&h).await.owner, "mallory");
    }

    #[tokio::test]
    async fn test_delete_only_before_mint() {
        let h = harness();
        created(&h).await;
        h.service.delete_asset(HASH).await.unwrap();
        assert!(h.service.get_asset(HASH).await.unwrap().is_none());

        let missing = h.service.delete_asset(HASH).await;
        assert!(matches!(
            missing,
            Err(AppError::Database(DatabaseError::NotFound(_)))
        ));

        minted(&h).await;
        assert!(h.service.delete_asset(HASH).await.is_err());
    }

    #[tokio::test]
    async fn test_resume_watching_skips_settled_files() {
        let h = harness();
        for (hash, status) in [
            ("aaaaaaaa00000001", FileStatus::Uploaded),
            ("aaaaaaaa00000002", FileStatus::Stored),
            ("aaaaaaaa00000003", FileStatus::Active),
        ] {
            let mut asset = Asset::from_request(&CreateAssetRequest::new(hash, "a", "f", 1));
            asset.file_status = status;
            h.db.create_asset(&asset).await.unwrap();
        }

        assert_eq!(h.service.resume_watching().await.unwrap(), 2);
        assert_eq!(h.service.poller().tracked(), 2);
    }

    #[tokio::test]
    async fn test_health_check() {
        let h = harness();
        let health = h.service.health_check().await;
        assert_eq!(health.status, HealthStatus::Healthy);

        h.chain.set_healthy(false);
        let health = h.service.health_check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.blockchain, HealthStatus::Unhealthy);

        h.db.set_healthy(false);
        let health = h.service.health_check().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_closed_pool_fails_activity() {
        let h = harness();
        created(&h).await;
        h.db.update_file_status(HASH, FileStatus::Stored).await.unwrap();
        h.service.pool().close();

        let result = h.service.mint(HASH, signed()).await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        let mint = &h.service.list_activities(HASH).await.unwrap()[0];
        assert_eq!(mint.event_type, EventType::Mint);
        assert_eq!(mint.state, ActivityState::Failed);
        assert_eq!(asset(&h).await.nft_status, NftStatus::Created);
    }
}
