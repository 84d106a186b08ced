use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::ValidationError;

/// Content hash identifying an asset.
pub type ContentHash = String;

/// Transaction identifier returned by the chain.
pub type TransactionId = String;

/// Chain an asset is recorded on when the caller does not say otherwise.
pub const DEFAULT_CHAIN: &str = "cess";

/// Number of trailing hex digits the status poller parses as its shard selector.
pub const SELECTOR_WIDTH: usize = 8;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text $(| $alias)* => Ok(Self::$variant),)+
                    other => Err(ValidationError::InvalidFormat(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

/// NFT lifecycle status of an asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NftStatus {
    Created,
    Minted,
    Listed,
}

string_enum!(NftStatus {
    Created => "created",
    Minted => "minted",
    Listed => "listed",
});

/// Storage-network status of the asset's underlying file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploaded,
    Stored,
    Active,
    Cancelled,
}

string_enum!(FileStatus {
    Uploaded => "uploaded" | "upload" | "pending",
    Stored => "stored" | "storage",
    Active => "active",
    Cancelled => "cancelled" | "canceled" | "cancel",
});

impl FileStatus {
    /// Terminal statuses end status polling for the asset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Active | FileStatus::Cancelled)
    }
}

/// Kind of lifecycle operation an activity records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Upload,
    Create,
    Mint,
    Purchase,
    Transfer,
    Alter,
}

string_enum!(EventType {
    Upload => "upload",
    Create => "create",
    Mint => "mint",
    Purchase => "purchase",
    Transfer => "transfer",
    Alter => "alter",
});

/// Settlement state of an activity.
///
/// `Listening` moves to exactly one of the terminal states and never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Listening,
    Success,
    Failed,
}

string_enum!(ActivityState {
    Listening => "listening",
    Success => "success",
    Failed => "failed",
});

impl ActivityState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActivityState::Listening)
    }
}

/// Persisted record of a content-addressed asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub content_hash: ContentHash,
    pub creator: String,
    pub owner: String,
    pub file_name: String,
    pub description: Option<String>,
    pub cover_image: String,
    pub length: Option<String>,
    pub size: i64,
    pub label: Option<String>,
    pub nft_status: NftStatus,
    pub file_status: FileStatus,
    /// `None` means the price is unset.
    pub price: Option<String>,
    pub nft_token: Option<String>,
    pub chain: String,
    /// Optimistic concurrency counter, bumped by every lifecycle write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Builds a freshly uploaded asset owned by its creator.
    pub fn from_request(request: &CreateAssetRequest) -> Self {
        let now = Utc::now();
        Self {
            content_hash: request.content_hash.clone(),
            creator: request.creator.clone(),
            owner: request.creator.clone(),
            file_name: request.file_name.clone(),
            description: request.description.clone(),
            cover_image: request.cover_image.clone(),
            length: request.length.clone(),
            size: request.file_size,
            label: request.label.clone(),
            nft_status: NftStatus::Created,
            file_status: FileStatus::Uploaded,
            price: None,
            nft_token: None,
            chain: DEFAULT_CHAIN.to_string(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for asset lookups. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetFilter {
    pub owner: Option<String>,
    pub creator: Option<String>,
    pub nft_status: Option<NftStatus>,
    pub file_statuses: Vec<FileStatus>,
}

impl AssetFilter {
    /// Assets still waiting on the storage network.
    pub fn awaiting_storage() -> Self {
        Self {
            file_statuses: vec![FileStatus::Uploaded, FileStatus::Stored],
            ..Self::default()
        }
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        self.owner.as_ref().is_none_or(|o| *o == asset.owner)
            && self.creator.as_ref().is_none_or(|c| *c == asset.creator)
            && self.nft_status.is_none_or(|s| s == asset.nft_status)
            && (self.file_statuses.is_empty() || self.file_statuses.contains(&asset.file_status))
    }
}

/// Append-mostly log entry for one lifecycle operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Activity {
    pub id: i64,
    pub event_type: EventType,
    pub creator: String,
    pub content_hash: ContentHash,
    pub source: Option<String>,
    pub target: Option<String>,
    pub state: ActivityState,
    pub tx_hash: Option<TransactionId>,
    pub nft_token: Option<String>,
    pub price: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Insert form of an [`Activity`]; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub event_type: EventType,
    pub creator: String,
    pub content_hash: ContentHash,
    pub source: Option<String>,
    pub target: Option<String>,
    pub state: ActivityState,
    pub nft_token: Option<String>,
    pub price: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewActivity {
    /// An activity awaiting settlement, started now.
    pub fn listening(event_type: EventType, creator: &str, content_hash: &str) -> Self {
        Self {
            event_type,
            creator: creator.to_string(),
            content_hash: content_hash.to_string(),
            source: None,
            target: None,
            state: ActivityState::Listening,
            nft_token: None,
            price: None,
            start_date: Utc::now(),
            end_date: None,
        }
    }

    /// An activity that completed synchronously.
    pub fn completed(event_type: EventType, creator: &str, content_hash: &str) -> Self {
        let mut activity = Self::listening(event_type, creator, content_hash);
        activity.state = ActivityState::Success;
        activity.end_date = Some(activity.start_date);
        activity
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.nft_token = token;
        self
    }

    pub fn with_price(mut self, price: Option<String>) -> Self {
        self.price = price;
        self
    }

    pub fn into_activity(self, id: i64) -> Activity {
        Activity {
            id,
            event_type: self.event_type,
            creator: self.creator,
            content_hash: self.content_hash,
            source: self.source,
            target: self.target,
            state: self.state,
            tx_hash: None,
            nft_token: self.nft_token,
            price: self.price,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// Filter for activity lookups. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub content_hash: Option<String>,
    pub event_type: Option<EventType>,
    pub state: Option<ActivityState>,
}

impl ActivityFilter {
    pub fn for_asset(content_hash: &str) -> Self {
        Self {
            content_hash: Some(content_hash.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        self.content_hash
            .as_ref()
            .is_none_or(|h| *h == activity.content_hash)
            && self.event_type.is_none_or(|t| t == activity.event_type)
            && self.state.is_none_or(|s| s == activity.state)
    }
}

/// Asset change applied once an operation's transaction has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetMutation {
    Mint { token: String },
    ChangeOwner { to: String },
    SetListing { status: NftStatus, price: Option<String> },
    SetPrice { price: String },
}

impl AssetMutation {
    pub fn apply(&self, asset: &mut Asset) {
        match self {
            AssetMutation::Mint { token } => {
                asset.nft_status = NftStatus::Minted;
                asset.nft_token = Some(token.clone());
            }
            AssetMutation::ChangeOwner { to } => {
                asset.nft_status = NftStatus::Minted;
                asset.owner = to.clone();
                asset.price = None;
            }
            AssetMutation::SetListing { status, price } => {
                asset.nft_status = *status;
                asset.price = if *status == NftStatus::Listed {
                    price.clone()
                } else {
                    None
                };
            }
            AssetMutation::SetPrice { price } => {
                asset.price = Some(price.clone());
            }
        }
    }
}

/// Transaction backing a lifecycle operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TxData {
    /// Raw signed transaction for the chain client to broadcast.
    Signed(String),
    /// Identifier of a transaction the caller already broadcast.
    AlreadySent(TransactionId),
}

/// Direction of a listing change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingAction {
    List,
    Unlist,
}

impl ListingAction {
    /// Status the asset must be in before the change.
    pub fn required_status(&self) -> NftStatus {
        match self {
            ListingAction::List => NftStatus::Minted,
            ListingAction::Unlist => NftStatus::Listed,
        }
    }

    pub fn target_status(&self) -> NftStatus {
        match self {
            ListingAction::List => NftStatus::Listed,
            ListingAction::Unlist => NftStatus::Minted,
        }
    }
}

impl FromStr for ListingAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(ListingAction::List),
            "unlist" => Ok(ListingAction::Unlist),
            other => Err(ValidationError::InvalidField {
                field: "status".to_string(),
                message: format!("expected 'list' or 'unlist', got '{}'", other),
            }),
        }
    }
}

/// Checks that a price string is a finite, non-negative number.
pub fn validate_price(price: &str) -> Result<(), ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidField {
        field: "price".to_string(),
        message: message.to_string(),
    };
    let value: f64 = price
        .trim()
        .parse()
        .map_err(|_| invalid("price must be a decimal number"))?;
    if !value.is_finite() {
        return Err(invalid("price must be finite"));
    }
    if value < 0.0 {
        return Err(invalid("price must not be negative"));
    }
    Ok(())
}

fn validate_content_hash(hash: &str) -> Result<(), validator::ValidationError> {
    if hash.len() < SELECTOR_WIDTH || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = validator::ValidationError::new("content_hash");
        err.message = Some(format!("must be at least {} hex characters", SELECTOR_WIDTH).into());
        return Err(err);
    }
    Ok(())
}

/// Request payload for registering a freshly uploaded asset.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAssetRequest {
    #[validate(custom(function = "validate_content_hash"))]
    pub content_hash: String,
    #[validate(length(min = 1, message = "creator must not be empty"))]
    pub creator: String,
    #[validate(length(min = 1, max = 255, message = "file name must be 1-255 characters"))]
    pub file_name: String,
    #[validate(length(min = 1, message = "cover image must not be empty"))]
    pub cover_image: String,
    #[validate(range(min = 1, message = "file size must be positive"))]
    pub file_size: i64,
    pub description: Option<String>,
    pub length: Option<String>,
    pub label: Option<String>,
}

impl CreateAssetRequest {
    pub fn new(content_hash: &str, creator: &str, file_name: &str, file_size: i64) -> Self {
        Self {
            content_hash: content_hash.to_string(),
            creator: creator.to_string(),
            file_name: file_name.to_string(),
            cover_image: "default.png".to_string(),
            file_size,
            description: None,
            length: None,
            label: None,
        }
    }
}

/// Response to a successful asset registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateAssetResponse {
    pub creator: String,
    pub date: DateTime<Utc>,
}

/// Synchronous answer to a lifecycle operation.
///
/// `state` is `Listening` when returned; the final outcome is only visible
/// through the activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventResponse {
    pub event_type: EventType,
    pub source: Option<String>,
    pub target: Option<String>,
    pub price: Option<String>,
    pub state: ActivityState,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<&Activity> for EventResponse {
    fn from(activity: &Activity) -> Self {
        Self {
            event_type: activity.event_type,
            source: activity.source.clone(),
            target: activity.target.clone(),
            price: activity.price.clone(),
            state: activity.state,
            start_date: activity.start_date,
            end_date: activity.end_date,
        }
    }
}

/// Metadata reported by the storage network's status service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub state: FileStatus,
    pub size: Option<u64>,
}

/// Result of one successful watch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchProgress {
    Pending,
    Terminal,
}

/// Health check status for services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub blockchain: HealthStatus,
    pub tracked_watch_items: usize,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn new(database: HealthStatus, blockchain: HealthStatus, tracked: usize) -> Self {
        let status = match (&database, &blockchain) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };

        Self {
            status,
            database,
            blockchain,
            tracked_watch_items: tracked,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub r#type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub error: ErrorDetail,
    pub retry_after: u64,
}
