//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, BlockchainError, ConfigError, DatabaseError, ExternalServiceError, ValidationError,
};
pub use traits::{
    ActivityRepository, AssetRepository, BlockchainClient, FileStatusService, Watched,
};
pub use types::{
    Activity, ActivityFilter, ActivityState, Asset, AssetFilter, AssetMutation, ContentHash,
    CreateAssetRequest, CreateAssetResponse, DEFAULT_CHAIN, ErrorDetail, ErrorResponse,
    EventResponse, EventType, FileMeta, FileStatus, HealthResponse, HealthStatus, ListingAction,
    NewActivity, NftStatus, RateLimitResponse, SELECTOR_WIDTH, TransactionId, TxData,
    WatchProgress, validate_price,
};
