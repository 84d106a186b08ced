//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app::{AppState, Submitted};
use crate::domain::{
    Activity, AppError, Asset, BlockchainError, CreateAssetRequest, CreateAssetResponse,
    DatabaseError, ErrorDetail, ErrorResponse, EventResponse, ExternalServiceError,
    HealthResponse, HealthStatus, TxData,
};

/// Body of `POST /assets/{hash}/mint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintBody {
    pub tx: TxData,
}

/// Body of the purchase and transfer endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyBody {
    /// Address receiving the asset.
    pub to: String,
    pub tx: TxData,
}

/// Body of `POST /assets/{hash}/listing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingBody {
    /// `list` or `unlist`.
    pub status: String,
    #[serde(default)]
    pub price: Option<String>,
    pub tx: TxData,
}

/// Body of `POST /assets/{hash}/price`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBody {
    pub price: String,
    pub tx: TxData,
}

fn accepted(submitted: Submitted) -> (StatusCode, Json<EventResponse>) {
    // Settlement keeps running on the worker pool after the handle is dropped.
    (StatusCode::ACCEPTED, Json(submitted.event))
}

pub async fn create_asset_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<CreateAssetResponse>), AppError> {
    let created = state.service.create_asset(&payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_asset_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<Asset>, AppError> {
    let asset = state
        .service
        .get_asset(&hash)
        .await?
        .ok_or(AppError::Database(DatabaseError::NotFound(hash)))?;
    Ok(Json(asset))
}

pub async fn delete_asset_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<StatusCode, AppError> {
    state.service.delete_asset(&hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Activity log of one asset, newest first.
pub async fn list_activities_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<Vec<Activity>>, AppError> {
    let activities = state.service.list_activities(&hash).await?;
    Ok(Json(activities))
}

pub async fn mint_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Json(body): Json<MintBody>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let submitted = state.service.mint(&hash, body.tx).await?;
    Ok(accepted(submitted))
}

pub async fn purchase_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Json(body): Json<PartyBody>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let submitted = state.service.purchase(&hash, &body.to, body.tx).await?;
    Ok(accepted(submitted))
}

pub async fn transfer_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Json(body): Json<PartyBody>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let submitted = state.service.transfer(&hash, &body.to, body.tx).await?;
    Ok(accepted(submitted))
}

pub async fn listing_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Json(body): Json<ListingBody>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let submitted = state
        .service
        .change_listing(&hash, &body.status, body.price.as_deref(), body.tx)
        .await?;
    Ok(accepted(submitted))
}

pub async fn price_handler(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
    Json(body): Json<PriceBody>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let submitted = state
        .service
        .change_price(&hash, &body.price, body.tx)
        .await?;
    Ok(accepted(submitted))
}

/// Detailed health check
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Prometheus scrape endpoint. 404 when no recorder was installed.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) | DatabaseError::PoolExhausted(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database_error",
                    self.to_string(),
                ),
                DatabaseError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found", self.to_string())
                }
                DatabaseError::Duplicate(_) => {
                    (StatusCode::CONFLICT, "duplicate", self.to_string())
                }
                DatabaseError::StaleWrite(_) => {
                    (StatusCode::CONFLICT, "stale_write", self.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    self.to_string(),
                ),
            },
            AppError::Blockchain(bc_err) => match bc_err {
                BlockchainError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "blockchain_error",
                    self.to_string(),
                ),
                BlockchainError::InsufficientFunds => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_funds",
                    self.to_string(),
                ),
                BlockchainError::InvalidPayload(_) => (
                    StatusCode::BAD_REQUEST,
                    "invalid_transaction",
                    self.to_string(),
                ),
                BlockchainError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "blockchain_error",
                    self.to_string(),
                ),
            },
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                ExternalServiceError::Unavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "external_service_error",
                    self.to_string(),
                ),
                _ => (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    self.to_string(),
                ),
            },
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", self.to_string()),
            AppError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                self.to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
            AppError::NotSupported(_) => (
                StatusCode::NOT_IMPLEMENTED,
                "not_supported",
                self.to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
