//! JSON-RPC chain client.
//!
//! Broadcasts caller-signed, base58-encoded transactions and waits for
//! inclusion by polling signature statuses.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AppError, BlockchainClient, BlockchainError, TransactionId};

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Per-request HTTP timeout
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Upper bound on one submission, broadcast plus confirmation
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            confirmation_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// JSON-RPC blockchain client
pub struct RpcBlockchainClient {
    http_client: Client,
    rpc_url: String,
    config: RpcClientConfig,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    params: T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignatureStatus {
    err: Option<serde_json::Value>,
    #[serde(rename = "confirmationStatus")]
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignatureStatusResult {
    value: Vec<Option<SignatureStatus>>,
}

impl RpcBlockchainClient {
    /// Create a new RPC blockchain client with custom configuration
    pub fn new(rpc_url: &str, config: RpcClientConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Blockchain(BlockchainError::Connection(e.to_string())))?;
        info!(rpc_url = %rpc_url, "Created blockchain client");
        Ok(Self {
            http_client,
            rpc_url: rpc_url.to_string(),
            config,
        })
    }

    /// Create a new RPC blockchain client with default configuration
    pub fn with_defaults(rpc_url: &str) -> Result<Self, AppError> {
        Self::new(rpc_url, RpcClientConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    /// Make an idempotent RPC call, retrying transport failures
    #[instrument(skip(self, params))]
    async fn rpc_call<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, AppError> {
        let mut attempt = 0;
        loop {
            match self.do_rpc_call(method, &params).await {
                Ok(result) => return Ok(result),
                Err(AppError::Blockchain(
                    e @ (BlockchainError::Connection(_) | BlockchainError::Timeout(_)),
                )) if attempt < self.config.max_retries => {
                    warn!(attempt = attempt, error = %e, method = %method, "RPC call failed");
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute a single RPC call
    async fn do_rpc_call<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R, AppError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: method.to_string(),
            params,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Blockchain(BlockchainError::Timeout(e.to_string()))
                } else {
                    AppError::Blockchain(BlockchainError::Connection(e.to_string()))
                }
            })?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| AppError::Blockchain(BlockchainError::RpcError(e.to_string())))?;

        if let Some(error) = rpc_response.error {
            if error.message.contains("insufficient") || error.code == -32002 {
                return Err(AppError::Blockchain(BlockchainError::InsufficientFunds));
            }
            return Err(AppError::Blockchain(BlockchainError::RpcError(format!(
                "{}: {}",
                error.code, error.message
            ))));
        }

        rpc_response.result.ok_or_else(|| {
            AppError::Blockchain(BlockchainError::RpcError("Empty response".to_string()))
        })
    }

    /// `Ok(true)` once the signature is confirmed or finalized.
    async fn is_confirmed(&self, signature: &str) -> Result<bool, AppError> {
        let params = serde_json::json!([[signature], {"searchTransactionHistory": true}]);
        let result: SignatureStatusResult = self.rpc_call("getSignatureStatuses", params).await?;

        match result.value.first() {
            Some(Some(status)) => {
                if let Some(err) = &status.err {
                    return Err(AppError::Blockchain(BlockchainError::TransactionFailed(
                        format!("transaction {} failed: {}", signature, err),
                    )));
                }
                Ok(matches!(
                    status.confirmation_status.as_deref(),
                    Some("confirmed" | "finalized")
                ))
            }
            _ => Ok(false),
        }
    }

    async fn send_and_confirm(&self, signed_tx: &str) -> Result<TransactionId, AppError> {
        // Broadcast is attempted once; a timed-out request may still have landed.
        let params = serde_json::json!([signed_tx, {"encoding": "base58"}]);
        let signature: String = self.do_rpc_call("sendTransaction", &params).await?;
        info!(signature = %signature, "Transaction sent");

        loop {
            match self.is_confirmed(&signature).await {
                Ok(true) => {
                    info!(signature = %signature, "Transaction confirmed");
                    return Ok(signature);
                }
                Ok(false) => debug!(signature = %signature, "Transaction not yet confirmed"),
                Err(e @ AppError::Blockchain(BlockchainError::TransactionFailed(_))) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(signature = %signature, error = %e, "Error checking transaction status");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl BlockchainClient for RpcBlockchainClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let _: u64 = self.rpc_call("getSlot", Vec::<()>::new()).await?;
        Ok(())
    }

    #[instrument(skip(self, signed_tx), fields(payload_len = signed_tx.len()))]
    async fn submit_transaction(&self, signed_tx: &str) -> Result<TransactionId, AppError> {
        bs58::decode(signed_tx).into_vec().map_err(|e| {
            AppError::Blockchain(BlockchainError::InvalidPayload(format!(
                "signed transaction is not base58: {}",
                e
            )))
        })?;

        let window = self.config.confirmation_timeout;
        tokio::time::timeout(window, self.send_and_confirm(signed_tx))
            .await
            .map_err(|_| {
                AppError::Blockchain(BlockchainError::Timeout(format!(
                    "transaction not confirmed within {:?}",
                    window
                )))
            })?
    }
}
