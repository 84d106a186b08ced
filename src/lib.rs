//! Asset lifecycle reconciliation.
//!
//! Keeps digital-asset records in a local database consistent with an
//! external chain and a content-addressed storage network.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   API Layer                  │
//! │      axum routes, rate limiting, errors      │
//! ├─────────────────────────────────────────────┤
//! │               Application Layer              │
//! │  lifecycle service, status poller, workers   │
//! ├─────────────────────────────────────────────┤
//! │                 Domain Layer                 │
//! │          traits, types, error enums          │
//! ├─────────────────────────────────────────────┤
//! │             Infrastructure Layer             │
//! │  Postgres, chain RPC, status service, logs   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Two engines do the work. [`app::StatusPoller`] spreads storage watches
//! over `2^B` shards and re-checks each one on a backoff schedule until the
//! file reaches a terminal state. [`app::LifecycleService`] validates mint,
//! purchase, transfer and listing requests, records a `Listening` activity,
//! answers immediately, and settles the transaction on a bounded
//! [`app::WorkerPool`], marking the activity `Failed` if any step goes wrong.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use asset_lifecycle::app::{AppState, LifecycleService, PollerConfig, StatusPoller, WorkerPool};
//!
//! let pool = WorkerPool::new(64)?;
//! let poller = Arc::new(StatusPoller::new(PollerConfig::default(), pool.clone())?);
//! let service = LifecycleService::new(db.clone(), db, chain, status, poller, pool);
//! let router = asset_lifecycle::api::create_router(Arc::new(AppState::new(Arc::new(service))));
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infra;

// Test utilities are available in tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
