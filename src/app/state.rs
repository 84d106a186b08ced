//! Application state management.
//!
//! This module provides the shared application state that is
//! accessible to all request handlers via Axum's State extractor.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use super::service::LifecycleService;

/// Shared application state for the Axum web server.
///
/// All contained types are wrapped in `Arc`, making `AppState` cheap to
/// clone and safe to share across async tasks.
#[derive(Clone)]
pub struct AppState {
    /// The lifecycle service containing business logic.
    pub service: Arc<LifecycleService>,

    /// Renders the Prometheus scrape body, when a recorder is installed.
    pub metrics: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    #[must_use]
    pub fn new(service: Arc<LifecycleService>) -> Self {
        Self {
            service,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(Arc::new(handle));
        self
    }
}
