//! Per-asset guard against overlapping lifecycle operations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::AppError;

/// Registry of content hashes with an unsettled lifecycle operation.
#[derive(Clone, Debug, Default)]
pub struct InFlight {
    hashes: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `content_hash` until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if another operation already holds it.
    pub fn claim(&self, content_hash: &str) -> Result<InFlightGuard, AppError> {
        let mut hashes = self.hashes.lock().unwrap_or_else(PoisonError::into_inner);
        if !hashes.insert(content_hash.to_string()) {
            return Err(AppError::Conflict(format!(
                "an operation on {} is still settling",
                content_hash
            )));
        }
        Ok(InFlightGuard {
            hashes: Arc::clone(&self.hashes),
            content_hash: content_hash.to_string(),
        })
    }

    #[must_use]
    pub fn is_claimed(&self, content_hash: &str) -> bool {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(content_hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its content hash on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    hashes: Arc<Mutex<HashSet<String>>>,
    content_hash: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.content_hash);
    }
}
