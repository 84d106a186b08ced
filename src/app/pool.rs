//! Bounded worker pool for chain submissions and status checks.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::domain::{AppError, ConfigError};

/// Caps how many background tasks run at once.
///
/// Cloning is cheap; clones share the same permits.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WORKER_POOL_CAPACITY".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a running task.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot in the caller, then runs `task` on it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the pool has been closed.
    pub async fn submit<F, T>(&self, task: F) -> Result<JoinHandle<T>, AppError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("worker pool is closed".to_string()))?;

        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }))
    }

    /// Spawns immediately; the task waits for its slot before running `task`.
    ///
    /// Resolves to `None` if the pool was closed before a slot freed up.
    pub fn spawn<F, T>(&self, task: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_or_else(task, || {})
    }

    /// Like [`WorkerPool::spawn`], running `on_closed` instead of `task` when
    /// the pool closes before a slot frees up.
    pub fn spawn_or_else<F, T, C>(&self, task: F, on_closed: C) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => Some(task.await),
                Err(_) => {
                    on_closed();
                    None
                }
            }
        })
    }

    /// Stops handing out permits; running tasks finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}
