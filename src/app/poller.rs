//! Sharded, timer-driven status poller.
//!
//! Watch items are spread over `2^shard_bits` FIFO queues. Each shard has one
//! long-running loop that, once per tick, drains a snapshot of its queue: items
//! whose timer has fired are handed to the worker pool for a status check, the
//! rest go straight back. The check handler re-enqueues the item with a wider
//! backoff unless it reported a terminal state.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::backoff::PollBackoff;
use super::pool::WorkerPool;
use crate::domain::{AppError, ConfigError, SELECTOR_WIDTH, ValidationError, WatchProgress, Watched};

/// Largest supported shard exponent.
pub const MAX_SHARD_BITS: u32 = 16;

/// Configuration for the status poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Shard count is `2^shard_bits`
    pub shard_bits: u32,
    /// Maximum items tracked per shard, queued or being checked
    pub shard_capacity: usize,
    /// Interval between passes over a shard
    pub tick_interval: Duration,
    /// Backoff unit between checks of one item
    pub base_interval: Duration,
    /// Upper bound on the backoff between checks
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            shard_bits: 3,
            shard_capacity: 1024,
            tick_interval: Duration::from_secs(10),
            base_interval: Duration::from_secs(60),
            max_backoff: Duration::from_secs(3600),
        }
    }
}

impl PollerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.shard_bits > MAX_SHARD_BITS {
            return Err(invalid(
                "POLLER_SHARD_BITS",
                &format!("must be at most {}", MAX_SHARD_BITS),
            ));
        }
        if self.shard_capacity == 0 {
            return Err(invalid("POLLER_SHARD_CAPACITY", "must be greater than zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("POLLER_TICK_SECS", "must be greater than zero"));
        }
        if self.base_interval > self.max_backoff {
            return Err(invalid(
                "POLLER_MAX_BACKOFF_SECS",
                "must not be smaller than the base interval",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        1usize << self.shard_bits
    }
}

/// Maps an identity to its shard by parsing its trailing hex digits.
pub fn shard_selector(identity: &str, shard_bits: u32) -> Result<usize, ValidationError> {
    let start = identity
        .len()
        .checked_sub(SELECTOR_WIDTH)
        .filter(|start| identity.is_char_boundary(*start))
        .ok_or_else(|| {
            ValidationError::InvalidFormat(format!(
                "identity '{}' is shorter than {} characters",
                identity, SELECTOR_WIDTH
            ))
        })?;
    let selector = u64::from_str_radix(&identity[start..], 16).map_err(|e| {
        ValidationError::InvalidFormat(format!(
            "identity '{}' has no hex selector: {}",
            identity, e
        ))
    })?;
    Ok((selector % (1u64 << shard_bits)) as usize)
}

struct WatchItem {
    payload: Arc<dyn Watched>,
    retry_count: u32,
    next_fire: Instant,
}

/// Read-only view of a queued watch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSnapshot {
    pub identity: String,
    pub retry_count: u32,
    pub next_fire: Instant,
}

struct Shard {
    index: usize,
    queue: Mutex<VecDeque<WatchItem>>,
    /// Identities tracked on this shard; one item per identity.
    members: StdMutex<HashSet<String>>,
    tracked: AtomicUsize,
}

impl Shard {
    /// Forgets an item that will not be requeued.
    fn release(&self, identity: &str) {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);
        self.tracked.fetch_sub(1, Ordering::AcqRel);
        self.publish_tracked();
    }

    fn publish_tracked(&self) {
        metrics::gauge!("status_poller_tracked_items", "shard" => self.index.to_string())
            .set(self.tracked.load(Ordering::Relaxed) as f64);
    }
}

/// Outcome of one pass over a shard.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Status checks started during the pass.
    pub dispatched: Vec<JoinHandle<Option<()>>>,
    /// Items put back because their timer had not fired.
    pub requeued: usize,
}

/// Polls watch items until they report a terminal state.
pub struct StatusPoller {
    config: PollerConfig,
    backoff: PollBackoff,
    shards: Vec<Arc<Shard>>,
    pool: WorkerPool,
}

impl StatusPoller {
    /// Create a poller with empty shards; call [`StatusPoller::start`] to run it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid configuration.
    pub fn new(config: PollerConfig, pool: WorkerPool) -> Result<Self, AppError> {
        config.validate()?;
        let shards = (0..config.shard_count())
            .map(|index| {
                Arc::new(Shard {
                    index,
                    queue: Mutex::new(VecDeque::new()),
                    members: StdMutex::new(HashSet::new()),
                    tracked: AtomicUsize::new(0),
                })
            })
            .collect();
        Ok(Self {
            backoff: PollBackoff::new(config.base_interval, config.max_backoff),
            config,
            shards,
            pool,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_for(&self, identity: &str) -> Result<usize, ValidationError> {
        shard_selector(identity, self.config.shard_bits)
    }

    /// Register an item; its first check happens on the shard's next pass.
    ///
    /// An identity that is already tracked keeps its existing item. Returns
    /// the shard the item was routed to.
    #[instrument(skip(self, payload), fields(identity = %payload.identity()))]
    pub async fn watch(&self, payload: Arc<dyn Watched>) -> Result<usize, AppError> {
        let index = self.shard_for(payload.identity())?;
        let shard = &self.shards[index];

        {
            let mut members = shard
                .members
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if members.contains(payload.identity()) {
                debug!(shard = index, "Identity already tracked, keeping existing watch");
                return Ok(index);
            }

            let capacity = self.config.shard_capacity;
            shard
                .tracked
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < capacity).then_some(n + 1)
                })
                .map_err(|_| {
                    AppError::Internal(format!(
                        "poller shard {} is at capacity ({})",
                        index, capacity
                    ))
                })?;
            members.insert(payload.identity().to_string());
        }

        shard.queue.lock().await.push_back(WatchItem {
            payload,
            retry_count: 0,
            next_fire: Instant::now(),
        });
        shard.publish_tracked();
        info!(shard = index, "Watch item entered status polling");
        Ok(index)
    }

    /// One pass over a shard, bounded by the queue length at pass start.
    pub async fn run_pass(&self, index: usize) -> PassReport {
        let mut report = PassReport::default();
        let Some(shard) = self.shards.get(index) else {
            return report;
        };

        let now = Instant::now();
        let mut fired = Vec::new();
        {
            let mut queue = shard.queue.lock().await;
            let snapshot_len = queue.len();
            for _ in 0..snapshot_len {
                let Some(item) = queue.pop_front() else {
                    break;
                };
                if item.next_fire <= now {
                    fired.push(item);
                } else {
                    queue.push_back(item);
                    report.requeued += 1;
                }
            }
        }

        for item in fired {
            let identity = item.payload.identity().to_string();
            let on_closed = {
                let shard = Arc::clone(shard);
                move || {
                    warn!(identity = %identity, "Worker pool closed, dropping watch item unchecked");
                    shard.release(&identity);
                }
            };
            let check = check_item(Arc::clone(shard), item, self.backoff);
            report
                .dispatched
                .push(self.pool.spawn_or_else(check, on_closed));
        }
        report
    }

    /// Spawn one loop per shard; loops stop when `shutdown` flips to `true`.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            shards = self.shards.len(),
            tick_interval = ?self.config.tick_interval,
            "Starting status poller"
        );
        (0..self.shards.len())
            .map(|index| tokio::spawn(Arc::clone(self).run_shard(index, shutdown.clone())))
            .collect()
    }

    async fn run_shard(self: Arc<Self>, index: usize, mut shutdown: watch::Receiver<bool>) {
        info!(shard = index, "Status poller shard loop started");
        loop {
            let report = self.run_pass(index).await;
            if !report.dispatched.is_empty() {
                debug!(
                    shard = index,
                    dispatched = report.dispatched.len(),
                    requeued = report.requeued,
                    "Status poller pass"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!(shard = index, "Status poller shard loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Items tracked across all shards, queued or being checked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.tracked.load(Ordering::Acquire))
            .sum()
    }

    /// Items currently sitting in a shard's queue.
    pub async fn queued(&self, index: usize) -> usize {
        match self.shards.get(index) {
            Some(shard) => shard.queue.lock().await.len(),
            None => 0,
        }
    }

    pub async fn snapshot(&self, index: usize) -> Vec<WatchSnapshot> {
        let Some(shard) = self.shards.get(index) else {
            return Vec::new();
        };
        shard
            .queue
            .lock()
            .await
            .iter()
            .map(|item| WatchSnapshot {
                identity: item.payload.identity().to_string(),
                retry_count: item.retry_count,
                next_fire: item.next_fire,
            })
            .collect()
    }
}

async fn check_item(shard: Arc<Shard>, mut item: WatchItem, backoff: PollBackoff) {
    let delay = backoff.delay_for(item.retry_count);

    match item.payload.step().await {
        Ok(WatchProgress::Terminal) => {
            shard.release(item.payload.identity());
            metrics::counter!("status_checks_total", "outcome" => "terminal").increment(1);
            info!(
                identity = %item.payload.identity(),
                checks = item.retry_count + 1,
                "Watch item left status polling"
            );
            return;
        }
        Ok(WatchProgress::Pending) => {
            metrics::counter!("status_checks_total", "outcome" => "pending").increment(1);
            debug!(identity = %item.payload.identity(), ?delay, "Status still pending");
        }
        Err(e) => {
            metrics::counter!("status_checks_total", "outcome" => "error").increment(1);
            warn!(
                identity = %item.payload.identity(),
                error = %e,
                ?delay,
                "Status check failed, will retry"
            );
        }
    }

    item.retry_count = item.retry_count.saturating_add(1);
    item.next_fire = Instant::now() + delay;
    shard.queue.lock().await.push_back(item);
}
