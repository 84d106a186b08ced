//! Application layer containing business logic and shared state.

pub mod backoff;
pub mod inflight;
pub mod poller;
pub mod pool;
mod settlement;
pub mod service;
pub mod state;
pub mod watch;

pub use backoff::PollBackoff;
pub use inflight::{InFlight, InFlightGuard};
pub use poller::{PassReport, PollerConfig, StatusPoller, WatchSnapshot, shard_selector};
pub use pool::WorkerPool;
pub use service::{LifecycleService, Submitted};
pub use state::AppState;
pub use watch::FileStatusWatch;
