//! Infrastructure layer implementations.

pub mod blockchain;
pub mod database;
pub mod observability;
pub mod status;

pub use blockchain::{RpcBlockchainClient, RpcClientConfig};
pub use database::{PostgresClient, PostgresConfig};
pub use status::{HttpStatusService, StatusClientConfig};
