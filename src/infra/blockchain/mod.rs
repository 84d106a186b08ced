//! Blockchain client implementations.

pub mod rpc;

pub use rpc::{RpcBlockchainClient, RpcClientConfig};
