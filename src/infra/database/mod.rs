//! Concrete database client implementations.
//!
//! This module contains the Postgres adapter implementing the
//! `AssetRepository` and `ActivityRepository` traits of the domain layer.

pub mod postgres;

pub use postgres::{PostgresClient, PostgresConfig};
