//! File status service clients.

pub mod http;

pub use http::{HttpStatusService, StatusClientConfig};
