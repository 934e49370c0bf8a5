//! HTTP debug surface of the consumer
//!
//! Provides endpoints for:
//! - Triggering initial sync, delta sync and cleanup runs
//! - Removing initial sync jobs
//! - Flushing the ledger and the landing zone

pub mod server;

pub use server::{create_server, start_server, ApiError, AppState, ErrorResponse, SuccessResponse};
