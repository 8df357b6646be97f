//! HTTP server for distbot.
//!
//! Takes webhooks and message-bus deliveries, queues them for the
//! workers, and serves a read-only view of the pipelines.

pub mod error;
pub mod routes;
pub mod state;

pub use state::{AppState, worker_context};
