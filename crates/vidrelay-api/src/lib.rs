//! Axum HTTP server.
//!
//! This crate provides:
//! - `POST /chat/send`: synchronous submission, blocks until the upload ends
//! - `POST /webhook`: asynchronous submission from the WhatsApp gateway
//! - Health and Prometheus endpoints, request ids and request logging

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
