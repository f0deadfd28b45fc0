//! # Gateway Server
//!
//! HTTP surface of the LLM Gateway.
//!
//! This crate provides:
//! - The request orchestrator (route, cache, limit, call, record)
//! - Axum routes for generation, health, metrics and administration
//! - Service and admin key middleware
//! - Graceful shutdown handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admin;
pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod health;
pub mod orchestrator;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

pub use auth::{AuthKeys, ADMIN_KEY_HEADER, SERVICE_KEY_HEADER};
pub use error::ApiError;
pub use health::{startup_check, HealthResponse, ProviderHealth};
pub use orchestrator::{Orchestrator, OrchestratorParts};
pub use routes::create_router;
pub use server::Server;
pub use shutdown::shutdown_signal;
pub use state::{AppState, AppStateBuilder};
