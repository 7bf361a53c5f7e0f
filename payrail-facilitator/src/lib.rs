//! The payrail facilitator server.
//!
//! Wires the chain families into the core engines and exposes them over HTTP.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`chain`] - Chain family dispatch
//! - [`state`] - Shared application state
//! - [`handlers`] - Axum route handlers and router builder
//! - [`error`] - HTTP error responses
//! - [`shutdown`] - Signal-driven graceful shutdown

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod shutdown;
pub mod state;

pub use handlers::facilitator_router;
pub use state::{Facilitator, FacilitatorState};
