//! # huddle-server
//!
//! Axum front end for the Huddle messaging engine: configuration, metrics,
//! HTTP routes and the per-connection session driver.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, drive_session, run_server, serve, AppState};
