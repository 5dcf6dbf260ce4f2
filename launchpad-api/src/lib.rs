//! # Launchpad API Server Library
//!
//! The HTTP binding of the Launchpad core: configuration, the Axum router,
//! bearer-token middleware, and one handler module per resource.
//!
//! ## Modules
//!
//! - `app`: Application state, router builder, bearer middleware
//! - `config`: Configuration loaded from the environment
//! - `error`: Core error to HTTP response mapping
//! - `keys`: Signing key store construction and background rotation
//! - `routes`: Route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod keys;
pub mod routes;
