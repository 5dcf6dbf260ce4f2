//! # Launchpad Shared Library
//!
//! This crate is the access-control and tenant-isolation core that every
//! Launchpad API request goes through.
//!
//! ## Module Organization
//!
//! - `auth`: Signing keys, bearer tokens, claims, the ACL predicate, and the auth flow
//! - `db`: Connection pool, migrations, the claims-scoped query builder, cancellation
//! - `models`: Users, accounts, memberships, and projects with their repositories
//! - `signup`: The atomic account + user + admin membership transaction
//! - `validation`: Field-level validation helpers
//! - `error`: The error taxonomy returned by every public operation

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod signup;
pub mod validation;

pub use error::{Error, FieldError, Result};

/// Current version of the Launchpad shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
