//! # supersql-core
//!
//! Error types, settings, and logging setup shared by every supersql crate.
//! This crate has no database dependencies.
//!
//! ## Modules
//!
//! - [`error`] - [`SqlError`] and the [`SqlResult`] alias
//! - [`settings`] - Database and pool configuration
//! - [`settings_loader`] - Loading [`Settings`] from TOML or JSON documents
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorKind, SqlError, SqlResult};
pub use settings::{DatabaseSettings, PoolSettings, Settings};
