//! Core error types for supersql.
//!
//! This module provides the error enum [`SqlError`] shared by every crate in
//! the workspace. Variants are grouped by the stage that raises them so callers
//! can tell a malformed query (fail fast, never retry) apart from a saturated
//! pool (safe to retry) via [`SqlError::kind`] and [`SqlError::is_retryable`].

use std::time::Duration;

use thiserror::Error;

/// Message used when a connection is opened twice.
pub const CONNECTED_MESSAGE: &str = "A connection already exists";

/// Message used when a connection is used before being opened.
pub const DISCONNECTED_MESSAGE: &str = "No connection found to database";

/// The broad category an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Raised while building or compiling a query, before any I/O.
    Build,
    /// Raised by connection pooling or connect/disconnect ordering.
    Pool,
    /// Raised by the database driver while running a statement.
    Database,
    /// Raised while loading or interpreting configuration.
    Configuration,
    /// Raised by the operating system.
    Io,
}

/// The primary error type for supersql.
#[derive(Error, Debug)]
pub enum SqlError {
    // ── Build / usage errors ─────────────────────────────────────────

    /// A builder argument was malformed.
    #[error("Argument error: {0}")]
    Argument(String),

    /// A required builder argument was missing.
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// A column was used as a predicate without any comparison operator.
    #[error("Invalid use of bare column in predicate: {0}")]
    BareColumn(String),

    /// The requested operation is intentionally unsupported.
    #[error("{feature} is not yet implemented, use {alternative} instead")]
    NotImplemented {
        /// The operation that was requested.
        feature: String,
        /// What the caller should use instead.
        alternative: String,
    },

    /// The query state cannot be rendered into valid SQL.
    #[error("Compile error: {0}")]
    Compile(String),

    // ── Pool errors ──────────────────────────────────────────────────

    /// `connect` was called on something that is already connected.
    #[error("{}", CONNECTED_MESSAGE)]
    AlreadyConnected,

    /// An operation needed a connection but none was open.
    #[error("{}", DISCONNECTED_MESSAGE)]
    NotConnected,

    /// Waiting for a pooled connection exceeded the pool timeout.
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    /// The pool was closed.
    #[error("Connection pool is closed")]
    PoolClosed,

    // ── Database errors ──────────────────────────────────────────────

    /// A generic database error (bad SQL, type mismatch, ...).
    #[error("Database error: {0}")]
    Database(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    Operational(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqlError {
    /// Shorthand for [`SqlError::NotImplemented`].
    pub fn not_implemented(feature: impl Into<String>, alternative: impl Into<String>) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
            alternative: alternative.into(),
        }
    }

    /// Returns the category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Argument(_)
            | Self::MissingArgument(_)
            | Self::BareColumn(_)
            | Self::NotImplemented { .. }
            | Self::Compile(_) => ErrorKind::Build,
            Self::AlreadyConnected | Self::NotConnected | Self::PoolTimeout(_) | Self::PoolClosed => {
                ErrorKind::Pool
            }
            Self::Database(_) | Self::Integrity(_) | Self::Operational(_) => ErrorKind::Database,
            Self::Configuration(_) | Self::Serialization(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns `true` if the error was raised before any database round-trip.
    pub const fn is_build_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Build)
    }

    /// Returns `true` if repeating the same operation may succeed.
    ///
    /// A saturated pool or a dropped connection can clear up on its own; a
    /// malformed query or a constraint violation cannot.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolTimeout(_) | Self::Operational(_))
    }
}

/// A convenience type alias for `Result<T, SqlError>`.
pub type SqlResult<T> = Result<T, SqlError>;
