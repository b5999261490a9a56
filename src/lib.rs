//! Invoicedb is a lightweight, embeddable database core for a small-business
//! invoice management tool.
//!
//! It keeps four top-level collections (users, customers, invoices, roles) in
//! key-scoped client-side storage, wraps every operation in a bounded retry
//! against transient storage failures, and supports whole-database export and
//! import as a single JSON document.
//!
//! ## Core Components
//! - [`engine`]: The storage backend (in-memory map with file persistence).
//! - [`db`]: The [`Database`] component exposing the named operations.
//! - [`model`]: Entity types and the import/export payload schema.

pub mod db;
pub mod engine;
pub mod model;

pub use db::Database;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by invoicedb.
#[derive(Error, Debug)]
pub enum Error {
    /// An entity with the same unique key already exists.
    #[error("user already exists")]
    DuplicateEntity,
    /// The supplied credentials do not match the stored ones.
    #[error("invalid current password")]
    AuthenticationFailure,
    /// An import blob did not match the expected four-collection shape.
    #[error("malformed import payload: {0}")]
    MalformedPayload(String),
    /// A storage operation failed after exhausting its retries, or failed
    /// with a non-retryable engine error. The original cause is logged, not
    /// returned.
    #[error("Failed to {0}. Please try again.")]
    OperationFailed(String),
    /// The storage engine was in an invalid state. This is the transient
    /// class the retry wrapper is allowed to retry.
    #[error("invalid storage state: {0}")]
    InvalidState(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error belongs to the transient storage class.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }

    /// Domain rejections surface to the caller unchanged; they are neither
    /// retried nor collapsed into [`Error::OperationFailed`].
    pub(crate) fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::DuplicateEntity | Error::AuthenticationFailure | Error::MalformedPayload(_)
        )
    }
}

/// A specialized Result type for invoicedb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines read access to the key-scoped storage engine.
#[async_trait]
pub trait StorageRead: Send + Sync {
    /// Retrieves the value stored under `key`. `None` means the key is
    /// absent, which is distinct from a stored empty collection.
    async fn get_item(&self, key: &str) -> Result<Option<serde_json::Value>>;
}

/// Defines write access to the key-scoped storage engine.
#[async_trait]
pub trait StorageWrite: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: serde_json::Value) -> Result<()>;
    /// Removes `key`, returning it to the absent state.
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// The full engine interface a [`Database`] runs against.
pub trait StorageEngine: StorageRead + StorageWrite {}

impl<T: StorageRead + StorageWrite> StorageEngine for T {}
