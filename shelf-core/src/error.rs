//! Error types and result types for store operations.
//!
//! Use [`StoreResult<T>`] as the return type for fallible operations.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a store.
///
/// This enum covers encoding and decoding failures, query construction issues,
/// batch application problems, and engine-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error while opening or configuring a database.
    #[error("Open error: {0}")]
    Open(String),
    /// An element could not be encoded into a stored document.
    #[error("Encode error: {0}")]
    Encode(String),
    /// A stored document could not be decoded back into an element.
    #[error("Decode error: {0}")]
    Decode(String),
    /// A query could not be compiled or executed.
    #[error("Query error: {0}")]
    Query(String),
    /// A batch of write operations could not be applied.
    #[error("Batch error: {0}")]
    Batch(String),
    /// The operation requires a primary key but the entity type declares none.
    #[error("Entity type {0} declares no primary key")]
    MissingPrimaryKey(&'static str),
    /// An error occurred in the underlying storage engine.
    #[error("Engine error: {0}")]
    Engine(String),
}

/// A specialized `Result` type for store operations.
///
/// This type alias is used throughout the crate to indicate operations that may fail
/// with a [`StoreError`].
pub type StoreResult<T> = Result<T, StoreError>;

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Encode(err.to_string())
    }
}
