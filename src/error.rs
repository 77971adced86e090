//! Error types for layerstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::digest::Digest;
use crate::name::Name;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for layerstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("manifest not found: {0}")]
    ManifestNotFound(Name),

    #[error("blob not found: {0}")]
    BlobNotFound(Digest),

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    /// Committed state disagrees with the blob store. Never repaired
    /// automatically.
    #[error("store corruption: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`StoreError`] for callers at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Io,
    Corruption,
}

impl StoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ManifestNotFound(_) | StoreError::BlobNotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidName(_)
            | StoreError::InvalidDigest(_)
            | StoreError::Serialization(_)
            | StoreError::Config(_) => ErrorKind::InvalidInput,
            StoreError::Io(_) => ErrorKind::Io,
            StoreError::Corruption(_) => ErrorKind::Corruption,
        }
    }

    /// True for missing manifests and missing blobs
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
