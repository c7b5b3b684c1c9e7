//! Error types for quota-store

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// No file with this name exists
    #[error("File not found: {0}")]
    NotFound(String),

    /// Growth would exceed the unused capacity
    #[error("Insufficient capacity: requested {requested} bytes, {remaining} remaining")]
    InsufficientCapacity { requested: u64, remaining: u64 },

    /// Release asked for more than the unused capacity
    #[error("Cannot release {requested} bytes, only {remaining} unused")]
    OverRelease { requested: u64, remaining: u64 },

    /// Operation on a closed handle
    #[error("Handle closed: {0}")]
    InvalidHandle(String),

    /// Offset, length or amount out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Rename destination is taken
    #[error("File already exists: {0}")]
    AlreadyExists(String),

    /// File has open handles
    #[error("File in use: {0}")]
    FileInUse(String),

    /// Name rejected by the configured name policy
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Check if this error came from the capacity ledger
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            StoreError::InsufficientCapacity { .. } | StoreError::OverRelease { .. }
        )
    }
}
