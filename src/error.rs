//! Error types for postboard operations.

use thiserror::Error;

/// Result type alias for postboard operations.
pub type Result<T> = std::result::Result<T, BoardError>;

/// Main error type for postboard operations.
#[derive(Error, Debug)]
pub enum BoardError {
    /// Record is missing or could not be decoded
    #[error("Not found: {0}")]
    NotFound(String),

    /// The parent post is locked against replies
    #[error("Parent post is locked")]
    LockedParent,

    /// The parent post has reached its reply fan-out limit
    #[error("Too many replies")]
    TooManyReplies,

    /// The reply would exceed the nesting depth limit
    #[error("Reply nesting too deep")]
    TooDeep,

    /// Underlying store I/O or commit errors
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed encoded keys
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BoardError {
    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new transaction error.
    pub fn transaction<T: ToString>(msg: T) -> Self {
        Self::Transaction(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates a new invalid key error.
    pub fn invalid_key<T: ToString>(msg: T) -> Self {
        Self::InvalidKey(msg.to_string())
    }

    /// Creates a new invalid input error.
    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Returns true for errors the caller caused by referencing missing data.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
