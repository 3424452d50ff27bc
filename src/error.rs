//! # Error types
//!
//! Every library component reports failures through [`ChatError`]. The variants
//! follow the failure taxonomy the rest of the crate relies on:
//!
//! | Variant | Raised by | Recovery |
//! |---------|-----------|----------|
//! | [`ChatError::Configuration`] | controller (no credential), key file loading | user configures a key |
//! | [`ChatError::Validation`] | controller (empty prompt) | user edits input |
//! | [`ChatError::RequestFailure`] | completion client | user retries |
//! | [`ChatError::Decryption`] | vault internals | vault treats credential as unset |
//! | [`ChatError::NotFound`] | session store | caller refreshes its view |
//! | [`ChatError::Cancelled`] | cancellable submission | none needed |
//!
//! Database and IO failures are wrapped transparently so `?` works inside the stores.

use thiserror::Error;

/// Main error type for mdchat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Something required to talk to the API is missing (usually the credential).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// User input was rejected before any work was done.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The completion request failed (transport, provider error payload, malformed response).
    #[error("Request failed: {0}")]
    RequestFailure(String),

    /// A stored credential could not be decrypted with the current key.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// The referenced session does not exist (any more).
    #[error("Not found: {0}")]
    NotFound(String),

    /// An in-flight completion was cancelled before it produced a reply.
    #[error("Request cancelled")]
    Cancelled,

    /// Query or transaction failure reported by diesel.
    #[error("Storage error: {0}")]
    Storage(#[from] diesel::result::Error),

    /// The SQLite database could not be opened.
    #[error("Database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    /// IO errors (key file handling).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Whether the error is one the user can act on directly (as opposed to a storage fault).
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ChatError::Configuration(_)
                | ChatError::Validation(_)
                | ChatError::RequestFailure(_)
                | ChatError::NotFound(_)
                | ChatError::Cancelled
        )
    }
}
