use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced conversation document does not exist.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// The referenced message does not exist.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// The referenced access code does not exist.
    #[error("Access code not found: {0}")]
    CodeNotFound(String),

    /// A conditional merge found the document in a different state than
    /// the caller expected (lost a write race).
    #[error("Conditional write conflict on {0}")]
    Conflict(String),

    /// The backend rejected or failed the operation.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
