use thiserror::Error;

use glasschat_media::MediaError;
use glasschat_store::StoreError;

/// Errors from the identity gate and the end-user join flow.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid access code")]
    UnknownCode,

    /// The code exists but is blocked or past its expiry; the user must be
    /// guided back to re-authentication.
    #[error("This chat session is expired or blocked")]
    CodeNotUsable,

    #[error("Identity is not the allow-listed administrator")]
    NotAllowListed,

    #[error("Connection error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the compose & send pipeline. These are the only chat
/// failures surfaced inline to the user.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Nothing to send")]
    EmptyMessage,

    #[error("No conversation selected")]
    NoConversation,

    /// Attachment processing or upload failed; the whole send is aborted,
    /// nothing was partially written.
    #[error("Attachment upload failed: {0}")]
    Upload(#[from] MediaError),

    #[error("Only the author may edit a message")]
    NotAuthor,

    #[error("Delivery failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the call signaling coordinator.
#[derive(Error, Debug)]
pub enum CallError {
    /// A session already occupies the conversation (or we lost the
    /// initiation race).
    #[error("A call is already active in this conversation")]
    Busy,

    /// The shared session was not in the state this transition requires.
    #[error("No call in the expected state")]
    InvalidTransition,

    #[error("Store error: {0}")]
    Store(StoreError),
}
