//! Store traits mirroring the managed document database's contract.
//!
//! Watch methods hand out `tokio::sync::broadcast` receivers. Every change
//! pushes a complete snapshot; a receiver that lags simply skips to a newer
//! snapshot, which is safe because consumers derive all state from the
//! latest one.

use async_trait::async_trait;
use tokio::sync::broadcast;

use glasschat_shared::{
    AccessCode, CodeStatus, ConversationId, ConversationState, Message, MessageId, MessageStatus,
};

use crate::error::Result;
use crate::patch::{CallExpectation, ConversationPatch, MessagePatch, NewMessage};

/// Live subscription to one conversation document.
pub type DocWatch = broadcast::Receiver<ConversationState>;

/// Live subscription to one conversation's ordered message list.
pub type MessagesWatch = broadcast::Receiver<Vec<Message>>;

/// The conversation-document and message-collection surface of the store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Point read. `Ok(None)` when the document does not exist.
    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<ConversationState>>;

    /// Merge-write. Creates the document when missing; unset patch fields
    /// are left untouched.
    async fn merge_conversation(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
    ) -> Result<()>;

    /// Conditional merge: applied only when `expect` matches the current
    /// call state, otherwise fails with [`crate::StoreError::Conflict`].
    async fn merge_conversation_if(
        &self,
        id: &ConversationId,
        expect: CallExpectation,
        patch: ConversationPatch,
    ) -> Result<()>;

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()>;

    /// Subscribe to document changes. Emits one snapshot per change.
    async fn watch_conversation(&self, id: &ConversationId) -> Result<DocWatch>;

    /// Append a message. The store assigns the id and a monotonically
    /// increasing timestamp; the initial status is `sent`. Returns the
    /// stored message.
    async fn append_message(&self, id: &ConversationId, message: NewMessage) -> Result<Message>;

    async fn get_message(&self, id: &ConversationId, message_id: MessageId) -> Result<Message>;

    /// All messages, ordered by store-assigned timestamp.
    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>>;

    /// Author-side edit (text / edited marker only).
    async fn update_message(
        &self,
        id: &ConversationId,
        message_id: MessageId,
        patch: MessagePatch,
    ) -> Result<()>;

    /// Monotonic delivery-status advance: writes only when `to` is strictly
    /// ahead of the stored status. Returns whether a write happened, so
    /// re-observing an already-seen message is a no-op.
    async fn advance_message_status(
        &self,
        id: &ConversationId,
        message_id: MessageId,
        to: MessageStatus,
    ) -> Result<bool>;

    /// Idempotent delete. Returns whether the message existed.
    async fn delete_message(&self, id: &ConversationId, message_id: MessageId) -> Result<bool>;

    /// Delete every message in the conversation. Returns how many were
    /// removed.
    async fn clear_messages(&self, id: &ConversationId) -> Result<usize>;

    /// Subscribe to the message list. Emits the whole ordered list per
    /// change, never a diff.
    async fn watch_messages(&self, id: &ConversationId) -> Result<MessagesWatch>;
}

/// CRUD over the access-code registry. Codes are keyed by the code string.
#[async_trait]
pub trait CodeRegistry: Send + Sync {
    async fn get_code(&self, id: &str) -> Result<Option<AccessCode>>;

    /// Create or replace a code document.
    async fn put_code(&self, code: AccessCode) -> Result<()>;

    async fn set_code_status(&self, id: &str, status: CodeStatus) -> Result<()>;

    /// Returns whether the code existed. Does not cascade to the
    /// conversation document or its messages; those are orphaned.
    async fn delete_code(&self, id: &str) -> Result<bool>;

    async fn list_codes(&self) -> Result<Vec<AccessCode>>;
}
