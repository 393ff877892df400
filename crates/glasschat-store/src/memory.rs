//! In-memory realtime backend.
//!
//! Implements the full store contract with `broadcast`-based live
//! subscriptions, including the backend-assigned monotonic message
//! timestamps the ordering guarantee rests on. Used by the engines in
//! tests and local development; production deployments implement the same
//! traits against the managed database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use glasschat_shared::{
    AccessCode, CodeStatus, ConversationId, ConversationState, Message, MessageId, MessageStatus,
};

use crate::error::{Result, StoreError};
use crate::patch::{CallExpectation, ConversationPatch, MessagePatch, NewMessage};
use crate::store::{CodeRegistry, ConversationStore, DocWatch, MessagesWatch};

const CHANNEL_CAPACITY: usize = 64;

struct ConversationEntry {
    state: ConversationState,
    messages: Vec<Message>,
    /// Last assigned message timestamp (epoch ms); appends always move
    /// strictly past it, even within one wall-clock millisecond.
    last_timestamp_ms: i64,
    doc_tx: broadcast::Sender<ConversationState>,
    msg_tx: broadcast::Sender<Vec<Message>>,
}

impl ConversationEntry {
    fn new() -> Self {
        Self {
            state: ConversationState::default(),
            messages: Vec::new(),
            last_timestamp_ms: 0,
            doc_tx: broadcast::channel(CHANNEL_CAPACITY).0,
            msg_tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    fn notify_doc(&self) {
        // No receivers is fine; snapshots are only pushed to live watchers.
        let _ = self.doc_tx.send(self.state.clone());
    }

    fn notify_messages(&self) {
        let _ = self.msg_tx.send(self.messages.clone());
    }
}

struct Inner {
    conversations: HashMap<ConversationId, ConversationEntry>,
    codes: HashMap<String, AccessCode>,
}

/// In-memory store with live subscriptions.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                conversations: HashMap::new(),
                codes: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a writer panicked mid-update;
        // recover with whatever state is there rather than cascading.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<ConversationState>> {
        let inner = self.lock();
        Ok(inner.conversations.get(id).map(|e| e.state.clone()))
    }

    async fn merge_conversation(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
    ) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner
            .conversations
            .entry(id.clone())
            .or_insert_with(ConversationEntry::new);
        patch.apply(&mut entry.state);
        entry.notify_doc();
        Ok(())
    }

    async fn merge_conversation_if(
        &self,
        id: &ConversationId,
        expect: CallExpectation,
        patch: ConversationPatch,
    ) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner
            .conversations
            .entry(id.clone())
            .or_insert_with(ConversationEntry::new);
        if !expect.matches(&entry.state) {
            return Err(StoreError::Conflict(id.to_string()));
        }
        patch.apply(&mut entry.state);
        entry.notify_doc();
        Ok(())
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        let mut inner = self.lock();
        if inner.conversations.remove(id).is_some() {
            debug!(conversation = %id, "conversation deleted");
        }
        Ok(())
    }

    async fn watch_conversation(&self, id: &ConversationId) -> Result<DocWatch> {
        let mut inner = self.lock();
        let entry = inner
            .conversations
            .entry(id.clone())
            .or_insert_with(ConversationEntry::new);
        Ok(entry.doc_tx.subscribe())
    }

    async fn append_message(&self, id: &ConversationId, message: NewMessage) -> Result<Message> {
        let mut inner = self.lock();
        let entry = inner
            .conversations
            .entry(id.clone())
            .or_insert_with(ConversationEntry::new);

        let mut now_ms = Utc::now().timestamp_millis();
        if now_ms <= entry.last_timestamp_ms {
            now_ms = entry.last_timestamp_ms + 1;
        }
        entry.last_timestamp_ms = now_ms;

        let timestamp = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .ok_or_else(|| StoreError::Backend("timestamp out of range".into()))?;

        let stored = Message {
            id: MessageId::new(),
            text: message.text,
            is_image: message.is_image,
            sender: message.sender,
            timestamp: Some(timestamp),
            status: MessageStatus::Sent,
            is_edited: false,
            reply_to_id: message.reply_to_id,
        };

        entry.messages.push(stored.clone());
        entry.notify_messages();
        Ok(stored)
    }

    async fn get_message(&self, id: &ConversationId, message_id: MessageId) -> Result<Message> {
        let inner = self.lock();
        inner
            .conversations
            .get(id)
            .and_then(|e| e.messages.iter().find(|m| m.id == message_id))
            .cloned()
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>> {
        let inner = self.lock();
        Ok(inner
            .conversations
            .get(id)
            .map(|e| e.messages.clone())
            .unwrap_or_default())
    }

    async fn update_message(
        &self,
        id: &ConversationId,
        message_id: MessageId,
        patch: MessagePatch,
    ) -> Result<()> {
        let mut inner = self.lock();
        let entry = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;
        let msg = entry
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        if let Some(text) = patch.text {
            msg.text = text;
        }
        if let Some(edited) = patch.is_edited {
            msg.is_edited = edited;
        }
        entry.notify_messages();
        Ok(())
    }

    async fn advance_message_status(
        &self,
        id: &ConversationId,
        message_id: MessageId,
        to: MessageStatus,
    ) -> Result<bool> {
        let mut inner = self.lock();
        let entry = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;
        let msg = entry
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        // Never regress; equal status means nothing to do.
        if to <= msg.status {
            return Ok(false);
        }
        msg.status = to;
        entry.notify_messages();
        Ok(true)
    }

    async fn delete_message(&self, id: &ConversationId, message_id: MessageId) -> Result<bool> {
        let mut inner = self.lock();
        let Some(entry) = inner.conversations.get_mut(id) else {
            return Ok(false);
        };
        let before = entry.messages.len();
        entry.messages.retain(|m| m.id != message_id);
        let removed = entry.messages.len() != before;
        if removed {
            entry.notify_messages();
        }
        Ok(removed)
    }

    async fn clear_messages(&self, id: &ConversationId) -> Result<usize> {
        let mut inner = self.lock();
        let Some(entry) = inner.conversations.get_mut(id) else {
            return Ok(0);
        };
        let removed = entry.messages.len();
        entry.messages.clear();
        entry.notify_messages();
        debug!(conversation = %id, removed, "message history cleared");
        Ok(removed)
    }

    async fn watch_messages(&self, id: &ConversationId) -> Result<MessagesWatch> {
        let mut inner = self.lock();
        let entry = inner
            .conversations
            .entry(id.clone())
            .or_insert_with(ConversationEntry::new);
        Ok(entry.msg_tx.subscribe())
    }
}

#[async_trait]
impl CodeRegistry for MemoryStore {
    async fn get_code(&self, id: &str) -> Result<Option<AccessCode>> {
        let inner = self.lock();
        Ok(inner.codes.get(id).cloned())
    }

    async fn put_code(&self, code: AccessCode) -> Result<()> {
        let mut inner = self.lock();
        inner.codes.insert(code.id.clone(), code);
        Ok(())
    }

    async fn set_code_status(&self, id: &str, status: CodeStatus) -> Result<()> {
        let mut inner = self.lock();
        let code = inner
            .codes
            .get_mut(id)
            .ok_or_else(|| StoreError::CodeNotFound(id.to_string()))?;
        code.status = status;
        Ok(())
    }

    async fn delete_code(&self, id: &str) -> Result<bool> {
        let mut inner = self.lock();
        Ok(inner.codes.remove(id).is_some())
    }

    async fn list_codes(&self) -> Result<Vec<AccessCode>> {
        let inner = self.lock();
        Ok(inner.codes.values().cloned().collect())
    }
}
