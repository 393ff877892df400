//! Administrator console: access-code provisioning and the active
//! conversation selection.
//!
//! The selection rule matters: any operation that makes a code unusable
//! (delete, block, expiry sweep) must also drop the admin's active
//! selection when it points at that code, so no dangling reference to a
//! dead conversation survives.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use glasschat_shared::{AccessCode, CodeStatus, ConversationId, Role};
use glasschat_store::{CodeRegistry, ConversationPatch, ConversationStore, StoreError};

use crate::error::SendError;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Admin-side console state and registry operations.
pub struct AdminConsole<S> {
    store: Arc<S>,
    active: Option<ConversationId>,
}

impl<S: ConversationStore + CodeRegistry> AdminConsole<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            active: None,
        }
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// The selection, or the error every send against no selection gets.
    pub fn selected(&self) -> Result<&ConversationId, SendError> {
        self.active.as_ref().ok_or(SendError::NoConversation)
    }

    pub fn select(&mut self, conversation: ConversationId) {
        self.active = Some(conversation);
    }

    pub fn deselect(&mut self) {
        self.active = None;
    }

    /// Provision a new access code. `expiry_hours == None` (or zero) makes
    /// it permanent. Also seeds the conversation document so the first
    /// subscriber reads a well-formed snapshot.
    pub async fn create_code(
        &self,
        id: &str,
        expiry_hours: Option<i64>,
        name: Option<String>,
    ) -> Result<AccessCode, StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let expires_at = expiry_hours.filter(|h| *h > 0).map(|h| now_ms + h * HOUR_MS);

        let mut code = AccessCode::new(id, now_ms, expires_at);
        code.name = name;
        self.store.put_code(code.clone()).await?;

        self.store
            .merge_conversation(
                &ConversationId::from(id),
                ConversationPatch::new()
                    .with_typing(Role::User, false)
                    .with_typing(Role::Admin, false),
            )
            .await?;

        info!(code = id, expires = ?expires_at, "access code provisioned");
        Ok(code)
    }

    /// Flip a code between `active` and `blocked`. Blocking the open
    /// conversation clears the selection.
    pub async fn toggle_block(&mut self, id: &str) -> Result<CodeStatus, StoreError> {
        let code = self
            .store
            .get_code(id)
            .await?
            .ok_or_else(|| StoreError::CodeNotFound(id.to_string()))?;

        let new_status = match code.status {
            CodeStatus::Active => CodeStatus::Blocked,
            CodeStatus::Blocked => CodeStatus::Active,
        };
        self.store.set_code_status(id, new_status).await?;

        if new_status == CodeStatus::Blocked {
            self.drop_selection_if(id);
        }
        Ok(new_status)
    }

    /// Delete a code permanently. The conversation document and its
    /// messages are orphaned, not cascaded. Clears the selection when the
    /// deleted code was the open conversation.
    pub async fn delete_code(&mut self, id: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete_code(id).await?;
        self.drop_selection_if(id);
        Ok(removed)
    }

    /// Delete every expired code. Returns the swept ids.
    pub async fn sweep_expired(&mut self) -> Result<Vec<String>, StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut swept = Vec::new();

        for code in self.store.list_codes().await? {
            if code.is_expired(now_ms) && self.store.delete_code(&code.id).await? {
                self.drop_selection_if(&code.id);
                swept.push(code.id);
            }
        }

        if !swept.is_empty() {
            info!(count = swept.len(), "expired access codes swept");
        }
        Ok(swept)
    }

    fn drop_selection_if(&mut self, id: &str) {
        if self.active.as_ref().is_some_and(|c| c.as_str() == id) {
            self.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glasschat_shared::CodeKind;
    use glasschat_store::MemoryStore;

    fn console() -> (Arc<MemoryStore>, AdminConsole<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let console = AdminConsole::new(store.clone());
        (store, console)
    }

    #[tokio::test]
    async fn create_seeds_the_conversation_document() {
        let (store, console) = console();
        let code = console.create_code("VIP-01", None, None).await.unwrap();
        assert_eq!(code.kind, CodeKind::Permanent);
        assert_eq!(code.status, CodeStatus::Active);

        let state = store
            .get_conversation(&ConversationId::from("VIP-01"))
            .await
            .unwrap()
            .expect("conversation document must exist after provisioning");
        assert!(!state.user_typing);
        assert!(!state.admin_typing);
    }

    #[tokio::test]
    async fn temporary_codes_carry_an_expiry() {
        let (_, console) = console();
        let code = console.create_code("TMP-1", Some(12), None).await.unwrap();
        assert_eq!(code.kind, CodeKind::Temporary);
        let expires = code.expires_at.unwrap();
        assert_eq!(expires - code.created_at, 12 * HOUR_MS);
    }

    #[tokio::test]
    async fn deleting_the_open_code_clears_the_selection() {
        let (_, mut console) = console();
        console.create_code("VIP-01", None, None).await.unwrap();
        console.select(ConversationId::from("VIP-01"));

        assert!(console.delete_code("VIP-01").await.unwrap());
        assert!(console.active_conversation().is_none());
        assert!(matches!(console.selected(), Err(SendError::NoConversation)));
    }

    #[tokio::test]
    async fn deleting_another_code_keeps_the_selection() {
        let (_, mut console) = console();
        console.create_code("VIP-01", None, None).await.unwrap();
        console.create_code("VIP-02", None, None).await.unwrap();
        console.select(ConversationId::from("VIP-01"));

        console.delete_code("VIP-02").await.unwrap();
        assert_eq!(
            console.active_conversation().map(|c| c.as_str()),
            Some("VIP-01")
        );
    }

    #[tokio::test]
    async fn blocking_the_open_code_clears_the_selection() {
        let (_, mut console) = console();
        console.create_code("VIP-01", None, None).await.unwrap();
        console.select(ConversationId::from("VIP-01"));

        let status = console.toggle_block("VIP-01").await.unwrap();
        assert_eq!(status, CodeStatus::Blocked);
        assert!(console.active_conversation().is_none());

        // Unblocking does not restore the selection.
        let status = console.toggle_block("VIP-01").await.unwrap();
        assert_eq!(status, CodeStatus::Active);
        assert!(console.active_conversation().is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_codes() {
        let (store, mut console) = console();
        console.create_code("KEEP", None, None).await.unwrap();

        // Backdate one code past its expiry.
        let expired = AccessCode::new("OLD", 0, Some(1));
        store.put_code(expired).await.unwrap();
        console.select(ConversationId::from("OLD"));

        let swept = console.sweep_expired().await.unwrap();
        assert_eq!(swept, vec!["OLD".to_string()]);
        assert!(console.active_conversation().is_none());
        assert!(store.get_code("KEEP").await.unwrap().is_some());
        assert!(store.get_code("OLD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_code_orphans_the_conversation() {
        let (store, mut console) = console();
        console.create_code("VIP-01", None, None).await.unwrap();
        console.delete_code("VIP-01").await.unwrap();

        // The conversation document survives the code's deletion.
        assert!(store
            .get_conversation(&ConversationId::from("VIP-01"))
            .await
            .unwrap()
            .is_some());
    }
}
