//! Presence & typing engine.
//!
//! Keeps the local side's `*Online` / `*Typing` / `*LastSeen` fields an
//! accurate low-latency reflection of UI state. All writes here are
//! best-effort: failures are logged and swallowed, never surfaced, and
//! never block message sending. The next UI event self-heals any staleness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use glasschat_shared::{ConversationId, ConversationState, Role};
use glasschat_store::{ConversationPatch, ConversationStore, DocWatch, StoreError};

/// What one side sees of the *other* side's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerPresence {
    pub online: bool,
    pub typing: bool,
    pub last_seen_ms: Option<i64>,
}

/// Derive the opposite side's presence from a document snapshot.
pub fn peer_presence(state: &ConversationState, local_role: Role) -> PeerPresence {
    let peer = local_role.opposite();
    PeerPresence {
        online: state.online(peer),
        typing: state.typing(peer),
        last_seen_ms: state.last_seen(peer).map(|t| t.timestamp_millis()),
    }
}

/// Publishes the local side's presence fields.
pub struct PresenceEngine<S> {
    store: Arc<S>,
    conversation: ConversationId,
    role: Role,
    /// Ghost mode: outbound presence/typing forced to `false` while the
    /// real local state keeps being tracked for restore-on-disable.
    ghost: AtomicBool,
    local_online: AtomicBool,
    local_typing: AtomicBool,
}

impl<S: ConversationStore> PresenceEngine<S> {
    pub fn new(store: Arc<S>, conversation: ConversationId, role: Role) -> Self {
        Self {
            store,
            conversation,
            role,
            ghost: AtomicBool::new(false),
            local_online: AtomicBool::new(false),
            local_typing: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_ghost(&self) -> bool {
        self.ghost.load(Ordering::Relaxed)
    }

    /// Mark the local side online. Fired on conversation open and whenever
    /// the window regains visibility.
    pub async fn publish_online(&self) {
        self.local_online.store(true, Ordering::Relaxed);
        let wire = !self.is_ghost();
        self.write(ConversationPatch::online(self.role, wire)).await;
    }

    /// Mark the local side offline and stamp `lastSeen`. Fired on
    /// visibility loss, unmount, or abrupt navigation; best-effort with no
    /// retry.
    pub async fn publish_offline(&self) {
        self.local_online.store(false, Ordering::Relaxed);
        let patch = ConversationPatch::online(self.role, false)
            .with_last_seen(self.role, self.now());
        self.write(patch).await;
    }

    /// Publish the typing flag. Fired per compose-input change, and forced
    /// to `false` right before a send and on blur.
    pub async fn publish_typing(&self, typing: bool) {
        self.local_typing.store(typing, Ordering::Relaxed);
        let wire = typing && !self.is_ghost();
        self.write(ConversationPatch::typing(self.role, wire)).await;
    }

    /// Toggle ghost mode. Enabling force-writes `false` for both fields
    /// regardless of real state; disabling republishes the real values.
    pub async fn set_ghost(&self, enabled: bool) {
        self.ghost.store(enabled, Ordering::Relaxed);
        let (online, typing) = if enabled {
            (false, false)
        } else {
            (
                self.local_online.load(Ordering::Relaxed),
                self.local_typing.load(Ordering::Relaxed),
            )
        };
        let patch = ConversationPatch::online(self.role, online).with_typing(self.role, typing);
        self.write(patch).await;
    }

    /// Live subscription to the conversation document; consumers read the
    /// opposite role's fields via [`peer_presence`].
    pub async fn observe(&self) -> Result<DocWatch, StoreError> {
        self.store.watch_conversation(&self.conversation).await
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn write(&self, patch: ConversationPatch) {
        if let Err(e) = self
            .store
            .merge_conversation(&self.conversation, patch)
            .await
        {
            // Presence is best-effort; stale state heals on the next event.
            debug!(conversation = %self.conversation, error = %e, "presence write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glasschat_store::MemoryStore;

    fn engine(role: Role) -> (Arc<MemoryStore>, PresenceEngine<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = PresenceEngine::new(store.clone(), ConversationId::from("VIP-01"), role);
        (store, engine)
    }

    async fn state(store: &MemoryStore) -> ConversationState {
        store
            .get_conversation(&ConversationId::from("VIP-01"))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn online_offline_round_trip_stamps_last_seen() {
        let (store, engine) = engine(Role::User);

        engine.publish_online().await;
        assert!(state(&store).await.user_online);
        assert!(state(&store).await.user_last_seen.is_none());

        engine.publish_offline().await;
        let snapshot = state(&store).await;
        assert!(!snapshot.user_online);
        assert!(snapshot.user_last_seen.is_some());
    }

    #[tokio::test]
    async fn typing_tracks_compose_input() {
        let (store, engine) = engine(Role::Admin);

        engine.publish_typing(true).await;
        assert!(state(&store).await.admin_typing);

        engine.publish_typing(false).await;
        assert!(!state(&store).await.admin_typing);
    }

    #[tokio::test]
    async fn ghost_mode_suppresses_and_restores() {
        let (store, engine) = engine(Role::Admin);

        engine.publish_online().await;
        engine.publish_typing(true).await;

        engine.set_ghost(true).await;
        let hidden = state(&store).await;
        assert!(!hidden.admin_online);
        assert!(!hidden.admin_typing);

        // Publishing while ghosted still writes false on the wire.
        engine.publish_online().await;
        engine.publish_typing(true).await;
        let still_hidden = state(&store).await;
        assert!(!still_hidden.admin_online);
        assert!(!still_hidden.admin_typing);

        // Disabling republishes the real local state.
        engine.set_ghost(false).await;
        let restored = state(&store).await;
        assert!(restored.admin_online);
        assert!(restored.admin_typing);
    }

    #[tokio::test]
    async fn ghost_mode_never_touches_the_peer_fields() {
        let (store, engine) = engine(Role::Admin);
        store
            .merge_conversation(
                &ConversationId::from("VIP-01"),
                ConversationPatch::online(Role::User, true),
            )
            .await
            .unwrap();

        engine.set_ghost(true).await;
        let snapshot = state(&store).await;
        assert!(snapshot.user_online, "ghost writes stay in the admin namespace");

        // The ghosted admin can still observe the user's presence.
        let peer = peer_presence(&snapshot, Role::Admin);
        assert!(peer.online);
    }
}
