//! Call signaling coordinator.
//!
//! A tiny shared-state machine layered on the conversation document's
//! `activeCall` field, used purely to decide when each side mounts or
//! unmounts the external media session. It knows nothing about SDP/ICE.
//!
//! Transitions are guarded with conditional merges so two sides racing the
//! same field cannot clobber each other: initiation requires no live
//! session, accept/reject require `ringing`. The loser of a race gets a
//! typed error instead of corrupting the shared state.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use uuid::Uuid;

use glasschat_shared::constants::RING_TIMEOUT;
use glasschat_shared::{CallSession, CallStatus, ConversationId, Role};
use glasschat_store::{CallExpectation, ConversationPatch, ConversationStore, DocWatch, StoreError};

use crate::error::CallError;

/// Drives the shared `activeCall` field for one side of a conversation.
pub struct CallCoordinator<S> {
    store: Arc<S>,
    conversation: ConversationId,
    role: Role,
}

/// How a caller's ring attempt concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Callee accepted; mount the media session.
    Answered,
    /// Callee declined; tear down and do not retry automatically.
    Rejected,
    /// The session was cleared or ended before an answer.
    HungUp,
    /// Nobody answered within the ring window; the shared session has
    /// been cleared so the callee's prompt is torn down too.
    TimedOut,
}

impl<S: ConversationStore> CallCoordinator<S> {
    pub fn new(store: Arc<S>, conversation: ConversationId, role: Role) -> Self {
        Self {
            store,
            conversation,
            role,
        }
    }

    /// A fresh correlation token per call attempt, so a new call never
    /// collides with a stale prior session on the signaling broker.
    fn fresh_room_id() -> String {
        format!("{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4())
    }

    /// Start ringing as the caller.
    ///
    /// Fails with [`CallError::Busy`] when a session already occupies the
    /// conversation (including losing the race against the other side
    /// initiating simultaneously).
    pub async fn initiate(&self) -> Result<CallSession, CallError> {
        let session = CallSession {
            caller: self.role,
            status: CallStatus::Ringing,
            room_id: Self::fresh_room_id(),
        };

        self.store
            .merge_conversation_if(
                &self.conversation,
                CallExpectation::NoLiveCall,
                ConversationPatch::new().with_call(Some(session.clone())),
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => CallError::Busy,
                other => CallError::Store(other),
            })?;

        info!(conversation = %self.conversation, room = %session.room_id, "outgoing call ringing");
        Ok(session)
    }

    /// Accept the ringing call as the callee.
    pub async fn accept(&self) -> Result<(), CallError> {
        self.transition_from_ringing(CallStatus::InProgress).await
    }

    /// Decline the ringing call as the callee. The caller's watcher must
    /// treat this as tear-down, not retry.
    pub async fn reject(&self) -> Result<(), CallError> {
        self.transition_from_ringing(CallStatus::Rejected).await
    }

    async fn transition_from_ringing(&self, to: CallStatus) -> Result<(), CallError> {
        self.store
            .merge_conversation_if(
                &self.conversation,
                CallExpectation::Status(CallStatus::Ringing),
                ConversationPatch::new().with_call_status(to),
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => CallError::InvalidTransition,
                other => CallError::Store(other),
            })
    }

    /// Hang up from either side, in any live state: clears the shared
    /// session.
    pub async fn hang_up(&self) -> Result<(), CallError> {
        self.store
            .merge_conversation(
                &self.conversation,
                ConversationPatch::new().with_call(None),
            )
            .await
            .map_err(CallError::Store)?;
        debug!(conversation = %self.conversation, "call cleared");
        Ok(())
    }

    /// Caller-side wait for the callee's answer, bounded by the ring
    /// window.
    ///
    /// Event-driven: resolves as soon as the shared session transitions.
    /// On timeout the shared session is cleared too (conditionally, so a
    /// simultaneous accept is not destroyed), and the attempt reports
    /// [`CallOutcome::TimedOut`].
    pub async fn wait_for_answer(
        &self,
        watch: &mut DocWatch,
        room_id: &str,
    ) -> Result<CallOutcome, CallError> {
        let outcome = tokio::time::timeout(RING_TIMEOUT, async {
            loop {
                match watch.recv().await {
                    Ok(snapshot) => match snapshot.active_call {
                        Some(call) if call.room_id == room_id => match call.status {
                            CallStatus::Ringing => continue,
                            CallStatus::InProgress => return CallOutcome::Answered,
                            CallStatus::Rejected => return CallOutcome::Rejected,
                            CallStatus::Ended => return CallOutcome::HungUp,
                        },
                        // Cleared, or superseded by a different session.
                        _ => return CallOutcome::HungUp,
                    },
                    // Skipped snapshots are fine; the next one is newer.
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return CallOutcome::HungUp,
                }
            }
        })
        .await;

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(_elapsed) => {
                // Unanswered: clear the shared session so the callee's
                // incoming prompt does not stay stuck. Conditional, in
                // case an accept landed at the same instant.
                match self
                    .store
                    .merge_conversation_if(
                        &self.conversation,
                        CallExpectation::Status(CallStatus::Ringing),
                        ConversationPatch::new().with_call(None),
                    )
                    .await
                {
                    Ok(()) => Ok(CallOutcome::TimedOut),
                    Err(StoreError::Conflict(_)) => {
                        let state = self
                            .store
                            .get_conversation(&self.conversation)
                            .await
                            .map_err(CallError::Store)?;
                        let answered = state
                            .and_then(|s| s.active_call)
                            .is_some_and(|c| {
                                c.room_id == room_id && c.status == CallStatus::InProgress
                            });
                        if answered {
                            Ok(CallOutcome::Answered)
                        } else {
                            Ok(CallOutcome::TimedOut)
                        }
                    }
                    Err(other) => Err(CallError::Store(other)),
                }
            }
        }
    }
}

/// The local call phase one side derives from snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPhase {
    Idle,
    RingingOutgoing,
    RingingIncoming,
    InProgress,
}

/// Local side effects a snapshot transition demands.
///
/// The UI shell acts on these; the watcher itself touches no devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTransition {
    /// Play the ring tone and show the incoming-call prompt.
    IncomingRinging { session: CallSession },
    /// We are the caller and the shared session started ringing.
    OutgoingRinging { session: CallSession },
    /// Stop the ring tone and mount the media view for this room.
    Connected { room_id: String },
    /// Stop the ring tone, unmount the media view, release devices.
    /// `rejected` distinguishes a decline from an ordinary hang-up.
    Ended { rejected: bool },
}

/// Derives [`CallTransition`]s from a stream of conversation snapshots.
///
/// An absent session and a terminal (`ended`/`rejected`) session are the
/// same phase: both demand full local tear-down.
pub struct CallWatcher {
    role: Role,
    phase: CallPhase,
}

impl CallWatcher {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: CallPhase::Idle,
        }
    }

    pub fn is_in_call(&self) -> bool {
        self.phase == CallPhase::InProgress
    }

    pub fn is_ringing(&self) -> bool {
        matches!(
            self.phase,
            CallPhase::RingingIncoming | CallPhase::RingingOutgoing
        )
    }

    /// Feed the latest snapshot's call field; returns the side effect to
    /// run, if the phase changed.
    pub fn on_snapshot(&mut self, call: Option<&CallSession>) -> Option<CallTransition> {
        let next = match call {
            Some(c) if c.status == CallStatus::Ringing => {
                if c.caller == self.role {
                    CallPhase::RingingOutgoing
                } else {
                    CallPhase::RingingIncoming
                }
            }
            Some(c) if c.status == CallStatus::InProgress => CallPhase::InProgress,
            _ => CallPhase::Idle,
        };

        if next == self.phase {
            return None;
        }
        let previous = self.phase;
        self.phase = next;

        match next {
            CallPhase::Idle => {
                if previous == CallPhase::Idle {
                    None
                } else {
                    let rejected =
                        matches!(call, Some(c) if c.status == CallStatus::Rejected);
                    Some(CallTransition::Ended { rejected })
                }
            }
            CallPhase::RingingIncoming => Some(CallTransition::IncomingRinging {
                session: call.cloned()?,
            }),
            CallPhase::RingingOutgoing => Some(CallTransition::OutgoingRinging {
                session: call.cloned()?,
            }),
            CallPhase::InProgress => Some(CallTransition::Connected {
                room_id: call.map(|c| c.room_id.clone())?,
            }),
        }
    }
}

/// Local-only media flags for the duration of one call. Never written to
/// the shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCallControls {
    pub muted: bool,
    pub video_enabled: bool,
}

impl LocalCallControls {
    pub fn new() -> Self {
        Self {
            muted: false,
            video_enabled: true,
        }
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    pub fn toggle_video(&mut self) -> bool {
        self.video_enabled = !self.video_enabled;
        self.video_enabled
    }
}

impl Default for LocalCallControls {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glasschat_store::MemoryStore;

    fn conv() -> ConversationId {
        ConversationId::from("VIP-01")
    }

    fn pair(store: &Arc<MemoryStore>) -> (CallCoordinator<MemoryStore>, CallCoordinator<MemoryStore>) {
        (
            CallCoordinator::new(store.clone(), conv(), Role::User),
            CallCoordinator::new(store.clone(), conv(), Role::Admin),
        )
    }

    async fn call_field(store: &MemoryStore) -> Option<CallSession> {
        store
            .get_conversation(&conv())
            .await
            .unwrap()
            .and_then(|s| s.active_call)
    }

    #[tokio::test]
    async fn ring_accept_connects_both_sides() {
        let store = Arc::new(MemoryStore::new());
        let (user, admin) = pair(&store);
        let mut user_watch = CallWatcher::new(Role::User);
        let mut admin_watch = CallWatcher::new(Role::Admin);

        let session = user.initiate().await.unwrap();
        let snapshot = call_field(&store).await;
        assert!(matches!(
            user_watch.on_snapshot(snapshot.as_ref()),
            Some(CallTransition::OutgoingRinging { .. })
        ));
        assert!(matches!(
            admin_watch.on_snapshot(snapshot.as_ref()),
            Some(CallTransition::IncomingRinging { .. })
        ));

        admin.accept().await.unwrap();
        let snapshot = call_field(&store).await;
        match user_watch.on_snapshot(snapshot.as_ref()) {
            Some(CallTransition::Connected { room_id }) => assert_eq!(room_id, session.room_id),
            other => panic!("expected Connected, got {other:?}"),
        }
        assert!(matches!(
            admin_watch.on_snapshot(snapshot.as_ref()),
            Some(CallTransition::Connected { .. })
        ));
        assert!(user_watch.is_in_call());
        assert!(admin_watch.is_in_call());
    }

    #[tokio::test]
    async fn reject_returns_caller_to_idle_without_connecting() {
        let store = Arc::new(MemoryStore::new());
        let (user, admin) = pair(&store);
        let mut user_watch = CallWatcher::new(Role::User);

        user.initiate().await.unwrap();
        user_watch.on_snapshot(call_field(&store).await.as_ref());

        admin.reject().await.unwrap();
        let snapshot = call_field(&store).await;
        assert_eq!(
            user_watch.on_snapshot(snapshot.as_ref()),
            Some(CallTransition::Ended { rejected: true })
        );
        assert!(!user_watch.is_in_call());
        assert!(!user_watch.is_ringing());
    }

    #[tokio::test]
    async fn second_initiation_loses_the_race() {
        let store = Arc::new(MemoryStore::new());
        let (user, admin) = pair(&store);

        user.initiate().await.unwrap();
        let err = admin.initiate().await.unwrap_err();
        assert!(matches!(err, CallError::Busy));

        // The winner's session is untouched.
        assert_eq!(call_field(&store).await.unwrap().caller, Role::User);
    }

    #[tokio::test]
    async fn initiate_succeeds_over_a_terminal_session() {
        let store = Arc::new(MemoryStore::new());
        let (user, admin) = pair(&store);

        user.initiate().await.unwrap();
        admin.reject().await.unwrap();

        // The rejected session no longer occupies the conversation.
        let second = admin.initiate().await.unwrap();
        assert_eq!(second.caller, Role::Admin);
    }

    #[tokio::test]
    async fn accept_without_ringing_is_an_invalid_transition() {
        let store = Arc::new(MemoryStore::new());
        let (_, admin) = pair(&store);
        let err = admin.accept().await.unwrap_err();
        assert!(matches!(err, CallError::InvalidTransition));
    }

    #[tokio::test]
    async fn hang_up_clears_from_either_state() {
        let store = Arc::new(MemoryStore::new());
        let (user, admin) = pair(&store);

        user.initiate().await.unwrap();
        admin.accept().await.unwrap();
        admin.hang_up().await.unwrap();
        assert!(call_field(&store).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_ring_times_out_and_clears_shared_state() {
        let store = Arc::new(MemoryStore::new());
        let (user, _) = pair(&store);

        let mut watch = store.watch_conversation(&conv()).await.unwrap();
        let session = user.initiate().await.unwrap();
        // Drain the ringing snapshot so the wait sees only later changes.
        let _ = watch.recv().await.unwrap();

        let outcome = user
            .wait_for_answer(&mut watch, &session.room_id)
            .await
            .unwrap();
        assert_eq!(outcome, CallOutcome::TimedOut);
        assert!(
            call_field(&store).await.is_none(),
            "timeout must clear the shared session so the callee's prompt dies"
        );
    }

    #[tokio::test]
    async fn answer_resolves_the_wait() {
        let store = Arc::new(MemoryStore::new());
        let (user, admin) = pair(&store);

        let mut watch = store.watch_conversation(&conv()).await.unwrap();
        let session = user.initiate().await.unwrap();
        let _ = watch.recv().await.unwrap();

        let room = session.room_id.clone();
        let waiter = tokio::spawn(async move {
            user.wait_for_answer(&mut watch, &room).await.unwrap()
        });

        admin.accept().await.unwrap();
        assert_eq!(waiter.await.unwrap(), CallOutcome::Answered);
    }

    #[tokio::test]
    async fn decline_resolves_the_wait_as_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (user, admin) = pair(&store);

        let mut watch = store.watch_conversation(&conv()).await.unwrap();
        let session = user.initiate().await.unwrap();
        let _ = watch.recv().await.unwrap();

        let room = session.room_id.clone();
        let waiter = tokio::spawn(async move {
            user.wait_for_answer(&mut watch, &room).await.unwrap()
        });

        admin.reject().await.unwrap();
        assert_eq!(waiter.await.unwrap(), CallOutcome::Rejected);
    }

    #[test]
    fn fresh_room_ids_never_collide() {
        let a = CallCoordinator::<MemoryStore>::fresh_room_id();
        let b = CallCoordinator::<MemoryStore>::fresh_room_id();
        assert_ne!(a, b);
    }

    #[test]
    fn controls_start_unmuted_with_video() {
        let mut controls = LocalCallControls::new();
        assert!(!controls.muted);
        assert!(controls.video_enabled);
        assert!(controls.toggle_mute());
        assert!(!controls.toggle_video());
    }
}
