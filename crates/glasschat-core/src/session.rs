//! Per-conversation chat session.
//!
//! Owns the live subscriptions for exactly one conversation and turns
//! their snapshots into a typed event stream for the UI shell: message
//! lists, peer presence changes, call transitions, alert cues, and the
//! connection banner. Opening a session publishes `online`; closing it
//! aborts the watch tasks and publishes `offline`. Switching
//! conversations is close-then-open, which is what resets the
//! notification counters — a freshly opened backlog never rings the
//! alert.
//!
//! All cross-session state (ring tones, focus, counters) lives inside the
//! session rather than in process-wide singletons, so multiple windows do
//! not interfere.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use glasschat_shared::constants::CALL_TICK;
use glasschat_shared::{ConversationId, ConversationState, Message, Role, UserProfile, WindowFocus};
use glasschat_store::{ConversationPatch, ConversationStore, StoreError};

use crate::call::{CallTransition, CallWatcher};
use crate::delivery::DeliveryEngine;
use crate::presence::{peer_presence, PeerPresence, PresenceEngine};

const EVENT_CAPACITY: usize = 64;

/// Everything the UI shell reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Fresh ordered message snapshot (the whole list, never a diff).
    Messages(Vec<Message>),
    /// The other side's presence changed.
    Presence(PeerPresence),
    /// A call transition demanding local side effects.
    Call(CallTransition),
    /// Alert cues for a newly arrived peer message.
    Notify(Notification),
    /// The store stream failed; keep local state, show the banner.
    ConnectionLost,
    /// A snapshot arrived after a failure; clear the banner.
    ConnectionRestored,
}

/// Alert cues for one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub play_sound: bool,
    /// Only while the window is blurred; focus regain restores the title.
    pub blink_title: bool,
}

struct SessionShared {
    focused: AtomicBool,
    in_call: AtomicBool,
    call_seconds: AtomicU64,
    connection_lost: AtomicBool,
}

impl SessionShared {
    fn focus(&self) -> WindowFocus {
        if self.focused.load(Ordering::Relaxed) {
            WindowFocus::Focused
        } else {
            WindowFocus::Blurred
        }
    }

    /// Banner bookkeeping shared by both watch loops so the user sees one
    /// banner, not one per stream.
    fn mark_lost(&self) -> bool {
        !self.connection_lost.swap(true, Ordering::Relaxed)
    }

    fn mark_restored(&self) -> bool {
        self.connection_lost.swap(false, Ordering::Relaxed)
    }
}

/// A live session on one conversation.
pub struct ChatSession<S> {
    store: Arc<S>,
    conversation: ConversationId,
    role: Role,
    presence: Arc<PresenceEngine<S>>,
    delivery: Arc<DeliveryEngine<S>>,
    shared: Arc<SessionShared>,
    events: mpsc::Receiver<SessionEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: ConversationStore + 'static> ChatSession<S> {
    /// Subscribe to the conversation, publish `online`, and start the
    /// watch tasks. The initial backlog is delivered as the first
    /// [`SessionEvent::Messages`] without triggering alerts.
    pub async fn open(
        store: Arc<S>,
        conversation: ConversationId,
        role: Role,
    ) -> Result<Self, StoreError> {
        let (tx, events) = mpsc::channel(EVENT_CAPACITY);
        let shared = Arc::new(SessionShared {
            focused: AtomicBool::new(true),
            in_call: AtomicBool::new(false),
            call_seconds: AtomicU64::new(0),
            connection_lost: AtomicBool::new(false),
        });
        let presence = Arc::new(PresenceEngine::new(
            store.clone(),
            conversation.clone(),
            role,
        ));
        let delivery = Arc::new(DeliveryEngine::new(
            store.clone(),
            conversation.clone(),
            role,
        ));

        let doc_watch = store.watch_conversation(&conversation).await?;
        let msg_watch = store.watch_messages(&conversation).await?;

        presence.publish_online().await;

        // The subscription only pushes on change; seed both loops with the
        // current state so a quiet conversation still renders.
        let initial_doc = store
            .get_conversation(&conversation)
            .await?
            .unwrap_or_default();
        let initial_messages = store.list_messages(&conversation).await?;

        let tasks = vec![
            tokio::spawn(document_loop(
                store.clone(),
                conversation.clone(),
                role,
                initial_doc,
                doc_watch,
                tx.clone(),
                shared.clone(),
            )),
            tokio::spawn(message_loop(
                store.clone(),
                conversation.clone(),
                role,
                initial_messages,
                msg_watch,
                tx,
                shared.clone(),
                delivery.clone(),
            )),
        ];

        Ok(Self {
            store,
            conversation,
            role,
            presence,
            delivery,
            shared,
            events,
            tasks,
        })
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn presence(&self) -> &PresenceEngine<S> {
        &self.presence
    }

    pub fn delivery(&self) -> &DeliveryEngine<S> {
        &self.delivery
    }

    /// Next event, or `None` once the session is closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Report a window focus change. Regaining focus re-publishes
    /// `online` and acknowledges everything currently visible as seen;
    /// losing it publishes `offline`.
    pub async fn set_focus(&self, focus: WindowFocus) {
        self.shared
            .focused
            .store(focus.is_focused(), Ordering::Relaxed);

        match focus {
            WindowFocus::Focused => {
                self.presence.publish_online().await;
                match self.store.list_messages(&self.conversation).await {
                    Ok(messages) => {
                        self.delivery.observe(&messages, WindowFocus::Focused).await;
                    }
                    Err(e) => {
                        debug!(conversation = %self.conversation, error = %e, "focus re-observation failed");
                    }
                }
            }
            WindowFocus::Blurred => {
                // Nobody types into a blurred window.
                self.presence.publish_typing(false).await;
                self.presence.publish_offline().await;
            }
        }
    }

    /// Publish the end-user's profile card onto the conversation
    /// document. Best-effort like every presence-adjacent write.
    pub async fn publish_profile(&self, profile: UserProfile) {
        if let Err(e) = self
            .store
            .merge_conversation(
                &self.conversation,
                ConversationPatch::new().with_profile(Some(profile)),
            )
            .await
        {
            debug!(conversation = %self.conversation, error = %e, "profile write failed");
        }
    }

    /// Seconds the current call has been in progress (1 s granularity).
    pub fn call_elapsed_secs(&self) -> u64 {
        self.shared.call_seconds.load(Ordering::Relaxed)
    }

    /// Tear the session down: abort the watch tasks (unsubscribing this
    /// conversation) and publish `offline`.
    pub async fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.presence.publish_offline().await;
    }
}

impl<S> Drop for ChatSession<S> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

struct DocLoopState {
    call_watcher: CallWatcher,
    last_presence: Option<PeerPresence>,
}

/// Returns `false` once the event receiver is gone.
async fn process_doc_snapshot(
    snapshot: ConversationState,
    role: Role,
    state: &mut DocLoopState,
    tx: &mpsc::Sender<SessionEvent>,
    shared: &SessionShared,
) -> bool {
    let presence = peer_presence(&snapshot, role);
    if state.last_presence != Some(presence) {
        state.last_presence = Some(presence);
        if tx.send(SessionEvent::Presence(presence)).await.is_err() {
            return false;
        }
    }

    if let Some(transition) = state.call_watcher.on_snapshot(snapshot.active_call.as_ref()) {
        match &transition {
            CallTransition::Connected { .. } => {
                shared.call_seconds.store(0, Ordering::Relaxed);
                shared.in_call.store(true, Ordering::Relaxed);
            }
            CallTransition::Ended { .. } => {
                shared.in_call.store(false, Ordering::Relaxed);
            }
            _ => {}
        }
        if tx.send(SessionEvent::Call(transition)).await.is_err() {
            return false;
        }
    }
    true
}

async fn document_loop<S: ConversationStore>(
    store: Arc<S>,
    conversation: ConversationId,
    role: Role,
    initial: ConversationState,
    mut watch: glasschat_store::DocWatch,
    tx: mpsc::Sender<SessionEvent>,
    shared: Arc<SessionShared>,
) {
    let mut state = DocLoopState {
        call_watcher: CallWatcher::new(role),
        last_presence: None,
    };
    let mut pending = Some(initial);
    let mut ticker = tokio::time::interval(CALL_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let snapshot = if let Some(snapshot) = pending.take() {
            snapshot
        } else {
            tokio::select! {
                result = watch.recv() => match result {
                    Ok(snapshot) => {
                        if shared.mark_restored()
                            && tx.send(SessionEvent::ConnectionRestored).await.is_err()
                        {
                            return;
                        }
                        snapshot
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(conversation = %conversation, skipped, "document watch lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        if shared.mark_lost()
                            && tx.send(SessionEvent::ConnectionLost).await.is_err()
                        {
                            return;
                        }
                        match store.watch_conversation(&conversation).await {
                            Ok(w) => {
                                watch = w;
                                continue;
                            }
                            Err(e) => {
                                warn!(conversation = %conversation, error = %e, "document re-subscribe failed");
                                return;
                            }
                        }
                    }
                },
                _ = ticker.tick() => {
                    if shared.in_call.load(Ordering::Relaxed) {
                        shared.call_seconds.fetch_add(1, Ordering::Relaxed);
                    }
                    continue;
                }
            }
        };

        if !process_doc_snapshot(snapshot, role, &mut state, &tx, &shared).await {
            return;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn message_loop<S: ConversationStore>(
    store: Arc<S>,
    conversation: ConversationId,
    role: Role,
    initial: Vec<Message>,
    mut watch: glasschat_store::MessagesWatch,
    tx: mpsc::Sender<SessionEvent>,
    shared: Arc<SessionShared>,
    delivery: Arc<DeliveryEngine<S>>,
) {
    // Count of messages already accounted for. Zero means "backlog not
    // yet seen": the first snapshot never alerts, whatever its size.
    let mut previous_count = 0usize;
    let mut pending = Some(initial);

    loop {
        let messages = if let Some(messages) = pending.take() {
            messages
        } else {
            match watch.recv().await {
                Ok(messages) => {
                    if shared.mark_restored()
                        && tx.send(SessionEvent::ConnectionRestored).await.is_err()
                    {
                        return;
                    }
                    messages
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(conversation = %conversation, skipped, "message watch lagged");
                    continue;
                }
                Err(RecvError::Closed) => {
                    if shared.mark_lost() && tx.send(SessionEvent::ConnectionLost).await.is_err()
                    {
                        return;
                    }
                    match store.watch_messages(&conversation).await {
                        Ok(w) => {
                            watch = w;
                            continue;
                        }
                        Err(e) => {
                            warn!(conversation = %conversation, error = %e, "message re-subscribe failed");
                            return;
                        }
                    }
                }
            }
        };

        // Alert only for a peer-authored message beyond the known count.
        if previous_count != 0 && messages.len() > previous_count {
            if let Some(last) = messages.last() {
                if last.sender == role.opposite() {
                    let notification = Notification {
                        play_sound: true,
                        blink_title: !shared.focused.load(Ordering::Relaxed),
                    };
                    if tx.send(SessionEvent::Notify(notification)).await.is_err() {
                        return;
                    }
                }
            }
        }
        previous_count = messages.len();

        delivery.observe(&messages, shared.focus()).await;

        if tx.send(SessionEvent::Messages(messages)).await.is_err() {
            return;
        }
    }
}
