//! Message delivery state machine.
//!
//! Status advances only from the recipient side, based on the recipient's
//! window focus at the moment a snapshot is observed: a blurred window
//! acknowledges `delivered`, a focused one `seen`. The store's advance
//! operation is monotonic, so re-observing a snapshot is always safe and
//! a regression cannot be written even by a buggy caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use glasschat_shared::{ConversationId, Message, MessageId, MessageStatus, Role, WindowFocus};
use glasschat_store::ConversationStore;

/// Advances incoming messages' delivery status for one conversation.
pub struct DeliveryEngine<S> {
    store: Arc<S>,
    conversation: ConversationId,
    role: Role,
    /// "Hide receipts": suppress outbound status writes while keeping the
    /// local read rendering intact.
    hide_receipts: AtomicBool,
}

impl<S: ConversationStore> DeliveryEngine<S> {
    pub fn new(store: Arc<S>, conversation: ConversationId, role: Role) -> Self {
        Self {
            store,
            conversation,
            role,
            hide_receipts: AtomicBool::new(false),
        }
    }

    pub fn set_hide_receipts(&self, on: bool) {
        self.hide_receipts.store(on, Ordering::Relaxed);
    }

    pub fn hide_receipts(&self) -> bool {
        self.hide_receipts.load(Ordering::Relaxed)
    }

    /// The status an observation acknowledges under the given focus.
    pub fn target_status(focus: WindowFocus) -> MessageStatus {
        match focus {
            WindowFocus::Focused => MessageStatus::Seen,
            WindowFocus::Blurred => MessageStatus::Delivered,
        }
    }

    /// Observe a message snapshot and advance every incoming message that
    /// is behind the target status. Returns the ids actually advanced.
    ///
    /// Failed writes are logged and left stale; the next snapshot from the
    /// live subscription retries naturally. With receipts hidden, nothing
    /// is written at all.
    pub async fn observe(&self, messages: &[Message], focus: WindowFocus) -> Vec<MessageId> {
        if self.hide_receipts() {
            return Vec::new();
        }

        let target = Self::target_status(focus);
        let mut advanced = Vec::new();

        for message in messages {
            // Never touch our own messages; only the recipient advances.
            if message.sender == self.role || message.status >= target {
                continue;
            }
            match self
                .store
                .advance_message_status(&self.conversation, message.id, target)
                .await
            {
                Ok(true) => advanced.push(message.id),
                Ok(false) => {}
                Err(e) => {
                    debug!(
                        conversation = %self.conversation,
                        message = %message.id,
                        error = %e,
                        "status advance failed, leaving stale"
                    );
                }
            }
        }

        advanced
    }

    /// How the local UI should render a message's read state.
    ///
    /// Hiding receipts never lies to the local user: incoming messages
    /// they have observed render as read locally even though the wire
    /// status stays behind. Messages the local side sent always show the
    /// wire status.
    pub fn local_view_status(&self, message: &Message) -> MessageStatus {
        if message.sender != self.role && self.hide_receipts() {
            MessageStatus::Seen
        } else {
            message.status
        }
    }
}
