//! Merge-write payloads.
//!
//! The backing store merges fields rather than replacing documents, so
//! every write is expressed as a patch of `Option` fields: unset fields
//! are left untouched.

use chrono::{DateTime, Utc};

use glasschat_shared::{
    CallSession, CallStatus, ConversationState, MessageId, Role, UserProfile,
};

/// Field-level merge-write for the conversation document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPatch {
    pub user_online: Option<bool>,
    pub user_typing: Option<bool>,
    pub user_last_seen: Option<Option<DateTime<Utc>>>,
    pub admin_online: Option<bool>,
    pub admin_typing: Option<bool>,
    pub admin_last_seen: Option<Option<DateTime<Utc>>>,
    /// Whole-field write of `activeCall`; `Some(None)` clears the session.
    pub active_call: Option<Option<CallSession>>,
    /// Dotted-path write to `activeCall.status`. Ignored when no session
    /// exists, matching the backend's update-of-a-missing-map behavior.
    pub call_status: Option<CallStatus>,
    pub user_profile: Option<Option<UserProfile>>,
}

impl ConversationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn online(role: Role, online: bool) -> Self {
        Self::new().with_online(role, online)
    }

    pub fn typing(role: Role, typing: bool) -> Self {
        Self::new().with_typing(role, typing)
    }

    pub fn with_online(mut self, role: Role, online: bool) -> Self {
        match role {
            Role::User => self.user_online = Some(online),
            Role::Admin => self.admin_online = Some(online),
        }
        self
    }

    pub fn with_typing(mut self, role: Role, typing: bool) -> Self {
        match role {
            Role::User => self.user_typing = Some(typing),
            Role::Admin => self.admin_typing = Some(typing),
        }
        self
    }

    pub fn with_last_seen(mut self, role: Role, at: DateTime<Utc>) -> Self {
        match role {
            Role::User => self.user_last_seen = Some(Some(at)),
            Role::Admin => self.admin_last_seen = Some(Some(at)),
        }
        self
    }

    pub fn with_call(mut self, call: Option<CallSession>) -> Self {
        self.active_call = Some(call);
        self
    }

    pub fn with_call_status(mut self, status: CallStatus) -> Self {
        self.call_status = Some(status);
        self
    }

    pub fn with_profile(mut self, profile: Option<UserProfile>) -> Self {
        self.user_profile = Some(profile);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge this patch into a document snapshot.
    pub fn apply(&self, state: &mut ConversationState) {
        if let Some(v) = self.user_online {
            state.user_online = v;
        }
        if let Some(v) = self.user_typing {
            state.user_typing = v;
        }
        if let Some(v) = self.user_last_seen {
            state.user_last_seen = v;
        }
        if let Some(v) = self.admin_online {
            state.admin_online = v;
        }
        if let Some(v) = self.admin_typing {
            state.admin_typing = v;
        }
        if let Some(v) = self.admin_last_seen {
            state.admin_last_seen = v;
        }
        if let Some(ref call) = self.active_call {
            state.active_call = call.clone();
        }
        if let Some(status) = self.call_status {
            if let Some(ref mut call) = state.active_call {
                call.status = status;
            }
        }
        if let Some(ref profile) = self.user_profile {
            state.user_profile = profile.clone();
        }
    }
}

/// Expected current call state for a conditional conversation merge.
///
/// Closes the double-initiation race: both sides racing to write
/// `activeCall` cannot clobber each other, the loser observes a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallExpectation {
    /// No session occupies the conversation (field absent or terminal).
    NoLiveCall,
    /// A session is present with exactly this status.
    Status(CallStatus),
}

impl CallExpectation {
    pub fn matches(&self, state: &ConversationState) -> bool {
        match self {
            CallExpectation::NoLiveCall => !state.has_live_call(),
            CallExpectation::Status(expected) => state.call_status() == Some(*expected),
        }
    }
}

/// A message as handed to the store for appending. The store assigns the
/// id and the timestamp; the initial status is always `sent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub is_image: bool,
    pub sender: Role,
    pub reply_to_id: Option<MessageId>,
}

impl NewMessage {
    pub fn text(sender: Role, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_image: false,
            sender,
            reply_to_id: None,
        }
    }

    /// An image message; `url` is the hosted location of the upload.
    pub fn image(sender: Role, url: impl Into<String>) -> Self {
        Self {
            text: url.into(),
            is_image: true,
            sender,
            reply_to_id: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: MessageId) -> Self {
        self.reply_to_id = Some(reply_to);
        self
    }
}

/// Author-side message edit. Deliberately cannot touch the timestamp or
/// the delivery status; status advancement is a separate monotonic
/// operation on [`crate::ConversationStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub is_edited: Option<bool>,
}

impl MessagePatch {
    /// The patch an edit produces: new text plus the edited marker.
    pub fn edit(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_edited: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merges_only_set_fields() {
        let mut state = ConversationState {
            user_online: true,
            admin_typing: true,
            ..Default::default()
        };

        ConversationPatch::typing(Role::Admin, false).apply(&mut state);

        assert!(state.user_online, "untouched field must survive the merge");
        assert!(!state.admin_typing);
    }

    #[test]
    fn call_status_patch_without_session_is_noop() {
        let mut state = ConversationState::default();
        ConversationPatch::new()
            .with_call_status(CallStatus::InProgress)
            .apply(&mut state);
        assert!(state.active_call.is_none());
    }

    #[test]
    fn call_expectation_treats_terminal_as_free() {
        let mut state = ConversationState::default();
        assert!(CallExpectation::NoLiveCall.matches(&state));

        state.active_call = Some(CallSession {
            caller: Role::User,
            status: CallStatus::Rejected,
            room_id: "r".into(),
        });
        assert!(CallExpectation::NoLiveCall.matches(&state));

        state.active_call.as_mut().unwrap().status = CallStatus::Ringing;
        assert!(!CallExpectation::NoLiveCall.matches(&state));
        assert!(CallExpectation::Status(CallStatus::Ringing).matches(&state));
    }
}
