use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of a conversation a client acts as.
///
/// The role decides which field namespace the client may write on the
/// conversation document (`user*` vs `admin*`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// The other side of the conversation.
    pub fn opposite(self) -> Role {
        match self {
            Role::User => Role::Admin,
            Role::Admin => Role::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation identifier. The access code string doubles as the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message identifier (the store's document key for the message).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-message delivery state.
///
/// Advances `sent -> delivered -> seen` and never regresses; only the
/// side that did not author the message may advance it. Variant order
/// matters: the derived `Ord` is the monotonicity guard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Seen,
}

/// A single chat message, ordered within its conversation by the
/// store-assigned timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// Plain text, or a hosted URL when `is_image` is set.
    pub text: String,
    #[serde(rename = "isImage")]
    pub is_image: bool,
    pub sender: Role,
    /// Assigned once by the store at write time. `None` means the write is
    /// still in flight and must render as a transient "sending" state.
    pub timestamp: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    #[serde(rename = "isEdited")]
    pub is_edited: bool,
    #[serde(rename = "replyToId")]
    pub reply_to_id: Option<MessageId>,
}

impl Message {
    /// Whether the store has not yet resolved a timestamp for this message.
    pub fn is_pending(&self) -> bool {
        self.timestamp.is_none()
    }
}

/// Status of an embedded call session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallStatus {
    #[serde(rename = "ringing")]
    Ringing,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "ended")]
    Ended,
    #[serde(rename = "rejected")]
    Rejected,
}

impl CallStatus {
    /// `ended` and `rejected` are tear-down states; watchers treat them the
    /// same as an absent session.
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Rejected)
    }
}

/// Ephemeral call-signaling record embedded in the conversation document.
///
/// Coordinates only *when* each side mounts the external media session;
/// SDP/ICE negotiation happens elsewhere, keyed by `room_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallSession {
    pub caller: Role,
    pub status: CallStatus,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

impl CallSession {
    /// A session still occupying the conversation (ringing or connected).
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Optional end-user profile stored on the conversation document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub bio: String,
    pub avatar: Option<String>,
}

/// The shared per-conversation document.
///
/// Exactly one writer owns each `user*` / `admin*` field pair; `active_call`
/// is the single jointly-written field (see the call coordinator). Fields
/// are merge-written independently, so a snapshot may mix older and newer
/// writes across fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    #[serde(rename = "userOnline")]
    pub user_online: bool,
    #[serde(rename = "userTyping")]
    pub user_typing: bool,
    #[serde(rename = "userLastSeen")]
    pub user_last_seen: Option<DateTime<Utc>>,
    #[serde(rename = "adminOnline")]
    pub admin_online: bool,
    #[serde(rename = "adminTyping")]
    pub admin_typing: bool,
    #[serde(rename = "adminLastSeen")]
    pub admin_last_seen: Option<DateTime<Utc>>,
    #[serde(rename = "activeCall")]
    pub active_call: Option<CallSession>,
    #[serde(rename = "userProfile")]
    pub user_profile: Option<UserProfile>,
}

impl ConversationState {
    pub fn online(&self, role: Role) -> bool {
        match role {
            Role::User => self.user_online,
            Role::Admin => self.admin_online,
        }
    }

    pub fn typing(&self, role: Role) -> bool {
        match role {
            Role::User => self.user_typing,
            Role::Admin => self.admin_typing,
        }
    }

    pub fn last_seen(&self, role: Role) -> Option<DateTime<Utc>> {
        match role {
            Role::User => self.user_last_seen,
            Role::Admin => self.admin_last_seen,
        }
    }

    pub fn call_status(&self) -> Option<CallStatus> {
        self.active_call.as_ref().map(|c| c.status)
    }

    /// Whether a call session currently occupies this conversation.
    pub fn has_live_call(&self) -> bool {
        self.active_call.as_ref().is_some_and(CallSession::is_live)
    }
}

/// Access-code lifecycle status (admin-controlled).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    Active,
    Blocked,
}

/// Whether a code carries an expiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Permanent,
    Temporary,
}

/// An access code: the shared secret that gates end-user entry to one
/// conversation. Keyed by the code string itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessCode {
    pub id: String,
    pub status: CodeStatus,
    #[serde(rename = "type")]
    pub kind: CodeKind,
    /// Epoch milliseconds, matching how existing data encodes it.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    /// Epoch milliseconds, `None` for permanent codes.
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
    pub name: Option<String>,
}

impl AccessCode {
    /// Create an active code. `expires_at` is epoch ms; `None` makes the
    /// code permanent.
    pub fn new(id: impl Into<String>, created_at: i64, expires_at: Option<i64>) -> Self {
        Self {
            id: id.into(),
            status: CodeStatus::Active,
            kind: if expires_at.is_some() {
                CodeKind::Temporary
            } else {
                CodeKind::Permanent
            },
            created_at,
            expires_at,
            name: None,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|t| t < now_ms)
    }

    /// A code admits new logins only while it is active *and* unexpired.
    /// The two checks are independent: an expired code still marked
    /// `active` is unusable.
    pub fn is_usable(&self, now_ms: i64) -> bool {
        self.status == CodeStatus::Active && !self.is_expired(now_ms)
    }
}

/// Window focus of the local client, as reported by the UI shell.
///
/// Drives delivery-state advancement (blurred observation -> `delivered`,
/// focused observation -> `seen`) and title-blink suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFocus {
    Focused,
    Blurred,
}

impl WindowFocus {
    pub fn is_focused(self) -> bool {
        matches!(self, WindowFocus::Focused)
    }
}
