//! The identity gate and the end-user join flow.
//!
//! Exactly one allow-listed email may act as administrator; any other
//! authenticated identity must be signed out immediately. End-users never
//! authenticate: they present an access code, which is also the id of the
//! conversation they land in.

use tracing::info;

use glasschat_shared::ConversationId;
use glasschat_store::CodeRegistry;

use crate::error::AuthError;

/// Validates administrator identities against the single allow-listed
/// email address.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    admin_email: String,
}

impl IdentityGate {
    pub fn new(admin_email: impl Into<String>) -> Self {
        Self {
            admin_email: admin_email.into(),
        }
    }

    /// Decide whether an authenticated identity may act as administrator.
    ///
    /// A `NotAllowListed` result means the caller must sign the identity
    /// out, not retry.
    pub fn authorize_admin(&self, email: &str) -> Result<(), AuthError> {
        if email == self.admin_email {
            Ok(())
        } else {
            info!(email, "rejecting non-allow-listed identity");
            Err(AuthError::NotAllowListed)
        }
    }
}

/// End-user entry: validate the access code and hand back the
/// conversation id it unlocks.
///
/// An unknown code and an unusable (blocked or expired) code are distinct
/// failures so the UI can word them differently. The expiry check is
/// independent of the block status: an expired code still marked `active`
/// does not admit a login.
pub async fn join_chat<R: CodeRegistry>(
    registry: &R,
    code: &str,
    now_ms: i64,
) -> Result<ConversationId, AuthError> {
    let code_doc = registry
        .get_code(code)
        .await?
        .ok_or(AuthError::UnknownCode)?;

    if !code_doc.is_usable(now_ms) {
        return Err(AuthError::CodeNotUsable);
    }

    Ok(ConversationId::from(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glasschat_shared::{AccessCode, CodeStatus};
    use glasschat_store::MemoryStore;

    #[test]
    fn gate_accepts_only_the_allow_listed_email() {
        let gate = IdentityGate::new("ops@example.com");
        assert!(gate.authorize_admin("ops@example.com").is_ok());
        assert!(matches!(
            gate.authorize_admin("intruder@example.com"),
            Err(AuthError::NotAllowListed)
        ));
        // No case folding: the allow list is an exact string match.
        assert!(gate.authorize_admin("Ops@Example.com").is_err());
    }

    #[tokio::test]
    async fn join_rejects_unknown_code() {
        let store = MemoryStore::new();
        let err = join_chat(&store, "NOPE", 0).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownCode));
    }

    #[tokio::test]
    async fn join_accepts_active_unexpired_code() {
        let store = MemoryStore::new();
        store
            .put_code(AccessCode::new("VIP-01", 0, Some(10_000)))
            .await
            .unwrap();

        let conv = join_chat(&store, "VIP-01", 5_000).await.unwrap();
        assert_eq!(conv.as_str(), "VIP-01");
    }

    #[tokio::test]
    async fn join_rejects_expired_code_even_when_marked_active() {
        let store = MemoryStore::new();
        let code = AccessCode::new("VIP-01", 0, Some(10_000));
        assert_eq!(code.status, CodeStatus::Active);
        store.put_code(code).await.unwrap();

        let err = join_chat(&store, "VIP-01", 20_000).await.unwrap_err();
        assert!(matches!(err, AuthError::CodeNotUsable));
    }

    #[tokio::test]
    async fn join_rejects_blocked_code() {
        let store = MemoryStore::new();
        store
            .put_code(AccessCode::new("VIP-01", 0, None))
            .await
            .unwrap();
        store
            .set_code_status("VIP-01", CodeStatus::Blocked)
            .await
            .unwrap();

        let err = join_chat(&store, "VIP-01", 0).await.unwrap_err();
        assert!(matches!(err, AuthError::CodeNotUsable));
    }
}
