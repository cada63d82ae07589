//! Per-session key material.
//!
//! Replaces any notion of a process-global passphrase: the surrounding
//! authentication subsystem builds one `SessionContext` when a user signs in
//! and drops it on sign-out. Core calls take it by reference; there is no
//! ambient fallback. Secret fields zeroize on drop.

use rand::RngCore;
use zeroize::Zeroizing;

/// Identity and key material for one authenticated session.
pub struct SessionContext {
    pub actor_id: String,
    pub session_id: String,
    passphrase: Zeroizing<String>,
    signing_secret: Zeroizing<Vec<u8>>,
}

impl SessionContext {
    pub fn new(
        actor_id: impl Into<String>,
        passphrase: impl Into<String>,
        signing_secret: Vec<u8>,
    ) -> Self {
        let mut id_bytes = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut id_bytes);
        Self {
            actor_id: actor_id.into(),
            session_id: format!("sess-{}", hex::encode(id_bytes)),
            passphrase: Zeroizing::new(passphrase.into()),
            signing_secret: Zeroizing::new(signing_secret),
        }
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn signing_secret(&self) -> &[u8] {
        &self.signing_secret
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("actor_id", &self.actor_id)
            .field("session_id", &self.session_id)
            .field("passphrase", &"<redacted>")
            .field("signing_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_leaks_secrets() {
        let session = SessionContext::new("alice", "hunter2", b"secret".to_vec());
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionContext::new("alice", "pw", vec![]);
        let b = SessionContext::new("alice", "pw", vec![]);
        assert_ne!(a.session_id, b.session_id);
    }
}
