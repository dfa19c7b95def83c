//! Server-side session records and the signed cookie that names them
//!
//! Cookie value: `s:{sid}.{mac}` where `mac` is base64url (no padding) of
//! HMAC-SHA256(secret, sid). A percent-encoded `s%3A` prefix is accepted too.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub username: String,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Lookup and revocation of sessions issued elsewhere.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<Session>;

    async fn insert(&self, session: Session);

    /// Returns `false` if the session was unknown.
    async fn revoke(&self, session_id: &str) -> bool;

    /// The session if it exists and is neither revoked nor expired.
    async fn active(&self, session_id: &str) -> Option<Session> {
        self.get(session_id)
            .await
            .filter(|s| s.is_active(Utc::now()))
    }

    /// Forget sessions that are revoked or expired at `now`. Returns how many
    /// were dropped. Stores backed by something with its own expiry keep the
    /// default no-op.
    async fn prune(&self, _now: DateTime<Utc>) -> usize {
        0
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a session with random id and CSRF token.
    pub async fn create(&self, username: &str, ttl: Duration) -> Session {
        let session = Session {
            id: random_token(),
            username: username.to_string(),
            csrf_token: random_token(),
            expires_at: Utc::now() + ttl,
            revoked: false,
        };
        self.insert(session.clone()).await;
        session
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn insert(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    async fn revoke(&self, session_id: &str) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(s) => {
                s.revoked = true;
                tracing::info!(user = %s.username, "session revoked");
                true
            }
            None => false,
        }
    }

    async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_active(now));
        before - sessions.len()
    }
}

/// 24 random bytes, base64url. Used for session ids, CSRF tokens and
/// generated cookie secrets.
pub fn random_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, thiserror::Error)]
#[error("cookie secret must not be empty")]
pub struct InvalidSecret;

/// Signs and verifies session cookie values.
#[derive(Clone)]
pub struct CookieSigner {
    keyed: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidSecret> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(InvalidSecret);
        }
        let keyed = <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| InvalidSecret)?;
        Ok(Self { keyed })
    }

    pub fn sign(&self, session_id: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(session_id.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("s:{session_id}.{tag}")
    }

    /// The session id if the signature checks out. Comparison is constant time.
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let body = cookie_value
            .strip_prefix("s:")
            .or_else(|| cookie_value.strip_prefix("s%3A"))?;
        let (session_id, tag) = body.rsplit_once('.')?;
        if session_id.is_empty() {
            return None;
        }
        let tag = URL_SAFE_NO_PAD.decode(tag.trim_end_matches('=')).ok()?;

        let mut mac = self.keyed.clone();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(session_id.to_string())
    }
}
