//! Session records, token handling, and the idle-expiry policy.
//!
//! Tokens are 32 random bytes, URL-safe base64. The raw value is returned to
//! the caller exactly once (to transport however the web layer likes); the
//! store only ever sees a SHA-256 hash.

use anyhow::Context;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Error;

/// Server-side session bound to one account.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: Uuid,
    pub token_hash: Vec<u8>,
    pub account_id: Uuid,
    pub remember_me: bool,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry; 14 days with "remember me", the ambient default
    /// otherwise.
    pub expires_at: DateTime<Utc>,
    /// Sliding idle clock. `None` means the stored value was cleared or
    /// unreadable; the next request restarts the clock instead of failing.
    pub last_activity: Option<DateTime<Utc>>,
}

/// Create a new session token. The raw value is only handed to the caller;
/// storage keeps a hash.
pub fn generate_session_token() -> Result<String, Error> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the store.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Idle-expiry rule: a session dies once it has sat unused for strictly
/// longer than the configured window.
#[must_use]
pub fn idle_expired(last_activity: DateTime<Utc>, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
    now - last_activity > idle_timeout
}
