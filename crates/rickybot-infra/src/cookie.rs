//! Signed session cookies.
//!
//! The browser identifies its chat session with the `chat-session-id` cookie.
//! Its value is `base64(HMAC-SHA256(secret, name || value) || value)`, so the
//! server can recover the session id and detect tampering without storing
//! anything per client.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use rickybot_types::error::CookieError;
use rickybot_types::session::SessionId;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 tag.
const SIGNATURE_LEN: usize = 32;

/// Name of the session cookie.
pub const COOKIE_NAME: &str = "chat-session-id";

/// Lifetime of the session cookie.
pub const COOKIE_MAX_AGE_SECS: i64 = 3600;

fn mac_for(key: &str, value: &[u8], secret: &[u8]) -> Result<HmacSha256, CookieError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| CookieError::InvalidSecret)?;
    mac.update(key.as_bytes());
    mac.update(value);
    Ok(mac)
}

/// Sign `value` under the cookie name `key`.
pub fn sign_key_value(key: &str, value: &str, secret: &[u8]) -> Result<String, CookieError> {
    if key.is_empty() {
        return Err(CookieError::EmptyKey);
    }
    if value.is_empty() {
        return Err(CookieError::EmptyValue);
    }

    let signature = mac_for(key, value.as_bytes(), secret)?.finalize().into_bytes();

    let mut payload = Vec::with_capacity(SIGNATURE_LEN + value.len());
    payload.extend_from_slice(&signature);
    payload.extend_from_slice(value.as_bytes());
    Ok(STANDARD.encode(payload))
}

/// Verify a value produced by [`sign_key_value`] and return the original value.
pub fn verify_signed_key_value(
    key: &str,
    signed_value: &str,
    secret: &[u8],
) -> Result<String, CookieError> {
    if key.is_empty() {
        return Err(CookieError::EmptyKey);
    }
    if signed_value.is_empty() {
        return Err(CookieError::EmptySignedValue);
    }

    let decoded = STANDARD
        .decode(signed_value)
        .map_err(|_| CookieError::InvalidEncoding)?;
    if decoded.len() < SIGNATURE_LEN {
        return Err(CookieError::TooShort);
    }

    let (signature, value) = decoded.split_at(SIGNATURE_LEN);
    mac_for(key, value, secret)?
        .verify_slice(signature)
        .map_err(|_| CookieError::InvalidSignature)?;

    String::from_utf8(value.to_vec()).map_err(|_| CookieError::InvalidEncoding)
}

/// Signs and verifies session ids for the session cookie.
///
/// The secret never appears in `Debug` output.
pub struct CookieSigner {
    secret: SecretString,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl CookieSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Use the configured secret, or generate a process-local one.
    ///
    /// A generated secret invalidates every cookie on restart.
    pub fn from_config(secret: Option<&str>) -> Self {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(SecretString::from(secret.to_string())),
            None => {
                tracing::warn!(
                    "no cookie_secret configured; generated a random one, sessions will not survive a restart"
                );
                Self::new(generate_secret())
            }
        }
    }

    /// Signed cookie value for `id`.
    pub fn sign_session(&self, id: SessionId) -> Result<String, CookieError> {
        sign_key_value(
            COOKIE_NAME,
            &id.to_string(),
            self.secret.expose_secret().as_bytes(),
        )
    }

    /// Recover the session id from a cookie value.
    ///
    /// Returns `None` for anything tampered, malformed, or not a session id.
    pub fn verify_session(&self, signed_value: &str) -> Option<SessionId> {
        match verify_signed_key_value(
            COOKIE_NAME,
            signed_value,
            self.secret.expose_secret().as_bytes(),
        ) {
            Ok(value) => value
                .parse::<SessionId>()
                .ok()
                .filter(|id| !id.is_nil()),
            Err(e) => {
                tracing::debug!(error = %e, "rejected session cookie");
                None
            }
        }
    }
}

/// A random 64-hex-character secret.
pub fn generate_secret() -> SecretString {
    let secret = format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    );
    SecretString::from(secret)
}
