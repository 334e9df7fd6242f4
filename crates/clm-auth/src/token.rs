//! Token responses, refresh, and access-token expiry inspection
//!
//! Login, registration, OTP verification, Google sign-in and refresh all
//! answer with the same body shape (`access`, optional `refresh`, optional
//! `user`). The refresh endpoint takes `{"refresh": <token>}`.
//!
//! Access tokens are JWTs. The `exp` claim is read without verifying the
//! signature; it only decides whether to refresh before sending, the backend
//! remains the authority on validity.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::{CredentialPair, UserProfile};
use crate::error::{Error, Result};

/// Token-bearing response body.
#[derive(Clone, Deserialize, Serialize)]
pub struct AuthTokens {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl AuthTokens {
    pub fn credentials(&self) -> CredentialPair {
        CredentialPair::new(self.access.clone(), self.refresh.clone())
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access", &"[REDACTED]")
            .field("has_refresh", &self.refresh.is_some())
            .field("user", &self.user.as_ref().map(|u| u.email.as_str()))
            .finish()
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Exchange a refresh token for a new access token.
///
/// `url` is the absolute refresh endpoint. 401/403 mean the refresh token is
/// revoked or expired and map to `InvalidCredentials`; the session cannot be
/// recovered without signing in again.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    url: &str,
    refresh: &str,
) -> Result<AuthTokens> {
    let response = client
        .post(url)
        .json(&RefreshRequest { refresh })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenRefresh(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let tokens = response
        .json::<AuthTokens>()
        .await
        .map_err(|e| Error::TokenRefresh(format!("invalid refresh response: {e}")))?;
    debug!(rotated = tokens.refresh.is_some(), "access token refreshed");
    Ok(tokens)
}

/// `exp` claim (unix seconds) of a JWT, or `None` for opaque tokens.
pub fn access_token_expiry(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_u64()
}

/// Whether `token` expires within `threshold_secs` of `now_secs`.
///
/// Tokens without a readable `exp` are never considered expiring; the
/// backend's 401 is the fallback signal for those.
pub fn expires_within(token: &str, now_secs: u64, threshold_secs: u64) -> bool {
    match access_token_expiry(token) {
        Some(exp) => exp <= now_secs.saturating_add(threshold_secs),
        None => false,
    }
}

/// Current unix time in seconds.
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
pub(crate) fn test_jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"user_id":7}}"#));
    format!("{header}.{payload}.signature")
}
