//! OAuth app-access credential and its proactive renewal.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use twrec_common::protocol::TokenResponse;

/// A credential is renewed once it is closer than this to expiring.
pub const REFRESH_MARGIN_SECS: i64 = 3600;

/// Caps absurd `expires_in` values so the expiry stays representable.
const MAX_LIFETIME_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token endpoint returned HTTP {0}")]
    Status(u16),
    #[error("Token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Something that can perform the client-credentials exchange.
pub trait TokenSource {
    fn request_token(&self) -> Result<TokenResponse, AuthError>;
}

/// Bearer credential for authenticated API calls.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Full `Authorization` header value.
    pub authorization: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    fn from_response(token: &TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(token.expires_in)
            .unwrap_or(i64::MAX)
            .min(MAX_LIFETIME_SECS);
        Credential {
            authorization: token.authorization(),
            expires_at: now + Duration::seconds(lifetime),
        }
    }

    /// Whether the credential is inside the refresh margin at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) > self.expires_at
    }
}

/// Owns the current credential and renews it through a [`TokenSource`].
pub struct CredentialManager<S> {
    source: S,
    credential: Credential,
}

impl<S: TokenSource> CredentialManager<S> {
    /// Acquire the first credential.  There is no useful way to run
    /// without one, so the caller should treat an error as fatal.
    pub fn acquire_initial(source: S) -> Result<Self, AuthError> {
        Self::acquire_initial_at(source, Utc::now())
    }

    fn acquire_initial_at(source: S, now: DateTime<Utc>) -> Result<Self, AuthError> {
        info!("Requesting OAuth token from Twitch API server...");
        let token = source.request_token()?;
        let credential = Credential::from_response(&token, now);
        debug!("OAuth token expires at {}", credential.expires_at);
        Ok(Self { source, credential })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Replace the credential with a freshly requested one.  On error the
    /// previous credential stays in place.
    fn acquire_at(&mut self, now: DateTime<Utc>) -> Result<&Credential, AuthError> {
        info!("Requesting OAuth token from Twitch API server...");
        let token = self.source.request_token()?;
        self.credential = Credential::from_response(&token, now);
        debug!("OAuth token expires at {}", self.credential.expires_at);
        Ok(&self.credential)
    }

    /// Renew the credential if it is about to expire.  A failed renewal is
    /// logged and the stale credential returned; the call that uses it will
    /// fail on its own and the poll loop retries later.
    pub fn ensure_fresh(&mut self) -> &Credential {
        self.ensure_fresh_at(Utc::now())
    }

    pub fn ensure_fresh_at(&mut self, now: DateTime<Utc>) -> &Credential {
        if self.credential.needs_refresh(now) {
            if let Err(e) = self.acquire_at(now) {
                warn!("Cannot renew OAuth token: {e}");
            }
        }
        &self.credential
    }
}
