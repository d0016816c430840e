//! Blocking HTTP client for the Twitch OAuth and Helix endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use tracing::{debug, error};

use twrec_common::config::Config;
use twrec_common::protocol::{DataPage, LiveSession, TokenResponse, UserData};

use crate::auth::{AuthError, Credential, TokenSource};

/// Bound on a single stream-status request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for the token and user-lookup requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("twrec/", env!("CARGO_PKG_VERSION"));

/// Result of one stream-status poll.
#[derive(Debug, Clone)]
pub enum ProbeResult {
    Offline,
    Live(Box<LiveSession>),
    /// The request failed; the loop treats this like `Offline` but never
    /// starts a capture from it.
    TransientError(String),
}

/// Something that can tell whether a channel is live.
pub trait Prober {
    fn probe(&self, login: &str, credential: &Credential) -> ProbeResult;
}

/// Twitch API client.  Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HelixClient {
    http: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base_url: String,
}

impl HelixClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Cannot create HTTP client")?;

        Ok(Self::with_http(http, config))
    }

    fn with_http(http: Client, config: &Config) -> Self {
        HelixClient {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url.clone(),
            api_base_url: config.api_base_url.clone(),
        }
    }

    fn authed_get(&self, path: &str, credential: &Credential) -> RequestBuilder {
        self.http
            .get(format!("{}/{}", self.api_base_url, path))
            .header("Client-ID", &self.client_id)
            .header(AUTHORIZATION, &credential.authorization)
    }

    /// Look up `login`.  Fails when the request fails or the user does not
    /// exist.
    pub fn find_user(&self, login: &str, credential: &Credential) -> Result<UserData> {
        let resp = self
            .authed_get("users", credential)
            .query(&[("login", login)])
            .send()
            .context("GET /users")?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().unwrap_or_default();
            debug!("GET /users body: {body}");
            anyhow::bail!("GET /users returned {status}");
        }

        let page: DataPage<UserData> = resp.json().context("Parse users JSON")?;
        page.data
            .into_iter()
            .next()
            .with_context(|| format!("User {login} does not exist"))
    }
}

impl TokenSource for HelixClient {
    fn request_token(&self) -> Result<TokenResponse, AuthError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", ""),
        ];
        let resp = self.http.post(&self.token_url).form(&form).send()?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(AuthError::Status(status.as_u16()));
        }

        let body = resp.text()?;
        serde_json::from_str(&body).map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

impl Prober for HelixClient {
    fn probe(&self, login: &str, credential: &Credential) -> ProbeResult {
        let resp = match self
            .authed_get("streams", credential)
            .query(&[("user_login", login)])
            .timeout(PROBE_TIMEOUT)
            .send()
        {
            Ok(r) => r,
            Err(e) => {
                error!("Cannot get stream info: {e}");
                return ProbeResult::TransientError(e.to_string());
            }
        };

        let status = resp.status();
        if status != StatusCode::OK {
            error!("GET /streams returned {status}");
            return ProbeResult::TransientError(format!("HTTP {status}"));
        }

        match resp.json::<DataPage<LiveSession>>() {
            Ok(page) => match page.data.into_iter().next() {
                Some(session) => ProbeResult::Live(Box::new(session)),
                None => ProbeResult::Offline,
            },
            Err(e) => {
                error!("Cannot parse stream info: {e}");
                ProbeResult::TransientError(e.to_string())
            }
        }
    }
}
