//! Payload types for the Twitch OAuth and Helix APIs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response of the client-credentials token exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

impl TokenResponse {
    /// Value for the `Authorization` header, e.g. `Bearer abc123`.
    pub fn authorization(&self) -> String {
        format!("{} {}", title_case(&self.token_type), self.access_token)
    }
}

/// Helix wraps every result list in a `data` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPage<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Entry of `GET /users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
}

/// Entry of `GET /streams`: a snapshot of a broadcast taken when it was
/// detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSession {
    /// Stream id.
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Raw title, not safe for file names.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub is_mature: bool,
}

/// Upper-case the first letter of every alphabetic run and lower-case
/// the rest (`bearer` → `Bearer`).
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_header() {
        let json = r#"{"access_token":"abc123","expires_in":5011271,"token_type":"bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.authorization(), "Bearer abc123");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("bearer"), "Bearer");
        assert_eq!(title_case("BEARER"), "Bearer");
        assert_eq!(title_case("mac token"), "Mac Token");
    }

    #[test]
    fn test_parse_streams_page() {
        let json = r#"{
            "data": [{
                "id": "40952121085",
                "user_id": "101051819",
                "user_login": "afro",
                "user_name": "Afro",
                "game_id": "32982",
                "game_name": "Grand Theft Auto V",
                "type": "live",
                "title": "Jacob: Digital Den Laptops & Routers",
                "viewer_count": 1490,
                "started_at": "2021-03-10T03:18:11Z",
                "language": "en",
                "thumbnail_url": "https://example.invalid/{width}x{height}.jpg",
                "tag_ids": [],
                "is_mature": false
            }],
            "pagination": {}
        }"#;
        let page: DataPage<LiveSession> = serde_json::from_str(json).unwrap();
        assert_eq!(page.data.len(), 1);
        let s = &page.data[0];
        assert_eq!(s.user_login, "afro");
        assert_eq!(s.kind, "live");
        assert_eq!(s.started_at.to_rfc3339(), "2021-03-10T03:18:11+00:00");
    }

    #[test]
    fn test_missing_data_is_empty() {
        let page: DataPage<UserData> = serde_json::from_str("{}").unwrap();
        assert!(page.data.is_empty());
    }
}
