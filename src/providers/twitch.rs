// ABOUTME: Twitch Helix client implementing LiveStatusProvider.
// ABOUTME: App access token via client credentials, live stream listing, and game lookups.

use super::truncate_body;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use goob_core::config::LiveConfig;
use goob_core::{LiveStatus, LiveStatusProvider, Metadata};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const HELIX_URL: &str = "https://api.twitch.tv/helix";
const CHANNEL_URL: &str = "https://www.twitch.tv";
/// Helix accepts at most this many `user_login` parameters per request
const MAX_LOGINS_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixStream {
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct HelixGame {
    id: String,
    name: String,
}

/// Live status for a stream, or None when it is not actually live
pub fn live_status(stream: HelixStream) -> Option<LiveStatus> {
    if stream.kind != "live" || stream.user_name.is_empty() {
        return None;
    }
    let login = if stream.user_login.is_empty() {
        stream.user_name.to_lowercase()
    } else {
        stream.user_login.to_lowercase()
    };
    Some(LiveStatus {
        url: format!("{}/{}", CHANNEL_URL, login),
        subject: login,
        display_name: stream.user_name,
        started_at: stream.started_at,
        title: stream.title,
        metadata_id: Some(stream.game_id).filter(|id| !id.is_empty()),
    })
}

pub struct TwitchClient {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    access_token: RwLock<Option<String>>,
}

impl std::fmt::Debug for TwitchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl TwitchClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http,
            access_token: RwLock::new(None),
        })
    }

    pub fn from_settings(settings: &LiveConfig) -> Result<Self> {
        let client_id = settings
            .client_id
            .as_deref()
            .context("live.client_id is required")?;
        let client_secret = settings
            .client_secret
            .as_deref()
            .context("live.client_secret is required")?;
        Self::new(client_id, client_secret)
    }

    async fn helix_get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let token = self
            .access_token
            .read()
            .await
            .clone()
            .context("No Twitch access token; refresh the credential first")?;

        let response = self
            .http
            .get(format!("{}/{}", HELIX_URL, path))
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Helix {} request failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Helix {} failed: {} {}", path, status, truncate_body(&body, 200));
        }

        let page: Page<T> = response
            .json()
            .await
            .with_context(|| format!("Invalid Helix {} response", path))?;
        Ok(page.data)
    }
}

#[async_trait]
impl LiveStatusProvider for TwitchClient {
    async fn refresh_credential(&self) -> Result<Duration> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .context("Twitch token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Twitch token request failed: {} {}", status, truncate_body(&body, 200));
        }

        let token: TokenResponse = response.json().await.context("Invalid Twitch token response")?;
        *self.access_token.write().await = Some(token.access_token);
        Ok(Duration::from_secs(token.expires_in))
    }

    async fn list_active(&self, subjects: &[String]) -> Result<Vec<LiveStatus>> {
        let mut live = Vec::new();
        for chunk in subjects.chunks(MAX_LOGINS_PER_REQUEST) {
            let query: Vec<(&str, &str)> = chunk.iter().map(|s| ("user_login", s.as_str())).collect();
            let streams: Vec<HelixStream> = self.helix_get("streams", &query).await?;
            live.extend(
                streams
                    .into_iter()
                    .filter_map(live_status)
                    .filter(|status| chunk.iter().any(|s| s.eq_ignore_ascii_case(&status.subject))),
            );
        }
        Ok(live)
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        let games: Vec<HelixGame> = self.helix_get("games", &[("id", id)]).await?;
        Ok(games.into_iter().next().map(|g| Metadata {
            id: g.id,
            name: g.name,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAMS: &str = r#"{
        "data": [
            {
                "id": "1",
                "user_id": "9",
                "user_login": "streamer",
                "user_name": "Streamer",
                "game_id": "743",
                "game_name": "Chess",
                "type": "live",
                "title": "blitz",
                "viewer_count": 10,
                "started_at": "2024-06-03T19:00:00Z"
            },
            {
                "user_login": "rerun",
                "user_name": "Rerun",
                "game_id": "",
                "type": "",
                "title": "old",
                "started_at": "2024-06-03T18:00:00Z"
            }
        ],
        "pagination": {}
    }"#;

    #[test]
    fn test_only_live_streams_become_statuses() {
        let page: Page<HelixStream> = serde_json::from_str(STREAMS).unwrap();
        let statuses: Vec<LiveStatus> = page.data.into_iter().filter_map(live_status).collect();

        assert_eq!(statuses.len(), 1);
        let status = &statuses[0];
        assert_eq!(status.subject, "streamer");
        assert_eq!(status.display_name, "Streamer");
        assert_eq!(status.metadata_id.as_deref(), Some("743"));
        assert_eq!(status.url, "https://www.twitch.tv/streamer");
        assert_eq!(status.started_at.to_rfc3339(), "2024-06-03T19:00:00+00:00");
    }

    #[test]
    fn test_empty_game_id_has_no_metadata() {
        let stream = HelixStream {
            user_login: "a".to_string(),
            user_name: "A".to_string(),
            game_id: String::new(),
            kind: "live".to_string(),
            title: String::new(),
            started_at: Utc::now(),
        };
        assert_eq!(live_status(stream).unwrap().metadata_id, None);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let client = TwitchClient::new("id", "very-secret").unwrap();
        assert!(!format!("{:?}", client).contains("very-secret"));
    }

    #[tokio::test]
    async fn test_listing_without_token_fails() {
        let client = TwitchClient::new("id", "secret").unwrap();
        assert!(client.list_active(&["streamer".to_string()]).await.is_err());
    }
}
