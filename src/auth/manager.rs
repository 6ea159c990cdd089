use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use tokio::sync::Mutex;

use super::refresh;
use super::types::{Credentials, Token};
use crate::error::{ClientError, Result};

/// Token manager
/// Lazily acquires and caches the client-credentials access token
pub struct TokenManager {
    /// Client credentials
    credentials: Credentials,

    /// Currently held token; the lock also serializes check-then-refresh
    token: Mutex<Option<Token>>,

    /// Token endpoint URL
    token_url: String,

    /// Freshness margin in seconds (the request timeout)
    refresh_margin: u64,

    /// HTTP client for token requests
    client: Client,
}

impl TokenManager {
    /// Create a new TokenManager
    ///
    /// `token_json` is a previously saved token response; it is parsed eagerly
    /// so a bad payload fails construction.
    pub fn new(
        client: Client,
        credentials: Credentials,
        token_url: impl Into<String>,
        refresh_margin: u64,
        token_json: Option<&str>,
    ) -> Result<Self> {
        let token = token_json.map(Token::from_json).transpose()?;

        Ok(Self {
            credentials,
            token: Mutex::new(token),
            token_url: token_url.into(),
            refresh_margin,
            client,
        })
    }

    /// Margins beyond what chrono can represent saturate
    fn margin(&self) -> Duration {
        i64::try_from(self.refresh_margin)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Check if a token is stale under the current margin
    pub fn is_expired(&self, token: &Token) -> bool {
        token.is_expired(self.margin())
    }

    /// Get a valid token, requesting a new one when none is held or it is stale
    pub async fn get_valid_token(&self) -> Result<Token> {
        let mut held = self.token.lock().await;

        if let Some(token) = held.as_ref() {
            if !self.is_expired(token) {
                return Ok(token.clone());
            }
            tracing::debug!(
                "Access token stale (expires: {}), refreshing",
                token.expires_at.to_rfc3339()
            );
        }

        let timeout = std::time::Duration::from_secs(self.refresh_margin);
        match refresh::request_token(&self.client, &self.token_url, &self.credentials, timeout)
            .await
        {
            Ok(token) => {
                *held = Some(token.clone());
                Ok(token)
            }
            Err(e @ ClientError::Auth(_)) => {
                *held = None;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Force one token acquisition up front
    pub async fn init(&self) -> Result<()> {
        self.get_valid_token().await.map(|_| ())
    }

    /// Replace the held token from a token response payload
    ///
    /// On an error payload the held token is discarded.
    pub async fn set_token(&self, token_json: &str) -> Result<Token> {
        let mut held = self.token.lock().await;
        *held = None;
        let token = Token::from_json(token_json)?;
        *held = Some(token.clone());
        Ok(token)
    }

    /// Snapshot of the held token, if any
    pub async fn token(&self) -> Option<Token> {
        self.token.lock().await.clone()
    }

    /// Current access token string (empty when none is held)
    pub async fn access_token(&self) -> String {
        self.token
            .lock()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
            .unwrap_or_default()
    }

    /// Expiry of the held token
    pub async fn access_token_expires(&self) -> Option<DateTime<Utc>> {
        self.token.lock().await.as_ref().map(|t| t.expires_at)
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn set_token_url(&mut self, token_url: impl Into<String>) {
        self.token_url = token_url.into();
    }

    pub fn set_refresh_margin(&mut self, seconds: u64) {
        self.refresh_margin = seconds;
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}
