// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::{ClientError, Result};

/// Client-credentials pair, fixed for the lifetime of a client
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Access token obtained from the token endpoint
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Clone)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    /// Full token response as returned by the platform
    pub raw: Value,
}

impl Token {
    /// Parse a token endpoint payload
    ///
    /// Expiry comes from the absolute `expires` timestamp; `expires_in` is ignored.
    pub fn from_json(payload: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(payload)
            .map_err(|e| ClientError::Auth(format!("Malformed token response: {}", e)))?;

        if let Some(error) = raw.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(ClientError::Auth(message));
        }

        let data: TokenResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ClientError::Auth(format!("Malformed token response: {}", e)))?;

        let expires_at = DateTime::from_timestamp(data.expires, 0).ok_or_else(|| {
            ClientError::Auth(format!("Token expiry out of range: {}", data.expires))
        })?;

        Ok(Self {
            access_token: data.access_token,
            token_type: data.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            raw,
        })
    }

    /// Check whether the token is stale at the given instant
    ///
    /// A token is fresh only while `now + margin < expires_at`. A margin
    /// that overflows the calendar counts as stale.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match now.checked_add_signed(margin) {
            Some(deadline) => deadline >= self.expires_at,
            None => true,
        }
    }

    /// Check whether the token is stale now
    pub fn is_expired(&self, margin: Duration) -> bool {
        self.is_expired_at(Utc::now(), margin)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint success payload
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires: i64,
}
