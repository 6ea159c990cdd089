// Token acquisition via the client-credentials grant

use reqwest::Client;
use std::time::Duration;

use super::types::{Credentials, Token};
use crate::error::Result;

/// Form body sent to the token endpoint
const CLIENT_CREDENTIALS_BODY: &str = "grant_type=client_credentials";

/// Request a fresh access token
///
/// POSTs `grant_type=client_credentials` with HTTP Basic auth. The payload is
/// parsed regardless of HTTP status: the platform reports failures as
/// `{"error": "..."}`.
pub async fn request_token(
    client: &Client,
    token_url: &str,
    creds: &Credentials,
    timeout: Duration,
) -> Result<Token> {
    tracing::debug!(url = %token_url, client_id = %creds.client_id, "Requesting access token");

    let response = client
        .post(token_url)
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(CLIENT_CREDENTIALS_BODY)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, url = %token_url, "Token request failed");
            e
        })?;

    let status = response.status();
    let payload = response.text().await?;

    match Token::from_json(&payload) {
        Ok(token) => {
            tracing::info!(
                "Access token acquired, expires: {}",
                token.expires_at.to_rfc3339()
            );
            Ok(token)
        }
        Err(e) => {
            tracing::error!(status = status.as_u16(), error = %e, "Token endpoint rejected credentials");
            Err(e)
        }
    }
}
