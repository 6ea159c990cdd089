use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Method, RequestBuilder};
use std::path::Path;
use std::time::Duration;

use crate::auth::{Credentials, Token, TokenManager};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::request::{Params, PreparedBody, RequestSpec};
use crate::response::HttpResponse;

/// OAuth2 client-credentials HTTP client
/// Attaches a valid bearer token to every request and classifies the result
pub struct ApiClient {
    /// Shared HTTP client carrying the TLS policy
    client: Client,

    /// Token lifecycle
    token_manager: TokenManager,

    /// Base URL prefixed to every request path
    base_api_url: String,

    /// Request timeout in seconds (also the token freshness margin)
    request_timeout: u64,
}

impl ApiClient {
    /// Create a new client
    ///
    /// `token_json` is a saved token response that is reused while fresh.
    pub fn new(
        credentials: Credentials,
        config: ClientConfig,
        token_json: Option<&str>,
    ) -> Result<Self> {
        check_timeout(config.request_timeout)?;

        let client = build_http_client(config.ca_cert_path.as_deref())?;
        let token_manager = TokenManager::new(
            client.clone(),
            credentials,
            config.token_url,
            config.request_timeout,
            token_json,
        )?;

        Ok(Self {
            client,
            token_manager,
            base_api_url: config.base_api_url,
            request_timeout: config.request_timeout,
        })
    }

    /// Acquire a token up front so bad credentials fail before the first call
    pub async fn init(&self) -> Result<()> {
        self.token_manager.init().await
    }

    /// Execute one authenticated request
    ///
    /// Status codes above 299 become `ClientError::Api`. No retries.
    pub async fn execute(&self, spec: RequestSpec) -> Result<HttpResponse> {
        let token = self.token_manager.get_valid_token().await?;

        let url = spec.url(&self.base_api_url)?;
        let method = spec.method.clone();

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let builder = self.build_request(spec, &url, &token.access_token).await?;

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    error_kind = error_kind(&e),
                    error = %e,
                    method = %method,
                    url = %url,
                    "HTTP request failed"
                );
                return Err(ClientError::Transport(e));
            }
        };

        let response = HttpResponse::read(response).await?;
        let status = response.status();

        tracing::debug!(status = status, "Received HTTP response");

        if status > 299 {
            let body = response.body().into_value();
            tracing::warn!(
                status = status,
                url = %url,
                response_body = %body,
                "HTTP request failed with error response"
            );
            return Err(ClientError::Api { status, body });
        }

        Ok(response)
    }

    /// Attach auth, timeout, content type and body
    ///
    /// Multipart bodies carry their own boundary `Content-Type`, so a
    /// caller-supplied one is not added on top.
    async fn build_request(
        &self,
        spec: RequestSpec,
        url: &str,
        access_token: &str,
    ) -> Result<RequestBuilder> {
        let builder = self
            .client
            .request(spec.method.clone(), url)
            .bearer_auth(access_token)
            .timeout(Duration::from_secs(self.request_timeout));
        let content_type = spec.content_type.clone();

        let builder = match spec.prepare_body().await? {
            PreparedBody::Empty => with_content_type(builder, &content_type),
            PreparedBody::Text(text) => with_content_type(builder, &content_type).body(text),
            PreparedBody::Form(form) => builder.multipart(form),
        };
        Ok(builder)
    }

    /// Execute a request from its parts
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: impl Into<Params>,
        content_type: &str,
    ) -> Result<HttpResponse> {
        self.execute(
            RequestSpec::new(method, path)
                .params(params)
                .content_type(content_type),
        )
        .await
    }

    pub fn api_base_url(&self) -> &str {
        &self.base_api_url
    }

    pub fn set_api_base_url(&mut self, url: impl Into<String>) {
        self.base_api_url = url.into();
    }

    pub fn api_token_url(&self) -> &str {
        self.token_manager.token_url()
    }

    pub fn set_api_token_url(&mut self, url: impl Into<String>) {
        self.token_manager.set_token_url(url);
    }

    pub fn request_timeout(&self) -> u64 {
        self.request_timeout
    }

    /// Set the request timeout; the token freshness margin follows it
    pub fn set_request_timeout(&mut self, seconds: u64) -> Result<()> {
        check_timeout(seconds)?;
        self.request_timeout = seconds;
        self.token_manager.set_refresh_margin(seconds);
        Ok(())
    }

    /// Store a token response obtained elsewhere
    pub async fn set_access_token(&self, token_json: &str) -> Result<Token> {
        self.token_manager.set_token(token_json).await
    }

    pub async fn access_token(&self) -> String {
        self.token_manager.access_token().await
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }
}

fn check_timeout(seconds: u64) -> Result<()> {
    if seconds == 0 {
        return Err(ClientError::Config(
            "request timeout must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn with_content_type(builder: RequestBuilder, content_type: &str) -> RequestBuilder {
    if content_type.is_empty() {
        builder
    } else {
        builder.header(CONTENT_TYPE, content_type)
    }
}

/// Build the HTTP client with the TLS policy
///
/// With a CA file, peers are verified against it alone. Without one,
/// certificate verification is disabled.
fn build_http_client(ca_cert_path: Option<&Path>) -> Result<Client> {
    let mut builder = Client::builder();

    match ca_cert_path {
        Some(path) => {
            let pem = std::fs::read(path).map_err(|source| ClientError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let cert = Certificate::from_pem(&pem)?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(cert);
        }
        None => {
            tracing::warn!("No CA certificate configured, TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    Ok(builder.build()?)
}

/// Categorize a transport error for logging
fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else {
        "unknown"
    }
}
