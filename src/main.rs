use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::{Map, Value};

use pokitdok::config::{Command, Config};
use pokitdok::{Credentials, PlatformClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        base_url = %config.client.base_api_url,
        version_path = %config.version_path,
        token_url = %config.client.token_url,
        timeout = config.client.request_timeout,
        "Client configured"
    );

    let saved_token = config.saved_token()?;
    let client = PlatformClient::with_config(
        Credentials::new(&config.client_id, &config.client_secret),
        config.client.clone(),
        saved_token.as_deref(),
    )
    .context("Failed to create platform client")?;

    match config.command.clone() {
        Command::Token => {
            client.init().await.context("Authentication failed")?;
            let expires = client.api().token_manager().access_token_expires().await;
            match expires {
                Some(expires) => println!("Access token valid until {}", expires.to_rfc3339()),
                None => println!("No access token held"),
            }
        }
        Command::Usage => {
            let usage = client.usage().await?;
            print_json(&usage.unwrap_or(Value::Null))?;
        }
        Command::Providers { query } => {
            let params: Map<String, Value> = query
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let response = client.providers(params).await?;
            print_json(&response.body().into_value())?;
        }
        Command::Request {
            method,
            path,
            params,
            content_type,
        } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw).context("--params must be valid JSON")?,
                None => Value::Null,
            };
            let response = client
                .request(method, &path, params, &content_type)
                .await?;
            print_json(&response.body().into_value())?;
        }
    }

    if let Some(usage) = client.cached_usage().await {
        tracing::info!(usage = %usage, "API usage");
    }

    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
