use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Platform site all default URLs are built from
pub const DEFAULT_API_SITE: &str = "https://platform.pokitdok.com";

/// API version path appended to the site
pub const DEFAULT_VERSION_PATH: &str = "/api/v4";

/// Token endpoint path appended to the site
pub const TOKEN_PATH: &str = "/oauth2/token";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT: u64 = 90;

/// Settings for one API client
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Request timeout in seconds, also used as the token freshness margin
    pub request_timeout: u64,
    pub base_api_url: String,
    pub token_url: String,
    /// Trusted CA certificates (PEM); `None` disables certificate verification
    pub ca_cert_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Config for a site and version path, e.g. a staging host
    pub fn for_site(site: &str, version_path: &str) -> Self {
        Self {
            base_api_url: format!("{}{}", site, version_path),
            token_url: format!("{}{}", site, TOKEN_PATH),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            base_api_url: format!("{}{}", DEFAULT_API_SITE, DEFAULT_VERSION_PATH),
            token_url: format!("{}{}", DEFAULT_API_SITE, TOKEN_PATH),
            ca_cert_path: None,
        }
    }
}

/// PokitDok platform client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Platform API client ID
    #[arg(long, env = "POKITDOK_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Platform API client secret
    #[arg(long, env = "POKITDOK_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Platform site URL
    #[arg(long, env = "POKITDOK_API_SITE", default_value = DEFAULT_API_SITE)]
    pub api_site: String,

    /// API version path
    #[arg(long, env = "POKITDOK_VERSION_PATH", default_value = DEFAULT_VERSION_PATH)]
    pub version_path: String,

    /// Request timeout in seconds
    #[arg(short, long, env = "POKITDOK_REQUEST_TIMEOUT", default_value_t = DEFAULT_TIMEOUT)]
    pub timeout: u64,

    /// Path to trusted CA certificates file
    #[arg(long, env = "POKITDOK_CA_CERT")]
    pub ca_cert: Option<String>,

    /// Path to a saved token response (JSON)
    #[arg(long, env = "POKITDOK_TOKEN_FILE")]
    pub token_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Acquire an access token and print its expiry
    Token,

    /// Print the API usage block
    Usage,

    /// Search providers by query parameters (key=value)
    Providers {
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Call an arbitrary endpoint
    Request {
        #[arg(short, long, default_value = "GET")]
        method: String,

        #[arg(short, long)]
        path: String,

        /// JSON parameters
        #[arg(long)]
        params: Option<String>,

        #[arg(long, default_value = "application/json")]
        content_type: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub client_id: String,
    pub client_secret: String,

    // Client settings
    pub client: ClientConfig,
    pub version_path: String,
    pub token_file: Option<PathBuf>,

    // Logging
    pub log_level: String,

    pub command: Command,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let client_id = args
            .client_id
            .context("POKITDOK_CLIENT_ID is required (use --client-id or set POKITDOK_CLIENT_ID)")?;
        let client_secret = args.client_secret.context(
            "POKITDOK_CLIENT_SECRET is required (use --client-secret or set POKITDOK_CLIENT_SECRET)",
        )?;

        let site = args.api_site.trim_end_matches('/');
        let client = ClientConfig {
            request_timeout: args.timeout,
            ca_cert_path: args.ca_cert.map(|s| expand_tilde(&s)),
            ..ClientConfig::for_site(site, &args.version_path)
        };

        Ok(Config {
            client_id,
            client_secret,
            client,
            version_path: args.version_path,
            token_file: args.token_file.map(|s| expand_tilde(&s)),
            log_level: args.log_level,
            command: args.command,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            anyhow::bail!("Client ID and client secret must not be empty");
        }

        if self.client.request_timeout == 0 {
            anyhow::bail!("Request timeout must be greater than zero");
        }

        if let Some(ref ca) = self.client.ca_cert_path {
            if !ca.exists() {
                anyhow::bail!("POKITDOK_CA_CERT does not exist: {}", ca.display());
            }
        }

        if let Some(ref token_file) = self.token_file {
            if !token_file.exists() {
                anyhow::bail!("POKITDOK_TOKEN_FILE does not exist: {}", token_file.display());
            }
        }

        Ok(())
    }

    /// Saved token response, if a token file is configured
    pub fn saved_token(&self) -> Result<Option<String>> {
        self.token_file
            .as_ref()
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read token file: {}", path.display()))
            })
            .transpose()
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a `key=value` query argument
fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}
