// PokitDok platform client - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod platform;
pub mod request;
pub mod response;

pub use auth::{Credentials, Token, TokenManager};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use http_client::ApiClient;
pub use platform::PlatformClient;
pub use request::{Attachment, Multipart, Params, RequestSpec};
pub use response::{Body, HttpResponse};
