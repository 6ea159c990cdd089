// Authentication module
// Manages the client-credentials token lifecycle

mod manager;
mod refresh;
mod types;

pub use manager::TokenManager;
pub use types::{Credentials, Token};
