//! Credential models: OAuth 2.0 tokens, redacted secrets, and static API keys.

pub mod api_key;
pub mod secret;
pub mod token;

pub use api_key::*;
pub use secret::*;
pub use token::*;
