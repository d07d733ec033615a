pub mod callback_server;
pub mod error;
pub mod flow;
pub mod storage;
pub mod types;

pub use {
    callback_server::CallbackServer,
    error::OAuthError,
    flow::{BrowserLauncher, OAuthFlow},
    storage::{ConfigStore, DEFAULT_CONFIG_FILE},
    types::{AccessToken, CredentialRecord, OAuthConfig, TokenResponse, serialize_option_secret},
};
