use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

/// Every failure of the authorization flow. All of them are terminal for the
/// operator-driven flow; none is retried.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("malformed config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to access config file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("client_id or client_secret not found in config")]
    MissingCredentials,

    #[error(
        "failed to bind callback listener on {addr}: {source}. Is another process using this port?"
    )]
    PortInUse {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("callback server error: {0}")]
    CallbackServer(#[source] io::Error),

    #[error("authorization rejected: no authorization code received")]
    AuthorizationRejected,

    #[error("invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("token request failed: {0}")]
    TokenRequest(#[from] reqwest::Error),

    #[error("error exchanging code for tokens (HTTP {status}): {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("no refresh token received")]
    MissingRefreshToken,
}
