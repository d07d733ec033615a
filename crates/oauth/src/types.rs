use std::{collections::BTreeMap, net::SocketAddr};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer, Serialize, de::Error as _},
    serde_json::Value,
};

use crate::error::OAuthError;

/// Google's consent screen.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Scope granting access to the Google Ads API.
pub const ADWORDS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";
/// Port the callback receiver listens on. Must match the redirect URI
/// registered for the OAuth client.
pub const CALLBACK_PORT: u16 = 8080;

/// OAuth 2.0 provider configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    /// Address the local callback receiver binds to.
    pub callback_addr: SocketAddr,
    /// Redirect URI sent to the provider. Derived from the bound callback
    /// address when unset.
    pub redirect_uri: Option<String>,
}

impl OAuthConfig {
    /// Endpoints and scope for an offline Google Ads authorization.
    pub fn google_ads() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            scopes: vec![ADWORDS_SCOPE.to_string()],
            callback_addr: SocketAddr::from(([127, 0, 0, 1], CALLBACK_PORT)),
            redirect_uri: Some(format!("http://localhost:{CALLBACK_PORT}")),
        }
    }
}

/// API credentials persisted in the Google Ads configuration document.
///
/// Only the three credential keys are modelled; every other key in the
/// document is carried through `extra` untouched. Credential values may be
/// any YAML scalar (an unquoted numeric secret is common) and are read as
/// strings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(
        default,
        deserialize_with = "deserialize_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_scalar_secret",
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_secret: Option<Secret<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_scalar_secret",
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<Secret<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl CredentialRecord {
    /// Client id and secret, both required before an authorization flow can
    /// start.
    pub fn credentials(&self) -> Result<(&str, &Secret<String>), OAuthError> {
        let client_id = self
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(OAuthError::MissingCredentials)?;
        let client_secret = self
            .client_secret
            .as_ref()
            .filter(|s| !s.expose_secret().is_empty())
            .ok_or(OAuthError::MissingCredentials)?;
        Ok((client_id, client_secret))
    }

    /// Copy of this record with only the refresh token replaced.
    pub fn with_refresh_token(&self, refresh_token: Secret<String>) -> Self {
        Self {
            refresh_token: Some(refresh_token),
            ..self.clone()
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("extra_keys", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Body of a successful token endpoint response. Only the refresh token is
/// kept past the exchange.
///
/// Built leniently from any JSON value: a field with an unexpected type is
/// treated as absent instead of failing the exchange.
#[derive(Clone, Default)]
pub struct TokenResponse {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn from_json(body: &Value) -> Self {
        let string = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let expires_in = match body.get("expires_in") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        Self {
            access_token: string("access_token").map(Secret::new),
            refresh_token: string("refresh_token").map(Secret::new),
            expires_in,
            token_type: string("token_type"),
        }
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Short-lived access token minted from a stored refresh token.
pub struct AccessToken {
    pub access_token: Secret<String>,
    /// Lifetime in seconds, as reported by the provider.
    pub expires_in: Option<u64>,
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

/// Serialize an `Option<Secret<String>>` by exposing its inner value.
/// Use only for fields that must round-trip through the config document.
pub fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Read an optional YAML scalar as a string. Null is absent; sequences and
/// mappings are rejected.
fn deserialize_scalar<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a scalar credential value, got {other:?}"
        ))),
    }
}

fn deserialize_scalar_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Secret<String>>, D::Error> {
    Ok(deserialize_scalar(deserializer)?.map(Secret::new))
}
