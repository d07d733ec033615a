use {
    reqwest::StatusCode,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    callback_server::CallbackServer,
    error::OAuthError,
    storage::ConfigStore,
    types::{AccessToken, CredentialRecord, OAuthConfig, TokenResponse},
};

/// Operator-facing side of the flow: opens the consent URL and hears about
/// progress.
pub trait BrowserLauncher {
    fn open(&self, url: &str) -> std::io::Result<()>;

    /// Credentials loaded; about to bind the callback listener.
    fn flow_started(&self, _client_id: &str) {}

    /// The callback captured a code; the token exchange comes next.
    fn code_received(&self) {}
}

/// Authorization-code flow that ends with a refresh token persisted in the
/// config store.
pub struct OAuthFlow {
    config: OAuthConfig,
    client: reqwest::Client,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Build the consent URL. `prompt=consent` makes the provider issue a
    /// fresh refresh token on every run.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Url, OAuthError> {
        let mut url = Url::parse(&self.config.auth_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    /// Run the whole flow: load credentials, collect consent, exchange the
    /// code and persist the new refresh token. Nothing is written unless every
    /// step succeeded.
    pub async fn run(
        &self,
        store: &ConfigStore,
        browser: &dyn BrowserLauncher,
    ) -> Result<CredentialRecord, OAuthError> {
        let record = store.load()?;
        let (client_id, client_secret) = record.credentials()?;
        info!(%client_id, "starting authorization flow");
        browser.flow_started(client_id);

        let server = CallbackServer::bind(self.config.callback_addr).await?;
        let redirect_uri = match &self.config.redirect_uri {
            Some(uri) => uri.clone(),
            None => format!("http://localhost:{}", server.local_addr()?.port()),
        };

        let auth_url = self.authorization_url(client_id, &redirect_uri)?;
        debug!(url = %auth_url, "authorization URL");
        if let Err(e) = browser.open(auth_url.as_str()) {
            warn!(%e, url = %auth_url, "could not open browser, visit the URL manually");
        }

        let code = server.wait_for_code().await?;
        info!("authorization code received, exchanging for tokens");
        browser.code_received();

        let tokens = self
            .exchange_code(client_id, client_secret, &code, &redirect_uri)
            .await?;
        let refresh_token = tokens
            .refresh_token
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or(OAuthError::MissingRefreshToken)?;

        let updated = record.with_refresh_token(refresh_token);
        store.save(&updated)?;
        info!(path = %store.path().display(), "refresh token saved");
        Ok(updated)
    }

    /// Exchange an authorization code for tokens with one form POST.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &Secret<String>,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let form = [
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret().as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        self.post_token_form(&form).await
    }

    /// Mint an access token from the stored refresh token. Verifies the token
    /// still works; the store is left untouched.
    pub async fn refresh_access_token(
        &self,
        record: &CredentialRecord,
    ) -> Result<AccessToken, OAuthError> {
        let (client_id, client_secret) = record.credentials()?;
        let refresh_token = record
            .refresh_token
            .as_ref()
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or(OAuthError::MissingRefreshToken)?;

        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret().as_str()),
            ("refresh_token", refresh_token.expose_secret().as_str()),
            ("grant_type", "refresh_token"),
        ];
        let tokens = self.post_token_form(&form).await?;
        let access_token = tokens
            .access_token
            .ok_or_else(|| OAuthError::TokenExchangeFailed {
                status: StatusCode::OK.as_u16(),
                body: "response did not contain an access_token".into(),
            })?;

        Ok(AccessToken {
            access_token,
            expires_in: tokens.expires_in,
        })
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OAuthError> {
        let resp = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            return Err(OAuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| OAuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body: format!("invalid token response: {e}"),
            })?;
        Ok(TokenResponse::from_json(&json))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, net::SocketAddr};

    use {super::*, mockito::Matcher};

    const CONFIG: &str = "\
client_id: client-1
client_secret: secret-1
developer_token: dev-token
";

    /// Plays the operator's browser: follows the redirect URI embedded in the
    /// consent URL, appending the given query string.
    struct FakeBrowser {
        query: String,
        events: std::sync::Mutex<Vec<String>>,
    }

    impl FakeBrowser {
        fn with_code(code: &str) -> Self {
            Self {
                query: format!("code={code}&scope=adwords"),
                events: Default::default(),
            }
        }

        fn without_code() -> Self {
            Self {
                query: "error=access_denied".into(),
                events: Default::default(),
            }
        }

        fn record(&self, event: String) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }
    }

    impl BrowserLauncher for FakeBrowser {
        fn flow_started(&self, client_id: &str) {
            self.record(format!("started {client_id}"));
        }

        fn code_received(&self) {
            self.record("code received".into());
        }

        fn open(&self, url: &str) -> std::io::Result<()> {
            self.record("open".into());
            let url = Url::parse(url).map_err(std::io::Error::other)?;
            let redirect = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .ok_or_else(|| std::io::Error::other("no redirect_uri"))?;
            let target = format!("{redirect}/?{}", self.query);
            tokio::spawn(async move {
                let _ = reqwest::get(target).await;
            });
            Ok(())
        }
    }

    struct NoBrowser;

    impl BrowserLauncher for NoBrowser {
        fn open(&self, _url: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("no display"))
        }
    }

    fn test_config(token_url: String) -> OAuthConfig {
        OAuthConfig {
            token_url,
            callback_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            redirect_uri: None,
            ..OAuthConfig::google_ads()
        }
    }

    fn test_store(content: &str) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-ads.yaml");
        fs::write(&path, content).unwrap();
        (dir, ConfigStore::new(path))
    }

    fn stored_refresh_token(store: &ConfigStore) -> Option<String> {
        store
            .load()
            .unwrap()
            .refresh_token
            .map(|t| t.expose_secret().clone())
    }

    #[test]
    fn test_authorization_url() {
        let flow = OAuthFlow::new(OAuthConfig::google_ads());
        let url = flow
            .authorization_url("client-1", "http://localhost:8080")
            .unwrap();
        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/auth?"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("client_id"), Some("client-1"));
        assert_eq!(get("redirect_uri"), Some("http://localhost:8080"));
        assert_eq!(get("scope"), Some("https://www.googleapis.com/auth/adwords"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("prompt"), Some("consent"));
        assert_eq!(get("state"), None);
    }

    #[tokio::test]
    async fn test_flow_persists_refresh_token() {
        let mut provider = mockito::Server::new_async().await;
        let mock = provider
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("code".into(), "auth-code-1".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret-1".into()),
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::Regex("redirect_uri=http".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A1","refresh_token":"R1","expires_in":3599}"#)
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let record = flow
            .run(&store, &FakeBrowser::with_code("auth-code-1"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(record.has_refresh_token());
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.client_id.as_deref(), Some("client-1"));
        assert_eq!(
            reloaded.client_secret.as_ref().map(|s| s.expose_secret().as_str()),
            Some("secret-1")
        );
        assert_eq!(stored_refresh_token(&store).as_deref(), Some("R1"));
        assert_eq!(
            reloaded.extra.get("developer_token"),
            Some(&serde_yaml::Value::from("dev-token"))
        );
    }

    #[tokio::test]
    async fn test_rejected_callback_does_not_write() {
        let mut provider = mockito::Server::new_async().await;
        let mock = provider
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let result = flow.run(&store, &FakeBrowser::without_code()).await;

        assert!(matches!(result, Err(OAuthError::AuthorizationRejected)));
        mock.assert_async().await;
        assert_eq!(fs::read_to_string(store.path()).unwrap(), CONFIG);
    }

    #[tokio::test]
    async fn test_token_endpoint_error_does_not_write() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let result = flow.run(&store, &FakeBrowser::with_code("bad")).await;

        match result {
            Err(OAuthError::TokenExchangeFailed { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            },
            other => panic!("expected TokenExchangeFailed, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(store.path()).unwrap(), CONFIG);
    }

    #[tokio::test]
    async fn test_non_200_success_status_is_failure() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("POST", "/token")
            .with_status(201)
            .with_body(r#"{"refresh_token":"R1"}"#)
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let result = flow.run(&store, &FakeBrowser::with_code("c")).await;

        assert!(matches!(
            result,
            Err(OAuthError::TokenExchangeFailed { status: 201, .. })
        ));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), CONFIG);
    }

    #[tokio::test]
    async fn test_mistyped_ignored_fields_still_persist_token() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("POST", "/token")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "access_token": "A1",
                    "refresh_token": "R1",
                    "expires_in": "3599",
                    "scope": ["a", "b"],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        flow.run(&store, &FakeBrowser::with_code("c")).await.unwrap();

        assert_eq!(stored_refresh_token(&store).as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_non_json_body_is_exchange_failure() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("POST", "/token")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let result = flow.run(&store, &FakeBrowser::with_code("c")).await;

        assert!(matches!(
            result,
            Err(OAuthError::TokenExchangeFailed { status: 200, .. })
        ));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), CONFIG);
    }

    #[tokio::test]
    async fn test_progress_reported_in_order() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"refresh_token":"R1"}"#)
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let browser = FakeBrowser::with_code("c");
        flow.run(&store, &browser).await.unwrap();

        assert_eq!(
            browser.events(),
            vec!["started client-1", "open", "code received"]
        );
    }

    #[tokio::test]
    async fn test_missing_refresh_token_does_not_write() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"A1","expires_in":3599}"#)
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let result = flow.run(&store, &FakeBrowser::with_code("c")).await;

        assert!(matches!(result, Err(OAuthError::MissingRefreshToken)));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), CONFIG);
    }

    #[tokio::test]
    async fn test_missing_credentials_fails_before_binding() {
        let (_dir, store) = test_store("client_id: only-id\n");
        let flow = OAuthFlow::new(test_config("http://127.0.0.1:9/token".into()));
        let result = flow.run(&store, &NoBrowser).await;
        assert!(matches!(result, Err(OAuthError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("google-ads.yaml"));
        let flow = OAuthFlow::new(test_config("http://127.0.0.1:9/token".into()));
        let result = flow.run(&store, &NoBrowser).await;
        assert!(matches!(result, Err(OAuthError::ConfigNotFound { .. })));
    }

    #[tokio::test]
    async fn test_last_run_wins() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("code".into(), "code-1".into()))
            .with_status(200)
            .with_body(r#"{"access_token":"A1","refresh_token":"R1"}"#)
            .create_async()
            .await;
        provider
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("code".into(), "code-2".into()))
            .with_status(200)
            .with_body(r#"{"access_token":"A2","refresh_token":"R2"}"#)
            .create_async()
            .await;

        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        flow.run(&store, &FakeBrowser::with_code("code-1"))
            .await
            .unwrap();
        assert_eq!(stored_refresh_token(&store).as_deref(), Some("R1"));

        flow.run(&store, &FakeBrowser::with_code("code-2"))
            .await
            .unwrap();
        assert_eq!(stored_refresh_token(&store).as_deref(), Some("R2"));

        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.matches("refresh_token").count(), 1);
        assert!(!raw.contains("R1"));
    }

    #[tokio::test]
    async fn test_refresh_access_token() {
        let mut provider = mockito::Server::new_async().await;
        let mock = provider
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "R1".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"A9","expires_in":3599,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let (_dir, store) = test_store(&format!("{CONFIG}refresh_token: R1\n"));
        let before = fs::read_to_string(store.path()).unwrap();
        let flow = OAuthFlow::new(test_config(format!("{}/token", provider.url())));
        let token = flow
            .refresh_access_token(&store.load().unwrap())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token.expose_secret(), "A9");
        assert_eq!(token.expires_in, Some(3599));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_refresh_without_stored_token() {
        let (_dir, store) = test_store(CONFIG);
        let flow = OAuthFlow::new(test_config("http://127.0.0.1:9/token".into()));
        let result = flow.refresh_access_token(&store.load().unwrap()).await;
        assert!(matches!(result, Err(OAuthError::MissingRefreshToken)));
    }
}
