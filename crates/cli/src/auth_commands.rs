use std::path::{Path, PathBuf};

use {
    allervie_oauth::{BrowserLauncher, ConfigStore, DEFAULT_CONFIG_FILE, OAuthConfig, OAuthFlow},
    anyhow::Result,
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Obtain a new refresh token through the Google consent screen.
    Login {
        /// Path to the Google Ads config document.
        #[arg(long, env = "ALLERVIE_ADS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Show which credentials are stored.
    Status {
        #[arg(long, env = "ALLERVIE_ADS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Check that the stored refresh token can still mint access tokens.
    Verify {
        #[arg(long, env = "ALLERVIE_ADS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

pub async fn handle_auth(action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Login { config } => login(&config).await,
        AuthAction::Status { config } => status(&config),
        AuthAction::Verify { config } => verify(&config).await,
    }
}

const CODE_RECEIVED: &str = "Authorization code received, exchanging for tokens...";

fn client_id_line(client_id: &str) -> String {
    format!("Using client ID: {client_id}")
}

/// Opens the consent screen in the operator's default browser, falling back
/// to printing the URL.
struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn flow_started(&self, client_id: &str) {
        println!("{}", client_id_line(client_id));
    }

    fn code_received(&self) {
        println!("{CODE_RECEIVED}");
    }

    fn open(&self, url: &str) -> std::io::Result<()> {
        println!("Opening browser window for authorization...");
        if open::that(url).is_err() {
            println!("Could not open browser. Please visit:\n{url}");
        }
        println!("Waiting for authorization...");
        Ok(())
    }
}

async fn login(config: &Path) -> Result<()> {
    println!("=== Google Ads API Refresh Token Generator ===");

    let store = ConfigStore::new(config);
    let flow = OAuthFlow::new(OAuthConfig::google_ads());
    flow.run(&store, &SystemBrowser).await?;

    println!("=== Success ===");
    println!(
        "Refresh token has been updated in {}",
        store.path().display()
    );
    Ok(())
}

fn status(config: &Path) -> Result<()> {
    let store = ConfigStore::new(config);
    let record = store.load()?;

    println!("Config:        {}", store.path().display());
    println!(
        "Client ID:     {}",
        record.client_id.as_deref().unwrap_or("(missing)")
    );
    println!(
        "Client secret: {}",
        if record.client_secret.is_some() {
            "present"
        } else {
            "(missing)"
        }
    );
    println!(
        "Refresh token: {}",
        if record.has_refresh_token() {
            "present"
        } else {
            "(missing, run `allervie auth login`)"
        }
    );
    Ok(())
}

async fn verify(config: &Path) -> Result<()> {
    let store = ConfigStore::new(config);
    let record = store.load()?;
    let flow = OAuthFlow::new(OAuthConfig::google_ads());
    let token = flow.refresh_access_token(&record).await?;

    match token.expires_in {
        Some(secs) => println!("Refresh token is valid (access token expires in {secs}s)"),
        None => println!("Refresh token is valid"),
    }
    Ok(())
}
