use anyhow::{Context, Result};

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    /// Deployment mode ("development" enables verbose error detail).
    pub environment: String,

    // ── Database (PostgreSQL) ───────────────────────────────────────────
    pub database_url: String,

    // ── Powens (open-banking aggregator) ────────────────────────────────
    pub powens_client_id: String,
    pub powens_client_secret: String,
    /// Data API base, e.g. https://<domain>.biapi.pro/2.0
    pub powens_api_url: String,
    /// Auth base hosting /auth/token and the connect webview.
    pub powens_auth_url: String,
    pub powens_redirect_uri: String,
    /// Shared secret for webhook HMAC verification. Verification is skipped
    /// (with a warning) when unset.
    pub powens_webhook_secret: Option<String>,

    // ── Mobile app ──────────────────────────────────────────────────────
    /// URI scheme the callback page redirects into.
    pub app_scheme: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .context("Invalid PORT")?,
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL is required (PostgreSQL connection string)")?,

            powens_client_id: std::env::var("POWENS_CLIENT_ID")
                .context("POWENS_CLIENT_ID is required")?,
            powens_client_secret: std::env::var("POWENS_CLIENT_SECRET")
                .context("POWENS_CLIENT_SECRET is required")?,
            powens_api_url: std::env::var("POWENS_API_URL")
                .context("POWENS_API_URL is required")?,
            powens_auth_url: std::env::var("POWENS_AUTH_URL")
                .context("POWENS_AUTH_URL is required")?,
            powens_redirect_uri: std::env::var("POWENS_REDIRECT_URI")
                .context("POWENS_REDIRECT_URI is required")?,
            powens_webhook_secret: std::env::var("POWENS_WEBHOOK_SECRET").ok(),

            app_scheme: std::env::var("APP_SCHEME").unwrap_or_else(|_| "finaice".into()),
        })
    }

    /// Deep link the callback page hands the authorization code to.
    pub fn deep_link_base(&self) -> String {
        format!("{}://auth/callback", self.app_scheme)
    }
}
