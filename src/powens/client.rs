//! Authenticated HTTP access to the Powens API.
//!
//! Two credential levels:
//! - a service-level Basic credential (client_id:client_secret) for user
//!   provisioning,
//! - per-user Bearer tokens for account/transaction data calls.
//!
//! The client owns transport plus credential injection only. No caching, no
//! rate limiting. Idempotent GETs get a single retry on transient network
//! failure; token-endpoint POSTs never retry (authorization codes are
//! one-time use).

use base64::Engine as _;
use serde_json::Value;
use std::time::Duration;

use super::types::{AccountsResponse, ProvisionedUser, TokenResponse, TransactionsResponse};
use crate::config::Config;
use crate::error::BridgeError;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Query parameters accepted by the transaction endpoints.
#[derive(Debug, Default, Clone)]
pub struct TransactionQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u32>,
}

impl TransactionQuery {
    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(from) = &self.from {
            params.push(("from", from.clone()));
        }
        if let Some(to) = &self.to {
            params.push(("to", to.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

/// Client for the Powens REST API.
#[derive(Clone)]
pub struct PowensClient {
    http: reqwest::Client,
    api_base: String,
    auth_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    /// Precomputed `Basic base64(client_id:client_secret)`, immutable after
    /// construction.
    basic_auth: String,
}

impl PowensClient {
    pub fn new(config: &Config) -> Result<Self, BridgeError> {
        if config.powens_client_id.is_empty() || config.powens_client_secret.is_empty() {
            return Err(BridgeError::Configuration(
                "Powens client credentials are empty".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("HTTP client init failed: {e}")))?;

        let credentials = format!(
            "{}:{}",
            config.powens_client_id, config.powens_client_secret
        );
        let basic_auth = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        );

        Ok(Self {
            http,
            api_base: config.powens_api_url.trim_end_matches('/').to_string(),
            auth_base: config.powens_auth_url.trim_end_matches('/').to_string(),
            client_id: config.powens_client_id.clone(),
            client_secret: config.powens_client_secret.clone(),
            redirect_uri: config.powens_redirect_uri.clone(),
            basic_auth,
        })
    }

    // =========================================================================
    // Token endpoint
    // =========================================================================

    /// Exchange an authorization code for tokens (grant_type=authorization_code).
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, BridgeError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    /// Renew an expired access token (grant_type=refresh_token).
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, BridgeError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, BridgeError> {
        let resp = self
            .http
            .post(format!("{}/auth/token", self.auth_base))
            .form(form)
            .send()
            .await
            .map_err(|e| BridgeError::transport(&e))?;

        let resp = check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| BridgeError::UpstreamTransport(format!("invalid token response: {e}")))
    }

    // =========================================================================
    // Service-level calls (Basic credential)
    // =========================================================================

    /// Provision a Powens user, returning the remote id.
    pub async fn provision_user(&self) -> Result<i64, BridgeError> {
        let resp = self
            .http
            .post(format!("{}/users", self.api_base))
            .header("Authorization", &self.basic_auth)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| BridgeError::transport(&e))?;

        let resp = check_status(resp).await?;
        let user: ProvisionedUser = resp
            .json()
            .await
            .map_err(|e| BridgeError::UpstreamTransport(format!("invalid user response: {e}")))?;
        Ok(user.id_user)
    }

    // =========================================================================
    // Data calls (Bearer token)
    // =========================================================================

    /// Fetch the caller's account list.
    pub async fn accounts(&self, access_token: &str) -> Result<AccountsResponse, BridgeError> {
        let value = self.accounts_json(access_token).await?;
        serde_json::from_value(value)
            .map_err(|e| BridgeError::UpstreamTransport(format!("invalid accounts payload: {e}")))
    }

    /// Fetch the raw account list payload (for proxy routes).
    pub async fn accounts_json(&self, access_token: &str) -> Result<Value, BridgeError> {
        self.get_json(
            &format!("{}/users/me/accounts", self.api_base),
            access_token,
            &[],
        )
        .await
    }

    /// Fetch transactions for one account.
    pub async fn account_transactions(
        &self,
        access_token: &str,
        account_id: i64,
        query: &TransactionQuery,
    ) -> Result<TransactionsResponse, BridgeError> {
        let value = self
            .account_transactions_json(access_token, account_id, query)
            .await?;
        serde_json::from_value(value).map_err(|e| {
            BridgeError::UpstreamTransport(format!("invalid transactions payload: {e}"))
        })
    }

    /// Raw account-scoped transactions payload (for proxy routes).
    pub async fn account_transactions_json(
        &self,
        access_token: &str,
        account_id: i64,
        query: &TransactionQuery,
    ) -> Result<Value, BridgeError> {
        self.get_json(
            &format!("{}/users/me/accounts/{}/transactions", self.api_base, account_id),
            access_token,
            &query.to_params(),
        )
        .await
    }

    /// Raw cross-account transactions payload (for proxy routes).
    pub async fn user_transactions_json(
        &self,
        access_token: &str,
        query: &TransactionQuery,
    ) -> Result<Value, BridgeError> {
        self.get_json(
            &format!("{}/users/me/transactions", self.api_base),
            access_token,
            &query.to_params(),
        )
        .await
    }

    /// GET with Bearer auth and a single retry on transient network failure.
    async fn get_json(
        &self,
        url: &str,
        access_token: &str,
        params: &[(&str, String)],
    ) -> Result<Value, BridgeError> {
        let send = || {
            self.http
                .get(url)
                .header("Authorization", format!("Bearer {access_token}"))
                .query(params)
                .send()
        };

        let resp = match send().await {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!("Transient failure calling {url}, retrying once: {e}");
                send().await.map_err(|e| BridgeError::transport(&e))?
            }
            Err(e) => return Err(BridgeError::transport(&e)),
        };

        let resp = check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| BridgeError::UpstreamTransport(format!("invalid JSON from Powens: {e}")))
    }
}

/// Surface any non-2xx response as an upstream error carrying status and body.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BridgeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BridgeError::Upstream {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            host: "0.0.0.0".into(),
            port: 3000,
            environment: "test".into(),
            database_url: "postgres://localhost/finaice".into(),
            powens_client_id: "client-123".into(),
            powens_client_secret: "s3cret".into(),
            powens_api_url: "https://demo.biapi.pro/2.0/".into(),
            powens_auth_url: "https://demo.biapi.pro/2.0".into(),
            powens_redirect_uri: "https://bridge.example.com/powens/callback".into(),
            powens_webhook_secret: None,
            app_scheme: "finaice".into(),
        }
    }

    #[test]
    fn test_basic_auth_header() {
        let client = PowensClient::new(&test_config()).unwrap();
        // base64("client-123:s3cret")
        assert_eq!(client.basic_auth, "Basic Y2xpZW50LTEyMzpzM2NyZXQ=");
    }

    #[test]
    fn test_base_urls_trimmed() {
        let client = PowensClient::new(&test_config()).unwrap();
        assert_eq!(client.api_base, "https://demo.biapi.pro/2.0");
        assert_eq!(client.auth_base, "https://demo.biapi.pro/2.0");
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let mut config = test_config();
        config.powens_client_id = String::new();
        assert!(matches!(
            PowensClient::new(&config),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_transaction_query_params() {
        let query = TransactionQuery {
            from: Some("2024-01-01".into()),
            to: None,
            limit: Some(100),
        };
        let params = query.to_params();
        assert_eq!(params.len(), 2);
        assert!(params.contains(&("from", "2024-01-01".into())));
        assert!(params.contains(&("limit", "100".into())));
    }
}
