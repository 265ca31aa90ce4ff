//! Token lifecycle: CSRF state issuance, authorization-code exchange, and
//! refresh-on-demand access token retrieval.
//!
//! All coordination state lives in the store; the broker itself is stateless
//! and reconstructs context from storage on every call.

use chrono::{Duration, Utc};
use rand::RngCore;
use tracing::{info, warn};
use url::Url;

use crate::error::BridgeError;
use crate::powens::PowensClient;
use crate::store::{Store, TokenUpsert};
use crate::sync::SyncEngine;

/// How long an issued CSRF state stays valid.
const STATE_TTL_MINUTES: i64 = 10;

/// Scopes requested from the Powens webview.
const OAUTH_SCOPE: &str = "transactions accounts";

/// An authorization URL plus the state token bound to it.
#[derive(Debug, serde::Serialize)]
pub struct AuthorizationRequest {
    #[serde(rename = "authUrl")]
    pub auth_url: String,
    pub state: String,
}

/// Issues CSRF states, exchanges codes for tokens, and serves fresh access
/// tokens, refreshing them when expired.
#[derive(Clone)]
pub struct TokenBroker {
    store: Store,
    powens: PowensClient,
    sync: SyncEngine,
    auth_base: String,
    client_id: String,
    redirect_uri: String,
}

impl TokenBroker {
    pub fn new(
        store: Store,
        powens: PowensClient,
        sync: SyncEngine,
        auth_base: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Self {
        Self {
            store,
            powens,
            sync,
            auth_base: auth_base.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    /// Issue a fresh CSRF state for a user and build the webview URL the app
    /// should open.
    pub async fn authorize(&self, user_id: &str) -> Result<AuthorizationRequest, BridgeError> {
        let state = generate_state();
        let expires_at = Utc::now() + Duration::minutes(STATE_TTL_MINUTES);

        self.store
            .insert_oauth_state(&state, user_id, expires_at)
            .await?;

        let auth_url =
            build_authorize_url(&self.auth_base, &self.client_id, &self.redirect_uri, &state)?;

        info!("Issued OAuth state for user {user_id}");

        Ok(AuthorizationRequest { auth_url, state })
    }

    /// Exchange an authorization code for tokens.
    ///
    /// The (state, user_id) pair must match a stored, unexpired state row —
    /// this is the CSRF defense. The consumed state is deleted before the
    /// post-exchange sync runs, so replaying the same pair finds nothing.
    pub async fn exchange(
        &self,
        code: &str,
        state: &str,
        user_id: &str,
    ) -> Result<(), BridgeError> {
        let stored = self
            .store
            .get_oauth_state(state, user_id)
            .await?
            .ok_or(BridgeError::InvalidState)?;

        if stored.is_expired(Utc::now()) {
            return Err(BridgeError::ExpiredState);
        }

        let tokens = self.powens.exchange_code(code).await?;
        let expires_at = Utc::now() + Duration::seconds(tokens.expires_in);

        let remote_user_id = match tokens.id_user {
            Some(id) => Some(id.to_string()),
            None => self.ensure_remote_user(user_id).await,
        };

        self.store
            .upsert_token(&TokenUpsert {
                user_id: user_id.to_string(),
                powens_user_id: remote_user_id,
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token,
                expires_at,
            })
            .await?;

        self.store.delete_oauth_state(state).await?;

        info!("Exchanged authorization code for user {user_id}");

        // Post-commit hook: the initial pull must not fail the exchange.
        self.run_initial_sync(user_id, &tokens.access_token).await;

        Ok(())
    }

    /// Return a usable access token for the user, or `None` when the user
    /// must reauthorize.
    ///
    /// Expired records trigger exactly one refresh attempt; its transport or
    /// upstream failure is downgraded to `None` rather than propagated, since
    /// callers can only react by restarting the flow.
    pub async fn valid_access_token(
        &self,
        user_id: &str,
    ) -> Result<Option<String>, BridgeError> {
        let record = match self.store.get_token(user_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        if !record.is_expired(Utc::now()) {
            return Ok(Some(record.access_token));
        }

        match self.powens.refresh_token(&record.refresh_token).await {
            Ok(tokens) => {
                let expires_at = Utc::now() + Duration::seconds(tokens.expires_in);
                self.store
                    .update_refreshed_token(
                        user_id,
                        &tokens.access_token,
                        &tokens.refresh_token,
                        expires_at,
                    )
                    .await?;
                info!("Refreshed access token for user {user_id}");
                Ok(Some(tokens.access_token))
            }
            Err(e) => {
                warn!("Token refresh failed for user {user_id}, reauthorization required: {e}");
                Ok(None)
            }
        }
    }

    /// Reuse the remote user id from a previous connection, provisioning one
    /// through the service credential when none exists yet.
    async fn ensure_remote_user(&self, user_id: &str) -> Option<String> {
        match self.store.get_token(user_id).await {
            Ok(Some(record)) if record.powens_user_id.is_some() => record.powens_user_id,
            Ok(_) => match self.powens.provision_user().await {
                Ok(id) => Some(id.to_string()),
                Err(e) => {
                    warn!("Could not provision remote user for {user_id}: {e}");
                    None
                }
            },
            Err(e) => {
                warn!("Could not read token record for {user_id}: {e}");
                None
            }
        }
    }

    /// Post-exchange initial sync. Failure is logged, never propagated.
    async fn run_initial_sync(&self, user_id: &str, access_token: &str) {
        if let Err(e) = self.sync.sync_user(user_id, access_token).await {
            warn!("Initial sync after exchange failed for user {user_id}: {e}");
        }
    }
}

/// 32 random bytes, hex-encoded: 256 bits of entropy.
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build the Powens connect webview URL.
fn build_authorize_url(
    auth_base: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<String, BridgeError> {
    let mut url = Url::parse(&format!("{auth_base}/auth/webview/fr/connect"))
        .map_err(|e| BridgeError::Configuration(format!("invalid POWENS_AUTH_URL: {e}")))?;

    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("state", state)
        .append_pair("scope", OAUTH_SCOPE);

    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_64_hex_chars() {
        let state = generate_state();
        assert_eq!(state.len(), 64);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_states_are_distinct() {
        // Two requests must never share a state token.
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorize_url_composition() {
        let url = build_authorize_url(
            "https://demo.biapi.pro/2.0",
            "client-123",
            "https://bridge.example.com/powens/callback",
            "abc123",
        )
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/2.0/auth/webview/fr/connect");

        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("client_id".into(), "client-123".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("state".into(), "abc123".into())));
        assert!(pairs.contains(&("scope".into(), "transactions accounts".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "https://bridge.example.com/powens/callback".into()
        )));
    }

    #[test]
    fn test_authorize_url_rejects_bad_base() {
        assert!(build_authorize_url("not a url", "c", "r", "s").is_err());
    }
}
