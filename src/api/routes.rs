//! Route handlers for the bridge.
//!
//! Handlers validate input, delegate to the broker / sync engine / client,
//! and map results to JSON. All taxonomy-to-status mapping lives in
//! `BridgeError::into_response`.

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::BridgeError;
use crate::powens::TransactionQuery;
use crate::webhooks::powens as powens_webhooks;
use crate::SharedState;

pub fn powens_router(state: SharedState) -> Router {
    Router::new()
        .route("/auth", get(auth_url))
        .route("/callback", get(oauth_callback))
        .route("/exchange", post(exchange))
        .route("/accounts/{user_id}", get(accounts))
        .route("/transactions/{user_id}", get(transactions))
        .route("/sync/{user_id}", post(sync))
        .route("/webhook", post(powens_webhooks::powens_webhook))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "FinAIce Bridge is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// OAuth Flow
// =============================================================================

#[derive(Deserialize)]
struct AuthQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// GET /powens/auth — Generate the authorization URL for the app.
async fn auth_url(
    State(state): State<SharedState>,
    Query(q): Query<AuthQuery>,
) -> Result<Json<serde_json::Value>, BridgeError> {
    let user_id = q
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BridgeError::Validation("userId is required".into()))?;

    let request = state.broker.authorize(&user_id).await?;
    Ok(Json(serde_json::to_value(request).map_err(|e| {
        BridgeError::Internal(e.to_string())
    })?))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// GET /powens/callback — Hand the code back to the app via deep link.
///
/// Pure presentation: the page redirects into the app, which then posts the
/// code to /powens/exchange.
async fn oauth_callback(
    State(state): State<SharedState>,
    Query(q): Query<CallbackQuery>,
) -> Result<Html<String>, BridgeError> {
    let (code, oauth_state) = match (q.code, q.state) {
        (Some(code), Some(s)) if !code.is_empty() && !s.is_empty() => (code, s),
        _ => return Err(BridgeError::Validation("code and state are required".into())),
    };

    tracing::info!(
        "OAuth callback received (code: {}…, state: {}…)",
        truncate(&code, 10),
        truncate(&oauth_state, 10),
    );

    let deep_link = build_deep_link(&state.config.deep_link_base(), &code, &oauth_state);
    Ok(Html(callback_page(&deep_link)))
}

#[derive(Deserialize)]
struct ExchangeBody {
    code: Option<String>,
    state: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// POST /powens/exchange — Exchange an authorization code for tokens.
async fn exchange(
    State(state): State<SharedState>,
    Json(body): Json<ExchangeBody>,
) -> Result<Json<serde_json::Value>, BridgeError> {
    let (code, oauth_state, user_id) = match (body.code, body.state, body.user_id) {
        (Some(c), Some(s), Some(u)) if !c.is_empty() && !s.is_empty() && !u.is_empty() => {
            (c, s, u)
        }
        _ => {
            return Err(BridgeError::Validation(
                "code, state, and userId are required".into(),
            ))
        }
    };

    state.broker.exchange(&code, &oauth_state, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Bank connection successful",
    })))
}

// =============================================================================
// Data Proxies
// =============================================================================

/// GET /powens/accounts/:user_id — Proxy the aggregator account list.
async fn accounts(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, BridgeError> {
    let access_token = state
        .broker
        .valid_access_token(&user_id)
        .await?
        .ok_or(BridgeError::NoValidToken)?;

    let payload = state.powens.accounts_json(&access_token).await?;
    Ok(Json(payload))
}

#[derive(Deserialize)]
struct TransactionsQueryParams {
    #[serde(rename = "accountId")]
    account_id: Option<i64>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
}

/// GET /powens/transactions/:user_id — Proxy the aggregator transaction list.
async fn transactions(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Query(q): Query<TransactionsQueryParams>,
) -> Result<Json<serde_json::Value>, BridgeError> {
    let access_token = state
        .broker
        .valid_access_token(&user_id)
        .await?
        .ok_or(BridgeError::NoValidToken)?;

    let query = TransactionQuery {
        from: q.from,
        to: q.to,
        limit: Some(q.limit.unwrap_or(100)),
    };

    let payload = match q.account_id {
        Some(account_id) => {
            state
                .powens
                .account_transactions_json(&access_token, account_id, &query)
                .await?
        }
        None => {
            state
                .powens
                .user_transactions_json(&access_token, &query)
                .await?
        }
    };

    Ok(Json(payload))
}

/// POST /powens/sync/:user_id — Manually trigger a full sync.
async fn sync(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, BridgeError> {
    let access_token = state
        .broker
        .valid_access_token(&user_id)
        .await?
        .ok_or(BridgeError::NoValidToken)?;

    let summary = state.sync.sync_user(&user_id, &access_token).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Data synced successfully",
        "accounts": summary.accounts,
        "transactions": summary.transactions,
    })))
}

// =============================================================================
// Callback Page
// =============================================================================

fn build_deep_link(base: &str, code: &str, state: &str) -> String {
    format!(
        "{base}?code={}&state={}",
        urlencode(code),
        urlencode(state)
    )
}

/// HTML page that bounces the browser into the mobile app. JavaScript
/// redirect works more reliably than a Location header inside mobile
/// webviews.
fn callback_page(deep_link: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Connexion réussie</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
      body {{
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        display: flex;
        flex-direction: column;
        align-items: center;
        justify-content: center;
        height: 100vh;
        margin: 0;
        background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
        color: white;
      }}
      .container {{ text-align: center; padding: 2rem; }}
      h1 {{ font-size: 2rem; margin-bottom: 1rem; }}
      p {{ font-size: 1.2rem; opacity: 0.9; }}
    </style>
  </head>
  <body>
    <div class="container">
      <h1>✅ Connexion bancaire réussie!</h1>
      <p>Retour à l'application...</p>
    </div>
    <script>
      setTimeout(() => {{ window.location.href = '{deep_link}'; }}, 500);
    </script>
  </body>
</html>
"#
    )
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Truncate to at most `max` characters, never splitting a UTF-8 sequence.
/// Callback query values are attacker-controlled, so byte slicing is not safe.
fn truncate(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(i, _)| &s[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_link_encodes_parameters() {
        let link = build_deep_link("finaice://auth/callback", "c o/de", "ab&c");
        assert_eq!(link, "finaice://auth/callback?code=c+o%2Fde&state=ab%26c");
    }

    #[test]
    fn test_callback_page_embeds_deep_link() {
        let link = build_deep_link("finaice://auth/callback", "c1", "abc123");
        let page = callback_page(&link);
        assert!(page.contains("finaice://auth/callback?code=c1&state=abc123"));
        assert!(page.contains("window.location.href"));
    }

    #[test]
    fn test_truncate_short_input() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("0123456789abcdef", 10), "0123456789");
    }

    #[test]
    fn test_truncate_multibyte_input() {
        // Byte 10 falls inside the fourth euro sign; must not panic.
        assert_eq!(truncate("€€€€", 10), "€€€€");
        assert_eq!(truncate("€€€€€€€€€€€€", 10), "€€€€€€€€€€");
        assert_eq!(truncate("aé€aé€aé€aé€", 3), "aé€");
    }
}
