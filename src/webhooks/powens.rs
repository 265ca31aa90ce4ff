//! Powens webhook dispatcher.
//!
//! Classifies inbound events by their `type` discriminator and routes them to
//! handlers. Unknown types are acknowledged, never rejected — Powens adds
//! event types over time and the bridge must stay forward compatible.
//!
//! Signature verification: when `POWENS_WEBHOOK_SECRET` is configured, the
//! `x-powens-signature` header must carry hex HMAC-SHA256 of the raw body.
//! Without a secret the dispatcher accepts events unverified and logs a
//! warning.

use axum::{extract::State, http::HeaderMap, response::Json};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use crate::{error::BridgeError, SharedState};

type HmacSha256 = Hmac<Sha256>;

/// Minimal event envelope — everything beyond `type` is handler-specific.
#[derive(Debug, Deserialize)]
struct PowensEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    data: Value,
}

/// Recognized event categories.
#[derive(Debug, PartialEq, Eq)]
enum EventKind {
    AccountChanged,
    TransactionChanged,
    ConnectionSynced,
    Unknown,
}

fn classify(event_type: &str) -> EventKind {
    match event_type {
        "account.created" | "account.updated" => EventKind::AccountChanged,
        "transaction.created" | "transaction.updated" => EventKind::TransactionChanged,
        "connection.synced" => EventKind::ConnectionSynced,
        _ => EventKind::Unknown,
    }
}

// =============================================================================
// Signature Verification
// =============================================================================

/// Verify hex-encoded HMAC-SHA256 of the raw body in constant time.
fn verify_signature(raw_body: &[u8], signature_hex: &str, secret: &str) -> Result<(), BridgeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BridgeError::Internal("HMAC key error".into()))?;
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();
    let expected_hex: String = expected.iter().map(|b| format!("{b:02x}")).collect();

    if !constant_time_eq(expected_hex.as_bytes(), signature_hex.as_bytes()) {
        return Err(BridgeError::Unauthorized);
    }

    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// =============================================================================
// Main Handler
// =============================================================================

/// POST /powens/webhook
pub async fn powens_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, BridgeError> {
    match &state.config.powens_webhook_secret {
        Some(secret) => {
            let signature = headers
                .get("x-powens-signature")
                .and_then(|v| v.to_str().ok())
                .ok_or(BridgeError::Unauthorized)?;
            verify_signature(&body, signature, secret)?;
        }
        None => {
            tracing::warn!(
                "[Webhook] POWENS_WEBHOOK_SECRET not set — accepting event unverified"
            );
        }
    }

    let event: PowensEvent = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::Validation(format!("invalid webhook payload: {e}")))?;

    tracing::info!("[Webhook:Powens] event={}", event.kind);

    match classify(&event.kind) {
        EventKind::AccountChanged => handle_account_event(&event.kind, &event.data),
        EventKind::TransactionChanged => handle_transaction_event(&event.kind, &event.data),
        EventKind::ConnectionSynced => handle_connection_synced(&event.data),
        EventKind::Unknown => {
            tracing::debug!("[Webhook:Powens] unhandled event type: {}", event.kind);
        }
    }

    Ok(Json(json!({ "received": true })))
}

// =============================================================================
// Event Handlers
// =============================================================================
//
// Domain logic for these events is intentionally not implemented yet: account
// and transaction changes are picked up by the next sync. The handlers exist
// so each recognized type has a named landing spot.

fn handle_account_event(kind: &str, data: &Value) {
    tracing::info!("[Webhook:Powens] account event {kind}: {data}");
}

fn handle_transaction_event(kind: &str, data: &Value) {
    tracing::info!("[Webhook:Powens] transaction event {kind}: {data}");
}

fn handle_connection_synced(data: &Value) {
    tracing::info!("[Webhook:Powens] connection synced: {data}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_recognized_types() {
        assert_eq!(classify("account.created"), EventKind::AccountChanged);
        assert_eq!(classify("account.updated"), EventKind::AccountChanged);
        assert_eq!(
            classify("transaction.created"),
            EventKind::TransactionChanged
        );
        assert_eq!(
            classify("transaction.updated"),
            EventKind::TransactionChanged
        );
        assert_eq!(classify("connection.synced"), EventKind::ConnectionSynced);
    }

    #[test]
    fn test_classify_unknown_is_not_an_error() {
        assert_eq!(classify("unknown.event"), EventKind::Unknown);
        assert_eq!(classify(""), EventKind::Unknown);
    }

    #[test]
    fn test_envelope_parsing() {
        let body = r#"{"type": "account.updated", "id": 42, "user_id": 7}"#;
        let event: PowensEvent = serde_json::from_slice(body.as_bytes()).unwrap();
        assert_eq!(event.kind, "account.updated");
        assert_eq!(event.data.get("id").and_then(|v| v.as_i64()), Some(42));
    }

    #[test]
    fn test_signature_roundtrip() {
        let secret = "whsec_test";
        let body = br#"{"type":"connection.synced"}"#;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        assert!(verify_signature(body, &sig, secret).is_ok());
    }

    #[test]
    fn test_signature_tamper_detection() {
        let secret = "whsec_test";
        let body = br#"{"type":"connection.synced"}"#;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        let tampered = br#"{"type":"account.created"}"#;
        assert!(matches!(
            verify_signature(tampered, &sig, secret),
            Err(BridgeError::Unauthorized)
        ));

        assert!(matches!(
            verify_signature(body, &sig, "other-secret"),
            Err(BridgeError::Unauthorized)
        ));
    }

    #[test]
    fn test_signature_length_mismatch() {
        assert!(verify_signature(b"body", "deadbeef", "secret").is_err());
    }
}
