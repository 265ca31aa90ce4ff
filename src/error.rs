use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the finaice-bridge service.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    // ── Input Errors ────────────────────────────────────────────────────
    #[error("{0}")]
    Validation(String),

    #[error("Invalid state")]
    InvalidState,

    #[error("State expired")]
    ExpiredState,

    // ── Token Errors ────────────────────────────────────────────────────
    #[error("No valid access token")]
    NoValidToken,

    #[error("Unauthorized")]
    Unauthorized,

    // ── Aggregator Errors ───────────────────────────────────────────────
    #[error("Powens returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Powens request failed: {0}")]
    UpstreamTransport(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BridgeError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        BridgeError::Store(e.to_string())
    }
}

impl BridgeError {
    /// Map a reqwest transport failure (no HTTP response at all).
    pub fn transport(e: &reqwest::Error) -> Self {
        BridgeError::UpstreamTransport(e.to_string())
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            BridgeError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            BridgeError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state"),
            BridgeError::ExpiredState => (StatusCode::BAD_REQUEST, "state_expired"),
            BridgeError::NoValidToken => (StatusCode::UNAUTHORIZED, "no_valid_token"),
            BridgeError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            BridgeError::Upstream { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "upstream_error"),
            BridgeError::UpstreamTransport(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "upstream_unreachable")
            }
            BridgeError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            BridgeError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            BridgeError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BridgeError::Validation("userId is required".into()), 400),
            (BridgeError::InvalidState, 400),
            (BridgeError::ExpiredState, 400),
            (BridgeError::NoValidToken, 401),
            (BridgeError::Unauthorized, 401),
            (
                BridgeError::Upstream {
                    status: 403,
                    body: "forbidden".into(),
                },
                500,
            ),
            (BridgeError::Store("down".into()), 500),
        ];
        for (err, expected) in cases {
            let resp = err.into_response();
            assert_eq!(resp.status().as_u16(), expected);
        }
    }

    #[test]
    fn test_upstream_detail_surfaced() {
        let err = BridgeError::Upstream {
            status: 400,
            body: "invalid_grant".into(),
        };
        assert!(err.to_string().contains("invalid_grant"));
        assert!(err.to_string().contains("400"));
    }
}
