//! Wire types for the Powens REST API.
//!
//! Only the fields the bridge actually reads are modeled; everything else in
//! the payloads is ignored by serde.

use chrono::NaiveDate;
use serde::Deserialize;

/// Response from POST /auth/token (code exchange and refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Remote user the tokens belong to. Not present on every grant.
    pub id_user: Option<i64>,
}

/// Response from POST /users (service-level user provisioning).
#[derive(Debug, Deserialize)]
pub struct ProvisionedUser {
    pub id_user: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountsResponse {
    #[serde(default)]
    pub accounts: Vec<RemoteAccount>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteAccount {
    pub id: i64,
    pub name: Option<String>,
    /// Powens sometimes populates `label` instead of `name`.
    pub label: Option<String>,
    pub bank_name: Option<String>,
    pub balance: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub currency: Option<RemoteCurrency>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteCurrency {
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsResponse {
    #[serde(default)]
    pub transactions: Vec<RemoteTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteTransaction {
    pub id: i64,
    pub wording: Option<String>,
    pub original_wording: Option<String>,
    pub simplified_wording: Option<String>,
    /// Signed amount.
    pub value: Option<f64>,
    pub date: Option<NaiveDate>,
    pub category: Option<RemoteCategory>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteCategory {
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let body = r#"{
            "access_token": "at-123",
            "refresh_token": "rt-456",
            "expires_in": 3600,
            "token_type": "Bearer"
        }"#;
        let parsed: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "at-123");
        assert_eq!(parsed.refresh_token, "rt-456");
        assert_eq!(parsed.expires_in, 3600);
        assert!(parsed.id_user.is_none());
    }

    #[test]
    fn test_parse_accounts_with_sparse_fields() {
        let body = r#"{
            "accounts": [
                {
                    "id": 101,
                    "label": "Compte courant",
                    "balance": 1250.42,
                    "currency": {"code": "EUR"},
                    "type": "checking"
                },
                {"id": 102}
            ],
            "total": 2
        }"#;
        let parsed: AccountsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.accounts.len(), 2);
        assert_eq!(parsed.accounts[0].label.as_deref(), Some("Compte courant"));
        assert!(parsed.accounts[1].name.is_none());
        assert!(parsed.accounts[1].currency.is_none());
    }

    #[test]
    fn test_parse_transactions() {
        let body = r#"{
            "transactions": [
                {
                    "id": 9001,
                    "wording": "CB CARREFOUR",
                    "simplified_wording": "Carrefour",
                    "value": -34.90,
                    "date": "2024-03-15",
                    "category": {"name": "Groceries"},
                    "type": "card"
                }
            ]
        }"#;
        let parsed: TransactionsResponse = serde_json::from_str(body).unwrap();
        let tx = &parsed.transactions[0];
        assert_eq!(tx.id, 9001);
        assert_eq!(tx.value, Some(-34.90));
        assert_eq!(tx.date.unwrap().to_string(), "2024-03-15");
        assert_eq!(
            tx.category.as_ref().and_then(|c| c.name.as_deref()),
            Some("Groceries")
        );
    }

    #[test]
    fn test_missing_accounts_key_defaults_empty() {
        let parsed: AccountsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.accounts.is_empty());
    }
}
