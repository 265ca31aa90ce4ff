//! PostgreSQL-backed store for OAuth flow state, Powens tokens, and synced
//! financial records.
//!
//! Tables:
//! - `oauth_states`: single-use CSRF state rows, 10-minute lifetime
//! - `powens_tokens`: one access/refresh token pair per user
//! - `bank_accounts`: accounts keyed by (user_id, powens_account_id)
//! - `transactions`: transactions keyed by (user_id, powens_transaction_id)

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};

use crate::error::BridgeError;

/// Store backed by PostgreSQL. Cheap to clone (pool handle).
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self, BridgeError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
            .map_err(|e| BridgeError::Store(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self { pool })
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), BridgeError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_states (
                state       TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                expires_at  TIMESTAMPTZ NOT NULL,
                created_at  TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS powens_tokens (
                user_id         TEXT PRIMARY KEY,
                powens_user_id  TEXT,
                access_token    TEXT NOT NULL,
                refresh_token   TEXT NOT NULL,
                expires_at      TIMESTAMPTZ NOT NULL,
                created_at      TIMESTAMPTZ DEFAULT NOW(),
                updated_at      TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bank_accounts (
                id                 BIGSERIAL PRIMARY KEY,
                user_id            TEXT NOT NULL,
                powens_account_id  BIGINT NOT NULL,
                name               TEXT NOT NULL,
                bank_name          TEXT,
                balance            DOUBLE PRECISION NOT NULL DEFAULT 0,
                type               TEXT NOT NULL DEFAULT 'checking',
                currency           TEXT NOT NULL DEFAULT 'EUR',
                is_active          BOOLEAN NOT NULL DEFAULT true,
                created_at         TIMESTAMPTZ DEFAULT NOW(),
                updated_at         TIMESTAMPTZ DEFAULT NOW(),
                UNIQUE(user_id, powens_account_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id                     BIGSERIAL PRIMARY KEY,
                user_id                TEXT NOT NULL,
                powens_transaction_id  BIGINT NOT NULL,
                account_id             BIGINT,
                description            TEXT,
                amount                 DOUBLE PRECISION NOT NULL DEFAULT 0,
                date                   DATE,
                category               TEXT,
                type                   TEXT,
                merchant               TEXT,
                created_at             TIMESTAMPTZ DEFAULT NOW(),
                updated_at             TIMESTAMPTZ DEFAULT NOW(),
                UNIQUE(user_id, powens_transaction_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth_states_expiry ON oauth_states(expires_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bank_accounts_user ON bank_accounts(user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, date DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // OAuth states
    // =========================================================================

    /// Persist a freshly generated CSRF state for an authorization attempt.
    pub async fn insert_oauth_state(
        &self,
        state: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BridgeError> {
        sqlx::query("INSERT INTO oauth_states (state, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(state)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Look up a state row bound to the given user. The (state, user_id) pair
    /// is the CSRF check: a state issued for another user does not match.
    pub async fn get_oauth_state(
        &self,
        state: &str,
        user_id: &str,
    ) -> Result<Option<OAuthState>, BridgeError> {
        let row = sqlx::query(
            "SELECT state, user_id, expires_at FROM oauth_states WHERE state = $1 AND user_id = $2",
        )
        .bind(state)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| OAuthState {
            state: r.get(0),
            user_id: r.get(1),
            expires_at: r.get(2),
        }))
    }

    /// Delete a consumed state (single-use guarantee).
    pub async fn delete_oauth_state(&self, state: &str) -> Result<(), BridgeError> {
        sqlx::query("DELETE FROM oauth_states WHERE state = $1")
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete expired state rows. Returns how many were removed.
    pub async fn sweep_expired_states(&self) -> Result<u64, BridgeError> {
        let affected = sqlx::query("DELETE FROM oauth_states WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Upsert the token record for a user after a code exchange.
    pub async fn upsert_token(&self, token: &TokenUpsert) -> Result<(), BridgeError> {
        sqlx::query(
            r#"
            INSERT INTO powens_tokens
                (user_id, powens_user_id, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id)
            DO UPDATE SET
                powens_user_id = COALESCE(EXCLUDED.powens_user_id, powens_tokens.powens_user_id),
                access_token   = EXCLUDED.access_token,
                refresh_token  = EXCLUDED.refresh_token,
                expires_at     = EXCLUDED.expires_at,
                updated_at     = NOW()
            "#,
        )
        .bind(&token.user_id)
        .bind(&token.powens_user_id)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch the token record for a user, if any.
    pub async fn get_token(&self, user_id: &str) -> Result<Option<TokenRecord>, BridgeError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, powens_user_id, access_token, refresh_token, expires_at, updated_at
            FROM powens_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TokenRecord {
            user_id: r.get(0),
            powens_user_id: r.get(1),
            access_token: r.get(2),
            refresh_token: r.get(3),
            expires_at: r.get(4),
            updated_at: r.get(5),
        }))
    }

    /// Overwrite a user's tokens after a successful refresh.
    pub async fn update_refreshed_token(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), BridgeError> {
        sqlx::query(
            r#"
            UPDATE powens_tokens
            SET access_token = $1,
                refresh_token = $2,
                expires_at = $3,
                updated_at = NOW()
            WHERE user_id = $4
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Synced financial records
    // =========================================================================

    /// Upsert a bank account by its remote identifier.
    pub async fn upsert_account(&self, account: &AccountUpsert) -> Result<(), BridgeError> {
        sqlx::query(
            r#"
            INSERT INTO bank_accounts
                (user_id, powens_account_id, name, bank_name, balance, type, currency, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true)
            ON CONFLICT (user_id, powens_account_id)
            DO UPDATE SET
                name       = EXCLUDED.name,
                bank_name  = EXCLUDED.bank_name,
                balance    = EXCLUDED.balance,
                type       = EXCLUDED.type,
                currency   = EXCLUDED.currency,
                is_active  = true,
                updated_at = NOW()
            "#,
        )
        .bind(&account.user_id)
        .bind(account.powens_account_id)
        .bind(&account.name)
        .bind(&account.bank_name)
        .bind(account.balance)
        .bind(&account.kind)
        .bind(&account.currency)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a transaction by its remote identifier.
    pub async fn upsert_transaction(&self, tx: &TransactionUpsert) -> Result<(), BridgeError> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (user_id, powens_transaction_id, account_id, description, amount,
                 date, category, type, merchant)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, powens_transaction_id)
            DO UPDATE SET
                account_id  = EXCLUDED.account_id,
                description = EXCLUDED.description,
                amount      = EXCLUDED.amount,
                date        = EXCLUDED.date,
                category    = EXCLUDED.category,
                type        = EXCLUDED.type,
                merchant    = EXCLUDED.merchant,
                updated_at  = NOW()
            "#,
        )
        .bind(&tx.user_id)
        .bind(tx.powens_transaction_id)
        .bind(tx.account_id)
        .bind(&tx.description)
        .bind(tx.amount)
        .bind(tx.date)
        .bind(&tx.category)
        .bind(&tx.kind)
        .bind(&tx.merchant)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct OAuthState {
    pub state: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct TokenUpsert {
    pub user_id: String,
    pub powens_user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TokenRecord {
    pub user_id: String,
    pub powens_user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// An expired record never yields its stored access token.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct AccountUpsert {
    pub user_id: String,
    pub powens_account_id: i64,
    pub name: String,
    pub bank_name: Option<String>,
    pub balance: f64,
    pub kind: String,
    pub currency: String,
}

#[derive(Debug)]
pub struct TransactionUpsert {
    pub user_id: String,
    pub powens_transaction_id: i64,
    /// Remote id of the account this transaction was fetched under.
    pub account_id: i64,
    pub description: Option<String>,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub kind: Option<String>,
    pub merchant: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_oauth_state_expiry() {
        let now = Utc::now();
        let state = OAuthState {
            state: "abc".into(),
            user_id: "u1".into(),
            expires_at: now + Duration::minutes(10),
        };
        assert!(!state.is_expired(now));
        assert!(state.is_expired(now + Duration::minutes(10)));
        assert!(state.is_expired(now + Duration::minutes(11)));
    }

    #[test]
    fn test_token_record_expiry_boundary() {
        let now = Utc::now();
        let record = TokenRecord {
            user_id: "u1".into(),
            powens_user_id: None,
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: now,
            updated_at: now,
        };
        // now >= expires_at counts as expired
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - Duration::seconds(1)));
    }
}
