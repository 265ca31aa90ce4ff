//! Reconciliation of remote Powens data into local storage.
//!
//! Pulls the full account list, then a bounded page of transactions per
//! account, upserting everything by its natural remote identifier. Running a
//! sync twice against unchanged remote data changes nothing but `updated_at`.
//!
//! Fail-fast: the first fetch or store error aborts the whole sync and
//! propagates. There is no per-account continuation, retry, or backoff; syncs
//! are request-scoped and the caller decides whether to rerun them.

use tracing::info;

use crate::error::BridgeError;
use crate::powens::types::{RemoteAccount, RemoteTransaction};
use crate::powens::{PowensClient, TransactionQuery};
use crate::store::{AccountUpsert, Store, TransactionUpsert};

/// Transactions fetched per account on each sync.
const TRANSACTION_PAGE_SIZE: u32 = 100;

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub accounts: usize,
    pub transactions: usize,
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Store,
    powens: PowensClient,
}

impl SyncEngine {
    pub fn new(store: Store, powens: PowensClient) -> Self {
        Self { store, powens }
    }

    /// Pull accounts and transactions for a user and reconcile them into the
    /// store.
    pub async fn sync_user(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<SyncSummary, BridgeError> {
        let mut summary = SyncSummary::default();

        let accounts = self.powens.accounts(access_token).await?.accounts;

        for account in &accounts {
            self.store.upsert_account(&map_account(user_id, account)).await?;
            summary.accounts += 1;

            let transactions = self
                .powens
                .account_transactions(
                    access_token,
                    account.id,
                    &TransactionQuery::limit(TRANSACTION_PAGE_SIZE),
                )
                .await?
                .transactions;

            for tx in &transactions {
                self.store
                    .upsert_transaction(&map_transaction(user_id, account.id, tx))
                    .await?;
                summary.transactions += 1;
            }
        }

        info!(
            "Synced {} accounts and {} transactions for user {user_id}",
            summary.accounts, summary.transactions
        );

        Ok(summary)
    }
}

/// Map a remote account to its local upsert row, applying the defaults the
/// aggregator leaves blank.
fn map_account(user_id: &str, account: &RemoteAccount) -> AccountUpsert {
    let name = account
        .name
        .clone()
        .or_else(|| account.label.clone())
        .unwrap_or_else(|| "Compte".into());

    AccountUpsert {
        user_id: user_id.into(),
        powens_account_id: account.id,
        name,
        bank_name: account.bank_name.clone(),
        balance: account.balance.unwrap_or(0.0),
        kind: account.kind.clone().unwrap_or_else(|| "checking".into()),
        currency: account
            .currency
            .as_ref()
            .and_then(|c| c.code.clone())
            .unwrap_or_else(|| "EUR".into()),
    }
}

/// Map a remote transaction, linking it to the remote id of the account it
/// was fetched under.
fn map_transaction(user_id: &str, account_id: i64, tx: &RemoteTransaction) -> TransactionUpsert {
    TransactionUpsert {
        user_id: user_id.into(),
        powens_transaction_id: tx.id,
        account_id,
        description: tx.wording.clone().or_else(|| tx.original_wording.clone()),
        amount: tx.value.unwrap_or(0.0),
        date: tx.date,
        category: tx.category.as_ref().and_then(|c| c.name.clone()),
        kind: tx.kind.clone(),
        merchant: tx.simplified_wording.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::powens::types::{RemoteCategory, RemoteCurrency};

    fn remote_account(id: i64) -> RemoteAccount {
        RemoteAccount {
            id,
            name: None,
            label: None,
            bank_name: None,
            balance: None,
            kind: None,
            currency: None,
        }
    }

    #[test]
    fn test_account_mapping_defaults() {
        let mapped = map_account("u1", &remote_account(101));
        assert_eq!(mapped.user_id, "u1");
        assert_eq!(mapped.powens_account_id, 101);
        assert_eq!(mapped.name, "Compte");
        assert_eq!(mapped.balance, 0.0);
        assert_eq!(mapped.kind, "checking");
        assert_eq!(mapped.currency, "EUR");
    }

    #[test]
    fn test_account_name_falls_back_to_label() {
        let mut account = remote_account(101);
        account.label = Some("Livret A".into());
        assert_eq!(map_account("u1", &account).name, "Livret A");

        account.name = Some("Compte courant".into());
        assert_eq!(map_account("u1", &account).name, "Compte courant");
    }

    #[test]
    fn test_account_currency_code_extracted() {
        let mut account = remote_account(101);
        account.currency = Some(RemoteCurrency {
            code: Some("USD".into()),
        });
        assert_eq!(map_account("u1", &account).currency, "USD");

        account.currency = Some(RemoteCurrency { code: None });
        assert_eq!(map_account("u1", &account).currency, "EUR");
    }

    #[test]
    fn test_transaction_mapping_links_parent_account() {
        let tx = RemoteTransaction {
            id: 9001,
            wording: Some("CB CARREFOUR".into()),
            original_wording: Some("CB CARREFOUR 15/03".into()),
            simplified_wording: Some("Carrefour".into()),
            value: Some(-34.90),
            date: Some("2024-03-15".parse().unwrap()),
            category: Some(RemoteCategory {
                name: Some("Groceries".into()),
            }),
            kind: Some("card".into()),
        };

        let mapped = map_transaction("u1", 101, &tx);
        assert_eq!(mapped.account_id, 101);
        assert_eq!(mapped.powens_transaction_id, 9001);
        assert_eq!(mapped.description.as_deref(), Some("CB CARREFOUR"));
        assert_eq!(mapped.merchant.as_deref(), Some("Carrefour"));
        assert_eq!(mapped.category.as_deref(), Some("Groceries"));
        assert_eq!(mapped.amount, -34.90);
    }

    #[test]
    fn test_transaction_description_falls_back_to_original_wording() {
        let tx = RemoteTransaction {
            id: 9002,
            wording: None,
            original_wording: Some("VIR SEPA SALAIRE".into()),
            simplified_wording: None,
            value: Some(2500.0),
            date: None,
            category: None,
            kind: None,
        };
        let mapped = map_transaction("u1", 101, &tx);
        assert_eq!(mapped.description.as_deref(), Some("VIR SEPA SALAIRE"));
        assert!(mapped.date.is_none());
    }
}
