pub mod client;
pub mod types;

pub use client::{PowensClient, TransactionQuery};
pub use types::{
    AccountsResponse, RemoteAccount, RemoteTransaction, TokenResponse, TransactionsResponse,
};
