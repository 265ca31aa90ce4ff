pub mod db;
pub mod sweeper;

pub use db::{
    AccountUpsert, OAuthState, Store, TokenRecord, TokenUpsert, TransactionUpsert,
};
pub use sweeper::state_sweeper;
