pub mod broker;

pub use broker::{AuthorizationRequest, TokenBroker};
