pub mod config;
pub mod error;
pub mod exchange;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{ExchangeClient, OrderAck, OrderRequest};
pub use store::{AccountStore, AccountUpdate};
pub use types::*;
