use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Credentials, Result, TradeRecord};

/// Partial update of an account's bookkeeping fields. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub balance: Option<f64>,
    pub bot_running: Option<bool>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Durable account and trade store consumed by the bot core.
///
/// Persistence and locking are the implementation's concern; the core only
/// requires that writes are eventually durable.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<Option<Credentials>>;

    /// Append a trade record and return its generated id.
    async fn record_trade(&self, account_id: &str, trade: &TradeRecord) -> Result<String>;

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<()>;
}
