pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Bookkeeping fields kept next to an account's credentials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountState {
    pub balance: f64,
    pub bot_running: bool,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Generated identifier for a stored trade.
fn new_trade_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
