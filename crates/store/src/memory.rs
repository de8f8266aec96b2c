use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use common::{AccountStore, AccountUpdate, Credentials, Error, Result, TradeRecord};

use crate::{new_trade_id, AccountState};

#[derive(Debug, Clone)]
struct MemoryAccount {
    credentials: Credentials,
    state: AccountState,
}

/// In-process `AccountStore`. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, MemoryAccount>>,
    trades: RwLock<HashMap<String, Vec<(String, TradeRecord)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_account(&self, account_id: &str, credentials: Credentials) {
        self.accounts.write().await.insert(
            account_id.to_string(),
            MemoryAccount {
                credentials,
                state: AccountState::default(),
            },
        );
    }

    pub async fn account_state(&self, account_id: &str) -> Option<AccountState> {
        self.accounts
            .read()
            .await
            .get(account_id)
            .map(|a| a.state.clone())
    }

    /// Trades recorded for an account, oldest first.
    pub async fn trades(&self, account_id: &str) -> Vec<TradeRecord> {
        self.trades
            .read()
            .await
            .get(account_id)
            .map(|t| t.iter().map(|(_, record)| record.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account(&self, account_id: &str) -> Result<Option<Credentials>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(account_id)
            .map(|a| a.credentials.clone()))
    }

    async fn record_trade(&self, account_id: &str, trade: &TradeRecord) -> Result<String> {
        let id = new_trade_id();
        self.trades
            .write()
            .await
            .entry(account_id.to_string())
            .or_default()
            .push((id.clone(), trade.clone()));
        Ok(id)
    }

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| Error::Internal(format!("unknown account '{account_id}'")))?;

        if let Some(balance) = update.balance {
            account.state.balance = balance;
        }
        if let Some(running) = update.bot_running {
            account.state.bot_running = running;
        }
        if let Some(at) = update.last_cycle_at {
            account.state.last_cycle_at = Some(at);
        }
        Ok(())
    }
}
