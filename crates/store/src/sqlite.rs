use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use common::{AccountStore, AccountUpdate, Credentials, Error, Result, TradeRecord};

use crate::{new_trade_id, AccountState};

fn db_err(e: sqlx::Error) -> Error {
    Error::Internal(format!("database: {e}"))
}

/// SQLite-backed `AccountStore`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true);
        // An in-memory database exists per connection; keep it to one.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Internal(format!("migration: {e}")))?;

        info!(url, "Database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace an account's credentials.
    pub async fn add_account(
        &self,
        account_id: &str,
        username: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO accounts (id, username, api_key, api_secret, network, account_type, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                api_key = excluded.api_key,
                api_secret = excluded.api_secret,
                network = excluded.network,
                account_type = excluded.account_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account_id)
        .bind(username)
        .bind(&credentials.api_key)
        .bind(&credentials.api_secret)
        .bind(credentials.network.to_string())
        .bind(credentials.account_type.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn account_state(&self, account_id: &str) -> Result<Option<AccountState>> {
        let row = sqlx::query(
            "SELECT balance, bot_running, last_cycle_at FROM accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let last_cycle_at: Option<String> = row.try_get("last_cycle_at").map_err(db_err)?;
        Ok(Some(AccountState {
            balance: row.try_get("balance").map_err(db_err)?,
            bot_running: row.try_get("bot_running").map_err(db_err)?,
            last_cycle_at: last_cycle_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc)),
        }))
    }

    /// The most recent `limit` trades of an account, oldest first.
    pub async fn trades(&self, account_id: &str, limit: i64) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"SELECT payload FROM trades WHERE account_id = ?1
               ORDER BY rowid DESC LIMIT ?2"#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut trades = rows
            .iter()
            .map(|row| {
                let payload: String = row.try_get("payload").map_err(db_err)?;
                Ok(serde_json::from_str(&payload)?)
            })
            .collect::<Result<Vec<TradeRecord>>>()?;
        trades.reverse();
        Ok(trades)
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn get_account(&self, account_id: &str) -> Result<Option<Credentials>> {
        let row = sqlx::query(
            "SELECT api_key, api_secret, network, account_type FROM accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let network: String = row.try_get("network").map_err(db_err)?;
        let account_type: String = row.try_get("account_type").map_err(db_err)?;

        Ok(Some(Credentials {
            api_key: row.try_get("api_key").map_err(db_err)?,
            api_secret: row.try_get("api_secret").map_err(db_err)?,
            network: network.parse().map_err(Error::Internal)?,
            account_type: account_type.parse().map_err(Error::Internal)?,
        }))
    }

    async fn record_trade(&self, account_id: &str, trade: &TradeRecord) -> Result<String> {
        let id = new_trade_id();
        let payload = serde_json::to_string(trade)?;

        sqlx::query(
            r#"
            INSERT INTO trades (id, account_id, kind, position_id, symbol, pnl, close_reason, recorded_at, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&id)
        .bind(account_id)
        .bind(trade.kind.to_string())
        .bind(&trade.position_id)
        .bind(&trade.symbol)
        .bind(trade.pnl)
        .bind(trade.close_reason.map(|r| r.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(account = account_id, trade_id = %id, kind = %trade.kind, "Trade recorded");
        Ok(id)
    }

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                balance = COALESCE(?1, balance),
                bot_running = COALESCE(?2, bot_running),
                last_cycle_at = COALESCE(?3, last_cycle_at),
                updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(update.balance)
        .bind(update.bot_running)
        .bind(update.last_cycle_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::Internal(format!("unknown account '{account_id}'")));
        }
        Ok(())
    }
}
