use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use common::{
    AccountSnapshot, AccountStore, AccountType, AccountUpdate, BotState, CloseReason,
    Credentials, Error, ExchangeClient, Result, StatusSnapshot,
};
use risk::PositionManager;
use strategy::SignalEngine;

use crate::config::BotConfigFile;
use crate::worker::Worker;

/// Builds the exchange client for an account. Live mode returns a
/// `BinanceClient`; paper mode hands out the simulator.
pub type Connector = Arc<dyn Fn(&Credentials) -> Result<Arc<dyn ExchangeClient>> + Send + Sync>;

/// Successful `start()` result.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub account_id: String,
    /// Free quote-asset balance resolved during the start checks.
    pub balance: f64,
    pub can_trade: bool,
    pub server_time_ms: i64,
}

/// `stop()` result. `was_running == false` means the call was a no-op.
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub account_id: String,
    pub was_running: bool,
    /// Positions closed with `MANUAL_CLOSE`.
    pub closed: usize,
    /// Positions whose closing order failed.
    pub failed: usize,
}

struct ActiveBot {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
    positions: Arc<Mutex<PositionManager>>,
    status: Arc<RwLock<StatusSnapshot>>,
}

enum Slot {
    /// Start checks in flight; the worker does not exist yet.
    Starting,
    Running(ActiveBot),
    Stopping(Arc<RwLock<StatusSnapshot>>),
    /// Idle again. Keeps the final snapshot for `status()`.
    Stopped(StatusSnapshot),
}

/// Account id -> bot slot. Every transition happens under one mutex so
/// concurrent start/stop calls for the same account serialize.
#[derive(Default)]
pub struct BotRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl BotRegistry {
    /// Reserve `account_id` for a start attempt.
    async fn claim(&self, account_id: &str) -> Result<()> {
        let mut slots = self.slots.lock().await;
        match slots.get(account_id) {
            Some(Slot::Running(_)) => Err(Error::InvalidState(format!(
                "bot for account {account_id} is already running"
            ))),
            Some(Slot::Starting) => Err(Error::InvalidState(format!(
                "bot for account {account_id} is already starting"
            ))),
            Some(Slot::Stopping(_)) => Err(Error::InvalidState(format!(
                "bot for account {account_id} is still stopping"
            ))),
            Some(Slot::Stopped(_)) | None => {
                slots.insert(account_id.to_string(), Slot::Starting);
                Ok(())
            }
        }
    }

    async fn activate(&self, account_id: &str, bot: ActiveBot) {
        self.slots
            .lock()
            .await
            .insert(account_id.to_string(), Slot::Running(bot));
    }

    /// Drop a `Starting` reservation after a failed start.
    async fn release(&self, account_id: &str) {
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(account_id), Some(Slot::Starting)) {
            slots.remove(account_id);
        }
    }

    /// Move a running bot to `Stopping` and hand it to the caller.
    /// `None` when there is nothing to stop.
    async fn begin_stop(&self, account_id: &str) -> Result<Option<ActiveBot>> {
        let mut slots = self.slots.lock().await;
        match slots.remove(account_id) {
            Some(Slot::Running(bot)) => {
                bot.status.write().await.state = BotState::Stopping;
                slots.insert(
                    account_id.to_string(),
                    Slot::Stopping(bot.status.clone()),
                );
                Ok(Some(bot))
            }
            Some(Slot::Starting) => {
                slots.insert(account_id.to_string(), Slot::Starting);
                Err(Error::InvalidState(format!(
                    "bot for account {account_id} is still starting"
                )))
            }
            Some(other) => {
                slots.insert(account_id.to_string(), other);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn finish_stop(&self, account_id: &str, last: StatusSnapshot) {
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(account_id), Some(Slot::Stopping(_))) {
            slots.insert(account_id.to_string(), Slot::Stopped(last));
        }
    }

    async fn status(&self, account_id: &str) -> StatusSnapshot {
        let status = match self.slots.lock().await.get(account_id) {
            Some(Slot::Running(bot)) => bot.status.clone(),
            Some(Slot::Stopping(status)) => status.clone(),
            Some(Slot::Stopped(last)) => return last.clone(),
            Some(Slot::Starting) | None => return StatusSnapshot::default(),
        };
        let snapshot = status.read().await.clone();
        snapshot
    }

    async fn running(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Running(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Per-account lifecycle supervisor: `Idle -> Running -> Stopping -> Idle`.
///
/// The only entry point the control API uses. `start` and `stop` run on their
/// own task, so a caller that goes away mid-call (a dropped HTTP request)
/// never leaves a slot stuck in `Starting` or `Stopping`.
pub struct BotController {
    inner: Arc<Supervisor>,
}

struct Supervisor {
    config: BotConfigFile,
    store: Arc<dyn AccountStore>,
    connector: Connector,
    registry: BotRegistry,
}

/// Run a registry transition to completion regardless of the caller.
async fn detached<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|e| Error::Internal(format!("lifecycle task failed: {e}")))?
}

impl BotController {
    pub fn new(config: BotConfigFile, store: Arc<dyn AccountStore>, connector: Connector) -> Self {
        Self {
            inner: Arc::new(Supervisor {
                config,
                store,
                connector,
                registry: BotRegistry::default(),
            }),
        }
    }

    pub fn config(&self) -> &BotConfigFile {
        &self.inner.config
    }

    /// Run the start checks and, if they pass, spawn the account's worker.
    ///
    /// On any failure the registry is left as it was and no worker exists.
    /// Exchange errors are returned with the exchange's message intact.
    /// A start whose caller is dropped still finishes.
    pub async fn start(&self, account_id: &str, credentials: &Credentials) -> Result<StartReport> {
        let inner = self.inner.clone();
        let account_id = account_id.to_string();
        let credentials = credentials.clone();
        detached(async move { inner.start(&account_id, &credentials).await }).await
    }

    /// Cancel the worker, wait up to `stop_grace_secs` for it to finish, then
    /// close every open position with `MANUAL_CLOSE`.
    ///
    /// Stopping an account that is not running is a no-op. Once begun, the
    /// close-out completes even if the caller is dropped.
    pub async fn stop(&self, account_id: &str) -> Result<StopReport> {
        let inner = self.inner.clone();
        let account_id = account_id.to_string();
        detached(async move { inner.stop(&account_id).await }).await
    }

    /// Current view of the account's bot. Never has side effects. After a
    /// stop this is the final snapshot with `state == Idle`.
    pub async fn status(&self, account_id: &str) -> StatusSnapshot {
        self.inner.registry.status(account_id).await
    }

    /// Ids of accounts with a running bot, sorted.
    pub async fn running_accounts(&self) -> Vec<String> {
        self.inner.registry.running().await
    }

    /// Stop every running bot. Used on shutdown.
    pub async fn stop_all(&self) -> Vec<(String, Result<StopReport>)> {
        let mut results = Vec::new();
        for account_id in self.running_accounts().await {
            let result = self.stop(&account_id).await;
            results.push((account_id, result));
        }
        results
    }
}

impl Supervisor {
    async fn start(&self, account_id: &str, credentials: &Credentials) -> Result<StartReport> {
        self.registry.claim(account_id).await?;

        let checked = self.start_checks(credentials).await;
        let (client, snapshot) = match checked {
            Ok(ok) => ok,
            Err(e) => {
                self.registry.release(account_id).await;
                warn!(account = account_id, error = %e, "Bot start refused");
                return Err(e);
            }
        };

        let positions = Arc::new(Mutex::new(PositionManager::new(
            account_id,
            self.config.risk.clone(),
            client.clone(),
            self.store.clone(),
        )));
        let status = Arc::new(RwLock::new(StatusSnapshot {
            state: BotState::Running,
            running: true,
            balance: snapshot.quote_free,
            started_at: Some(Utc::now()),
            ..StatusSnapshot::default()
        }));
        let (cancel, cancel_rx) = watch::channel(false);

        let worker = Worker {
            account_id: account_id.to_string(),
            client,
            store: self.store.clone(),
            settings: self.config.bot.clone(),
            signals: SignalEngine::new(self.config.signal.clone()),
            positions: positions.clone(),
            status: status.clone(),
        };
        let handle = tokio::spawn(worker.run(cancel_rx));

        self.registry
            .activate(
                account_id,
                ActiveBot {
                    cancel,
                    handle,
                    positions,
                    status,
                },
            )
            .await;

        self.mark_running(account_id, true, Some(snapshot.quote_free)).await;
        info!(account = account_id, balance = snapshot.quote_free, "Bot started");

        Ok(StartReport {
            account_id: account_id.to_string(),
            balance: snapshot.quote_free,
            can_trade: snapshot.can_trade,
            server_time_ms: snapshot.server_time_ms,
        })
    }

    /// Connectivity, authentication, `canTrade` and minimum balance, in that order.
    async fn start_checks(
        &self,
        credentials: &Credentials,
    ) -> Result<(Arc<dyn ExchangeClient>, AccountSnapshot)> {
        if credentials.account_type != AccountType::Spot {
            return Err(Error::Policy("only spot accounts are supported".into()));
        }

        let client = (self.connector)(credentials)?;
        client.ping().await?;
        let snapshot = client.account_info().await?;

        if !snapshot.can_trade {
            return Err(Error::Policy(
                "trading is disabled for this account (canTrade=false)".into(),
            ));
        }
        let min = self.config.bot.min_balance;
        if snapshot.quote_free < min {
            return Err(Error::Policy(format!(
                "balance below minimum: {:.2} {} available, {:.2} required",
                snapshot.quote_free, self.config.bot.quote_asset, min
            )));
        }
        Ok((client, snapshot))
    }

    async fn stop(&self, account_id: &str) -> Result<StopReport> {
        let Some(bot) = self.registry.begin_stop(account_id).await? else {
            return Ok(StopReport {
                account_id: account_id.to_string(),
                was_running: false,
                closed: 0,
                failed: 0,
            });
        };

        info!(account = account_id, "Stopping bot");
        // The worker may already be gone; a closed channel is fine.
        let _ = bot.cancel.send(true);

        let grace = Duration::from_secs(self.config.bot.stop_grace_secs);
        match tokio::time::timeout(grace, bot.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(account = account_id, error = %e, "Worker task failed"),
            Err(_) => warn!(
                account = account_id,
                grace_secs = grace.as_secs(),
                "Worker did not stop within grace period, closing positions anyway"
            ),
        }

        let (report, open_positions, trade_count) = {
            let mut positions = bot.positions.lock().await;
            let report = positions.close_all(CloseReason::ManualClose).await;
            (report, positions.open_count(), positions.closed_count())
        };
        if report.failed > 0 {
            warn!(
                account = account_id,
                failed = report.failed,
                "Some positions could not be closed and remain on the exchange"
            );
        }

        let last = {
            let mut status = bot.status.write().await;
            status.state = BotState::Idle;
            status.running = false;
            status.open_positions = open_positions;
            status.trade_count = trade_count;
            status.clone()
        };
        self.registry.finish_stop(account_id, last).await;
        self.mark_running(account_id, false, None).await;
        info!(account = account_id, closed = report.closed.len(), "Bot stopped");

        Ok(StopReport {
            account_id: account_id.to_string(),
            was_running: true,
            closed: report.closed.len(),
            failed: report.failed,
        })
    }

    async fn mark_running(&self, account_id: &str, running: bool, balance: Option<f64>) {
        let update = AccountUpdate {
            balance,
            bot_running: Some(running),
            ..AccountUpdate::default()
        };
        if let Err(e) = self.store.update_account(account_id, update).await {
            warn!(account = account_id, error = %e, "Failed to persist bot state");
        }
    }
}
