use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use common::{AccountSnapshot, AccountStore, AccountUpdate, ExchangeClient, Signal, StatusSnapshot};
use risk::PositionManager;
use strategy::SignalEngine;

use crate::config::BotSettings;

/// Everything one account's polling loop needs. Owned by the spawned task.
pub(crate) struct Worker {
    pub account_id: String,
    pub client: Arc<dyn ExchangeClient>,
    pub store: Arc<dyn AccountStore>,
    pub settings: BotSettings,
    pub signals: SignalEngine,
    pub positions: Arc<Mutex<PositionManager>>,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl Worker {
    /// Poll-and-act until `cancel` flips to true or its sender goes away.
    /// Call from `tokio::spawn`.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.settings.poll_interval_secs);
        info!(
            account = %self.account_id,
            symbols = ?self.settings.symbols,
            interval_secs = self.settings.poll_interval_secs,
            "Worker started"
        );

        loop {
            if *cancel.borrow() {
                break;
            }
            self.run_cycle(&cancel).await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(account = %self.account_id, "Worker stopped");
    }

    /// One cycle: refresh balance, monitor positions, scan for entries.
    pub async fn run_cycle(&self, cancel: &watch::Receiver<bool>) {
        let snapshot = self.refresh_balance().await;

        let closed = self.positions.lock().await.monitor().await;
        if !closed.is_empty() {
            info!(account = %self.account_id, closed = closed.len(), "Positions closed this cycle");
        }

        match &snapshot {
            Some(snapshot) if !snapshot.can_trade => {
                warn!(account = %self.account_id, "Trading disabled on account, skipping scan");
            }
            Some(snapshot) => self.scan_and_open(snapshot.quote_free, cancel).await,
            None => {}
        }

        self.publish_status().await;
    }

    async fn refresh_balance(&self) -> Option<AccountSnapshot> {
        let snapshot = match self.client.account_info().await {
            Ok(s) => s,
            Err(e) => {
                warn!(account = %self.account_id, error = %e, "Balance refresh failed");
                return None;
            }
        };

        self.status.write().await.balance = snapshot.quote_free;
        let update = AccountUpdate {
            balance: Some(snapshot.quote_free),
            last_cycle_at: Some(Utc::now()),
            ..AccountUpdate::default()
        };
        if let Err(e) = self.store.update_account(&self.account_id, update).await {
            warn!(account = %self.account_id, error = %e, "Failed to persist balance");
        }
        Some(snapshot)
    }

    async fn scan_and_open(&self, mut balance: f64, cancel: &watch::Receiver<bool>) {
        if !self.positions.lock().await.has_capacity() {
            return;
        }

        for signal in rank_buys(self.scan().await) {
            let mut positions = self.positions.lock().await;
            // Checked under the lock so nothing opens after stop() has closed out.
            if *cancel.borrow() || !positions.has_capacity() {
                break;
            }
            if positions.holds(&signal.symbol) {
                continue;
            }

            match positions.open(&signal.symbol, &signal, balance).await {
                Ok(position) => balance -= position.entry_price * position.quantity,
                Err(e) => warn!(
                    account = %self.account_id,
                    symbol = %signal.symbol,
                    score = signal.score,
                    error = %e,
                    "Open attempt failed"
                ),
            }
        }
    }

    async fn scan(&self) -> Vec<Signal> {
        let mut signals = Vec::with_capacity(self.settings.symbols.len());
        for symbol in &self.settings.symbols {
            match self
                .client
                .klines(symbol, &self.settings.interval, self.settings.kline_limit)
                .await
            {
                Ok(candles) => {
                    let signal = self.signals.analyze(symbol, &candles);
                    debug!(
                        account = %self.account_id,
                        symbol = %symbol,
                        score = signal.score,
                        decision = ?signal.decision,
                        "Signal"
                    );
                    signals.push(signal);
                }
                Err(e) => warn!(
                    account = %self.account_id,
                    symbol = %symbol,
                    error = %e,
                    "Candle fetch failed, skipping symbol"
                ),
            }
        }
        signals
    }

    async fn publish_status(&self) {
        let (open_positions, trade_count) = {
            let positions = self.positions.lock().await;
            (positions.open_count(), positions.closed_count())
        };
        let mut status = self.status.write().await;
        status.open_positions = open_positions;
        status.trade_count = trade_count;
        status.last_cycle_at = Some(Utc::now());
    }
}

/// BUY signals by descending score. The sort is stable, so equal scores keep
/// the configured symbol order.
fn rank_buys(signals: Vec<Signal>) -> Vec<Signal> {
    let mut buys: Vec<Signal> = signals.into_iter().filter(Signal::is_buy).collect();
    buys.sort_by(|a, b| b.score.total_cmp(&a.score));
    buys
}
