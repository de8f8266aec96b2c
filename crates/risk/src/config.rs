use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// User-configurable risk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of the free balance put at risk per trade (e.g. 0.01 = 1%).
    pub risk_per_trade: f64,
    /// Stop distance below entry (e.g. 0.02 = 2%).
    pub stop_loss_pct: f64,
    /// Target distance above entry (e.g. 0.04 = 4%).
    pub take_profit_pct: f64,
    /// Maximum simultaneously open positions per account.
    pub max_positions: usize,
    /// Positions held longer than this are closed with `TIME_LIMIT`.
    pub max_hold_secs: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            max_positions: 1,
            max_hold_secs: 24 * 60 * 60,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade <= 1.0) {
            return Err(Error::Config(format!(
                "risk.risk_per_trade ({}) must be within (0, 1]",
                self.risk_per_trade
            )));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(Error::Config(format!(
                "risk.stop_loss_pct ({}) must be within (0, 1)",
                self.stop_loss_pct
            )));
        }
        if self.take_profit_pct <= 0.0 {
            return Err(Error::Config(format!(
                "risk.take_profit_pct ({}) must be positive",
                self.take_profit_pct
            )));
        }
        if self.max_positions == 0 {
            return Err(Error::Config("risk.max_positions must be at least 1".into()));
        }
        Ok(())
    }

    pub fn stop_loss_price(&self, entry: f64) -> f64 {
        entry * (1.0 - self.stop_loss_pct)
    }

    pub fn take_profit_price(&self, entry: f64) -> f64 {
        entry * (1.0 + self.take_profit_pct)
    }
}
