use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use common::{Error, Result};
use risk::RiskConfig;
use strategy::SignalConfig;

/// Contents of the bot configuration file (`config/bot.toml` by default).
/// Every section and field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfigFile {
    pub bot: BotSettings,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
}

/// Polling loop and start-check parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Symbols scanned each cycle, in tie-break order.
    pub symbols: Vec<String>,
    /// Candle interval requested from the exchange, e.g. "1h".
    pub interval: String,
    pub kline_limit: u32,
    pub poll_interval_secs: u64,
    /// `start()` refuses accounts with less free quote balance than this.
    pub min_balance: f64,
    pub quote_asset: String,
    /// How long `stop()` waits for the worker before closing positions anyway.
    pub stop_grace_secs: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".into(), "ETHUSDT".into(), "BNBUSDT".into()],
            interval: "1h".into(),
            kline_limit: 100,
            poll_interval_secs: 60,
            min_balance: 10.0,
            quote_asset: "USDT".into(),
            stop_grace_secs: 30,
        }
    }
}

impl BotSettings {
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(Error::Config("bot.symbols must not be empty".into()));
        }
        if self.kline_limit == 0 || self.kline_limit > 1000 {
            return Err(Error::Config(format!(
                "bot.kline_limit ({}) must be within 1..=1000",
                self.kline_limit
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("bot.poll_interval_secs must be positive".into()));
        }
        if self.min_balance < 0.0 {
            return Err(Error::Config("bot.min_balance must not be negative".into()));
        }
        Ok(())
    }
}

impl BotConfigFile {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid bot config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    /// Like [`BotConfigFile::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Bot config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        self.bot.validate()?;
        self.signal.validate()?;
        self.risk.validate()?;
        if self.signal.min_candles > self.bot.kline_limit as usize {
            return Err(Error::Config(format!(
                "bot.kline_limit ({}) is below signal.min_candles ({})",
                self.bot.kline_limit, self.signal.min_candles
            )));
        }
        Ok(())
    }
}
