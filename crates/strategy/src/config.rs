use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Tunable parameters of the signal scorer.
///
/// Example `[signal]` section of `config/bot.toml`:
/// ```toml
/// [signal]
/// short_period = 20
/// long_period = 50
/// rsi_period = 14
/// change_lookback = 5
/// min_candles = 20
/// confidence_threshold = 70.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Short simple moving average window.
    pub short_period: usize,
    /// Long simple moving average window.
    pub long_period: usize,
    pub rsi_period: usize,
    /// Number of candles the short-term price change is measured over.
    pub change_lookback: usize,
    /// Below this many candles a symbol is always HOLD with score 0.
    pub min_candles: usize,
    /// Minimum score for a BUY decision.
    pub confidence_threshold: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            short_period: 20,
            long_period: 50,
            rsi_period: 14,
            change_lookback: 5,
            min_candles: 20,
            confidence_threshold: 70.0,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.short_period == 0 || self.short_period >= self.long_period {
            return Err(Error::Config(format!(
                "signal.short_period ({}) must be positive and below long_period ({})",
                self.short_period, self.long_period
            )));
        }
        if self.min_candles < self.rsi_period + 1 || self.min_candles <= self.change_lookback {
            return Err(Error::Config(format!(
                "signal.min_candles ({}) must cover rsi_period + 1 and change_lookback",
                self.min_candles
            )));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "signal.confidence_threshold ({}) must be within [0, 100]",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SignalConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let cfg: SignalConfig = toml::from_str("confidence_threshold = 60.0").unwrap();
        assert_eq!(cfg.confidence_threshold, 60.0);
        assert_eq!(cfg.short_period, 20);
        assert_eq!(cfg.long_period, 50);
    }

    #[test]
    fn min_candles_must_cover_rsi() {
        let cfg = SignalConfig {
            min_candles: 10,
            ..SignalConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
