use tracing::debug;

use common::{Candle, Decision, Indicators, Signal};

use crate::config::SignalConfig;
use crate::indicators::{percent_change, sma, RsiIndicator};

const TREND_POINTS: f64 = 40.0;
const RSI_APPROACHING_OVERSOLD_POINTS: f64 = 30.0;
const RSI_NEUTRAL_POINTS: f64 = 20.0;
const RSI_EXTREME_PENALTY: f64 = -10.0;
const MOMENTUM_POINTS: f64 = 20.0;

/// Momentum band (percent, exclusive) rewarded by the scorer.
const MOMENTUM_BAND: (f64, f64) = (2.0, 10.0);

/// Scores a symbol's candle history into a BUY/HOLD signal.
///
/// The score is additive over three independent rules (trend alignment,
/// RSI band, short-term momentum) and clamped to [0, 100].
#[derive(Debug, Clone)]
pub struct SignalEngine {
    config: SignalConfig,
    rsi: RsiIndicator,
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> Self {
        let rsi = RsiIndicator::new(config.rsi_period);
        Self { config, rsi }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn analyze(&self, symbol: &str, candles: &[Candle]) -> Signal {
        if candles.len() < self.config.min_candles {
            debug!(symbol, candles = candles.len(), "Not enough history to score");
            return Signal::hold(symbol);
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let price = closes[closes.len() - 1];

        let (Some(sma_short), Some(sma_long), Some(rsi)) = (
            sma(&closes, self.config.short_period),
            sma(&closes, self.config.long_period),
            self.rsi.compute(&closes),
        ) else {
            return Signal::hold(symbol);
        };
        let change_pct = percent_change(&closes, self.config.change_lookback).unwrap_or(0.0);

        let indicators = Indicators {
            price,
            sma_short,
            sma_long,
            rsi,
            change_pct,
        };
        let score = score(&indicators);
        let decision = if score >= self.config.confidence_threshold {
            Decision::Buy
        } else {
            Decision::Hold
        };

        debug!(
            symbol,
            score,
            %decision,
            price,
            sma_short,
            sma_long,
            rsi,
            change_pct,
            "Signal scored"
        );

        Signal {
            symbol: symbol.to_string(),
            score,
            decision,
            indicators,
        }
    }
}

/// Additive, order-independent score clamped to [0, 100].
pub fn score(ind: &Indicators) -> f64 {
    let mut score = 0.0;

    if ind.price > ind.sma_short && ind.sma_short > ind.sma_long {
        score += TREND_POINTS;
    }

    score += rsi_points(ind.rsi);

    if ind.change_pct > MOMENTUM_BAND.0 && ind.change_pct < MOMENTUM_BAND.1 {
        score += MOMENTUM_POINTS;
    }

    score.clamp(0.0, 100.0)
}

fn rsi_points(rsi: f64) -> f64 {
    if (30.0..40.0).contains(&rsi) {
        RSI_APPROACHING_OVERSOLD_POINTS
    } else if (40.0..=70.0).contains(&rsi) {
        RSI_NEUTRAL_POINTS
    } else {
        RSI_EXTREME_PENALTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time_ms: i as i64 * 60_000,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                close_time_ms: i as i64 * 60_000 + 59_999,
            })
            .collect()
    }

    fn indicators(price: f64, sma_short: f64, sma_long: f64, rsi: f64, change_pct: f64) -> Indicators {
        Indicators {
            price,
            sma_short,
            sma_long,
            rsi,
            change_pct,
        }
    }

    #[test]
    fn fewer_than_min_candles_is_zero_hold() {
        let engine = SignalEngine::new(SignalConfig::default());
        let closes: Vec<f64> = (0..19).map(|i| 100.0 + i as f64).collect();
        let signal = engine.analyze("BTCUSDT", &candles_from(&closes));
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.decision, Decision::Hold);
    }

    #[test]
    fn full_alignment_scores_ninety() {
        assert_eq!(score(&indicators(110.0, 105.0, 100.0, 35.0, 5.0)), 90.0);
    }

    #[test]
    fn neutral_rsi_with_trend_and_momentum_scores_eighty() {
        assert_eq!(score(&indicators(110.0, 105.0, 100.0, 55.0, 3.0)), 80.0);
    }

    #[test]
    fn extreme_rsi_alone_clamps_to_zero() {
        assert_eq!(score(&indicators(90.0, 95.0, 100.0, 85.0, 0.0)), 0.0);
    }

    #[test]
    fn momentum_band_is_exclusive() {
        let base = |change| score(&indicators(90.0, 95.0, 100.0, 55.0, change));
        assert_eq!(base(2.0), 20.0);
        assert_eq!(base(10.0), 20.0);
        assert_eq!(base(2.5), 40.0);
    }

    #[test]
    fn trend_requires_ascending_order() {
        // price above both averages but short below long: no trend points
        assert_eq!(score(&indicators(110.0, 100.0, 105.0, 55.0, 0.0)), 20.0);
    }

    #[test]
    fn rsi_band_edges() {
        assert_eq!(rsi_points(30.0), 30.0);
        assert_eq!(rsi_points(40.0), 20.0);
        assert_eq!(rsi_points(70.0), 20.0);
        assert_eq!(rsi_points(70.1), -10.0);
        assert_eq!(rsi_points(29.9), -10.0);
    }

    #[test]
    fn steady_uptrend_is_held_for_overbought_rsi() {
        // Monotonic rise: trend +40, RSI 100 -> -10, change ~ 2.9% -> +20
        let engine = SignalEngine::new(SignalConfig::default());
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let signal = engine.analyze("ETHUSDT", &candles_from(&closes));
        assert_eq!(signal.indicators.rsi, 100.0);
        assert_eq!(signal.score, 50.0);
        assert_eq!(signal.decision, Decision::Hold);
    }

    #[test]
    fn pullback_in_uptrend_is_a_buy() {
        // Long rise, then alternating gains/losses keep RSI neutral while
        // the last five candles climb 4%.
        let mut closes: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let tail = [150.0, 148.0, 151.0, 149.0, 152.0, 150.0, 153.0, 151.0, 154.0, 152.0, 156.0];
        closes.extend_from_slice(&tail);
        let engine = SignalEngine::new(SignalConfig::default());
        let signal = engine.analyze("BNBUSDT", &candles_from(&closes));
        assert!(signal.indicators.price > signal.indicators.sma_short);
        assert!(signal.indicators.sma_short > signal.indicators.sma_long);
        assert!((40.0..=70.0).contains(&signal.indicators.rsi), "rsi {}", signal.indicators.rsi);
        assert!(signal.indicators.change_pct > 2.0 && signal.indicators.change_pct < 10.0);
        assert_eq!(signal.score, 80.0);
        assert!(signal.is_buy());
    }

    #[test]
    fn threshold_is_configurable() {
        let engine = SignalEngine::new(SignalConfig {
            confidence_threshold: 50.0,
            ..SignalConfig::default()
        });
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let signal = engine.analyze("ETHUSDT", &candles_from(&closes));
        assert_eq!(signal.decision, Decision::Buy);
    }
}
