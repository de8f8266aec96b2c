use proptest::prelude::*;

use common::{Candle, Decision};
use strategy::{SignalConfig, SignalEngine};

fn candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time_ms: i as i64,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
            close_time_ms: i as i64,
        })
        .collect()
}

proptest! {
    /// Any candle series yields a score within [0, 100].
    #[test]
    fn score_is_always_bounded(
        closes in prop::collection::vec(0.0001f64..1_000_000.0f64, 0..120),
    ) {
        let engine = SignalEngine::new(SignalConfig::default());
        let signal = engine.analyze("TESTUSDT", &candles(&closes));
        prop_assert!((0.0..=100.0).contains(&signal.score));
        if closes.len() < 20 {
            prop_assert_eq!(signal.score, 0.0);
            prop_assert_eq!(signal.decision, Decision::Hold);
        }
    }

    /// The decision is exactly the threshold comparison on the score.
    #[test]
    fn decision_matches_threshold(
        closes in prop::collection::vec(1.0f64..10_000.0f64, 20..80),
        threshold in 0.0f64..100.0f64,
    ) {
        let engine = SignalEngine::new(SignalConfig {
            confidence_threshold: threshold,
            ..SignalConfig::default()
        });
        let signal = engine.analyze("TESTUSDT", &candles(&closes));
        prop_assert_eq!(signal.is_buy(), signal.score >= threshold);
    }
}
