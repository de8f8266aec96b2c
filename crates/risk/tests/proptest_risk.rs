use proptest::prelude::*;
use risk::{position_size, quantity_decimals, RiskConfig};

proptest! {
    /// Sizing on arbitrary balances and prices must never panic and never
    /// produce a negative, non-finite, or unaffordable quantity.
    #[test]
    fn position_size_is_finite_and_affordable(
        balance in 0.0f64..10_000_000.0f64,
        entry_price in 0.000_001f64..1_000_000.0f64,
        risk_per_trade in 0.001f64..1.0f64,
        stop_loss_pct in 0.001f64..0.5f64,
    ) {
        let config = RiskConfig {
            risk_per_trade,
            stop_loss_pct,
            ..RiskConfig::default()
        };
        let qty = position_size(balance, entry_price, &config);

        prop_assert!(qty.is_finite());
        prop_assert!(qty >= 0.0);
        prop_assert!(
            qty * entry_price <= balance * (1.0 + 1e-9) + 1e-6,
            "notional {} exceeds balance {}", qty * entry_price, balance
        );
    }

    /// Quantities carry no more decimals than the price magnitude allows.
    #[test]
    fn position_size_respects_precision(
        balance in 10.0f64..1_000_000.0f64,
        entry_price in 0.01f64..100_000.0f64,
    ) {
        let qty = position_size(balance, entry_price, &RiskConfig::default());
        let factor = 10f64.powi(quantity_decimals(entry_price) as i32);
        let scaled = qty * factor;
        prop_assert!((scaled - scaled.round()).abs() < 1e-6, "qty {} not floored", qty);
    }

    /// Brackets always straddle the entry: stop_loss < entry < take_profit.
    #[test]
    fn brackets_straddle_entry(
        entry_price in 0.000_001f64..1_000_000.0f64,
        stop_loss_pct in 0.001f64..0.99f64,
        take_profit_pct in 0.001f64..5.0f64,
    ) {
        let config = RiskConfig {
            stop_loss_pct,
            take_profit_pct,
            ..RiskConfig::default()
        };
        prop_assert!(config.stop_loss_price(entry_price) < entry_price);
        prop_assert!(config.take_profit_price(entry_price) > entry_price);
    }

    #[test]
    fn invalid_inputs_size_to_zero(
        balance in -1_000.0f64..=0.0f64,
        entry_price in -1_000.0f64..1_000.0f64,
    ) {
        prop_assert_eq!(position_size(balance, entry_price, &RiskConfig::default()), 0.0);
    }
}
