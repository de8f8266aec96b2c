use crate::RiskConfig;

/// Largest number of decimals any quantity is rounded to.
const MAX_DECIMALS: i32 = 8;

/// Quantity precision for an asset trading at `price`: one more decimal per
/// order of magnitude, so a step is worth roughly the same in quote terms
/// (BTC ~60k -> 5, ETH ~3k -> 4, BNB ~600 -> 3, sub-dollar coins -> 0).
pub fn quantity_decimals(price: f64) -> u32 {
    if !price.is_finite() || price <= 0.0 {
        return MAX_DECIMALS as u32;
    }
    (price.log10().ceil() as i32).clamp(0, MAX_DECIMALS) as u32
}

/// Round `quantity` down to `decimals` places.
pub fn floor_to(quantity: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    // Nudge up by a tiny epsilon so 2.0 stored as 1.9999999 doesn't floor to 1.99
    ((quantity * factor) + 1e-9).floor() / factor
}

/// Risk-based position size, floored to the asset's precision:
/// `(balance * risk_per_trade) / (entry * stop_loss_pct)`, capped so the
/// notional never exceeds the free balance.
///
/// Returns 0.0 for any input that cannot produce a valid order.
pub fn position_size(balance: f64, entry_price: f64, config: &RiskConfig) -> f64 {
    if !(balance > 0.0 && entry_price > 0.0 && config.stop_loss_pct > 0.0) {
        return 0.0;
    }

    let risk_amount = balance * config.risk_per_trade;
    let raw = risk_amount / (entry_price * config.stop_loss_pct);
    let affordable = balance / entry_price;
    let quantity = raw.min(affordable);

    if !quantity.is_finite() {
        return 0.0;
    }
    floor_to(quantity, quantity_decimals(entry_price))
}
