/// Simple moving average of the trailing `period` values.
///
/// With fewer than `period` values the average is taken over everything
/// available, so a short history still yields a usable baseline.
/// Returns `None` only for an empty slice or a zero period.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.is_empty() || period == 0 {
        return None;
    }
    let window = period.min(closes.len());
    let sum: f64 = closes[closes.len() - window..].iter().sum();
    Some(sum / window as f64)
}

/// Percentage change between the latest close and the close `lookback`
/// candles earlier (falls back to the oldest close when history is short).
pub fn percent_change(closes: &[f64], lookback: usize) -> Option<f64> {
    let last = *closes.last()?;
    let base_idx = closes.len().saturating_sub(lookback + 1);
    let base = closes[base_idx];
    if base == 0.0 {
        return None;
    }
    Some((last - base) / base * 100.0)
}
