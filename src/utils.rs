/// Parses a raw cell into a finite number.
///
/// Blank cells, non-numeric text, `NaN` and infinities all yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rounds half away from zero to the given number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Division that reports a zero denominator instead of producing inf/NaN.
pub fn checked_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Profit as a percentage of revenue, one decimal. Zero revenue gives 0.
pub fn margin_pct(profit: f64, revenue: f64) -> f64 {
    checked_ratio(profit, revenue)
        .map(|ratio| round_to(ratio * 100.0, 1))
        .unwrap_or(0.0)
}
