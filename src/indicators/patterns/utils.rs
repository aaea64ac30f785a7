use crate::indicators::patterns::conditions::PatternError;
use crate::models::SeriesWindow;

// Helper functions for pattern recognition

pub fn mean(values: &[f64]) -> Result<f64, PatternError> {
    if values.is_empty() {
        return Err(PatternError::EmptyWindow { what: "mean" });
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if !mean.is_finite() {
        return Err(PatternError::NonFinite { what: "mean" });
    }
    Ok(mean)
}

pub fn max_of(values: &[f64]) -> Result<f64, PatternError> {
    values
        .iter()
        .copied()
        .reduce(f64::max)
        .filter(|v| v.is_finite())
        .ok_or(PatternError::NonFinite { what: "maximum" })
}

pub fn min_of(values: &[f64]) -> Result<f64, PatternError> {
    values
        .iter()
        .copied()
        .reduce(f64::min)
        .filter(|v| v.is_finite())
        .ok_or(PatternError::NonFinite { what: "minimum" })
}

/// (max high - min low) / mean close over the window
pub fn range_ratio(window: &SeriesWindow<'_>) -> Result<f64, PatternError> {
    let high = max_of(window.high)?;
    let low = min_of(window.low)?;
    let mean_close = mean(window.close)?;
    if mean_close == 0.0 {
        return Err(PatternError::ZeroDenominator { what: "mean close" });
    }
    Ok((high - low) / mean_close)
}

/// Each value <= the previous one. Any NaN breaks monotonicity.
pub fn is_non_increasing(values: &[f64]) -> bool {
    if values.iter().any(|v| v.is_nan()) {
        return false;
    }
    values.windows(2).all(|pair| pair[1] <= pair[0])
}

pub fn within(value: f64, lower: f64, upper: f64) -> bool {
    value >= lower && value <= upper
}
