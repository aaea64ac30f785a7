pub struct OverlapCalculator;

impl OverlapCalculator {
    // Calculate SMA (Simple Moving Average) over a trailing window.
    // Output is aligned with the input; NaN until `period` values are seen,
    // and NaN wherever the window contains a NaN.
    pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
        let mut results = vec![f64::NAN; values.len()];
        if period == 0 || values.len() < period {
            return results;
        }

        for end in period..=values.len() {
            let window = &values[end - period..end];
            results[end - 1] = window.iter().sum::<f64>() / period as f64;
        }

        results
    }

    // Calculate EMA (Exponential Moving Average) with alpha = 2 / (span + 1),
    // seeded with the first value and without bias adjustment.
    pub fn calculate_ema(values: &[f64], span: usize) -> Vec<f64> {
        let mut results = Vec::with_capacity(values.len());
        let Some(&first) = values.first() else {
            return results;
        };

        let alpha = 2.0 / (span as f64 + 1.0);
        let mut ema = first;
        results.push(ema);

        for &value in &values[1..] {
            ema = alpha * value + (1.0 - alpha) * ema;
            results.push(ema);
        }

        results
    }

    // Bar-to-bar percentage change; the first element has no predecessor
    pub fn calculate_pct_change(values: &[f64]) -> Vec<f64> {
        let mut results = Vec::with_capacity(values.len());
        if values.is_empty() {
            return results;
        }

        results.push(f64::NAN);
        for pair in values.windows(2) {
            results.push(pair[1] / pair[0] - 1.0);
        }

        results
    }
}
