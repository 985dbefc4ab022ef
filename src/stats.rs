// =============================================================================
// Statistics helpers shared by the engines
// =============================================================================

/// Probabilities are clipped to this distance from 0 and 1 before taking logs.
const PROB_EPS: f64 = 1e-15;

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0.0 for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Logistic function, split on sign so large magnitudes do not overflow.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Inverse of [`sigmoid`] on a clipped probability.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
    (p / (1.0 - p)).ln()
}

/// Mean binary cross-entropy. Returns 0.0 on empty input.
pub fn log_loss(probabilities: &[f64], labels: &[bool]) -> f64 {
    let n = probabilities.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
            if y {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / n as f64
}

/// Mean squared error of probabilistic predictions. Returns 0.0 on empty input.
pub fn brier_score(probabilities: &[f64], labels: &[bool]) -> f64 {
    let n = probabilities.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| (p - if y { 1.0 } else { 0.0 }).powi(2))
        .sum();
    total / n as f64
}

/// Linearly remap `value` from `[in_lo, in_hi]` to `[out_lo, out_hi]`, clamped
/// to the output range. Works regardless of whether `in_lo < in_hi` or vice
/// versa.
pub fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    let t = if (in_hi - in_lo).abs() < f64::EPSILON {
        0.5
    } else {
        (value - in_lo) / (in_hi - in_lo)
    };
    let clamped = t.clamp(0.0, 1.0);
    out_lo + clamped * (out_hi - out_lo)
}

/// Clamp into [0, 1], mapping NaN to 0.
pub fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_dev() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
        assert_eq!(std_dev(&[0.3; 4]), 0.0);
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(1000.0) <= 1.0);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!((sigmoid(logit(0.73)) - 0.73).abs() < 1e-9);
    }

    #[test]
    fn perfect_predictions_score_zero() {
        let p = [1.0, 0.0, 1.0];
        let y = [true, false, true];
        assert!(log_loss(&p, &y) < 1e-12);
        assert!(brier_score(&p, &y) < 1e-12);
    }

    #[test]
    fn coin_flip_scores() {
        let p = [0.5, 0.5];
        let y = [true, false];
        assert!((log_loss(&p, &y) - std::f64::consts::LN_2).abs() < 1e-12);
        assert!((brier_score(&p, &y) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_remap() {
        assert!((remap(0.5, 0.0, 1.0, 0.0, 10.0) - 5.0).abs() < 1e-10);
        assert!((remap(2.0, 0.0, 1.0, 0.0, 10.0) - 10.0).abs() < 1e-10);
        assert!((remap(-1.0, 0.0, 1.0, 0.0, 10.0) - 0.0).abs() < 1e-10);
        assert!((remap(0.25, 1.0, 0.0, 0.0, 1.0) - 0.75).abs() < 1e-10);
    }

    #[test]
    fn unit_handles_nan() {
        assert_eq!(unit(f64::NAN), 0.0);
        assert_eq!(unit(1.7), 1.0);
        assert_eq!(unit(-0.2), 0.0);
    }
}
