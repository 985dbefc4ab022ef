// =============================================================================
// L2-regularised logistic regression on standardised inputs
// =============================================================================
//
// Full-batch gradient descent, fixed iteration budget, deterministic:
//   loss = mean log-loss + (l2 / 2n) * |w|^2      (intercept unpenalised)
// Stops early once every gradient component is below GRADIENT_TOLERANCE.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::stats::{logit, mean, sigmoid, std_dev};

const GRADIENT_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    pub l2_penalty: f64,
    pub learning_rate: f64,
    pub max_iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    intercept: f64,
    iterations: usize,
}

impl LogisticModel {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], params: &LogisticParams) -> EngineResult<Self> {
        if rows.is_empty() {
            return Err(EngineError::InvalidTrainingSet("no rows".into()));
        }
        if rows.len() != labels.len() {
            return Err(EngineError::InvalidTrainingSet(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let n_features = rows[0].len();
        if rows.iter().any(|r| r.len() != n_features) {
            return Err(EngineError::InvalidTrainingSet("ragged feature rows".into()));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidTrainingSet("non-finite feature value".into()));
        }
        let positives = labels.iter().filter(|&&y| y).count();
        if positives == 0 || positives == labels.len() {
            return Err(EngineError::InvalidTrainingSet(
                "labels must contain both classes".into(),
            ));
        }

        let n = rows.len() as f64;
        let (means, scales): (Vec<f64>, Vec<f64>) = (0..n_features)
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                let sd = std_dev(&column);
                (mean(&column), if sd > 0.0 { sd } else { 1.0 })
            })
            .unzip();

        let x: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .map(|(j, v)| (v - means[j]) / scales[j])
                    .collect()
            })
            .collect();
        let y: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();

        let mut weights = vec![0.0; n_features];
        let mut intercept = logit(positives as f64 / n);
        let mut iterations = 0;

        for _ in 0..params.max_iterations {
            iterations += 1;
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;
            for (row, target) in x.iter().zip(&y) {
                let z = intercept + dot(&weights, row);
                let residual = sigmoid(z) - target;
                grad_b += residual;
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += residual * v;
                }
            }
            grad_b /= n;
            for (g, w) in grad_w.iter_mut().zip(&weights) {
                *g = *g / n + params.l2_penalty / n * w;
            }

            intercept -= params.learning_rate * grad_b;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= params.learning_rate * g;
            }

            let largest = grad_w.iter().fold(grad_b.abs(), |m, g| m.max(g.abs()));
            if largest < GRADIENT_TOLERANCE {
                break;
            }
        }

        Ok(Self {
            means,
            scales,
            weights,
            intercept,
            iterations,
        })
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Coefficients on the standardised scale.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let z = row
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .map(|(((v, m), s), w)| (v - m) / s * w)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LogisticParams {
        LogisticParams {
            l2_penalty: 1.0,
            learning_rate: 0.1,
            max_iterations: 500,
        }
    }

    fn separable() -> (Vec<Vec<f64>>, Vec<bool>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let x = i as f64;
            rows.push(vec![x, 3.0]);
            labels.push(i >= 20);
        }
        (rows, labels)
    }

    #[test]
    fn learns_positive_slope() {
        let (rows, labels) = separable();
        let m = LogisticModel::fit(&rows, &labels, &params()).unwrap();
        assert!(m.weights()[0] > 0.0);
        assert!(m.predict_proba(&[35.0, 3.0]) > 0.8);
        assert!(m.predict_proba(&[2.0, 3.0]) < 0.2);
    }

    #[test]
    fn constant_column_gets_no_weight() {
        let (rows, labels) = separable();
        let m = LogisticModel::fit(&rows, &labels, &params()).unwrap();
        assert!(m.weights()[1].abs() < 1e-12);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let (rows, labels) = separable();
        let m = LogisticModel::fit(&rows, &labels, &params()).unwrap();
        for x in [-1e6, -10.0, 0.0, 10.0, 1e6] {
            let p = m.predict_proba(&[x, 3.0]);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn stronger_penalty_shrinks_weights() {
        let (rows, labels) = separable();
        let loose = LogisticModel::fit(&rows, &labels, &params()).unwrap();
        let tight = LogisticModel::fit(
            &rows,
            &labels,
            &LogisticParams {
                l2_penalty: 40.0,
                ..params()
            },
        )
        .unwrap();
        assert!(tight.weights()[0].abs() < loose.weights()[0].abs());
    }

    #[test]
    fn single_class_is_rejected() {
        let rows = vec![vec![1.0], vec![2.0]];
        assert!(matches!(
            LogisticModel::fit(&rows, &[true, true], &params()),
            Err(EngineError::InvalidTrainingSet(_))
        ));
    }

    #[test]
    fn fit_is_deterministic() {
        let (rows, labels) = separable();
        let a = LogisticModel::fit(&rows, &labels, &params()).unwrap();
        let b = LogisticModel::fit(&rows, &labels, &params()).unwrap();
        assert_eq!(a, b);
    }
}
