// =============================================================================
// Gradient-Boosted Trees — binary log-loss ensemble
// =============================================================================
//
// Each stage fits a depth-limited regression tree to the gradient of the
// log-loss with second-order (Newton) leaf values:
//
//   g_i = p_i - y_i          h_i = p_i (1 - p_i)
//   leaf = -sum(g) / (sum(h) + lambda)
//   gain = GL^2/(HL+lambda) + GR^2/(HR+lambda) - G^2/(H+lambda)
//
// Split search scans every feature in column order and every midpoint between
// distinct sorted values, keeping the first strictly-best candidate, so the
// fitted ensemble is a pure function of its input.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::stats::{logit, sigmoid};

/// L2 regularisation on leaf values.
const LEAF_LAMBDA: f64 = 1.0;
/// Splits must improve the objective by more than this.
const MIN_SPLIT_GAIN: f64 = 1e-9;
/// Initial prior is clipped so single-class folds stay finite.
const PRIOR_CLIP: f64 = 1e-3;

/// Hyper-parameters for one boosting run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    /// Rows with `row[feature] <= threshold` go left.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { value } => return *value,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf { .. } => 0,
            Self::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Boosted ensemble of regression trees over log-odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedEnsemble {
    n_features: usize,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<TreeNode>,
}

impl BoostedEnsemble {
    /// Fit on `rows` (all of width `n_features`) against `labels`.
    pub fn fit(rows: &[&[f64]], labels: &[bool], params: &BoostingParams) -> EngineResult<Self> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(EngineError::InvalidTrainingSet(format!(
                "{} rows against {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let n_features = rows[0].len();
        if rows.iter().any(|r| r.len() != n_features) {
            return Err(EngineError::InvalidTrainingSet(
                "rows have differing widths".to_string(),
            ));
        }

        let targets: Vec<f64> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();
        let prior = (targets.iter().sum::<f64>() / targets.len() as f64)
            .clamp(PRIOR_CLIP, 1.0 - PRIOR_CLIP);
        let base_score = logit(prior);

        let mut raw = vec![base_score; rows.len()];
        let mut grad = vec![0.0; rows.len()];
        let mut hess = vec![0.0; rows.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let all: Vec<usize> = (0..rows.len()).collect();

        for _ in 0..params.n_estimators {
            for i in 0..rows.len() {
                let p = sigmoid(raw[i]);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(1e-12);
            }

            let ctx = GrowContext {
                rows,
                grad: &grad,
                hess: &hess,
                n_features,
                max_depth: params.max_depth,
                min_samples_leaf: params.min_samples_leaf.max(1),
            };
            let tree = ctx.grow(all.clone(), 0);

            for (i, row) in rows.iter().enumerate() {
                raw[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            n_features,
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Log-odds score for one row.
    pub fn raw_score(&self, row: &[f64]) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Uncalibrated win probability for one row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.raw_score(row))
    }
}

// =============================================================================
// Tree growing
// =============================================================================

struct GrowContext<'a> {
    rows: &'a [&'a [f64]],
    grad: &'a [f64],
    hess: &'a [f64],
    n_features: usize,
    max_depth: usize,
    min_samples_leaf: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl GrowContext<'_> {
    fn grow(&self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        let leaf = TreeNode::Leaf {
            value: -g / (h + LEAF_LAMBDA),
        };

        if depth >= self.max_depth || indices.len() < 2 * self.min_samples_leaf {
            return leaf;
        }

        let Some(split) = self.best_split(&indices, g, h) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = g * g / (h + LEAF_LAMBDA);
        let n = indices.len();
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..self.n_features {
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut gl = 0.0;
            let mut hl = 0.0;
            for k in 0..n - 1 {
                let i = sorted[k];
                gl += self.grad[i];
                hl += self.hess[i];

                let left_n = k + 1;
                if left_n < self.min_samples_leaf || n - left_n < self.min_samples_leaf {
                    continue;
                }
                let x = self.rows[i][feature];
                let x_next = self.rows[sorted[k + 1]][feature];
                if x_next <= x {
                    continue;
                }

                let gr = g - gl;
                let hr = h - hl;
                let gain =
                    gl * gl / (hl + LEAF_LAMBDA) + gr * gr / (hr + LEAF_LAMBDA) - parent;
                if gain > MIN_SPLIT_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: x + (x_next - x) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
