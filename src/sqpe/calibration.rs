// =============================================================================
// Isotonic Calibration — monotone map from raw ensemble scores to probabilities
// =============================================================================
//
// Fit with pool-adjacent-violators on (raw probability, outcome) pairs from the
// held-out calibration slice. Each pooled block contributes knots at its lowest
// and highest raw score; lookups interpolate linearly between knots and clip
// outside the fitted range. An empty knot table is the identity map.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::stats::unit;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

struct Block {
    sum_y: f64,
    weight: f64,
    x_lo: f64,
    x_hi: f64,
}

impl Block {
    fn mean(&self) -> f64 {
        self.sum_y / self.weight
    }
}

impl IsotonicCalibrator {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn fit(scores: &[f64], labels: &[bool]) -> Self {
        let mut pairs: Vec<(f64, f64)> = scores
            .iter()
            .zip(labels)
            .filter(|(s, _)| s.is_finite())
            .map(|(&s, &y)| (s, if y { 1.0 } else { 0.0 }))
            .collect();
        if pairs.is_empty() {
            return Self::identity();
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut blocks: Vec<Block> = Vec::with_capacity(pairs.len());
        for (x, y) in pairs {
            // Equal scores must share one fitted value.
            if let Some(last) = blocks.last_mut() {
                if last.x_hi == x {
                    last.sum_y += y;
                    last.weight += 1.0;
                    Self::pool(&mut blocks);
                    continue;
                }
            }
            blocks.push(Block {
                sum_y: y,
                weight: 1.0,
                x_lo: x,
                x_hi: x,
            });
            Self::pool(&mut blocks);
        }

        let mut xs = Vec::with_capacity(blocks.len() * 2);
        let mut ys = Vec::with_capacity(blocks.len() * 2);
        for b in &blocks {
            let m = b.mean();
            xs.push(b.x_lo);
            ys.push(m);
            if b.x_hi > b.x_lo {
                xs.push(b.x_hi);
                ys.push(m);
            }
        }
        Self { xs, ys }
    }

    /// Merge trailing blocks while they violate monotonicity.
    fn pool(blocks: &mut Vec<Block>) {
        while blocks.len() >= 2 {
            let n = blocks.len();
            if blocks[n - 2].mean() <= blocks[n - 1].mean() {
                break;
            }
            let Some(top) = blocks.pop() else { break };
            if let Some(prev) = blocks.last_mut() {
                prev.sum_y += top.sum_y;
                prev.weight += top.weight;
                prev.x_hi = top.x_hi;
            }
        }
    }

    /// Calibrated probability for a raw score, clipped to [0, 1].
    pub fn transform(&self, raw: f64) -> f64 {
        if self.xs.is_empty() {
            return unit(raw);
        }
        let n = self.xs.len();
        if raw <= self.xs[0] {
            return unit(self.ys[0]);
        }
        if raw >= self.xs[n - 1] {
            return unit(self.ys[n - 1]);
        }
        // First knot strictly greater than raw; 1 <= hi <= n - 1 here.
        let hi = self.xs.partition_point(|&x| x <= raw);
        let lo = hi - 1;
        let span = self.xs[hi] - self.xs[lo];
        if span <= f64::EPSILON {
            return unit(self.ys[hi]);
        }
        let t = (raw - self.xs[lo]) / span;
        unit(self.ys[lo] + t * (self.ys[hi] - self.ys[lo]))
    }

    pub fn knots(&self) -> usize {
        self.xs.len()
    }
}
