// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Platt scaling of raw ensemble margins into probabilities

use serde::{Deserialize, Serialize};

use crate::trainer::sigmoid;

const MAX_ITERATIONS: usize = 100;
const MIN_STEP: f64 = 1e-10;
const HESSIAN_RIDGE: f64 = 1e-12;
const GRADIENT_TOLERANCE: f64 = 1e-5;

/// `p = sigmoid(slope * score + offset)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattCalibrator {
    pub slope: f64,
    pub offset: f64,
}

impl Default for PlattCalibrator {
    fn default() -> Self {
        Self {
            slope: 1.0,
            offset: 0.0,
        }
    }
}

impl PlattCalibrator {
    /// Fit slope and offset by regularized maximum likelihood.
    ///
    /// Targets are smoothed to `(n+ + 1) / (n+ + 2)` and `1 / (n- + 2)` so a
    /// perfectly separated training set still gives finite parameters.
    /// Newton steps with backtracking line search.
    pub fn fit(scores: &[f32], labels: &[bool]) -> Self {
        let positives = labels.iter().filter(|l| **l).count() as f64;
        let negatives = labels.len() as f64 - positives;
        let hi = (positives + 1.0) / (positives + 2.0);
        let lo = 1.0 / (negatives + 2.0);
        let targets: Vec<f64> = labels.iter().map(|l| if *l { hi } else { lo }).collect();
        let scores: Vec<f64> = scores.iter().map(|s| *s as f64).collect();

        // Internally p = 1 / (1 + exp(a * s + b))
        let mut a = 0.0;
        let mut b = ((negatives + 1.0) / (positives + 1.0)).ln();
        let mut value = objective(&scores, &targets, a, b);

        for _ in 0..MAX_ITERATIONS {
            let (mut h11, mut h22, mut h21) = (HESSIAN_RIDGE, HESSIAN_RIDGE, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (s, t) in scores.iter().zip(&targets) {
                let z = s * a + b;
                let (p, q) = if z >= 0.0 {
                    let e = (-z).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = z.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += s * s * d2;
                h22 += d2;
                h21 += s * d2;
                let d1 = t - p;
                g1 += s * d1;
                g2 += d1;
            }
            if g1.abs() < GRADIENT_TOLERANCE && g2.abs() < GRADIENT_TOLERANCE {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            if !det.is_finite() || det <= 0.0 {
                break;
            }
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let slope_along = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let (na, nb) = (a + step * da, b + step * db);
                let candidate = objective(&scores, &targets, na, nb);
                if candidate < value + 1e-4 * step * slope_along {
                    a = na;
                    b = nb;
                    value = candidate;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                break;
            }
        }

        if a.is_finite() && b.is_finite() {
            Self {
                slope: -a,
                offset: -b,
            }
        } else {
            Self::default()
        }
    }

    pub fn probability(&self, score: f32) -> f64 {
        sigmoid(self.slope * score as f64 + self.offset)
    }

    pub fn is_finite(&self) -> bool {
        self.slope.is_finite() && self.offset.is_finite()
    }
}

fn objective(scores: &[f64], targets: &[f64], a: f64, b: f64) -> f64 {
    scores
        .iter()
        .zip(targets)
        .map(|(s, t)| {
            let z = s * a + b;
            if z >= 0.0 {
                t * z + (-z).exp().ln_1p()
            } else {
                (t - 1.0) * z + z.exp().ln_1p()
            }
        })
        .sum()
}
