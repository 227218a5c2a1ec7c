// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Leaf-wise tree growth over binned features
//!
//! Each round expands the open leaf with the largest split gain until the
//! leaf budget is spent or no leaf has a valid split. Histograms are built
//! sparsely: only rows that leave a feature's default bin touch it, and the
//! default bin is recovered from the node totals.

use std::collections::HashMap;

use rayon::prelude::*;

use super::binning::BinnedMatrix;
use super::tree::{Tree, TreeBuilder};
use crate::context::Parallelism;

/// Features per thread below which split search stays on the calling thread
const MIN_FEATURES_PER_THREAD: usize = 64;

#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowerParams {
    pub n_leaves: usize,
    pub min_samples_in_leaf: usize,
    pub l2: f64,
    pub min_split_gain: f64,
    pub learning_rate: f64,
}

/// Gradient statistics of a set of rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct BinStat {
    pub grad: f64,
    pub hess: f64,
    pub count: usize,
}

impl BinStat {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    fn merge(&mut self, other: &BinStat) {
        self.grad += other.grad;
        self.hess += other.hess;
        self.count += other.count;
    }

    fn minus(&self, other: &BinStat) -> BinStat {
        BinStat {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SplitCandidate {
    pub feature: u32,
    /// Bins `0..=bin` go left
    pub bin: u8,
    pub gain: f64,
    pub threshold: f32,
}

impl SplitCandidate {
    /// Higher gain wins; equal gains go to the lower feature index
    fn better(a: SplitCandidate, b: SplitCandidate) -> SplitCandidate {
        if b.gain > a.gain || (b.gain == a.gain && b.feature < a.feature) {
            b
        } else {
            a
        }
    }
}

#[derive(Debug)]
struct LeafState {
    node: usize,
    rows: Vec<u32>,
    total: BinStat,
    best: Option<SplitCandidate>,
}

pub(crate) struct TreeGrower<'a> {
    matrix: &'a BinnedMatrix,
    params: GrowerParams,
    parallelism: Parallelism,
}

impl<'a> TreeGrower<'a> {
    pub fn new(matrix: &'a BinnedMatrix, params: GrowerParams, parallelism: Parallelism) -> Self {
        Self {
            matrix,
            params,
            parallelism,
        }
    }

    /// Grow one tree on `rows`. Leaf values are already scaled by the learning rate.
    pub fn grow(&self, rows: Vec<u32>, grad: &[f64], hess: &[f64]) -> Tree {
        let mut builder = TreeBuilder::new();
        let mut leaves = vec![self.make_leaf(0, rows, grad, hess)];

        while leaves.len() < self.params.n_leaves {
            let chosen = leaves
                .iter()
                .enumerate()
                .filter_map(|(pos, leaf)| leaf.best.map(|best| (pos, leaf.node, best.gain)))
                .fold(None, |acc: Option<(usize, usize, f64)>, cur| match acc {
                    Some(prev) if prev.2 > cur.2 || (prev.2 == cur.2 && prev.1 < cur.1) => {
                        Some(prev)
                    }
                    _ => Some(cur),
                });
            let Some((pos, _, _)) = chosen else {
                break;
            };

            let leaf = leaves.remove(pos);
            let Some(split) = leaf.best else {
                break;
            };

            let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = leaf
                .rows
                .iter()
                .partition(|row| self.matrix.bin_at(**row, split.feature) <= split.bin);

            let (left, right) =
                builder.split(leaf.node, split.feature, split.threshold, split.gain as f32);
            leaves.push(self.make_leaf(left, left_rows, grad, hess));
            leaves.push(self.make_leaf(right, right_rows, grad, hess));
        }

        for leaf in &leaves {
            builder.set_leaf_value(leaf.node, self.leaf_value(&leaf.total));
        }
        builder.build()
    }

    fn make_leaf(&self, node: usize, rows: Vec<u32>, grad: &[f64], hess: &[f64]) -> LeafState {
        let mut total = BinStat::default();
        for row in &rows {
            total.add(grad[*row as usize], hess[*row as usize]);
        }
        let best = if rows.len() >= 2 * self.params.min_samples_in_leaf {
            self.find_best_split(&rows, &total, grad, hess)
        } else {
            None
        };
        LeafState {
            node,
            rows,
            total,
            best,
        }
    }

    fn leaf_value(&self, stat: &BinStat) -> f32 {
        let denom = stat.hess + self.params.l2;
        if denom <= 0.0 {
            return 0.0;
        }
        (-stat.grad / denom * self.params.learning_rate) as f32
    }

    /// Per-feature histograms of the rows, covering only features that occur off
    /// their default bin. Sorted by feature.
    fn build_histograms(
        &self,
        rows: &[u32],
        total: &BinStat,
        grad: &[f64],
        hess: &[f64],
    ) -> Vec<(u32, Vec<BinStat>)> {
        let mut sparse: HashMap<u32, Vec<BinStat>> = HashMap::new();
        for row in rows {
            let (g, h) = (grad[*row as usize], hess[*row as usize]);
            for (feature, bin) in self.matrix.row(*row) {
                let hist = sparse.entry(*feature).or_insert_with(|| {
                    vec![BinStat::default(); self.matrix.mapper(*feature).n_bins()]
                });
                hist[*bin as usize].add(g, h);
            }
        }

        let mut hists: Vec<(u32, Vec<BinStat>)> = sparse
            .into_iter()
            .map(|(feature, mut hist)| {
                let mut stored = BinStat::default();
                for stat in &hist {
                    stored.merge(stat);
                }
                let default_bin = self.matrix.mapper(feature).default_bin() as usize;
                hist[default_bin] = total.minus(&stored);
                (feature, hist)
            })
            .collect();
        hists.sort_unstable_by_key(|(feature, _)| *feature);
        hists
    }

    fn find_best_split(
        &self,
        rows: &[u32],
        total: &BinStat,
        grad: &[f64],
        hess: &[f64],
    ) -> Option<SplitCandidate> {
        let hists = self.build_histograms(rows, total, grad, hess);
        let search = |(feature, hist): &(u32, Vec<BinStat>)| self.best_split_for_feature(*feature, hist, total);

        if self
            .parallelism
            .correct_for_workload(hists.len(), MIN_FEATURES_PER_THREAD)
            .allows_parallel()
        {
            hists
                .par_iter()
                .filter_map(search)
                .reduce_with(SplitCandidate::better)
        } else {
            hists.iter().filter_map(search).reduce(SplitCandidate::better)
        }
    }

    fn best_split_for_feature(
        &self,
        feature: u32,
        hist: &[BinStat],
        total: &BinStat,
    ) -> Option<SplitCandidate> {
        let min_samples = self.params.min_samples_in_leaf;
        let l2 = self.params.l2;
        let parent = score(total, l2);
        let mapper = self.matrix.mapper(feature);

        let mut left = BinStat::default();
        let mut best: Option<SplitCandidate> = None;
        for bin in 0..hist.len().saturating_sub(1) {
            left.merge(&hist[bin]);
            let right = total.minus(&left);
            if left.count < min_samples || right.count < min_samples {
                continue;
            }
            if left.hess + l2 <= 0.0 || right.hess + l2 <= 0.0 {
                continue;
            }
            let gain = 0.5 * (score(&left, l2) + score(&right, l2) - parent);
            if gain <= self.params.min_split_gain || gain <= 0.0 || !gain.is_finite() {
                continue;
            }
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    bin: bin as u8,
                    gain,
                    threshold: mapper.upper_bound(bin as u8),
                });
            }
        }
        best
    }
}

#[inline]
fn score(stat: &BinStat, l2: f64) -> f64 {
    stat.grad * stat.grad / (stat.hess + l2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::featurizer::FeatureVector;
    use crate::gbdt::tree::Node;

    fn params(n_leaves: usize) -> GrowerParams {
        GrowerParams {
            n_leaves,
            min_samples_in_leaf: 1,
            l2: 0.0,
            min_split_gain: 0.0,
            learning_rate: 1.0,
        }
    }

    fn separable() -> (BinnedMatrix, Vec<f64>, Vec<f64>) {
        let features = vec![
            FeatureVector::new(vec![1.0, 0.0]),
            FeatureVector::new(vec![1.0, 0.0]),
            FeatureVector::new(vec![0.0, 1.0]),
            FeatureVector::new(vec![0.0, 1.0]),
        ];
        let matrix = BinnedMatrix::from_features(&features, 16);
        // Rows 0 and 1 are positive at p = 0.5
        let grad = vec![-0.5, -0.5, 0.5, 0.5];
        let hess = vec![0.25; 4];
        (matrix, grad, hess)
    }

    #[test]
    fn test_stump_on_separable_data() {
        let (matrix, grad, hess) = separable();
        let grower = TreeGrower::new(&matrix, params(2), Parallelism::Sequential);
        let tree = grower.grow((0..4).collect(), &grad, &hess);

        assert_eq!(tree.n_leaves(), 2);
        // Both features split equally well; the lower index wins
        match tree.nodes()[0] {
            Node::Split { feature, threshold, gain, .. } => {
                assert_eq!(feature, 0);
                assert_eq!(threshold, 0.0);
                assert!((gain - 2.0).abs() < 1e-6);
            }
            _ => panic!("expected a split at the root"),
        }
        assert!((tree.predict(&[1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!((tree.predict(&[0.0, 1.0]) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_samples_blocks_split() {
        let (matrix, grad, hess) = separable();
        let mut p = params(4);
        p.min_samples_in_leaf = 3;
        let tree = TreeGrower::new(&matrix, p, Parallelism::Sequential).grow((0..4).collect(), &grad, &hess);
        assert_eq!(tree.n_leaves(), 1);
        // Gradients cancel out
        assert!(tree.predict(&[1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_leaf_budget_respected() {
        let features: Vec<FeatureVector> = (0..40)
            .map(|i| FeatureVector::new(vec![i as f32, (i % 7) as f32]))
            .collect();
        let matrix = BinnedMatrix::from_features(&features, 32);
        let grad: Vec<f64> = (0..40).map(|i| if i % 3 == 0 { -0.5 } else { 0.5 }).collect();
        let hess = vec![0.25; 40];
        let tree = TreeGrower::new(&matrix, params(5), Parallelism::Sequential)
            .grow((0..40).collect(), &grad, &hess);
        assert!(tree.n_leaves() <= 5);
        assert!(tree.n_leaves() > 1);
        assert!(tree.validate(2).is_ok());
    }

    #[test]
    fn test_parallel_search_matches_sequential() {
        let features: Vec<FeatureVector> = (0..200)
            .map(|i| {
                let values = (0..300).map(|j| ((i * 31 + j * 17) % 11) as f32 / 10.0).collect();
                FeatureVector::new(values)
            })
            .collect();
        let matrix = BinnedMatrix::from_features(&features, 16);
        let grad: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { -0.5 } else { 0.5 }).collect();
        let hess = vec![0.25; 200];

        let sequential = TreeGrower::new(&matrix, params(8), Parallelism::Sequential)
            .grow((0..200).collect(), &grad, &hess);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let parallel = pool.install(|| {
            TreeGrower::new(&matrix, params(8), Parallelism::Parallel(4))
                .grow((0..200).collect(), &grad, &hess)
        });
        assert_eq!(sequential, parallel);
    }
}
