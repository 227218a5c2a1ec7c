// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Quantile binning of training features and sparse binned row storage

use crate::featurizer::FeatureVector;

/// Maps raw values of one feature to histogram bins.
///
/// `bin(v)` is the number of upper bounds strictly below `v`, so
/// `bin(v) <= k` exactly when `v <= upper_bounds[k]`. Trees store
/// `upper_bounds[k]` as the split threshold, which keeps training-time bin
/// routing and inference-time threshold routing identical.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    upper_bounds: Vec<f32>,
    default_bin: u8,
}

impl BinMapper {
    /// Build bins from the non-zero values of a feature plus its zero count.
    pub fn build(values: &[f32], n_zeros: usize, max_bins: usize) -> Self {
        let mut pairs: Vec<(f32, usize)> = values.iter().map(|v| (*v, 1)).collect();
        if n_zeros > 0 {
            pairs.push((0.0, n_zeros));
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut distinct: Vec<(f32, usize)> = Vec::with_capacity(pairs.len());
        for (value, count) in pairs {
            match distinct.last_mut() {
                Some(last) if last.0 == value => last.1 += count,
                _ => distinct.push((value, count)),
            }
        }

        let mut upper_bounds = Vec::new();
        if distinct.len() <= max_bins {
            upper_bounds.extend(distinct.iter().take(distinct.len().saturating_sub(1)).map(|(v, _)| *v));
        } else {
            let total: usize = distinct.iter().map(|(_, c)| c).sum();
            let mut cumulative = 0usize;
            for (i, (value, count)) in distinct.iter().enumerate() {
                if i + 1 == distinct.len() || upper_bounds.len() + 1 >= max_bins {
                    break;
                }
                cumulative += count;
                let target = (upper_bounds.len() + 1) as f64 * total as f64 / max_bins as f64;
                if cumulative as f64 >= target {
                    upper_bounds.push(*value);
                }
            }
        }

        let mut mapper = Self {
            upper_bounds,
            default_bin: 0,
        };
        mapper.default_bin = mapper.bin(0.0);
        mapper
    }

    #[inline]
    pub fn bin(&self, value: f32) -> u8 {
        self.upper_bounds.partition_point(|b| *b < value) as u8
    }

    pub fn n_bins(&self) -> usize {
        self.upper_bounds.len() + 1
    }

    /// Bin of the value 0.0, which is not stored explicitly
    pub fn default_bin(&self) -> u8 {
        self.default_bin
    }

    /// Threshold that sends bins `0..=bin` left
    pub fn upper_bound(&self, bin: u8) -> f32 {
        self.upper_bounds[bin as usize]
    }
}

/// Training rows in CSR layout, storing only entries off their feature's default bin
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    mappers: Vec<BinMapper>,
    row_offsets: Vec<usize>,
    entries: Vec<(u32, u8)>,
}

impl BinnedMatrix {
    /// Bin a rectangular set of feature vectors
    pub fn from_features(features: &[FeatureVector], max_bins: usize) -> Self {
        let n_rows = features.len();
        let n_features = features.first().map_or(0, FeatureVector::len);

        let mut columns: Vec<Vec<f32>> = vec![Vec::new(); n_features];
        for row in features {
            for (j, v) in row.nonzero() {
                columns[j].push(v);
            }
        }

        let mappers: Vec<BinMapper> = columns
            .iter()
            .map(|values| BinMapper::build(values, n_rows - values.len(), max_bins))
            .collect();

        let mut row_offsets = Vec::with_capacity(n_rows + 1);
        row_offsets.push(0);
        let mut entries = Vec::new();
        for row in features {
            for (j, v) in row.nonzero() {
                let mapper = &mappers[j];
                let bin = mapper.bin(v);
                if bin != mapper.default_bin() {
                    entries.push((j as u32, bin));
                }
            }
            row_offsets.push(entries.len());
        }

        Self {
            mappers,
            row_offsets,
            entries,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn n_features(&self) -> usize {
        self.mappers.len()
    }

    pub fn mapper(&self, feature: u32) -> &BinMapper {
        &self.mappers[feature as usize]
    }

    /// Stored `(feature, bin)` entries of a row, sorted by feature
    pub fn row(&self, row: u32) -> &[(u32, u8)] {
        let row = row as usize;
        &self.entries[self.row_offsets[row]..self.row_offsets[row + 1]]
    }

    pub fn bin_at(&self, row: u32, feature: u32) -> u8 {
        let entries = self.row(row);
        match entries.binary_search_by_key(&feature, |(f, _)| *f) {
            Ok(pos) => entries[pos].1,
            Err(_) => self.mapper(feature).default_bin(),
        }
    }
}
