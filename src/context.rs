// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Explicit training context: seed and thread budget passed to every fit call
//!
//! Nothing in the crate reads global state. Two fits with equal contexts and
//! equal inputs produce identical models.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};

/// Thread budget for a fit. Split search and batch scoring may still run
/// sequentially when there is too little work to share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Sequential,
    /// Up to `n` rayon workers
    Parallel(usize),
}

impl Parallelism {
    /// Map a `--threads` value: 0 means every core, 1 means sequential
    pub fn from_threads(n_threads: usize) -> Self {
        match n_threads {
            0 => Self::Parallel(rayon::current_num_threads()),
            1 => Self::Sequential,
            n => Self::Parallel(n),
        }
    }

    #[inline]
    pub fn allows_parallel(self) -> bool {
        matches!(self, Self::Parallel(n) if n > 1)
    }

    #[inline]
    pub fn n_threads(self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Parallel(n) => n.max(1),
        }
    }

    /// Shrink the worker count so each thread gets `min_items_per_thread`
    /// items; one worker left means sequential.
    pub fn correct_for_workload(self, n_items: usize, min_items_per_thread: usize) -> Self {
        match self {
            Self::Sequential => Self::Sequential,
            Self::Parallel(n) => {
                let effective = n.min(n_items / min_items_per_thread.max(1)).max(1);
                if effective <= 1 {
                    Self::Sequential
                } else {
                    Self::Parallel(effective)
                }
            }
        }
    }
}

/// Resource handle threaded through featurizer and trainer fits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrainingContext {
    seed: u64,
    parallelism: Parallelism,
}

impl Default for TrainingContext {
    fn default() -> Self {
        Self::new(42)
    }
}

impl TrainingContext {
    /// Sequential context with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            parallelism: Parallelism::Sequential,
        }
    }

    /// Set the thread budget (see [`Parallelism::from_threads`])
    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.parallelism = Parallelism::from_threads(n_threads);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Independent seeded random stream; distinct `stream` ids never overlap.
    pub fn rng(&self, stream: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        rng
    }

    /// Run `op` inside a rayon pool sized to this context.
    ///
    /// Sequential contexts run `op` on the calling thread.
    pub fn install<R, F>(&self, op: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        if !self.parallelism.allows_parallel() {
            return Ok(op());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism.n_threads())
            .build()
            .map_err(|e| Error::config(format!("cannot build thread pool: {e}")))?;
        Ok(pool.install(op))
    }
}
