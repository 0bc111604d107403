// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Initializer policies for new variables.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::tensor::{numel, Tensor};

/// How a freshly registered variable is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// Every element set to the same value.
    Const(f64),
    /// i.i.d. normal samples.
    Randn { mean: f64, stdev: f64 },
    /// i.i.d. uniform samples on `[lo, up)`.
    Uniform { lo: f64, up: f64 },
    /// Uniform on `[-b, b)` with `b = sqrt(3 / fan_in)`.
    KaimingUniform,
}

impl Init {
    pub const ZEROS: Init = Init::Const(0.0);
    pub const ONES: Init = Init::Const(1.0);
    pub const STANDARD_NORMAL: Init = Init::Randn {
        mean: 0.0,
        stdev: 1.0,
    };

    /// Allocate and fill a tensor of `shape`.
    ///
    /// # Panics
    ///
    /// Panics on a zero dimension or an empty uniform range.
    pub fn materialize<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> Tensor {
        let n = numel(shape);
        let data: Vec<f32> = match *self {
            Init::Const(value) => vec![value as f32; n],
            Init::Randn { mean, stdev } => (0..n)
                .map(|_| {
                    let z: f64 = rng.sample(StandardNormal);
                    (mean + stdev * z) as f32
                })
                .collect(),
            Init::Uniform { lo, up } => uniform(n, lo, up, rng),
            Init::KaimingUniform => {
                let bound = kaiming_bound(shape);
                uniform(n, -bound, bound, rng)
            },
        };
        Tensor::new(shape, data)
    }
}

fn uniform<R: Rng + ?Sized>(n: usize, lo: f64, up: f64, rng: &mut R) -> Vec<f32> {
    assert!(lo < up, "uniform init needs lo < up, got [{lo}, {up})");
    (0..n).map(|_| rng.gen_range(lo..up) as f32).collect()
}

/// Fan-in used by Kaiming initialization: the product of every dimension but
/// the first (the output dimension). Scalars and one-dimensional shapes get a
/// fan-in of 1, matching the usual tensor libraries.
pub fn fan_in(shape: &[usize]) -> usize {
    shape.iter().skip(1).product()
}

pub fn kaiming_bound(shape: &[usize]) -> f64 {
    (3.0 / fan_in(shape) as f64).sqrt()
}
