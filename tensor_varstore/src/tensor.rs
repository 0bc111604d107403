// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Dense `f32` buffers and the placement descriptor.
//!
//! This is the smallest numeric collaborator the registry needs: a shape, a
//! row-major buffer and a fill. No arithmetic happens here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SnapshotError, SnapshotResult};

/// Where a store's variables live. Threaded through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// Row-major dense tensor. The buffer length always matches the shape, also
/// for tensors produced by deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Unchecked wire form of [`Tensor`].
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = SnapshotError;

    fn try_from(raw: RawTensor) -> SnapshotResult<Self> {
        Tensor::try_new(&raw.shape, raw.data)
    }
}

/// Number of elements described by `shape`. An empty shape is a scalar.
///
/// # Panics
///
/// Panics if any dimension is zero.
pub fn numel(shape: &[usize]) -> usize {
    assert!(
        shape.iter().all(|&d| d > 0),
        "tensor dimensions must be positive, got {shape:?}"
    );
    shape.iter().product()
}

impl Tensor {
    /// # Panics
    ///
    /// Panics if `data.len()` does not match the element count of `shape`.
    pub fn new(shape: &[usize], data: Vec<f32>) -> Self {
        match Self::try_new(shape, data) {
            Ok(tensor) => tensor,
            Err(e) => panic!("{e}"),
        }
    }

    /// Checked constructor for decoders: a zero dimension or a buffer that
    /// does not fit `shape` is a [`SnapshotError::InvalidTensor`].
    pub fn try_new(shape: &[usize], data: Vec<f32>) -> SnapshotResult<Self> {
        if shape.contains(&0) || shape.iter().product::<usize>() != data.len() {
            return Err(SnapshotError::InvalidTensor {
                shape: shape.to_vec(),
                len: data.len(),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![value; numel(shape)],
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}
