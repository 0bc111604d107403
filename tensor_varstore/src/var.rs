// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
use std::{fmt, sync::Arc};

use crate::{sync_compat::RwLock, tensor::Tensor};

/// Handle to a variable registered in a [`VarStore`](crate::VarStore).
///
/// Cloning is cheap and every clone refers to the same storage, so an update
/// made through the store (load, copy) is visible through all handles. The
/// shape and trainability are fixed at registration.
#[derive(Clone)]
pub struct Var {
    inner: Arc<VarInner>,
}

struct VarInner {
    shape: Vec<usize>,
    trainable: bool,
    state: RwLock<VarState>,
}

struct VarState {
    data: Vec<f32>,
    requires_grad: bool,
}

impl Var {
    pub(crate) fn new(tensor: Tensor, trainable: bool) -> Self {
        let shape = tensor.shape().to_vec();
        Self {
            inner: Arc::new(VarInner {
                shape,
                trainable,
                state: RwLock::new(VarState {
                    data: tensor.into_data(),
                    requires_grad: trainable,
                }),
            }),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.inner.shape
    }

    /// Whether the variable was registered as trainable.
    pub fn is_trainable(&self) -> bool {
        self.inner.trainable
    }

    /// Whether gradients are currently tracked for this variable.
    pub fn requires_grad(&self) -> bool {
        self.inner.state.read().requires_grad
    }

    pub(crate) fn set_requires_grad(&self, requires_grad: bool) {
        self.inner.state.write().requires_grad = requires_grad;
    }

    /// Snapshot of the current content.
    pub fn to_tensor(&self) -> Tensor {
        Tensor::new(&self.inner.shape, self.inner.state.read().data.clone())
    }

    /// Run `f` against the content without copying it.
    pub fn with_data<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        f(&self.inner.state.read().data)
    }

    /// Mutate the content in place. Used by the numeric collaborator
    /// (optimizers, training loops).
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        f(&mut self.inner.state.write().data)
    }

    /// Overwrite the content with `src`.
    ///
    /// # Panics
    ///
    /// Panics if `src` has a different shape.
    pub fn copy_from(&self, src: &Tensor) {
        assert_eq!(
            self.shape(),
            src.shape(),
            "cannot copy a tensor of shape {:?} into a variable of shape {:?}",
            src.shape(),
            self.shape()
        );
        self.inner.state.write().data.copy_from_slice(src.data());
    }

    /// Overwrite the content with another variable's content.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn copy_from_var(&self, src: &Var) {
        if self.ptr_eq(src) {
            return;
        }
        assert_eq!(
            self.shape(),
            src.shape(),
            "cannot copy a variable of shape {:?} into a variable of shape {:?}",
            src.shape(),
            self.shape()
        );
        // Never hold both value locks at once.
        let data = src.inner.state.read().data.clone();
        self.inner.state.write().data = data;
    }

    /// Whether both handles refer to the same registered variable.
    pub fn ptr_eq(&self, other: &Var) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("shape", &self.inner.shape)
            .field("trainable", &self.inner.trainable)
            .field("requires_grad", &self.requires_grad())
            .finish_non_exhaustive()
    }
}
