// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Hierarchical naming and variable creation.
//!
//! A [`Path`] is a list of name segments bound to a store. Model code walks
//! down with [`Path::sub`] (or `&path / "segment"`) and registers variables at
//! the leaves:
//!
//! ```
//! use tensor_varstore::{Device, VarStore};
//!
//! let vs = VarStore::new(Device::Cpu);
//! let layer = vs.root().sub("encoder").sub("layer0");
//! let _w = layer.zeros("weight", &[4, 4]);
//! let _b = layer.zeros("bias", &[4]);
//!
//! let names: Vec<_> = vs.variables().into_keys().collect();
//! assert_eq!(names, ["encoder.layer0.bias", "encoder.layer0.weight"]);
//! ```
//!
//! An [`Entry`] gives get-or-create semantics for parameters shared between
//! modules; the registry lock is held from [`Path::entry`] until the entry's
//! single `or_*` call returns.

use std::ops::Div;

use tracing::warn;

use crate::{
    init::Init,
    registry::NamedRegistry,
    store::VarStore,
    sync_compat::MutexGuard,
    tensor::{Device, Tensor},
    var::Var,
};

/// Joins path segments into fully qualified variable names.
pub const SEPARATOR: char = '.';

fn check_name(kind: &str, name: &str) {
    assert!(
        !name.contains(SEPARATOR),
        "{kind} name cannot contain {SEPARATOR}: {name}"
    );
}

/// A namespace inside a [`VarStore`].
#[derive(Debug, Clone)]
pub struct Path<'a> {
    segments: Vec<String>,
    store: &'a VarStore,
}

impl<'a> Path<'a> {
    pub(crate) fn root(store: &'a VarStore) -> Self {
        Self {
            segments: Vec::new(),
            store,
        }
    }

    /// Child path with `segment` appended.
    ///
    /// # Panics
    ///
    /// Panics if `segment` contains [`SEPARATOR`].
    pub fn sub(&self, segment: &str) -> Path<'a> {
        check_name("sub", segment);
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Path {
            segments,
            store: self.store,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn device(&self) -> Device {
        self.store.device()
    }

    /// Fully qualified name of `leaf` under this path.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` contains [`SEPARATOR`].
    pub fn resolve(&self, leaf: &str) -> String {
        check_name("variable", leaf);
        let mut name = String::new();
        for segment in &self.segments {
            name.push_str(segment);
            name.push(SEPARATOR);
        }
        name.push_str(leaf);
        name
    }

    fn add(&self, leaf: &str, tensor: Tensor, trainable: bool) -> Var {
        let name = self.resolve(leaf);
        let var = Var::new(tensor, trainable);
        self.store.registry().insert(name, var.clone());
        var
    }

    /// Register a trainable variable filled according to `init`.
    ///
    /// If the resolved name is already taken the variable is stored under a
    /// fresh `name__N` instead of replacing the existing one.
    pub fn var(&self, leaf: &str, shape: &[usize], init: Init) -> Var {
        let tensor = self.store.materialize(init, shape);
        self.add(leaf, tensor, true)
    }

    /// Non-trainable variable filled with zeros.
    pub fn zeros_no_train(&self, leaf: &str, shape: &[usize]) -> Var {
        self.add(leaf, Tensor::zeros(shape), false)
    }

    /// Non-trainable variable filled with ones.
    pub fn ones_no_train(&self, leaf: &str, shape: &[usize]) -> Var {
        self.add(leaf, Tensor::ones(shape), false)
    }

    pub fn zeros(&self, leaf: &str, shape: &[usize]) -> Var {
        self.var(leaf, shape, Init::ZEROS)
    }

    pub fn ones(&self, leaf: &str, shape: &[usize]) -> Var {
        self.var(leaf, shape, Init::ONES)
    }

    pub fn randn_standard(&self, leaf: &str, shape: &[usize]) -> Var {
        self.var(leaf, shape, Init::STANDARD_NORMAL)
    }

    pub fn randn(&self, leaf: &str, shape: &[usize], mean: f64, stdev: f64) -> Var {
        self.var(leaf, shape, Init::Randn { mean, stdev })
    }

    pub fn uniform(&self, leaf: &str, shape: &[usize], lo: f64, up: f64) -> Var {
        self.var(leaf, shape, Init::Uniform { lo, up })
    }

    pub fn kaiming_uniform(&self, leaf: &str, shape: &[usize]) -> Var {
        self.var(leaf, shape, Init::KaimingUniform)
    }

    /// Trainable zero-filled variable with the shape of `source`.
    ///
    /// Content is not copied; follow up with [`Var::copy_from`] if needed.
    pub fn var_copy(&self, leaf: &str, source: &Tensor) -> Var {
        self.zeros(leaf, source.shape())
    }

    pub fn get(&self, leaf: &str) -> Option<Var> {
        let name = self.resolve(leaf);
        self.store.registry().lookup(&name)
    }

    /// Lock the registry and bind `leaf` for one get-or-create.
    ///
    /// Do not call other store methods while the returned entry is alive;
    /// the registry lock is not reentrant.
    pub fn entry(&self, leaf: &str) -> Entry<'a> {
        let name = self.resolve(leaf);
        Entry {
            name,
            store: self.store,
            registry: self.store.registry(),
        }
    }
}

impl<'a, S: AsRef<str>> Div<S> for &Path<'a> {
    type Output = Path<'a>;

    fn div(self, segment: S) -> Path<'a> {
        self.sub(segment.as_ref())
    }
}

impl<'a, S: AsRef<str>> Div<S> for Path<'a> {
    type Output = Path<'a>;

    fn div(self, segment: S) -> Path<'a> {
        self.sub(segment.as_ref())
    }
}

/// A resolved name with the registry lock held.
///
/// Each `or_*` method consumes the entry, returning the variable already
/// registered under the name or creating it. Concurrent entries for the same
/// name serialize on the lock, so exactly one of them creates the variable.
pub struct Entry<'a> {
    name: String,
    store: &'a VarStore,
    registry: MutexGuard<'a, NamedRegistry>,
}

impl<'a> Entry<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn get_or_add(self, shape: &[usize], trainable: bool, make: impl FnOnce() -> Tensor) -> Var {
        let Entry {
            name,
            store: _,
            mut registry,
        } = self;
        let (var, created) = registry.get_or_insert_with(&name, || Var::new(make(), trainable));
        if !created && var.shape() != shape {
            warn!(
                name = %name,
                existing = ?var.shape(),
                requested = ?shape,
                "entry already holds a variable of a different shape"
            );
        }
        var
    }

    pub fn or_var(self, shape: &[usize], init: Init) -> Var {
        let store = self.store;
        self.get_or_add(shape, true, || store.materialize(init, shape))
    }

    pub fn or_zeros(self, shape: &[usize]) -> Var {
        self.or_var(shape, Init::ZEROS)
    }

    pub fn or_ones(self, shape: &[usize]) -> Var {
        self.or_var(shape, Init::ONES)
    }

    pub fn or_randn_standard(self, shape: &[usize]) -> Var {
        self.or_var(shape, Init::STANDARD_NORMAL)
    }

    pub fn or_randn(self, shape: &[usize], mean: f64, stdev: f64) -> Var {
        self.or_var(shape, Init::Randn { mean, stdev })
    }

    pub fn or_uniform(self, shape: &[usize], lo: f64, up: f64) -> Var {
        self.or_var(shape, Init::Uniform { lo, up })
    }

    pub fn or_kaiming_uniform(self, shape: &[usize]) -> Var {
        self.or_var(shape, Init::KaimingUniform)
    }

    /// Existing variable, or a trainable zero-filled one shaped like `source`.
    /// Content is never copied.
    pub fn or_var_copy(self, source: &Tensor) -> Var {
        self.or_zeros(source.shape())
    }

    pub fn or_zeros_no_train(self, shape: &[usize]) -> Var {
        self.get_or_add(shape, false, || Tensor::zeros(shape))
    }

    pub fn or_ones_no_train(self, shape: &[usize]) -> Var {
        self.get_or_add(shape, false, || Tensor::ones(shape))
    }
}
