// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! The name table behind a [`VarStore`](crate::VarStore).
//!
//! A `NamedRegistry` is never shared on its own: the owning store keeps it
//! behind a single mutex, and every method here assumes the caller holds that
//! guard for the whole compound operation.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::var::Var;

#[derive(Default)]
pub(crate) struct NamedRegistry {
    named: HashMap<String, Var>,
    trainable: Vec<Var>,
}

impl NamedRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `var` under `name`, or under a fresh `name__N` if `name` is
    /// taken. Returns the name actually used.
    pub(crate) fn insert(&mut self, name: String, var: Var) -> String {
        let name = self.unused_name(name);
        if var.is_trainable() {
            self.trainable.push(var.clone());
        }
        debug!(name = %name, shape = ?var.shape(), trainable = var.is_trainable(), "registered variable");
        self.named.insert(name.clone(), var);
        name
    }

    /// Return the variable registered under `name`, creating it with `make`
    /// only if the name is free. The flag is `true` when `make` ran.
    pub(crate) fn get_or_insert_with(
        &mut self,
        name: &str,
        make: impl FnOnce() -> Var,
    ) -> (Var, bool) {
        if let Some(existing) = self.named.get(name) {
            return (existing.clone(), false);
        }
        let var = make();
        self.insert(name.to_string(), var.clone());
        (var, true)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Var> {
        self.named.get(name).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.named.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    pub(crate) fn trainable(&self) -> Vec<Var> {
        self.trainable.clone()
    }

    /// Name-sorted view of every registered variable.
    pub(crate) fn snapshot(&self) -> BTreeMap<String, Var> {
        self.named
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect()
    }

    pub(crate) fn vars(&self) -> impl Iterator<Item = &Var> {
        self.named.values()
    }

    fn unused_name(&self, name: String) -> String {
        if !self.named.contains_key(&name) {
            return name;
        }
        let mut suffix = self.named.len();
        loop {
            let candidate = format!("{name}__{suffix}");
            if !self.named.contains_key(&candidate) {
                debug!(requested = %name, assigned = %candidate, "disambiguated variable name");
                return candidate;
            }
            suffix += 1;
        }
    }
}
