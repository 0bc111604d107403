// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! `TensorVarStore` - Hierarchical Variable Store for Neumann models
//!
//! A thread-safe, name-addressed registry for model parameters:
//! - Hierarchical names built from [`Path`] segments (`encoder.layer0.weight`)
//! - Deterministic disambiguation of colliding names (`w`, `w__1`, ...)
//! - Get-or-create [`Entry`] for parameters shared between modules
//! - Freeze/unfreeze of gradient tracking
//! - Name-keyed snapshots (save, load, partial load) and store-to-store copy
//!
//! # Architecture
//!
//! ```text
//! VarStore
//!   ├── Mutex<NamedRegistry>   name -> Var, trainable vars in creation order
//!   ├── Mutex<ChaCha8Rng>      random initializers
//!   └── Device                 placement, passed through untouched
//! Path<'_>                     segments + &VarStore, creates variables
//! Entry<'_>                    resolved name + held registry guard
//! ```
//!
//! # Quick Start
//!
//! ```
//! use tensor_varstore::{Device, VarStore, VarStoreConfig};
//!
//! let vs = VarStore::with_config(VarStoreConfig::new().with_seed(7));
//! let root = vs.root();
//! let enc = &root / "encoder";
//! let w = enc.kaiming_uniform("weight", &[8, 4]);
//! let tied = enc.entry("weight").or_zeros(&[8, 4]);
//! assert!(w.ptr_eq(&tied));
//! assert_eq!(vs.len(), 1);
//! assert_eq!(vs.device(), Device::Cpu);
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_panics_doc)]

mod codec;
mod error;
mod init;
mod path;
mod registry;
mod store;
mod sync_compat;
mod tensor;
mod var;

pub use codec::{BincodeCodec, Codec, SnapshotHeader};
pub use error::{Result, SnapshotError, SnapshotResult, VarStoreError};
pub use init::{fan_in, kaiming_bound, Init};
pub use path::{Entry, Path, SEPARATOR};
pub use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
pub use store::VarStore;
pub use tensor::{Device, Tensor};
pub use var::Var;

/// Construction options for a [`VarStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarStoreConfig {
    /// Placement descriptor handed to every path of the store.
    pub device: Device,
    /// Seed for the initializer RNG. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl VarStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Make random initialization reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
