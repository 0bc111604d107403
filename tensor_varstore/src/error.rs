// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
use thiserror::Error;

/// Failures while reading or writing a variable snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot header declares {declared} entries but {found} were decoded")]
    EntryCountMismatch { declared: u64, found: u64 },

    #[error("buffer of {len} elements does not fit shape {shape:?}")]
    InvalidTensor { shape: Vec<usize>, len: usize },
}

impl From<bincode::Error> for SnapshotError {
    fn from(e: bincode::Error) -> Self {
        SnapshotError::Deserialization(e.to_string())
    }
}

/// Errors returned by whole-store operations.
#[derive(Error, Debug)]
pub enum VarStoreError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("cannot find {name} in {origin}")]
    MissingVariable { name: String, origin: String },

    #[error("cannot find {} in the source var store", .0.join(", "))]
    MissingVariables(Vec<String>),

    #[error("shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl VarStoreError {
    /// Whether the failure came from I/O or the codec rather than from the
    /// registered variable set.
    pub fn is_persistence(&self) -> bool {
        matches!(self, VarStoreError::Snapshot(_))
    }
}

impl From<std::io::Error> for VarStoreError {
    fn from(e: std::io::Error) -> Self {
        VarStoreError::Snapshot(SnapshotError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, VarStoreError>;

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;
