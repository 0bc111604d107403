// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Snapshot encoding for named tensors.
//!
//! The default [`BincodeCodec`] format:
//!
//! ```text
//! SnapshotHeader { magic: b"NVAR", version: u32, entry_count: u64 }
//! BTreeMap<String, Tensor>      (name-sorted, so output is reproducible)
//! ```
//!
//! Both parts are written as one bincode value. Decoding validates the magic,
//! the version and the declared entry count. Each tensor's buffer length is
//! checked by [`Tensor`]'s own deserializer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{SnapshotError, SnapshotResult},
    tensor::Tensor,
};

const MAGIC: [u8; 4] = *b"NVAR";

const CURRENT_VERSION: u32 = 1;

/// Converts between a name-keyed tensor map and bytes.
pub trait Codec: Send + Sync {
    fn encode(&self, tensors: &BTreeMap<String, Tensor>) -> SnapshotResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> SnapshotResult<BTreeMap<String, Tensor>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub entry_count: u64,
}

impl SnapshotHeader {
    pub const fn new(entry_count: u64) -> Self {
        Self {
            magic: MAGIC,
            version: CURRENT_VERSION,
            entry_count,
        }
    }

    pub fn validate(&self) -> SnapshotResult<()> {
        if self.magic != MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        if self.version != CURRENT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    header: SnapshotHeader,
    tensors: &'a BTreeMap<String, Tensor>,
}

#[derive(Deserialize)]
struct SnapshotOwned {
    header: SnapshotHeader,
    tensors: BTreeMap<String, Tensor>,
}

/// Default codec: header plus bincode-encoded tensor map.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, tensors: &BTreeMap<String, Tensor>) -> SnapshotResult<Vec<u8>> {
        let snapshot = SnapshotRef {
            header: SnapshotHeader::new(tensors.len() as u64),
            tensors,
        };
        bincode::serialize(&snapshot).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SnapshotResult<BTreeMap<String, Tensor>> {
        // Check the header on its own first so a foreign file reports bad
        // magic rather than a generic decode failure.
        let header: SnapshotHeader = bincode::deserialize(bytes)?;
        header.validate()?;

        let snapshot: SnapshotOwned = bincode::deserialize(bytes)?;
        let found = snapshot.tensors.len() as u64;
        if found != snapshot.header.entry_count {
            return Err(SnapshotError::EntryCountMismatch {
                declared: snapshot.header.entry_count,
                found,
            });
        }

        Ok(snapshot.tensors)
    }
}
