// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path as FsPath,
};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument, warn};

use crate::{
    codec::{BincodeCodec, Codec},
    error::{Result, VarStoreError},
    init::Init,
    path::Path,
    registry::NamedRegistry,
    sync_compat::{Mutex, MutexGuard},
    tensor::{Device, Tensor},
    var::Var,
    VarStoreConfig,
};

/// Owner of a set of named variables.
///
/// All registration goes through [`Path`]s obtained from [`VarStore::root`].
/// One mutex guards the name table; a second one guards the RNG used by the
/// random initializers. When both are needed the registry lock is taken
/// first.
pub struct VarStore {
    registry: Mutex<NamedRegistry>,
    rng: Mutex<ChaCha8Rng>,
    device: Device,
}

impl VarStore {
    /// Store on `device` with an entropy-seeded RNG.
    pub fn new(device: Device) -> Self {
        Self::with_config(VarStoreConfig::new().with_device(device))
    }

    pub fn with_config(config: VarStoreConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::with_rng(config.device, rng)
    }

    /// Store drawing its random initializations from `rng`.
    pub fn with_rng(device: Device, rng: ChaCha8Rng) -> Self {
        Self {
            registry: Mutex::new(NamedRegistry::new()),
            rng: Mutex::new(rng),
            device,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn root(&self) -> Path<'_> {
        Path::root(self)
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    /// Trainable variables in registration order.
    pub fn trainable_variables(&self) -> Vec<Var> {
        self.registry().trainable()
    }

    /// Every registered variable keyed by its fully qualified name.
    pub fn variables(&self) -> BTreeMap<String, Var> {
        self.registry().snapshot()
    }

    /// Stop tracking gradients for every registered variable.
    pub fn freeze(&self) {
        let registry = self.registry();
        for var in registry.vars() {
            var.set_requires_grad(false);
        }
        debug!(count = registry.len(), "froze variables");
    }

    /// Resume gradient tracking: every variable goes back to tracking exactly
    /// when it was registered as trainable.
    pub fn unfreeze(&self) {
        let registry = self.registry();
        for var in registry.vars() {
            var.set_requires_grad(var.is_trainable());
        }
        debug!(count = registry.len(), "unfroze variables");
    }

    /// Write every variable to `path` with the default codec.
    pub fn save<P: AsRef<FsPath>>(&self, path: P) -> Result<()> {
        self.save_with(path, &BincodeCodec)
    }

    pub fn save_with<P: AsRef<FsPath>>(&self, path: P, codec: &dyn Codec) -> Result<()> {
        self.save_file(path.as_ref(), codec)
    }

    #[instrument(skip(self, path, codec), fields(path = %path.display()))]
    fn save_file(&self, path: &FsPath, codec: &dyn Codec) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let count = self.save_to_writer(&mut writer, codec)?;
        writer.flush()?;
        info!(variables = count, "saved var store");
        Ok(())
    }

    /// Encode every variable into `writer`. Returns the number written.
    pub fn save_to_writer<W: Write>(&self, writer: &mut W, codec: &dyn Codec) -> Result<usize> {
        let registry = self.registry();
        let tensors: BTreeMap<String, Tensor> = registry
            .snapshot()
            .into_iter()
            .map(|(name, var)| (name, var.to_tensor()))
            .collect();
        let bytes = codec.encode(&tensors)?;
        writer.write_all(&bytes)?;
        Ok(tensors.len())
    }

    /// Replace the content of every registered variable with the values in
    /// `path`. The set of registered names is not changed.
    ///
    /// Every registered name must be present in the file with the same shape.
    /// Names are checked in sorted order and the first missing one is
    /// reported; nothing is modified unless all of them match.
    pub fn load<P: AsRef<FsPath>>(&self, path: P) -> Result<()> {
        self.load_with(path, &BincodeCodec)
    }

    pub fn load_with<P: AsRef<FsPath>>(&self, path: P, codec: &dyn Codec) -> Result<()> {
        let path = path.as_ref();
        let tensors = read_snapshot(path, codec)?;
        self.apply_all(&tensors, &path.display().to_string())
    }

    pub fn load_from_reader<R: Read>(&self, reader: &mut R, codec: &dyn Codec) -> Result<()> {
        let tensors = decode_reader(reader, codec)?;
        self.apply_all(&tensors, "reader")
    }

    /// Like [`load`](Self::load), but registered names absent from `path` are
    /// left untouched. Returns the skipped names, sorted.
    pub fn load_partial<P: AsRef<FsPath>>(&self, path: P) -> Result<Vec<String>> {
        self.load_partial_with(path, &BincodeCodec)
    }

    pub fn load_partial_with<P: AsRef<FsPath>>(
        &self,
        path: P,
        codec: &dyn Codec,
    ) -> Result<Vec<String>> {
        let tensors = read_snapshot(path.as_ref(), codec)?;
        self.apply_present(&tensors)
    }

    pub fn load_partial_from_reader<R: Read>(
        &self,
        reader: &mut R,
        codec: &dyn Codec,
    ) -> Result<Vec<String>> {
        let tensors = decode_reader(reader, codec)?;
        self.apply_present(&tensors)
    }

    #[instrument(skip(self, tensors), fields(available = tensors.len()))]
    fn apply_all(&self, tensors: &BTreeMap<String, Tensor>, origin: &str) -> Result<()> {
        let registry = self.registry();
        let vars = registry.snapshot();
        for (name, var) in &vars {
            let Some(tensor) = tensors.get(name) else {
                return Err(VarStoreError::MissingVariable {
                    name: name.clone(),
                    origin: origin.to_string(),
                });
            };
            check_shape(name, var, tensor.shape())?;
        }
        for (name, var) in &vars {
            var.copy_from(&tensors[name]);
        }
        info!(variables = vars.len(), "loaded var store");
        Ok(())
    }

    #[instrument(skip(self, tensors), fields(available = tensors.len()))]
    fn apply_present(&self, tensors: &BTreeMap<String, Tensor>) -> Result<Vec<String>> {
        let registry = self.registry();
        let vars = registry.snapshot();
        let mut skipped = Vec::new();
        for (name, var) in &vars {
            match tensors.get(name) {
                Some(tensor) => check_shape(name, var, tensor.shape())?,
                None => skipped.push(name.clone()),
            }
        }
        for (name, var) in &vars {
            if let Some(tensor) = tensors.get(name) {
                var.copy_from(tensor);
            }
        }
        if !skipped.is_empty() {
            warn!(skipped = ?skipped, "variables missing from partial load");
        }
        info!(
            loaded = vars.len() - skipped.len(),
            skipped = skipped.len(),
            "partially loaded var store"
        );
        Ok(skipped)
    }

    /// Copy values from `source` into this store's variables.
    ///
    /// Every variable registered here must exist in `source` with the same
    /// shape. All missing names are reported together, ahead of any shape
    /// mismatch, and nothing is copied unless every name matches. Both registries stay locked for the whole
    /// copy, acquired in address order so opposite-direction copies cannot
    /// deadlock.
    #[instrument(skip_all)]
    pub fn copy_from(&self, source: &VarStore) -> Result<()> {
        if std::ptr::eq(self, source) {
            return Ok(());
        }

        let (dst, src) = lock_pair(self, source);
        let vars = dst.snapshot();

        let mut missing = Vec::new();
        let mut pairs = Vec::with_capacity(vars.len());
        for (name, var) in &vars {
            match src.lookup(name) {
                Some(src_var) => pairs.push((name, var, src_var)),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(VarStoreError::MissingVariables(missing));
        }
        for (name, var, src_var) in &pairs {
            check_shape(name, var, src_var.shape())?;
        }

        for (_, var, src_var) in pairs {
            var.copy_from_var(&src_var);
        }
        info!(variables = vars.len(), "copied var store");
        Ok(())
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, NamedRegistry> {
        self.registry.lock()
    }

    /// Materialize `init`, touching the RNG only for random policies.
    pub(crate) fn materialize(&self, init: Init, shape: &[usize]) -> Tensor {
        match init {
            Init::Const(value) => Tensor::full(shape, value as f32),
            _ => init.materialize(shape, &mut *self.rng.lock()),
        }
    }
}

impl Default for VarStore {
    fn default() -> Self {
        Self::new(Device::Cpu)
    }
}

impl fmt::Debug for VarStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Must not lock: a `Path` is formatted while an `Entry` may hold the
        // registry.
        f.debug_struct("VarStore")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Lock `dst` and `src` in address order. Returns `(dst, src)` guards.
fn lock_pair<'a>(
    dst: &'a VarStore,
    src: &'a VarStore,
) -> (MutexGuard<'a, NamedRegistry>, MutexGuard<'a, NamedRegistry>) {
    let dst_addr = dst as *const VarStore as usize;
    let src_addr = src as *const VarStore as usize;
    if dst_addr < src_addr {
        let d = dst.registry();
        let s = src.registry();
        (d, s)
    } else {
        let s = src.registry();
        let d = dst.registry();
        (d, s)
    }
}

// A `Tensor` always fits its shape, so equal shapes also mean equal buffer
// lengths.
fn check_shape(name: &str, var: &Var, found: &[usize]) -> Result<()> {
    if var.shape() == found {
        Ok(())
    } else {
        Err(VarStoreError::ShapeMismatch {
            name: name.to_string(),
            expected: var.shape().to_vec(),
            found: found.to_vec(),
        })
    }
}

fn read_snapshot(path: &FsPath, codec: &dyn Codec) -> Result<BTreeMap<String, Tensor>> {
    let mut reader = BufReader::new(File::open(path)?);
    decode_reader(&mut reader, codec)
}

fn decode_reader<R: Read>(reader: &mut R, codec: &dyn Codec) -> Result<BTreeMap<String, Tensor>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(codec.decode(&bytes)?)
}
