// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Snapshot files on disk: round trips, partial loads and failure modes.

use std::{collections::BTreeMap, fs};

use tempfile::tempdir;
use tensor_varstore::{
    BincodeCodec, Codec, SnapshotError, SnapshotResult, Tensor, VarStore, VarStoreConfig,
    VarStoreError,
};

fn model(seed: u64) -> VarStore {
    let vs = VarStore::with_config(VarStoreConfig::new().with_seed(seed));
    let root = vs.root();
    let enc = root.sub("encoder");
    for layer in 0..2 {
        let l = enc.sub(&format!("layer{layer}"));
        l.kaiming_uniform("weight", &[8, 8]);
        l.uniform("bias", &[8], -0.1, 0.1);
        l.ones_no_train("scale", &[8]);
    }
    root.sub("head").randn("proj", &[8, 3], 0.0, 0.02);
    vs
}

#[test]
fn test_round_trip_reproduces_content() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("model.nvar");

    let src = model(1);
    src.save(&file).unwrap();

    let dst = model(2);
    dst.load(&file).unwrap();

    let src_vars = src.variables();
    let dst_vars = dst.variables();
    assert_eq!(src_vars.len(), dst_vars.len());
    for (name, var) in &src_vars {
        assert_eq!(dst_vars[name].to_tensor(), var.to_tensor(), "{name}");
    }
}

#[test]
fn test_save_is_deterministic() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.nvar");
    let b = dir.path().join("b.nvar");

    let vs = model(3);
    vs.save(&a).unwrap();
    vs.save(&b).unwrap();
    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());

    // Same seed, same registration order, same bytes.
    model(3).save(&b).unwrap();
    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
}

#[test]
fn test_load_partial_leaves_missing_untouched() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("backbone.nvar");

    // Pretrained weights for the encoder only.
    let pretrained = VarStore::with_config(VarStoreConfig::new().with_seed(10));
    let enc = pretrained.root().sub("encoder");
    enc.ones("weight", &[4, 4]);
    enc.ones("bias", &[4]);
    pretrained.save(&file).unwrap();

    let vs = VarStore::with_config(VarStoreConfig::new().with_seed(11));
    let enc = vs.root().sub("encoder");
    let w = enc.zeros("weight", &[4, 4]);
    let b = enc.zeros("bias", &[4]);
    let head = vs.root().sub("head").randn_standard("X", &[4, 2]);
    let head_before = head.to_tensor();

    let skipped = vs.load_partial(&file).unwrap();
    assert_eq!(skipped, vec!["head.X".to_string()]);
    assert_eq!(w.to_tensor(), Tensor::ones(&[4, 4]));
    assert_eq!(b.to_tensor(), Tensor::ones(&[4]));
    assert_eq!(head.to_tensor(), head_before);
    assert_eq!(vs.len(), 3);
}

#[test]
fn test_load_does_not_register_extra_names() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("big.nvar");
    model(4).save(&file).unwrap();

    let vs = VarStore::with_config(VarStoreConfig::new().with_seed(5));
    vs.root().sub("head").zeros("proj", &[8, 3]);
    let skipped = vs.load_partial(&file).unwrap();
    assert!(skipped.is_empty());
    assert_eq!(vs.len(), 1);
}

#[test]
fn test_load_missing_name_fails() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("small.nvar");
    let small = VarStore::with_config(VarStoreConfig::new().with_seed(1));
    small.root().ones("present", &[2]);
    small.save(&file).unwrap();

    let vs = VarStore::with_config(VarStoreConfig::new().with_seed(2));
    let present = vs.root().zeros("present", &[2]);
    vs.root().zeros("absent", &[2]);

    match vs.load(&file) {
        Err(VarStoreError::MissingVariable { name, origin }) => {
            assert_eq!(name, "absent");
            assert!(origin.ends_with("small.nvar"));
        },
        other => panic!("expected missing variable, got {other:?}"),
    }
    assert_eq!(present.to_tensor(), Tensor::zeros(&[2]));
}

#[test]
fn test_corrupt_file_is_persistence_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("corrupt.nvar");
    fs::write(&file, b"definitely not a var store").unwrap();

    let vs = model(1);
    let err = vs.load(&file).unwrap_err();
    assert!(err.is_persistence());
    assert!(matches!(err, VarStoreError::Snapshot(SnapshotError::InvalidMagic)));

    let err = vs.load_partial(&file).unwrap_err();
    assert!(err.is_persistence());
}

#[test]
fn test_save_to_unwritable_path_fails() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("missing_dir").join("model.nvar");
    let err = model(1).save(&file).unwrap_err();
    assert!(matches!(err, VarStoreError::Snapshot(SnapshotError::Io(_))));
}

/// Plain-text codec used to check that the store only talks to `Codec`.
struct LinesCodec;

impl Codec for LinesCodec {
    fn encode(&self, tensors: &BTreeMap<String, Tensor>) -> SnapshotResult<Vec<u8>> {
        let mut out = String::new();
        for (name, t) in tensors {
            let shape: Vec<String> = t.shape().iter().map(ToString::to_string).collect();
            let data: Vec<String> = t.data().iter().map(ToString::to_string).collect();
            out.push_str(&format!("{name}|{}|{}\n", shape.join(","), data.join(",")));
        }
        Ok(out.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> SnapshotResult<BTreeMap<String, Tensor>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SnapshotError::Deserialization(e.to_string()))?;
        let bad = |line: &str| SnapshotError::Deserialization(format!("bad line: {line}"));
        let mut map = BTreeMap::new();
        for line in text.lines() {
            let mut parts = line.split('|');
            let (Some(name), Some(shape), Some(data)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(bad(line));
            };
            let shape: Vec<usize> = shape
                .split(',')
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| bad(line))?;
            let data: Vec<f32> = data
                .split(',')
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| bad(line))?;
            map.insert(name.to_string(), Tensor::try_new(&shape, data)?);
        }
        Ok(map)
    }
}

#[test]
fn test_custom_codec() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("model.txt");

    let src = model(7);
    src.save_with(&file, &LinesCodec).unwrap();
    assert!(fs::read_to_string(&file).unwrap().contains("encoder.layer0.weight|8,8|"));

    let dst = model(8);
    dst.load_with(&file, &LinesCodec).unwrap();
    for (name, var) in src.variables() {
        assert_eq!(dst.variables()[&name].to_tensor(), var.to_tensor());
    }

    // The default codec refuses the text file.
    assert!(dst.load_with(&file, &BincodeCodec).unwrap_err().is_persistence());
}

/// Headerless codec: the tensor map straight through bincode.
struct PlainBincode;

impl Codec for PlainBincode {
    fn encode(&self, tensors: &BTreeMap<String, Tensor>) -> SnapshotResult<Vec<u8>> {
        bincode::serialize(tensors).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SnapshotResult<BTreeMap<String, Tensor>> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[test]
fn test_custom_codec_rejects_oversized_buffer() {
    #[derive(serde::Serialize)]
    struct Wire {
        shape: Vec<usize>,
        data: Vec<f32>,
    }

    let mut wire = BTreeMap::new();
    wire.insert(
        "w".to_string(),
        Wire {
            shape: vec![2],
            data: vec![1.0, 2.0, 3.0],
        },
    );
    let bytes = bincode::serialize(&wire).unwrap();

    let vs = VarStore::with_config(VarStoreConfig::new().with_seed(1));
    let w = vs.root().zeros("w", &[2]);
    let err = vs
        .load_from_reader(&mut bytes.as_slice(), &PlainBincode)
        .unwrap_err();
    assert!(err.is_persistence(), "unexpected error: {err}");
    assert_eq!(w.to_tensor(), Tensor::zeros(&[2]));

    let err = vs
        .load_partial_from_reader(&mut bytes.as_slice(), &PlainBincode)
        .unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(w.to_tensor(), Tensor::zeros(&[2]));
}

#[test]
fn test_lines_codec_rejects_bad_buffer() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("bad.txt");
    fs::write(&file, "w|2|1,2,3\n").unwrap();

    let vs = VarStore::with_config(VarStoreConfig::new().with_seed(1));
    vs.root().zeros("w", &[2]);
    let err = vs.load_with(&file, &LinesCodec).unwrap_err();
    assert!(matches!(
        err,
        VarStoreError::Snapshot(SnapshotError::InvalidTensor { len: 3, .. })
    ));
}

#[test]
fn test_copy_from_round_trip() {
    let src = model(20);
    let dst = model(21);
    dst.copy_from(&src).unwrap();
    for (name, var) in src.variables() {
        assert_eq!(dst.variables()[&name].to_tensor(), var.to_tensor());
    }
}

#[test]
fn test_freeze_then_save_preserves_flags() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("frozen.nvar");
    let vs = model(1);
    let before: Vec<(String, bool)> = vs
        .variables()
        .into_iter()
        .map(|(n, v)| (n, v.requires_grad()))
        .collect();

    vs.freeze();
    assert!(vs.variables().values().all(|v| !v.requires_grad()));
    vs.save(&file).unwrap();
    vs.load(&file).unwrap();
    vs.unfreeze();

    let after: Vec<(String, bool)> = vs
        .variables()
        .into_iter()
        .map(|(n, v)| (n, v.requires_grad()))
        .collect();
    assert_eq!(before, after);
}
