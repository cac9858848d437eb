//! Golden artifacts: one binary file per test case holding the case's inputs
//! and expected outputs.
//!
//! Layout:
//!
//! ```text
//! magic (8 bytes) | manifest length (u32 LE) | manifest (JSON) | payload
//! ```
//!
//! The manifest lists every slot of the input list and then the output list
//! with its kind, dtype, shape and byte range in the payload, plus the payload
//! length and SHA-256. The payload holds raw little-endian elements. Writes
//! are not atomic: a reader racing a writer of the same case can observe a
//! partial file.

use ox_core::{DType, Literal, Shape, TensorValue, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const GOLDEN_MAGIC: &[u8; 8] = b"OXGOLD\x00\x01";
pub const GOLDEN_SCHEMA_VERSION: &str = "ox.golden.v1";
pub const GOLDEN_EXTENSION: &str = "golden";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub dtype: DType,
    pub dims: Vec<u32>,
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotRecord {
    Tensor { tensor: TensorRecord },
    Sequence { items: Vec<TensorRecord> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenManifest {
    pub schema_version: String,
    pub inputs: Vec<SlotRecord>,
    pub outputs: Vec<SlotRecord>,
    pub payload_len: u64,
    pub payload_sha256_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldenData {
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
}

#[derive(Debug)]
pub enum GoldenError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Decode(String),
    Integrity {
        expected_sha256_hex: String,
        actual_sha256_hex: String,
    },
}

impl std::fmt::Display for GoldenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "golden artifact io error at {}: {source}", path.display())
            }
            Self::Decode(detail) => write!(f, "golden artifact decode error: {detail}"),
            Self::Integrity {
                expected_sha256_hex,
                actual_sha256_hex,
            } => write!(
                f,
                "golden payload digest mismatch: manifest {expected_sha256_hex}, payload {actual_sha256_hex}"
            ),
        }
    }
}

impl std::error::Error for GoldenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Golden artifacts rooted at one directory, keyed by case name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldenStore {
    root: PathBuf,
}

impl GoldenStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn path_for(&self, case_name: &str) -> PathBuf {
        self.root.join(format!("{case_name}.{GOLDEN_EXTENSION}"))
    }

    pub fn save(
        &self,
        case_name: &str,
        inputs: &[Value],
        outputs: &[Value],
    ) -> Result<GoldenManifest, GoldenError> {
        save(&self.path_for(case_name), inputs, outputs)
    }

    pub fn load(&self, case_name: &str) -> Result<GoldenData, GoldenError> {
        load(&self.path_for(case_name))
    }
}

/// Writes `inputs` then `outputs` to `path`, replacing any existing artifact.
pub fn save(path: &Path, inputs: &[Value], outputs: &[Value]) -> Result<GoldenManifest, GoldenError> {
    let (bytes, manifest) = encode(inputs, outputs)?;
    let io_err = |source| GoldenError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, bytes).map_err(io_err)?;
    tracing::info!(
        path = %path.display(),
        inputs = inputs.len(),
        outputs = outputs.len(),
        payload_len = manifest.payload_len,
        "saved golden artifact"
    );
    Ok(manifest)
}

pub fn load(path: &Path) -> Result<GoldenData, GoldenError> {
    let bytes = fs::read(path).map_err(|source| GoldenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let data = decode(&bytes)?;
    tracing::info!(
        path = %path.display(),
        inputs = data.inputs.len(),
        outputs = data.outputs.len(),
        "loaded golden artifact"
    );
    Ok(data)
}

pub fn encode(inputs: &[Value], outputs: &[Value]) -> Result<(Vec<u8>, GoldenManifest), GoldenError> {
    let mut payload = Vec::new();
    let input_records = inputs
        .iter()
        .map(|value| encode_slot(value, &mut payload))
        .collect::<Vec<_>>();
    let output_records = outputs
        .iter()
        .map(|value| encode_slot(value, &mut payload))
        .collect::<Vec<_>>();

    let manifest = GoldenManifest {
        schema_version: GOLDEN_SCHEMA_VERSION.to_owned(),
        inputs: input_records,
        outputs: output_records,
        payload_len: payload.len() as u64,
        payload_sha256_hex: sha256_hex(&payload),
    };
    let manifest_json = serde_json::to_vec(&manifest)
        .map_err(|err| GoldenError::Decode(format!("manifest encode failed: {err}")))?;
    let manifest_len = u32::try_from(manifest_json.len())
        .map_err(|_| GoldenError::Decode("manifest exceeds u32 length".to_owned()))?;

    let mut bytes = Vec::with_capacity(GOLDEN_MAGIC.len() + 4 + manifest_json.len() + payload.len());
    bytes.extend_from_slice(GOLDEN_MAGIC);
    bytes.extend_from_slice(&manifest_len.to_le_bytes());
    bytes.extend_from_slice(&manifest_json);
    bytes.extend_from_slice(&payload);
    Ok((bytes, manifest))
}

pub fn decode(bytes: &[u8]) -> Result<GoldenData, GoldenError> {
    let header_len = GOLDEN_MAGIC.len() + 4;
    if bytes.len() < header_len {
        return Err(GoldenError::Decode(format!(
            "artifact is {} bytes, shorter than the {header_len}-byte header",
            bytes.len()
        )));
    }
    if &bytes[..GOLDEN_MAGIC.len()] != GOLDEN_MAGIC {
        return Err(GoldenError::Decode("bad magic".to_owned()));
    }
    let mut len_bytes = [0_u8; 4];
    len_bytes.copy_from_slice(&bytes[GOLDEN_MAGIC.len()..header_len]);
    let manifest_len = u32::from_le_bytes(len_bytes) as usize;
    let manifest_end = header_len
        .checked_add(manifest_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| GoldenError::Decode("manifest extends past end of artifact".to_owned()))?;

    let manifest: GoldenManifest = serde_json::from_slice(&bytes[header_len..manifest_end])
        .map_err(|err| GoldenError::Decode(format!("manifest parse failed: {err}")))?;
    if manifest.schema_version != GOLDEN_SCHEMA_VERSION {
        return Err(GoldenError::Decode(format!(
            "unsupported schema version {}",
            manifest.schema_version
        )));
    }

    let payload = &bytes[manifest_end..];
    if payload.len() as u64 != manifest.payload_len {
        return Err(GoldenError::Decode(format!(
            "payload is {} bytes, manifest declares {}",
            payload.len(),
            manifest.payload_len
        )));
    }
    let actual_sha256_hex = sha256_hex(payload);
    if actual_sha256_hex != manifest.payload_sha256_hex {
        return Err(GoldenError::Integrity {
            expected_sha256_hex: manifest.payload_sha256_hex,
            actual_sha256_hex,
        });
    }

    let inputs = manifest
        .inputs
        .iter()
        .map(|record| decode_slot(record, payload))
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = manifest
        .outputs
        .iter()
        .map(|record| decode_slot(record, payload))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GoldenData { inputs, outputs })
}

fn encode_slot(value: &Value, payload: &mut Vec<u8>) -> SlotRecord {
    match value {
        Value::Tensor(tensor) => SlotRecord::Tensor {
            tensor: encode_tensor(tensor, payload),
        },
        Value::Sequence(items) => SlotRecord::Sequence {
            items: items
                .iter()
                .map(|tensor| encode_tensor(tensor, payload))
                .collect(),
        },
    }
}

fn encode_tensor(tensor: &TensorValue, payload: &mut Vec<u8>) -> TensorRecord {
    let offset = payload.len() as u64;
    for lit in &tensor.elements {
        encode_literal(*lit, tensor.dtype, payload);
    }
    TensorRecord {
        dtype: tensor.dtype,
        dims: tensor.shape.dims.clone(),
        offset,
        len: payload.len() as u64 - offset,
    }
}

fn encode_literal(lit: Literal, dtype: DType, out: &mut Vec<u8>) {
    let int = lit.as_i128().unwrap_or_default();
    match dtype {
        DType::F32 => out.extend_from_slice(&(lit.as_f64() as f32).to_le_bytes()),
        DType::F64 => out.extend_from_slice(&lit.as_f64().to_le_bytes()),
        DType::I8 => out.extend_from_slice(&(int as i8).to_le_bytes()),
        DType::I16 => out.extend_from_slice(&(int as i16).to_le_bytes()),
        DType::I32 => out.extend_from_slice(&(int as i32).to_le_bytes()),
        DType::I64 => out.extend_from_slice(&(int as i64).to_le_bytes()),
        DType::U8 => out.extend_from_slice(&(int as u8).to_le_bytes()),
        DType::U16 => out.extend_from_slice(&(int as u16).to_le_bytes()),
        DType::U32 => out.extend_from_slice(&(int as u32).to_le_bytes()),
        DType::U64 => out.extend_from_slice(&(int as u64).to_le_bytes()),
        DType::Bool => out.push(u8::from(lit.is_truthy())),
    }
}

fn decode_slot(record: &SlotRecord, payload: &[u8]) -> Result<Value, GoldenError> {
    match record {
        SlotRecord::Tensor { tensor } => decode_tensor(tensor, payload).map(Value::Tensor),
        SlotRecord::Sequence { items } => items
            .iter()
            .map(|item| decode_tensor(item, payload))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
    }
}

fn decode_tensor(record: &TensorRecord, payload: &[u8]) -> Result<TensorValue, GoldenError> {
    let shape = Shape {
        dims: record.dims.clone(),
    };
    let count = shape
        .element_count()
        .ok_or_else(|| GoldenError::Decode(format!("shape {shape} overflows")))?;
    let width = record.dtype.size_bytes() as u64;
    let expected_len = count
        .checked_mul(width)
        .ok_or_else(|| GoldenError::Decode(format!("shape {shape} overflows")))?;
    if expected_len != record.len {
        return Err(GoldenError::Decode(format!(
            "{} tensor of shape {shape} needs {expected_len} bytes, record holds {}",
            record.dtype, record.len
        )));
    }
    let bytes = usize::try_from(record.offset)
        .ok()
        .zip(usize::try_from(record.len).ok())
        .and_then(|(start, len)| payload.get(start..start.checked_add(len)?))
        .ok_or_else(|| {
            GoldenError::Decode(format!(
                "tensor byte range {}+{} lies outside the payload",
                record.offset, record.len
            ))
        })?;

    let elements = bytes
        .chunks_exact(record.dtype.size_bytes())
        .map(|chunk| decode_literal(chunk, record.dtype))
        .collect::<Result<Vec<_>, _>>()?;
    TensorValue::new(record.dtype, shape, elements)
        .map_err(|err| GoldenError::Decode(format!("invalid tensor: {err}")))
}

fn decode_literal(chunk: &[u8], dtype: DType) -> Result<Literal, GoldenError> {
    fn array<const N: usize>(chunk: &[u8]) -> Result<[u8; N], GoldenError> {
        chunk
            .try_into()
            .map_err(|_| GoldenError::Decode(format!("expected {N} bytes, got {}", chunk.len())))
    }

    Ok(match dtype {
        DType::F32 => Literal::from_f32(f32::from_le_bytes(array(chunk)?)),
        DType::F64 => Literal::from_f64(f64::from_le_bytes(array(chunk)?)),
        DType::I8 => Literal::I64(i64::from(i8::from_le_bytes(array(chunk)?))),
        DType::I16 => Literal::I64(i64::from(i16::from_le_bytes(array(chunk)?))),
        DType::I32 => Literal::I64(i64::from(i32::from_le_bytes(array(chunk)?))),
        DType::I64 => Literal::I64(i64::from_le_bytes(array(chunk)?)),
        DType::U8 => Literal::U64(u64::from(u8::from_le_bytes(array(chunk)?))),
        DType::U16 => Literal::U64(u64::from(u16::from_le_bytes(array(chunk)?))),
        DType::U32 => Literal::U64(u64::from(u32::from_le_bytes(array(chunk)?))),
        DType::U64 => Literal::U64(u64::from_le_bytes(array(chunk)?)),
        DType::Bool => match chunk {
            [0] => Literal::Bool(false),
            [1] => Literal::Bool(true),
            other => {
                return Err(GoldenError::Decode(format!(
                    "invalid bool byte {other:?}"
                )));
            }
        },
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{GOLDEN_MAGIC, GoldenData, GoldenError, GoldenStore, decode, encode, load};
    use ox_core::{DType, TensorValue, Value};

    fn sample_values() -> (Vec<Value>, Vec<Value>) {
        let x = TensorValue::from_f32(&[2, 2], &[0.5, -1.0, 3.25, 1e-3]).expect("tensor");
        let seq = vec![
            TensorValue::from_i64(DType::I8, &[3], &[-128, 0, 127]).expect("tensor"),
            TensorValue::from_u64(DType::U16, &[0], &[]).expect("tensor"),
        ];
        let flags = TensorValue::from_bool(&[3], &[true, false, true]).expect("tensor");
        (
            vec![Value::Tensor(x), Value::Sequence(seq), Value::Sequence(Vec::new())],
            vec![Value::Tensor(flags)],
        )
    }

    #[test]
    fn store_round_trips_mixed_slots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldenStore::new(dir.path().join("nested"));
        let (inputs, outputs) = sample_values();
        store.save("mixed", &inputs, &outputs).expect("save should succeed");
        assert!(store.path_for("mixed").ends_with("nested/mixed.golden"));

        let loaded = store.load("mixed").expect("load should succeed");
        assert_eq!(loaded, GoldenData { inputs, outputs });
    }

    #[test]
    fn save_overwrites_existing_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldenStore::new(dir.path());
        let (inputs, outputs) = sample_values();
        store.save("case", &inputs, &outputs).expect("first save");
        store.save("case", &outputs, &[]).expect("second save");
        let loaded = store.load("case").expect("load");
        assert_eq!(loaded.inputs, outputs);
        assert!(loaded.outputs.is_empty());
    }

    #[test]
    fn missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(&dir.path().join("absent.golden")).expect_err("should fail");
        assert!(matches!(err, GoldenError::Io { .. }));
    }

    #[test]
    fn bad_magic_is_decode_error() {
        let (inputs, outputs) = sample_values();
        let (mut bytes, _) = encode(&inputs, &outputs).expect("encode");
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(GoldenError::Decode(_))));
    }

    #[test]
    fn truncated_artifact_is_decode_error() {
        let (inputs, outputs) = sample_values();
        let (bytes, _) = encode(&inputs, &outputs).expect("encode");
        assert!(matches!(decode(&bytes[..5]), Err(GoldenError::Decode(_))));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(GoldenError::Decode(_))
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_integrity() {
        let (inputs, outputs) = sample_values();
        let (mut bytes, _) = encode(&inputs, &outputs).expect("encode");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(GoldenError::Integrity { .. })));
    }

    #[test]
    fn manifest_records_slot_kinds_in_order() {
        let (inputs, outputs) = sample_values();
        let (bytes, manifest) = encode(&inputs, &outputs).expect("encode");
        assert!(bytes.starts_with(GOLDEN_MAGIC));
        assert_eq!(manifest.inputs.len(), 3);
        assert_eq!(manifest.outputs.len(), 1);
        // 4 f32 + 3 i8 + 0 u16 + 3 bool
        assert_eq!(manifest.payload_len, 16 + 3 + 3);
    }
}
