//! On-disk library artifact.
//!
//! ```text
//! [b"MS2L"][schema_version: u16 LE][codec: u8][payload]
//! ```
//!
//! The payload is the bincode (serde, standard config) encoding of the
//! embedding spaces, entries, embedding arena and structure neighbourhood,
//! compressed with the codec named in the header. The HNSW graph is not
//! stored; it is rebuilt when the library is loaded.
use std::fs;
use std::path::Path;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use embedding::EmbeddingSpace;
use serde::{Deserialize, Serialize};
use zstd::{decode_all, encode_all};

use crate::entry::LibraryEntry;
use crate::neighbourhood::StructureNeighbourhood;
use crate::IndexError;

/// Bump this value whenever the artifact payload layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

const MAGIC: &[u8; 4] = b"MS2L";
const HEADER_LEN: usize = MAGIC.len() + 2 + 1;

/// Compression codec options for library artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression.
    #[default]
    Zstd,
}

impl CompressionCodec {
    fn tag(self) -> u8 {
        match self {
            CompressionCodec::None => 0,
            CompressionCodec::Zstd => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, IndexError> {
        match tag {
            0 => Ok(CompressionCodec::None),
            1 => Ok(CompressionCodec::Zstd),
            other => Err(IndexError::Decode(format!("unknown compression codec {other}"))),
        }
    }
}

/// Compression behavior when writing an artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level (1-22, higher = smaller but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }
}

fn decompress(codec: CompressionCodec, data: &[u8]) -> Result<Vec<u8>, IndexError> {
    match codec {
        CompressionCodec::None => Ok(data.to_vec()),
        CompressionCodec::Zstd => {
            decode_all(data).map_err(|e| IndexError::Decode(format!("zstd: {e}")))
        }
    }
}

#[derive(Serialize)]
pub(crate) struct PayloadRef<'a> {
    pub space: &'a EmbeddingSpace,
    pub secondary_space: &'a Option<EmbeddingSpace>,
    pub entries: &'a [LibraryEntry],
    pub vectors: &'a [f32],
    pub neighbourhood: &'a Option<StructureNeighbourhood>,
}

#[derive(Deserialize)]
pub(crate) struct Payload {
    pub space: EmbeddingSpace,
    pub secondary_space: Option<EmbeddingSpace>,
    pub entries: Vec<LibraryEntry>,
    pub vectors: Vec<f32>,
    pub neighbourhood: Option<StructureNeighbourhood>,
}

pub(crate) fn encode(payload: &PayloadRef<'_>, compression: &CompressionConfig) -> Result<Vec<u8>, IndexError> {
    let encoded = encode_to_vec(payload, standard())?;
    let body = compression.compress(&encoded)?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&INDEX_SCHEMA_VERSION.to_le_bytes());
    out.push(compression.codec.tag());
    out.extend_from_slice(&body);
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Payload, IndexError> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(IndexError::Decode("not a spectral library artifact".into()));
    }
    let found = u16::from_le_bytes([bytes[4], bytes[5]]);
    if found != INDEX_SCHEMA_VERSION {
        return Err(IndexError::UnsupportedSchema {
            found,
            expected: INDEX_SCHEMA_VERSION,
        });
    }
    let codec = CompressionCodec::from_tag(bytes[6])?;
    let body = decompress(codec, &bytes[HEADER_LEN..])?;
    let (payload, _) = decode_from_slice(&body, standard())?;
    Ok(payload)
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)?;
    Ok(())
}
