// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Binary model format
//!
//! A saved model is a fixed 24-byte header followed by a postcard payload
//! holding the complete [`SentimentModel`].
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("SNTM")
//! 4       1     Version major
//! 5       1     Version minor
//! 6       2     Reserved
//! 8       4     Payload size (bytes, little-endian)
//! 12      4     CRC32 of the payload
//! 16      4     Feature dimension
//! 20      4     Reserved
//! ```
//!
//! Decoding never returns a model that failed its structural checks.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::error::{Error, Result};
use crate::pipeline::SentimentModel;

pub const MAGIC: &[u8; 4] = b"SNTM";
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const HEADER_SIZE: usize = 24;

/// Problems with a serialized model
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a sentiment model (bad magic bytes)")]
    NotAModel,

    #[error("unsupported model format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("model truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("encoding error: {0}")]
    Encoding(#[source] postcard::Error),

    #[error("decoding error: {0}")]
    Decoding(#[source] postcard::Error),

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    major: u8,
    minor: u8,
    payload_size: u32,
    checksum: u32,
    n_features: u32,
}

impl Header {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.major;
        buf[5] = self.minor;
        buf[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf[16..20].copy_from_slice(&self.n_features.to_le_bytes());
        buf
    }

    fn parse(bytes: &[u8]) -> std::result::Result<Self, FormatError> {
        if bytes.len() < MAGIC.len() || &bytes[0..4] != MAGIC {
            return Err(FormatError::NotAModel);
        }
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let (major, minor) = (bytes[4], bytes[5]);
        if major != VERSION_MAJOR {
            return Err(FormatError::UnsupportedVersion { major, minor });
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Ok(Self {
            major,
            minor,
            payload_size: word(8),
            checksum: word(12),
            n_features: word(16),
        })
    }
}

/// Serialize a fitted model
pub fn to_bytes(model: &SentimentModel) -> std::result::Result<Vec<u8>, FormatError> {
    let payload = postcard::to_allocvec(model).map_err(FormatError::Encoding)?;
    let payload_size = u32::try_from(payload.len())
        .map_err(|_| FormatError::CorruptPayload("payload exceeds 4 GiB".to_string()))?;
    let n_features = u32::try_from(model.dimension())
        .map_err(|_| FormatError::CorruptPayload("feature dimension exceeds u32".to_string()))?;

    let header = Header {
        major: VERSION_MAJOR,
        minor: VERSION_MINOR,
        payload_size,
        checksum: crc32fast::hash(&payload),
        n_features,
    };

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize and structurally validate a model
pub fn from_bytes(bytes: &[u8]) -> std::result::Result<SentimentModel, FormatError> {
    let header = Header::parse(bytes)?;
    let expected = HEADER_SIZE + header.payload_size as usize;
    if bytes.len() < expected {
        return Err(FormatError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(FormatError::CorruptPayload(format!(
            "{} trailing bytes after payload",
            bytes.len() - expected
        )));
    }

    let payload = &bytes[HEADER_SIZE..];
    let actual = crc32fast::hash(payload);
    if actual != header.checksum {
        return Err(FormatError::ChecksumMismatch {
            expected: header.checksum,
            actual,
        });
    }

    let (model, rest): (SentimentModel, &[u8]) =
        postcard::take_from_bytes(payload).map_err(FormatError::Decoding)?;
    if !rest.is_empty() {
        return Err(FormatError::CorruptPayload(format!(
            "{} undecoded payload bytes",
            rest.len()
        )));
    }
    model.validate().map_err(FormatError::CorruptPayload)?;
    if model.dimension() != header.n_features as usize {
        return Err(FormatError::CorruptPayload(format!(
            "header declares {} features, payload has {}",
            header.n_features,
            model.dimension()
        )));
    }
    Ok(model)
}

/// Write a model to `path`, creating parent directories
pub fn save(model: &SentimentModel, path: &Path) -> Result<()> {
    let bytes = to_bytes(model)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, &bytes).map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), bytes = bytes.len(), "Model saved");
    Ok(())
}

/// Read a model from `path`
pub fn load(path: &Path) -> Result<SentimentModel> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let model = from_bytes(&bytes)?;
    info!(
        path = %path.display(),
        bytes = bytes.len(),
        dimension = model.dimension(),
        "Model loaded"
    );
    Ok(model)
}
