//! Gzip-framed JSON documents
//!
//! Engine artifacts carry a `.gz` suffix. Readers sniff the gzip magic
//! instead of trusting the suffix, so an uncompressed payload is accepted too.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{ResumeError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True if `bytes` starts with the gzip member header
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Read a whole file, transparently inflating it if gzip-compressed
pub fn read_all(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).map_err(|e| ResumeError::io(path, e))?;
    if !is_gzip(&raw) {
        return Ok(raw);
    }
    let mut inflated = Vec::new();
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| ResumeError::io(path, e))?;
    Ok(inflated)
}

/// Deserialize a (possibly gzip-compressed) JSON document
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = read_all(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ResumeError::Config(format!("{}: {}", path.display(), e)))
}

/// Serialize `value` as gzip-compressed JSON at `path`
pub fn dump_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| ResumeError::io(path, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, value)
        .map_err(|e| ResumeError::io(path, std::io::Error::from(e)))?;
    let mut writer = encoder.finish().map_err(|e| ResumeError::io(path, e))?;
    writer.flush().map_err(|e| ResumeError::io(path, e))?;
    Ok(())
}
