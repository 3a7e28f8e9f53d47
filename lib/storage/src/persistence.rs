//! On-disk formats for the segment directory.
//!
//! The config is human-readable JSON; everything else is a gzip-compressed
//! bincode snapshot wrapped in a small envelope (magic, version, sha256 of
//! the compressed body). Files are written atomically via write-then-rename.

use anyhow::{anyhow, bail, Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use segx_core::SegmentConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::Path;

pub const CONFIG_FILE: &str = "segment.json";
pub const VECTOR_INDEX_FILE: &str = "vector_index.bin";
pub const PAYLOAD_FILE: &str = "payload.bin";
pub const PAYLOAD_INDEX_FILE: &str = "payload_index.bin";
pub const WAL_FILE: &str = "segment.wal";
pub const LOCK_FILE: &str = ".segment.lock";

const SNAPSHOT_MAGIC: &[u8; 4] = b"SGXS";
const SNAPSHOT_VERSION: u8 = 1;
const SHA256_LEN: usize = 32;

/// Config as persisted in `segment.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConfig {
    pub created_at: DateTime<Utc>,
    pub config: SegmentConfig,
}

impl StoredConfig {
    #[must_use]
    pub fn new(config: SegmentConfig) -> Self {
        Self {
            created_at: Utc::now(),
            config,
        }
    }
}

pub fn write_config(dir: &Path, stored: &StoredConfig) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(stored)?;
    atomic_write(&dir.join(CONFIG_FILE), &bytes)
}

/// Read the stored config, `None` when the directory holds no segment yet.
pub fn read_config(dir: &Path) -> Result<Option<StoredConfig>> {
    let path = dir.join(CONFIG_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let stored = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(stored))
}

/// Write a snapshot file: envelope + gzip(bincode(value)).
pub fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = bincode::serialize(value)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    let checksum = Sha256::digest(&compressed);

    let mut out = Vec::with_capacity(compressed.len() + SHA256_LEN + 5);
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.push(SNAPSHOT_VERSION);
    out.extend_from_slice(&checksum);
    out.extend_from_slice(&compressed);

    atomic_write(path, &out)
}

/// Read a snapshot file back. `None` when the file does not exist; any
/// envelope or checksum problem is an error (the caller maps it to
/// `Corruption`).
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };

    if bytes.len() < 4 + 1 + SHA256_LEN {
        bail!("{}: truncated snapshot header", path.display());
    }
    if &bytes[..4] != SNAPSHOT_MAGIC {
        bail!("{}: not a segment snapshot", path.display());
    }
    if bytes[4] != SNAPSHOT_VERSION {
        bail!(
            "{}: unsupported snapshot version {}",
            path.display(),
            bytes[4]
        );
    }

    let (expected, compressed) = bytes[5..].split_at(SHA256_LEN);
    let actual = Sha256::digest(compressed);
    if expected != actual.as_slice() {
        bail!("{}: checksum mismatch", path.display());
    }

    let mut raw = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut raw)
        .with_context(|| format!("decompress {}", path.display()))?;
    let value = bincode::deserialize(&raw)
        .map_err(|e| anyhow!("{}: decode snapshot: {e}", path.display()))?;
    Ok(Some(value))
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(bytes))
        .with_context(|| format!("write {}", path.display()))
}
