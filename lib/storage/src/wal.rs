//! Append-only operation log for the `AppendOnly` storage variant.
//!
//! Every mutation is framed as `len: u32 | check: u32 | bincode body`,
//! where `check` is the first four bytes of the body's sha256. A torn
//! final frame is treated as a clean end of log; a bad frame anywhere
//! earlier is corruption.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use segx_core::{PointIdType, StoredPayload};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One logged mutation. Vectors are stored in preprocessed form, so replay
/// feeds the index exactly what the original call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    Index {
        id: PointIdType,
        vector: Vec<f32>,
    },
    SetPayload {
        id: PointIdType,
        payload: StoredPayload,
    },
    Delete {
        id: PointIdType,
    },
}

pub struct WriteAheadLog {
    writer: Mutex<BufWriter<File>>,
    raw_file: Mutex<File>,
    path: PathBuf,
}

impl WriteAheadLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        let raw_file = file.try_clone()?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            raw_file: Mutex::new(raw_file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to the OS.
    pub fn append(&self, record: &WalRecord) -> Result<()> {
        let body = bincode::serialize(record)?;
        let check = frame_check(&body);

        let mut writer = self.writer.lock();
        writer.write_all(&(body.len() as u32).to_le_bytes())?;
        writer.write_all(&check.to_le_bytes())?;
        writer.write_all(&body)?;
        writer.flush()?;
        Ok(())
    }

    /// fdatasync the log.
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().flush()?;
        self.raw_file.lock().sync_data()?;
        Ok(())
    }

    /// Drop all logged records, called after a snapshot made them redundant.
    pub fn truncate(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        let raw = self.raw_file.lock();
        raw.set_len(0)?;
        writer.get_mut().seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Read every intact record from a log file. Missing file means no
    /// records; a torn trailing frame ends the replay silently.
    pub fn replay(path: &Path) -> Result<Vec<WalRecord>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            if bytes.len() - offset < 8 {
                break; // torn header at the tail
            }
            let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            let check = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
            let body_start = offset + 8;

            if bytes.len() - body_start < len {
                break; // torn body at the tail
            }
            let body = &bytes[body_start..body_start + len];

            if frame_check(body) != check {
                if body_start + len == bytes.len() {
                    break; // garbage in the final frame, treat as torn
                }
                bail!(
                    "{}: bad frame checksum at offset {offset}",
                    path.display()
                );
            }

            let record = bincode::deserialize(body).with_context(|| {
                format!("{}: decode record at offset {offset}", path.display())
            })?;
            records.push(record);
            offset = body_start + len;
        }

        Ok(records)
    }
}

fn frame_check(body: &[u8]) -> u32 {
    let digest = Sha256::digest(body);
    u32::from_le_bytes(digest[..4].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<WalRecord> {
        vec![
            WalRecord::Index {
                id: 1,
                vector: vec![0.5, 0.5],
            },
            WalRecord::SetPayload {
                id: 1,
                payload: StoredPayload::Structured(
                    segx_core::payload_from_json(serde_json::json!({"text": "doc"})).unwrap(),
                ),
            },
            WalRecord::Delete { id: 1 },
        ]
    }

    #[test]
    fn test_append_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&path).unwrap();
        for record in sample_records() {
            wal.append(&record).unwrap();
        }
        wal.sync().unwrap();

        assert_eq!(WriteAheadLog::replay(&path).unwrap(), sample_records());
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WriteAheadLog::replay(&dir.path().join("none.wal"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_torn_tail_is_clean_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&path).unwrap();
        for record in sample_records() {
            wal.append(&record).unwrap();
        }
        drop(wal);

        // chop the last frame in half
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let records = WriteAheadLog::replay(&path).unwrap();
        assert_eq!(records, sample_records()[..2]);
    }

    #[test]
    fn test_interior_corruption_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&path).unwrap();
        for record in sample_records() {
            wal.append(&record).unwrap();
        }
        drop(wal);

        // flip a byte inside the first frame's body
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[10] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(WriteAheadLog::replay(&path).is_err());
    }

    #[test]
    fn test_truncate_empties_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&path).unwrap();
        for record in sample_records() {
            wal.append(&record).unwrap();
        }
        wal.truncate().unwrap();
        assert!(WriteAheadLog::replay(&path).unwrap().is_empty());

        // the log keeps working after truncation
        wal.append(&WalRecord::Delete { id: 9 }).unwrap();
        assert_eq!(
            WriteAheadLog::replay(&path).unwrap(),
            vec![WalRecord::Delete { id: 9 }]
        );
    }
}
