use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::DbError;

pub enum DbOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Byte-keyed store used for skeleton progress and skeleton blocks.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError>;

    /// Applies all operations, then persists once.
    fn write_batch(&self, ops: Vec<DbOp>) -> Result<(), DbError>;

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), DbError> {
        self.write_batch(vec![DbOp::Put(key.to_vec(), value)])
    }

    fn delete(&self, key: &[u8]) -> Result<(), DbError> {
        self.write_batch(vec![DbOp::Delete(key.to_vec())])
    }
}

/// Ordered in-memory store, optionally mirrored to a JSON file after every write.
#[derive(Debug, Default)]
pub struct MemoryDb {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    path: Option<PathBuf>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a file-backed store, loading existing contents if the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let file = File::open(&path).map_err(|source| io_error(&path, source))?;
            let encoded: BTreeMap<String, String> = serde_json::from_reader(BufReader::new(file))
                .map_err(|error| DbError::Corrupt(error.to_string()))?;
            encoded
                .into_iter()
                .map(|(key, value)| {
                    let key = hex::decode(&key).map_err(|error| DbError::Corrupt(error.to_string()))?;
                    let value =
                        hex::decode(&value).map_err(|error| DbError::Corrupt(error.to_string()))?;
                    Ok((key, value))
                })
                .collect::<Result<BTreeMap<_, _>, DbError>>()?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened database");

        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn flush(&self, entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), DbError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let encoded: BTreeMap<String, String> = entries
            .iter()
            .map(|(key, value)| (hex::encode(key), hex::encode(value)))
            .collect();

        let tmp = path.with_extension("tmp");
        let file = File::create(&tmp).map_err(|source| io_error(&tmp, source))?;
        serde_json::to_writer(BufWriter::new(file), &encoded)
            .map_err(|error| DbError::Corrupt(error.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|source| io_error(path, source))
    }
}

impl KeyValueStore for MemoryDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<DbOp>) -> Result<(), DbError> {
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                DbOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                DbOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        self.flush(&entries)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DbError {
    DbError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_applies_in_order() {
        let db = MemoryDb::new();
        db.write_batch(vec![
            DbOp::Put(b"a".to_vec(), b"1".to_vec()),
            DbOp::Put(b"b".to_vec(), b"2".to_vec()),
            DbOp::Delete(b"a".to_vec()),
        ])
        .unwrap();

        assert_eq!(db.get(b"a").unwrap(), None);
        assert_eq!(db.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("sync-db-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let db = MemoryDb::open(&path).unwrap();
            db.put(b"status", vec![0xc0]).unwrap();
        }

        let reopened = MemoryDb::open(&path).unwrap();
        assert_eq!(reopened.get(b"status").unwrap(), Some(vec![0xc0]));

        let _ = std::fs::remove_file(&path);
    }
}
