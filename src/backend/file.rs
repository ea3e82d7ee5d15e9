//! FileBackend - whole-collection snapshot file.
//!
//! Every batch rewrites the file: the next collection is encoded, written to
//! a temporary sibling, synced, and renamed over the target. A crash or
//! error at any point leaves either the old file or the new one, never a mix.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{Backend, BackendError, Batch, Change};
use crate::record::{Record, RecordId};

const FORMAT_VERSION: u32 = 1;

/// On-disk encoding of the snapshot file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Pretty-printed JSON; readable and diffable.
    #[default]
    Json,
    /// Compact binary via bitcode.
    Bitcode,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Bitcode => "bitcode",
        }
    }

    pub fn parse(value: &str) -> Option<Codec> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Codec::Json),
            "bitcode" => Some(Codec::Bitcode),
            _ => None,
        }
    }

    fn encode(&self, file: &StoreFile) -> Result<Vec<u8>, BackendError> {
        match self {
            Codec::Json => Ok(serde_json::to_vec_pretty(file)?),
            Codec::Bitcode => Ok(bitcode::serialize(file)?),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<StoreFile, BackendError> {
        match self {
            Codec::Json => Ok(serde_json::from_slice(bytes)?),
            Codec::Bitcode => Ok(bitcode::deserialize(bytes)?),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    format_version: u32,
    records: Vec<Record>,
}

/// Snapshot-file backend.
pub struct FileBackend {
    path: PathBuf,
    codec: Codec,
    /// Last state known to be on disk.
    cache: Mutex<BTreeMap<RecordId, Record>>,
}

impl FileBackend {
    /// Open the file at `path`, creating parent directories as needed. A
    /// missing file is an empty collection; it is created on first write.
    pub fn open(path: impl AsRef<Path>, codec: Codec) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let records = if path.exists() {
            let bytes = fs::read(&path)?;
            let file = codec.decode(&bytes)?;
            if file.format_version != FORMAT_VERSION {
                return Err(BackendError::Corrupt(format!(
                    "{}: unsupported format version {}",
                    path.display(),
                    file.format_version
                )));
            }
            file.records
        } else {
            Vec::new()
        };

        let mut cache = BTreeMap::new();
        for record in records {
            if cache.insert(record.id(), record).is_some() {
                return Err(BackendError::Corrupt(format!(
                    "{}: duplicate record id",
                    path.display()
                )));
            }
        }

        tracing::debug!(
            path = %path.display(),
            codec = codec.as_str(),
            records = cache.len(),
            "opened store file"
        );

        Ok(Self {
            path,
            codec,
            cache: Mutex::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), BackendError> {
        let tmp = self.temp_path();
        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            Ok::<_, std::io::Error>(())
        })();

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        #[cfg(unix)]
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}

impl Backend for FileBackend {
    fn load_all(&self) -> Result<Vec<Record>, BackendError> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| BackendError::Unavailable("lock poisoned".into()))?;
        Ok(cache.values().cloned().collect())
    }

    fn apply(&self, batch: &Batch) -> Result<(), BackendError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| BackendError::Unavailable("lock poisoned".into()))?;

        let mut next = cache.clone();
        for change in batch.changes() {
            match change {
                Change::Put(record) => {
                    next.insert(record.id(), record.clone());
                }
                Change::Remove(id) => {
                    next.remove(id);
                }
            }
        }

        let file = StoreFile {
            format_version: FORMAT_VERSION,
            records: next.values().cloned().collect(),
        };
        let bytes = self.codec.encode(&file)?;
        self.write_atomic(&bytes)?;

        tracing::trace!(
            path = %self.path.display(),
            changes = batch.len(),
            bytes = bytes.len(),
            "store file written"
        );
        *cache = next;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}
