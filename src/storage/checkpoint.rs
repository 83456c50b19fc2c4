use std::fs;
use std::io::Write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;

/// Pointer to the latest committed revision of a disk shard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub revision: u64,
    pub uuid: Uuid,
    pub last_docid: u64,
    pub doc_count: u64,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn new(revision: u64, uuid: Uuid, last_docid: u64, doc_count: u64) -> Self {
        Checkpoint {
            format_version: Self::FORMAT_VERSION,
            revision,
            uuid,
            last_docid,
            doc_count,
            timestamp: Utc::now(),
        }
    }

    /// Load checkpoint from disk
    pub fn load(storage: &StorageLayout) -> Result<Self> {
        let path = storage.checkpoint_path();
        if !path.is_file() {
            return Err(Error::new(
                ErrorKind::Opening,
                format!("No shard found at {}", storage.base_dir.display()),
            ));
        }

        let data = fs::read(path)?;
        let checkpoint: Checkpoint = bincode::deserialize(&data)
            .map_err(|e| Error::corrupt(format!("Unreadable checkpoint: {}", e)))?;

        if checkpoint.format_version != Self::FORMAT_VERSION {
            return Err(Error::new(
                ErrorKind::Version,
                format!(
                    "Shard format version {} is not supported (expected {})",
                    checkpoint.format_version,
                    Self::FORMAT_VERSION
                ),
            ));
        }

        Ok(checkpoint)
    }

    /// Save checkpoint to disk. The file is replaced atomically.
    pub fn save(&self, storage: &StorageLayout, sync: bool) -> Result<()> {
        let data = bincode::serialize(self)?;

        let mut tmp = NamedTempFile::new_in(&storage.meta_dir)?;
        tmp.write_all(&data)?;
        if sync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(storage.checkpoint_path())?;
        Ok(())
    }
}
