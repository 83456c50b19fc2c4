use std::path::{Path, PathBuf};
use std::fs;
use crate::core::error::{Error, ErrorKind, Result};

/// Directory structure of a disk shard
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,       // Root directory
    pub meta_dir: PathBuf,       // Checkpoint location
    pub revisions_dir: PathBuf,  // One file per committed revision
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Self {
        let meta_dir = base_dir.join("meta");
        let revisions_dir = base_dir.join("revisions");

        StorageLayout {
            base_dir,
            meta_dir,
            revisions_dir,
        }
    }

    /// Create the directories if they are missing
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.meta_dir).map_err(|e| Self::opening_error(&self.base_dir, e))?;
        fs::create_dir_all(&self.revisions_dir).map_err(|e| Self::opening_error(&self.base_dir, e))?;
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.checkpoint_path().is_file()
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.meta_dir.join("checkpoint.bin")
    }

    pub fn revision_path(&self, revision: u64) -> PathBuf {
        self.revisions_dir.join(format!("rev_{:08}.bin", revision))
    }

    /// Revision numbers present on disk, ascending
    pub fn list_revisions(&self) -> Result<Vec<u64>> {
        let mut revisions = Vec::new();

        if self.revisions_dir.exists() {
            for entry in fs::read_dir(&self.revisions_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|s| s.to_str()) != Some("bin") {
                    continue;
                }
                let revision = path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.strip_prefix("rev_"))
                    .and_then(|seq| seq.parse::<u64>().ok());
                if let Some(revision) = revision {
                    revisions.push(revision);
                }
            }
        }

        revisions.sort();
        Ok(revisions)
    }

    /// Remove everything a previous database left behind
    pub fn wipe(&self) -> Result<()> {
        for revision in self.list_revisions()? {
            fs::remove_file(self.revision_path(revision))?;
        }
        let checkpoint = self.checkpoint_path();
        if checkpoint.exists() {
            fs::remove_file(checkpoint)?;
        }
        Ok(())
    }

    fn opening_error(path: &Path, err: std::io::Error) -> Error {
        Error::new(ErrorKind::Opening, format!("Cannot create {}: {}", path.display(), err))
    }
}
