use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document};
use crate::shard::live::{LiveShard, LiveState};
use crate::shard::tables::ShardTables;
use crate::shard::{OpenMode, Shard, ShardHandle, ShardWriter, TableUpdate};
use crate::storage::checkpoint::Checkpoint;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::revision::{self, DocIndex, RevisionReader};
use crate::writer::buffer::Mutation;

const OPEN_ATTEMPTS: usize = 3;

/// Read-only snapshot of one revision of a disk shard.
///
/// Tables are loaded when the snapshot is opened; document bodies stay in
/// the revision file and are read on demand.
pub struct DiskShard {
    storage: StorageLayout,
    revision: u64,
    uuid: Uuid,
    tables: Arc<ShardTables>,
    doc_index: Arc<DocIndex>,
    revision_path: PathBuf,
    closed: AtomicBool,
}

impl DiskShard {
    pub fn open(path: &Path) -> Result<Self> {
        let storage = StorageLayout::new(path.to_path_buf());
        if !storage.base_dir.is_dir() {
            return Err(Error::new(
                ErrorKind::Opening,
                format!("Cannot open shard at {}: no such directory", path.display()),
            ));
        }

        // A writer may prune the revision between reading the checkpoint
        // and opening the file; re-read the checkpoint when that happens.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let checkpoint = Checkpoint::load(&storage)?;
            let revision_path = storage.revision_path(checkpoint.revision);
            if !revision_path.is_file() && attempt < OPEN_ATTEMPTS {
                continue;
            }

            let reader = RevisionReader::open(&revision_path)?;
            if reader.header.revision != checkpoint.revision {
                return Err(Error::corrupt(format!(
                    "Revision file {} claims revision {}",
                    revision_path.display(),
                    reader.header.revision
                )));
            }

            tracing::debug!(
                "opened disk shard {} at revision {} ({} documents)",
                path.display(),
                checkpoint.revision,
                reader.tables.doc_count()
            );

            return Ok(DiskShard {
                storage,
                revision: checkpoint.revision,
                uuid: checkpoint.uuid,
                tables: Arc::new(reader.tables),
                doc_index: Arc::new(reader.doc_index),
                revision_path,
                closed: AtomicBool::new(false),
            });
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl Shard for DiskShard {
    fn tables(&self) -> Result<Arc<ShardTables>> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        Ok(self.tables.clone())
    }

    fn fetch_document(&self, docid: DocId) -> Result<Document> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        let loc = self.doc_index.get(&docid.0)
            .copied()
            .ok_or_else(|| Error::not_found(format!("Document {} not found", docid)))?;
        revision::read_document(&self.revision_path, self.revision, docid, loc)
    }

    fn uuid(&self) -> Result<Uuid> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        Ok(self.uuid)
    }

    fn reopen(&self) -> Result<ShardHandle> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        let shard = DiskShard::open(&self.storage.base_dir)?;
        tracing::debug!(
            "reopened {} from revision {} to {}",
            self.storage.base_dir.display(),
            self.revision,
            shard.revision
        );
        Ok(Arc::new(shard))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn description(&self) -> String {
        format!("disk shard {} (revision {})", self.storage.base_dir.display(), self.revision)
    }
}

/// Exclusive writer for a disk shard.
///
/// Holds the whole flushed state in memory. Every flush and every
/// auxiliary update is written out as a new revision followed by a
/// checkpoint that points at it.
pub struct DiskWriter {
    storage: StorageLayout,
    config: Config,
    lock: Option<FileLock>,
    checkpoint: Checkpoint,
    tables: Arc<ShardTables>,
    documents: Arc<BTreeMap<u64, Arc<Document>>>,
    live: LiveShard,
    in_txn: bool,
}

impl DiskWriter {
    pub fn open(path: &Path, mode: OpenMode, config: Config) -> Result<Self> {
        let storage = StorageLayout::new(path.to_path_buf());
        let exists = storage.exists();
        match mode {
            OpenMode::Create if exists => {
                return Err(Error::new(
                    ErrorKind::Opening,
                    format!("Cannot create shard at {}: it already exists", path.display()),
                ));
            }
            OpenMode::Open if !exists => {
                return Err(Error::new(
                    ErrorKind::Opening,
                    format!("Cannot open shard at {}: no shard found", path.display()),
                ));
            }
            _ => {}
        }

        storage.create_dirs()?;
        let lock = FileLock::acquire(&storage)?;

        // Numbering carries on across an overwrite so a reader still holding
        // an old revision never finds a different file under the same name.
        let mut first_revision = 1;
        if mode == OpenMode::CreateOrOverwrite && exists {
            let listed = storage.list_revisions()?.last().copied().unwrap_or(0);
            let current = Checkpoint::load(&storage).map(|c| c.revision).unwrap_or(0);
            first_revision = listed.max(current) + 1;
            tracing::debug!("overwriting existing shard at {} from revision {}", path.display(), first_revision);
            storage.wipe()?;
        }

        let (checkpoint, tables, documents) = if storage.exists() {
            let checkpoint = Checkpoint::load(&storage)?;
            let reader = RevisionReader::open(&storage.revision_path(checkpoint.revision))?;
            let documents = reader.load_documents()?;
            (checkpoint, reader.tables, documents)
        } else {
            let checkpoint = Checkpoint::new(first_revision, Uuid::new_v4(), 0, 0);
            let tables = ShardTables::default();
            let documents = BTreeMap::new();
            revision::write_revision(&storage, checkpoint.revision, &tables, &documents, config.sync_on_flush)?;
            checkpoint.save(&storage, config.sync_on_flush)?;
            tracing::debug!("created disk shard {} ({})", path.display(), checkpoint.uuid);
            (checkpoint, tables, documents)
        };

        let tables = Arc::new(tables);
        let documents = Arc::new(documents);
        let live = LiveShard::new(
            LiveState { tables: tables.clone(), documents: documents.clone() },
            Some(checkpoint.uuid),
            true,
            format!("writable disk shard {}", path.display()),
        );

        tracing::debug!(
            "opened {} for writing at revision {} (last docid {})",
            path.display(),
            checkpoint.revision,
            tables.last_docid
        );

        Ok(DiskWriter {
            storage,
            config,
            lock: Some(lock),
            checkpoint,
            tables,
            documents,
            live,
            in_txn: false,
        })
    }

    pub fn revision(&self) -> u64 {
        self.checkpoint.revision
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lock.is_none() {
            return Err(Error::closed());
        }
        Ok(())
    }

    /// Write `tables` and `documents` as the next revision and publish
    /// them. Nothing in memory changes unless every write succeeds.
    fn commit(&mut self, tables: ShardTables, documents: Arc<BTreeMap<u64, Arc<Document>>>) -> Result<()> {
        let revision = self.checkpoint.revision + 1;
        let sync = self.config.sync_on_flush;

        revision::write_revision(&self.storage, revision, &tables, &documents, sync)?;
        let checkpoint = Checkpoint::new(revision, self.checkpoint.uuid, tables.last_docid, tables.doc_count());
        checkpoint.save(&self.storage, sync)?;

        // The revision is durable from here on; pruning is best effort
        let pruned = revision::prune_revisions(&self.storage, self.config.retained_revisions);
        if pruned > 0 {
            tracing::debug!("pruned {} old revisions of {}", pruned, self.storage.base_dir.display());
        }

        self.checkpoint = checkpoint;
        self.tables = Arc::new(tables);
        self.documents = documents;
        self.live.publish(LiveState {
            tables: self.tables.clone(),
            documents: self.documents.clone(),
        });
        Ok(())
    }
}

impl ShardWriter for DiskWriter {
    fn flush(&mut self, batch: &[Mutation], last_docid: DocId) -> Result<()> {
        self.ensure_open()?;
        let mut tables = self.tables.as_ref().clone();
        let mut documents = self.documents.as_ref().clone();
        tables.apply_batch(&mut documents, batch, last_docid);

        self.commit(tables, Arc::new(documents))?;
        tracing::debug!(
            "flushed {} mutations to {} as revision {}",
            batch.len(),
            self.storage.base_dir.display(),
            self.checkpoint.revision
        );
        Ok(())
    }

    fn begin_txn(&mut self, flushed: bool) -> Result<()> {
        self.ensure_open()?;
        if self.in_txn {
            return Err(Error::invalid_operation("Transaction already in progress"));
        }
        self.in_txn = true;
        tracing::debug!("disk shard transaction started (flushed: {})", flushed);
        Ok(())
    }

    fn commit_txn(&mut self) -> Result<()> {
        if !self.in_txn {
            return Err(Error::invalid_operation("No transaction in progress"));
        }
        self.in_txn = false;
        Ok(())
    }

    fn cancel_txn(&mut self) -> Result<()> {
        if !self.in_txn {
            return Err(Error::invalid_operation("No transaction in progress"));
        }
        self.in_txn = false;
        Ok(())
    }

    fn last_docid(&self) -> DocId {
        DocId(self.tables.last_docid)
    }

    fn docids_for(&self, term: &str) -> Vec<DocId> {
        self.tables.docids_for(term)
    }

    fn update(&mut self, update: TableUpdate) -> Result<()> {
        self.ensure_open()?;
        let mut tables = self.tables.as_ref().clone();
        tables.apply_update(&update);
        let documents = self.documents.clone();
        self.commit(tables, documents)?;
        tracing::debug!("applied {:?} to {}", update, self.storage.base_dir.display());
        Ok(())
    }

    fn reader(&self) -> ShardHandle {
        Arc::new(self.live.clone())
    }

    fn close(&mut self) -> Result<()> {
        if self.lock.take().is_some() {
            tracing::debug!("released write lock on {}", self.storage.base_dir.display());
        }
        self.in_txn = false;
        self.live.mark_closed();
        Ok(())
    }
}
