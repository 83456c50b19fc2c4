use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::core::config::Config;
use crate::core::database::Database;
use crate::core::error::{Error, Result};
use crate::core::transaction::{TransactionEnd, TransactionMachine, TransactionState};
use crate::core::types::{DocId, Document};
use crate::shard::disk::DiskWriter;
use crate::shard::memory::MemoryShard;
use crate::shard::{OpenMode, ShardWriter};
use crate::writer::buffer::{Mutation, MutationBuffer};

struct WriterInner {
    writer: Box<dyn ShardWriter>,
    buffer: MutationBuffer,
    txn: TransactionMachine,
    config: Config,
    closed: bool,
}

impl WriterInner {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::closed());
        }
        Ok(())
    }

    /// Hand the buffer to the shard. The buffer is only cleared once the
    /// shard reports success.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let count = self.buffer.len();
        self.writer.flush(&self.buffer.pending, self.buffer.last_docid())?;
        self.buffer.pending.clear();
        tracing::debug!("flushed {} buffered mutations", count);
        Ok(())
    }

    fn push(&mut self, mutation: Mutation) -> Result<()> {
        self.buffer.push(mutation);
        if !self.txn.is_active() && self.buffer.should_flush() {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn discard_buffer(&mut self) -> usize {
        let persisted = self.writer.last_docid();
        self.buffer.discard(persisted)
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let pending = if self.txn.is_active() {
            let dropped = self.discard_buffer();
            let _ = self.txn.cancel();
            tracing::info!("transaction cancelled on close ({} mutations dropped)", dropped);
            self.writer.cancel_txn()
        } else {
            self.flush_buffer()
        };
        let closed = self.writer.close();
        pending.and(closed)
    }
}

impl Drop for WriterInner {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("error while closing writable database: {}", e);
        }
    }
}

/// Single-shard database that buffers document changes.
///
/// Mutations are collected in memory and written to the shard as one
/// atomic batch on `flush()`, when the buffer reaches
/// `Config::flush_threshold` outside a transaction, or when the last clone
/// is closed or dropped.
///
/// Reads through `Deref` see the state as of the last flush. Clones share
/// one writer; calls on them are serialized.
#[derive(Clone)]
pub struct WritableDatabase {
    inner: Arc<Mutex<WriterInner>>,
    view: Database,
}

impl WritableDatabase {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with_config(path, mode, Config::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, mode: OpenMode, config: Config) -> Result<Self> {
        let writer = DiskWriter::open(path.as_ref(), mode, config.clone())?;
        Ok(Self::from_writer(Box::new(writer), config))
    }

    /// Writable database backed by a fresh in-memory shard
    pub fn in_memory() -> Self {
        Self::from_writer(Box::new(MemoryShard::writable()), Config::default())
    }

    pub fn from_writer(writer: Box<dyn ShardWriter>, config: Config) -> Self {
        let buffer = MutationBuffer::new(writer.last_docid(), config.flush_threshold);
        let view = Database::from_shards(vec![writer.reader()]);
        WritableDatabase {
            inner: Arc::new(Mutex::new(WriterInner {
                writer,
                buffer,
                txn: TransactionMachine::new(),
                config,
                closed: false,
            })),
            view,
        }
    }

    /// Read-only handle on the flushed state, shareable with readers
    pub fn database(&self) -> Database {
        self.view.clone()
    }

    // ---- documents ----

    /// Buffer `document` under the next free id and return that id
    pub fn add_document(&self, document: Document) -> Result<DocId> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let docid = inner.buffer.allocate()?;
        inner.push(Mutation::Add { docid, document })?;
        Ok(docid)
    }

    pub fn delete_document(&self, docid: DocId) -> Result<()> {
        if !docid.is_valid() {
            return Err(Error::invalid_argument("Document id 0 is invalid"));
        }
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.push(Mutation::Delete { docid })
    }

    /// Remove every document indexed by `term` at flush time
    pub fn delete_document_by_term(&self, term: &str) -> Result<()> {
        if term.is_empty() {
            return Err(Error::invalid_argument("Empty termnames are invalid"));
        }
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.push(Mutation::DeleteByTerm { term: term.to_string() })
    }

    /// Store `document` as `docid`, replacing whatever is there. Using an
    /// id past the allocator moves the allocator up to it.
    pub fn replace_document(&self, docid: DocId, document: Document) -> Result<()> {
        if !docid.is_valid() {
            return Err(Error::invalid_argument("Document id 0 is invalid"));
        }
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let jump = inner.buffer.advance_past(docid);
        if jump > inner.config.docid_jump_warning {
            tracing::warn!(
                "replace_document({}) moved the docid allocator forward by {}; the id space is finite",
                docid,
                jump
            );
        }
        inner.push(Mutation::Replace { docid, document })
    }

    /// Replace the lowest-numbered document indexed by `term`, or add
    /// `document` if none is. Other matching documents are left alone.
    /// Returns the id the document is stored under.
    pub fn replace_document_by_term(&self, term: &str, document: Document) -> Result<DocId> {
        if term.is_empty() {
            return Err(Error::invalid_argument("Empty termnames are invalid"));
        }
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let predicted = {
            let state = &*inner;
            state.buffer.resolve_term(term, |t| state.writer.docids_for(t))
        };
        let docid = match predicted {
            Some(docid) => docid,
            None => inner.buffer.allocate()?,
        };
        inner.push(Mutation::ReplaceByTerm {
            term: term.to_string(),
            document,
            docid,
        })?;
        Ok(docid)
    }

    /// Write all buffered changes as one atomic batch. Not allowed inside
    /// a transaction.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.txn.check_flush_allowed()?;
        inner.flush_buffer()
    }

    pub fn pending_mutations(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    // ---- transactions ----

    /// Start a transaction. A flushed transaction writes out the buffer
    /// first and again on commit; an unflushed one just groups changes.
    pub fn begin_transaction(&self, flushed: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        if inner.txn.is_active() {
            return Err(Error::invalid_operation("Cannot begin transaction - transaction already in progress"));
        }
        if flushed {
            inner.flush_buffer()?;
        }
        inner.writer.begin_txn(flushed)?;
        inner.txn.begin(flushed)?;
        tracing::info!("transaction started (flushed: {})", flushed);
        Ok(())
    }

    /// End the transaction keeping its changes. The state is Idle
    /// afterwards even when the final flush fails.
    pub fn commit_transaction(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let end = inner.txn.commit()?;
        let flushed = match end {
            TransactionEnd::Flush => inner.flush_buffer(),
            TransactionEnd::Keep | TransactionEnd::Discard => Ok(()),
        };
        let backend = inner.writer.commit_txn();
        tracing::info!("transaction committed ({} mutations pending)", inner.buffer.len());
        flushed.and(backend)
    }

    /// End the transaction throwing its changes away. For an unflushed
    /// transaction this also drops everything buffered before it began.
    pub fn cancel_transaction(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.txn.cancel()?;
        let dropped = inner.discard_buffer();
        let backend = inner.writer.cancel_txn();
        tracing::info!("transaction cancelled ({} mutations dropped)", dropped);
        backend
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.inner.lock().txn.state()
    }

    // ---- auxiliary tables ----
    //
    // These go straight to the shard and are durable on return, whether
    // or not a transaction is active.

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("Empty metadata keys are invalid"));
        }
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.writer.set_metadata(key, value)
    }

    pub fn add_spelling(&self, word: &str, freq_inc: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.writer.add_spelling(word, freq_inc)
    }

    pub fn remove_spelling(&self, word: &str, freq_dec: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.writer.remove_spelling(word, freq_dec)
    }

    pub fn add_synonym(&self, term: &str, synonym: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.writer.add_synonym(term, synonym)
    }

    pub fn remove_synonym(&self, term: &str, synonym: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.writer.remove_synonym(term, synonym)
    }

    pub fn clear_synonyms(&self, term: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.writer.clear_synonyms(term)
    }

    // ---- lifecycle ----

    /// Flush (or cancel an active transaction) and release the write
    /// lock. Affects every clone. Calling it again does nothing.
    pub fn close(&self) -> Result<()> {
        self.inner.lock().shutdown()
    }
}

impl Deref for WritableDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.view
    }
}
