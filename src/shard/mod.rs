//! Shard capability interface.
//!
//! A shard is one independently openable index. The logical databases in
//! `core` only ever talk to shards through the traits here, so any backend
//! that implements them can be mixed into a database.

pub mod tables;
pub mod live;
pub mod disk;
pub mod memory;

use std::sync::Arc;
use uuid::Uuid;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document, ValueSlot};
use crate::index::posting::{PositionIter, PostingStream, ValueStream};
use crate::index::term::BoxTermStream;
use crate::shard::tables::{KeyCursor, KeyTable, PostingCursor, ShardTables, ValueCursor};
use crate::writer::buffer::Mutation;

pub type ShardHandle = Arc<dyn Shard>;

/// How a writable shard is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpenMode {
    /// Open for read/write; create if missing
    CreateOrOpen = 1,
    /// Create; fail if it already exists
    Create = 2,
    /// Create, replacing whatever is there
    CreateOrOverwrite = 3,
    /// Open for read/write; fail if missing
    Open = 4,
}

impl TryFrom<i32> for OpenMode {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            1 => Ok(OpenMode::CreateOrOpen),
            2 => Ok(OpenMode::Create),
            3 => Ok(OpenMode::CreateOrOverwrite),
            4 => Ok(OpenMode::Open),
            other => Err(Error::invalid_argument(format!("Invalid open mode code {}", other))),
        }
    }
}

/// Read side of a shard. Document ids here are local to the shard.
///
/// A handle is a snapshot: its answers do not change until `reopen()`
/// hands out a new one. Streams own a reference to the snapshot they were
/// created from.
///
/// Statistics and streams are answered from `tables()`; a backend only
/// overrides them where it cannot offer the capability.
pub trait Shard: Send + Sync {
    /// The table snapshot behind this handle. Fails once closed.
    fn tables(&self) -> Result<Arc<ShardTables>>;

    fn fetch_document(&self, docid: DocId) -> Result<Document>;

    fn doc_count(&self) -> Result<u64> {
        Ok(self.tables()?.doc_count())
    }

    fn last_docid(&self) -> Result<DocId> {
        Ok(DocId(self.tables()?.last_docid))
    }

    fn avg_length(&self) -> Result<f64> {
        Ok(self.tables()?.avg_length())
    }

    fn doc_length(&self, docid: DocId) -> Result<u64> {
        self.tables()?.doc_length(docid)
    }

    fn term_freq(&self, term: &str) -> Result<u64> {
        Ok(self.tables()?.term_freq(term))
    }

    fn collection_freq(&self, term: &str) -> Result<u64> {
        Ok(self.tables()?.collection_freq(term))
    }

    fn value_freq(&self, slot: ValueSlot) -> Result<u64> {
        Ok(self.tables()?.value_freq(slot))
    }

    fn value_lower_bound(&self, slot: ValueSlot) -> Result<String> {
        Ok(self.tables()?.value_lower_bound(slot))
    }

    fn value_upper_bound(&self, slot: ValueSlot) -> Result<String> {
        Ok(self.tables()?.value_upper_bound(slot))
    }

    fn has_positions(&self) -> Result<bool> {
        Ok(self.tables()?.has_positions())
    }

    fn postings(&self, term: &str) -> Result<PostingStream> {
        Ok(Box::new(PostingCursor::new(self.tables()?, term)))
    }

    fn term_list(&self, docid: DocId) -> Result<BoxTermStream> {
        Ok(Box::new(self.tables()?.term_list(docid)?))
    }

    fn positions(&self, docid: DocId, term: &str) -> Result<PositionIter> {
        Ok(PositionIter::new(self.tables()?.positions(docid, term)?))
    }

    fn all_terms(&self, prefix: &str) -> Result<BoxTermStream> {
        Ok(Box::new(KeyCursor::new(self.tables()?, KeyTable::Terms, prefix)))
    }

    fn value_stream(&self, slot: ValueSlot) -> Result<ValueStream> {
        Ok(Box::new(ValueCursor::new(self.tables()?, slot)))
    }

    fn spellings(&self) -> Result<BoxTermStream> {
        Ok(Box::new(KeyCursor::new(self.tables()?, KeyTable::Spelling, "")))
    }

    fn synonyms(&self, term: &str) -> Result<BoxTermStream> {
        Ok(Box::new(self.tables()?.synonyms(term)))
    }

    fn synonym_keys(&self, prefix: &str) -> Result<BoxTermStream> {
        Ok(Box::new(KeyCursor::new(self.tables()?, KeyTable::SynonymKeys, prefix)))
    }

    fn metadata(&self, key: &str) -> Result<String> {
        Ok(self.tables()?.metadata(key))
    }

    fn metadata_keys(&self, prefix: &str) -> Result<BoxTermStream> {
        Ok(Box::new(KeyCursor::new(self.tables()?, KeyTable::MetadataKeys, prefix)))
    }

    fn uuid(&self) -> Result<Uuid> {
        Err(Error::unimplemented("This backend does not support UUIDs"))
    }

    fn keep_alive(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        Ok(())
    }

    /// A fresh snapshot of the latest committed state
    fn reopen(&self) -> Result<ShardHandle>;

    /// Release resources. Calling it twice is a no-op.
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    fn description(&self) -> String;
}

/// Maintenance of the spelling, synonym and metadata tables. These bypass
/// the document buffer and are committed as soon as they are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableUpdate {
    SetMetadata { key: String, value: String },
    AddSpelling { word: String, freq_inc: u64 },
    RemoveSpelling { word: String, freq_dec: u64 },
    AddSynonym { term: String, synonym: String },
    RemoveSynonym { term: String, synonym: String },
    ClearSynonyms { term: String },
}

/// Write side of a shard. Only one writer may exist per shard.
pub trait ShardWriter: Send {
    /// Apply `batch` as one durable unit and persist `last_docid` as the
    /// allocator position. On error nothing from the batch is visible.
    fn flush(&mut self, batch: &[Mutation], last_docid: DocId) -> Result<()>;

    fn begin_txn(&mut self, _flushed: bool) -> Result<()> {
        Err(Error::unimplemented("Transactions are not available for this backend"))
    }

    fn commit_txn(&mut self) -> Result<()> {
        Err(Error::unimplemented("Transactions are not available for this backend"))
    }

    fn cancel_txn(&mut self) -> Result<()> {
        Err(Error::unimplemented("Transactions are not available for this backend"))
    }

    /// Allocator position as of the last flush
    fn last_docid(&self) -> DocId;

    /// Flushed documents indexed by `term`, ascending
    fn docids_for(&self, term: &str) -> Vec<DocId>;

    /// Apply one table update and commit it at once
    fn update(&mut self, update: TableUpdate) -> Result<()>;

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.update(TableUpdate::SetMetadata { key: key.to_string(), value: value.to_string() })
    }

    fn add_spelling(&mut self, word: &str, freq_inc: u64) -> Result<()> {
        self.update(TableUpdate::AddSpelling { word: word.to_string(), freq_inc })
    }

    fn remove_spelling(&mut self, word: &str, freq_dec: u64) -> Result<()> {
        self.update(TableUpdate::RemoveSpelling { word: word.to_string(), freq_dec })
    }

    fn add_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        self.update(TableUpdate::AddSynonym { term: term.to_string(), synonym: synonym.to_string() })
    }

    fn remove_synonym(&mut self, term: &str, synonym: &str) -> Result<()> {
        self.update(TableUpdate::RemoveSynonym { term: term.to_string(), synonym: synonym.to_string() })
    }

    fn clear_synonyms(&mut self, term: &str) -> Result<()> {
        self.update(TableUpdate::ClearSynonyms { term: term.to_string() })
    }

    /// Read handle that always shows the latest flushed state
    fn reader(&self) -> ShardHandle;

    /// Release the write lock
    fn close(&mut self) -> Result<()>;
}
