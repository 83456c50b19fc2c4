use std::collections::BTreeMap;
use std::sync::Arc;
use crate::core::error::Result;
use crate::core::types::{DocId, Document};
use crate::shard::live::{LiveShard, LiveState};
use crate::shard::tables::ShardTables;
use crate::shard::{ShardHandle, ShardWriter, TableUpdate};
use crate::writer::buffer::Mutation;

/// In-process shard. Nothing survives the process.
pub struct MemoryShard;

impl MemoryShard {
    /// A fresh, empty shard and the writer that owns it
    pub fn writable() -> MemoryWriter {
        MemoryWriter::new()
    }
}

/// Writer for an in-memory shard.
///
/// Has no transaction hooks, no uuid and no value upper bounds, so the
/// trait defaults report those as unimplemented.
pub struct MemoryWriter {
    tables: Arc<ShardTables>,
    documents: Arc<BTreeMap<u64, Arc<Document>>>,
    live: LiveShard,
}

impl MemoryWriter {
    fn new() -> Self {
        let state = LiveState::default();
        MemoryWriter {
            tables: state.tables.clone(),
            documents: state.documents.clone(),
            live: LiveShard::new(state, None, false, "memory shard".to_string()),
        }
    }

    fn publish(&mut self, tables: ShardTables) {
        self.tables = Arc::new(tables);
        self.live.publish(LiveState {
            tables: self.tables.clone(),
            documents: self.documents.clone(),
        });
    }
}

impl ShardWriter for MemoryWriter {
    fn flush(&mut self, batch: &[Mutation], last_docid: DocId) -> Result<()> {
        let mut tables = self.tables.as_ref().clone();
        let mut documents = self.documents.as_ref().clone();
        tables.apply_batch(&mut documents, batch, last_docid);

        self.documents = Arc::new(documents);
        self.publish(tables);
        tracing::debug!("memory shard flushed {} mutations", batch.len());
        Ok(())
    }

    fn last_docid(&self) -> DocId {
        DocId(self.tables.last_docid)
    }

    fn docids_for(&self, term: &str) -> Vec<DocId> {
        self.tables.docids_for(term)
    }

    fn update(&mut self, update: TableUpdate) -> Result<()> {
        let mut tables = self.tables.as_ref().clone();
        tables.apply_update(&update);
        self.publish(tables);
        Ok(())
    }

    fn reader(&self) -> ShardHandle {
        Arc::new(self.live.clone())
    }

    fn close(&mut self) -> Result<()> {
        self.live.mark_closed();
        Ok(())
    }
}
