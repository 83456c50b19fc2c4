use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::RwLock;
use uuid::Uuid;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document, ValueSlot};
use crate::shard::tables::ShardTables;
use crate::shard::{Shard, ShardHandle};

/// Flushed state published by a writer
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    pub tables: Arc<ShardTables>,
    pub documents: Arc<BTreeMap<u64, Arc<Document>>>,
}

struct LiveInner {
    state: RwLock<LiveState>,
    closed: AtomicBool,
    uuid: Option<Uuid>,
    value_bounds: bool,
    label: String,
}

/// Read handle onto a writer's flushed state.
///
/// Every call sees the state as of the last flush; streams capture the
/// tables at creation so a later flush never changes them mid-iteration.
#[derive(Clone)]
pub struct LiveShard {
    inner: Arc<LiveInner>,
}

impl LiveShard {
    pub fn new(state: LiveState, uuid: Option<Uuid>, value_bounds: bool, label: String) -> Self {
        LiveShard {
            inner: Arc::new(LiveInner {
                state: RwLock::new(state),
                closed: AtomicBool::new(false),
                uuid,
                value_bounds,
                label,
            }),
        }
    }

    /// Make `state` visible to readers
    pub fn publish(&self, state: LiveState) {
        *self.inner.state.write() = state;
    }

    pub fn mark_closed(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl Shard for LiveShard {
    fn tables(&self) -> Result<Arc<ShardTables>> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        Ok(self.inner.state.read().tables.clone())
    }

    fn fetch_document(&self, docid: DocId) -> Result<Document> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        let documents = self.inner.state.read().documents.clone();
        documents.get(&docid.0)
            .map(|doc| doc.as_ref().clone())
            .ok_or_else(|| Error::not_found(format!("Document {} not found", docid)))
    }

    fn value_lower_bound(&self, slot: ValueSlot) -> Result<String> {
        let tables = self.tables()?;
        if !self.inner.value_bounds {
            return Ok(String::new());
        }
        Ok(tables.value_lower_bound(slot))
    }

    fn value_upper_bound(&self, slot: ValueSlot) -> Result<String> {
        let tables = self.tables()?;
        if !self.inner.value_bounds {
            return Err(Error::unimplemented(format!("{} cannot report value upper bounds", self.inner.label)));
        }
        Ok(tables.value_upper_bound(slot))
    }

    fn uuid(&self) -> Result<Uuid> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        self.inner.uuid
            .ok_or_else(|| Error::unimplemented(format!("{} does not support UUIDs", self.inner.label)))
    }

    fn reopen(&self) -> Result<ShardHandle> {
        if self.is_closed() {
            return Err(Error::closed());
        }
        Ok(Arc::new(self.clone()))
    }

    fn close(&self) -> Result<()> {
        self.mark_closed();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn description(&self) -> String {
        self.inner.label.clone()
    }
}
