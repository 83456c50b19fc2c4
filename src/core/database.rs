use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document, FieldValue, ValueSlot};
use crate::index::merge::{DocMerge, DocidMap, PostingMerge, TermMerge};
use crate::index::posting::{PositionIter, ValueEntry};
use crate::index::term::{BoxTermStream, VecTermStream};
use crate::search::spelling;
use crate::shard::disk::DiskShard;
use crate::shard::ShardHandle;

// Stub files may name other stubs
const MAX_STUB_DEPTH: usize = 8;

/// Read access to one or more shards presented as a single collection.
///
/// Document ids are interleaved across shards (see `DocidMap`). Cloning
/// is cheap: clones share the shard handles.
#[derive(Clone, Default)]
pub struct Database {
    shards: Vec<ShardHandle>,
    closed: bool,
}

impl Database {
    /// A database with no shards
    pub fn new() -> Self {
        Database::default()
    }

    /// Open a shard directory, or a stub file listing shard paths
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at_depth(path.as_ref(), 0)
    }

    pub fn from_shards(shards: Vec<ShardHandle>) -> Self {
        Database { shards, closed: false }
    }

    fn open_at_depth(path: &Path, depth: usize) -> Result<Self> {
        if path.is_dir() {
            let shard = DiskShard::open(path)?;
            return Ok(Database::from_shards(vec![Arc::new(shard)]));
        }
        if path.is_file() {
            if depth >= MAX_STUB_DEPTH {
                return Err(Error::new(
                    ErrorKind::Opening,
                    format!("Stub file {} nests too deeply", path.display()),
                ));
            }
            return Self::open_stub(path, depth);
        }
        Err(Error::new(
            ErrorKind::Opening,
            format!("Cannot open database at {}: no such file or directory", path.display()),
        ))
    }

    fn open_stub(path: &Path, depth: usize) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut db = Database::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = PathBuf::from(line);
            let entry = if entry.is_relative() { base.join(entry) } else { entry };
            let sub = Self::open_at_depth(&entry, depth + 1)?;
            db.add_database(&sub)?;
        }

        tracing::debug!("opened stub {} with {} shards", path.display(), db.shards.len());
        Ok(db)
    }

    /// Append the shards of `other`. Ids of documents in this database
    /// change when the shard count does.
    pub fn add_database(&mut self, other: &Database) -> Result<()> {
        self.check_open()?;
        other.check_open()?;
        self.shards.extend(other.shards.iter().cloned());
        Ok(())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::closed());
        }
        Ok(())
    }

    fn map(&self) -> DocidMap {
        DocidMap::new(self.shards.len())
    }

    /// Run `f` on every shard, tagging errors with the shard index when
    /// there is more than one.
    fn each_shard<T>(&self, mut f: impl FnMut(&ShardHandle) -> Result<T>) -> Result<Vec<T>> {
        self.check_open()?;
        let many = self.shards.len() > 1;
        self.shards.iter()
            .enumerate()
            .map(|(i, shard)| f(shard).map_err(|e| if many { e.in_shard(i) } else { e }))
            .collect()
    }

    /// Resolve a global id to its shard and local id
    fn locate(&self, docid: DocId) -> Result<(usize, &ShardHandle, DocId)> {
        self.check_open()?;
        if !docid.is_valid() {
            return Err(Error::not_found("Document id 0 is invalid"));
        }
        if self.shards.is_empty() {
            return Err(Error::not_found(format!("Document {} not found: database has no shards", docid)));
        }
        let (index, local) = self.map().to_local(docid);
        Ok((index, &self.shards[index], local))
    }

    fn tag(&self, index: usize, err: Error) -> Error {
        if self.shards.len() > 1 { err.in_shard(index) } else { err }
    }

    // ---- statistics ----

    pub fn doc_count(&self) -> Result<u64> {
        Ok(self.each_shard(|s| s.doc_count())?.into_iter().sum())
    }

    /// Highest global id in use, 0 when every shard is empty
    pub fn last_docid(&self) -> Result<DocId> {
        let map = self.map();
        let locals = self.each_shard(|s| s.last_docid())?;
        let mut last = DocId::default();
        for (i, local) in locals.into_iter().enumerate().filter(|(_, local)| local.is_valid()) {
            let global = map.to_global(i, local).ok_or_else(|| {
                self.tag(i, Error::invalid_operation(format!(
                    "Document {} does not fit in the global id space of {} shards",
                    local,
                    self.shards.len()
                )))
            })?;
            last = last.max(global);
        }
        Ok(last)
    }

    pub fn avg_length(&self) -> Result<f64> {
        let stats = self.each_shard(|s| Ok((s.doc_count()?, s.avg_length()?)))?;
        let total_docs: u64 = stats.iter().map(|(count, _)| count).sum();
        if total_docs == 0 {
            return Ok(0.0);
        }
        let total_length: f64 = stats.iter().map(|&(count, avg)| count as f64 * avg).sum();
        Ok(total_length / total_docs as f64)
    }

    pub fn doc_length(&self, docid: DocId) -> Result<u64> {
        let (index, shard, local) = self.locate(docid)?;
        shard.doc_length(local).map_err(|e| self.tag(index, e))
    }

    pub fn term_freq(&self, term: &str) -> Result<u64> {
        Ok(self.each_shard(|s| s.term_freq(term))?.into_iter().sum())
    }

    pub fn collection_freq(&self, term: &str) -> Result<u64> {
        Ok(self.each_shard(|s| s.collection_freq(term))?.into_iter().sum())
    }

    pub fn term_exists(&self, term: &str) -> Result<bool> {
        Ok(self.term_freq(term)? > 0)
    }

    pub fn value_freq(&self, slot: ValueSlot) -> Result<u64> {
        Ok(self.each_shard(|s| s.value_freq(slot))?.into_iter().sum())
    }

    /// Smallest value in `slot` across shards that use it; "" if none do
    pub fn value_lower_bound(&self, slot: ValueSlot) -> Result<String> {
        let bounds = self.each_shard(|s| {
            if s.value_freq(slot)? == 0 {
                return Ok(None);
            }
            s.value_lower_bound(slot).map(Some)
        })?;
        Ok(bounds.into_iter().flatten().min().unwrap_or_default())
    }

    /// Largest value in `slot` across shards that use it; "" if none do
    pub fn value_upper_bound(&self, slot: ValueSlot) -> Result<String> {
        let bounds = self.each_shard(|s| {
            if s.value_freq(slot)? == 0 {
                return Ok(None);
            }
            s.value_upper_bound(slot).map(Some)
        })?;
        Ok(bounds.into_iter().flatten().max().unwrap_or_default())
    }

    pub fn has_positions(&self) -> Result<bool> {
        Ok(self.each_shard(|s| s.has_positions())?.into_iter().any(|p| p))
    }

    // ---- documents ----

    pub fn get_document(&self, docid: DocId) -> Result<Document> {
        let (index, shard, local) = self.locate(docid)?;
        let mut doc = shard.fetch_document(local).map_err(|e| self.tag(index, e))?;
        doc.id = docid;
        Ok(doc)
    }

    /// Like `get_document`, but nothing is read until the document's
    /// contents are first needed.
    pub fn get_document_lazily(&self, docid: DocId) -> Result<LazyDocument> {
        let (index, shard, local) = self.locate(docid)?;
        Ok(LazyDocument {
            docid,
            local,
            shard: shard.clone(),
            tag: (self.shards.len() > 1).then_some(index),
            loaded: OnceLock::new(),
        })
    }

    // ---- streams ----

    /// Documents indexed by `term` in global id order. The empty term
    /// lists every document.
    pub fn postings(&self, term: &str) -> Result<PostingMerge> {
        let streams = self.each_shard(|s| s.postings(term))?;
        Ok(DocMerge::new(self.map(), streams).with_filter(|p| p.wdf > 0))
    }

    /// Every term starting with `prefix`, statistics summed across shards
    pub fn all_terms(&self, prefix: &str) -> Result<TermMerge> {
        Ok(TermMerge::new(self.each_shard(|s| s.all_terms(prefix))?))
    }

    pub fn term_list(&self, docid: DocId) -> Result<BoxTermStream> {
        let (index, shard, local) = self.locate(docid)?;
        shard.term_list(local).map_err(|e| self.tag(index, e))
    }

    pub fn positions(&self, docid: DocId, term: &str) -> Result<PositionIter> {
        let (index, shard, local) = self.locate(docid)?;
        shard.positions(local, term).map_err(|e| self.tag(index, e))
    }

    pub fn value_stream(&self, slot: ValueSlot) -> Result<DocMerge<ValueEntry>> {
        let streams = self.each_shard(|s| s.value_stream(slot))?;
        Ok(DocMerge::new(self.map(), streams))
    }

    // ---- spelling and synonyms ----

    /// Spelling dictionary with frequencies summed across shards
    pub fn spellings(&self) -> Result<TermMerge> {
        Ok(TermMerge::new(self.each_shard(|s| s.spellings())?))
    }

    /// Best dictionary word within `max_edit_distance` edits of `word`,
    /// or "" if there is none
    pub fn spelling_suggestion(&self, word: &str, max_edit_distance: usize) -> Result<String> {
        Ok(spelling::best_suggestion(word, self.spellings()?, max_edit_distance))
    }

    /// `spelling_suggestion` with the default limit of
    /// `DEFAULT_MAX_EDIT_DISTANCE` edits
    pub fn suggest_spelling(&self, word: &str) -> Result<String> {
        self.spelling_suggestion(word, spelling::DEFAULT_MAX_EDIT_DISTANCE)
    }

    pub fn synonyms(&self, term: &str) -> Result<TermMerge> {
        Ok(TermMerge::new(self.each_shard(|s| s.synonyms(term))?))
    }

    pub fn synonym_keys(&self, prefix: &str) -> Result<TermMerge> {
        Ok(TermMerge::new(self.each_shard(|s| s.synonym_keys(prefix))?))
    }

    // ---- metadata (first shard only) ----

    pub fn metadata(&self, key: &str) -> Result<String> {
        self.check_open()?;
        if key.is_empty() {
            return Err(Error::invalid_argument("Empty metadata keys are invalid"));
        }
        match self.shards.first() {
            Some(shard) => shard.metadata(key),
            None => Ok(String::new()),
        }
    }

    pub fn metadata_keys(&self, prefix: &str) -> Result<BoxTermStream> {
        self.check_open()?;
        match self.shards.first() {
            Some(shard) => shard.metadata_keys(prefix),
            None => Ok(Box::new(VecTermStream::new(Vec::new()))),
        }
    }

    // ---- lifecycle ----

    pub fn uuid(&self) -> Result<Uuid> {
        self.check_open()?;
        match self.shards.as_slice() {
            [shard] => shard.uuid(),
            shards => Err(Error::unimplemented(format!(
                "UUID is only available for a single shard, this database has {}",
                shards.len()
            ))),
        }
    }

    pub fn keep_alive(&self) -> Result<()> {
        self.each_shard(|s| s.keep_alive()).map(|_| ())
    }

    /// Move every shard to its latest committed state. Streams created
    /// before the call keep reading the state they started with.
    pub fn reopen(&mut self) -> Result<()> {
        let fresh = self.each_shard(|s| s.reopen())?;
        self.shards = fresh;
        tracing::debug!("reopened database with {} shards", self.shards.len());
        Ok(())
    }

    /// Close every shard. Later calls do nothing; every other operation
    /// fails with `DatabaseClosed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_error = None;
        for shard in self.shards.drain(..) {
            if let Err(e) = shard.close() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.closed {
            return write!(f, "Database(closed)");
        }
        let parts: Vec<String> = self.shards.iter().map(|s| s.description()).collect();
        write!(f, "Database({})", parts.join(", "))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Handle to a document whose contents are fetched on first use
pub struct LazyDocument {
    docid: DocId,
    local: DocId,
    shard: ShardHandle,
    tag: Option<usize>,
    loaded: OnceLock<Document>,
}

impl LazyDocument {
    pub fn docid(&self) -> DocId {
        self.docid
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    pub fn document(&self) -> Result<&Document> {
        if let Some(doc) = self.loaded.get() {
            return Ok(doc);
        }
        let mut doc = self.shard.fetch_document(self.local).map_err(|e| match self.tag {
            Some(index) => e.in_shard(index),
            None => e,
        })?;
        doc.id = self.docid;
        Ok(self.loaded.get_or_init(|| doc))
    }

    pub fn get_field(&self, name: &str) -> Result<Option<&FieldValue>> {
        Ok(self.document()?.get_field(name))
    }

    pub fn get_value(&self, slot: ValueSlot) -> Result<&str> {
        Ok(self.document()?.get_value(slot))
    }
}
