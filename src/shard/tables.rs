use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Document, TermData, ValueSlot};
use crate::index::posting::{DocStream, Posting, ValueEntry};
use crate::index::term::{TermEntry, TermStream, VecTermStream};
use crate::shard::TableUpdate;
use crate::writer::buffer::Mutation;

/// Everything a shard knows apart from stored document bodies.
///
/// Tables are immutable once published: writers build the next version on
/// a copy and swap the `Arc`, so cursors that hold the old `Arc` keep a
/// consistent view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardTables {
    pub last_docid: u64,
    pub total_length: u64,
    pub doc_lengths: BTreeMap<u64, u64>,                     // docid -> length
    pub postings: BTreeMap<String, BTreeMap<u64, u32>>,      // term -> docid -> wdf
    pub termlists: BTreeMap<u64, BTreeMap<String, TermData>>,
    pub values: BTreeMap<ValueSlot, BTreeMap<u64, String>>,  // slot -> docid -> value
    pub spelling: BTreeMap<String, u64>,
    pub synonyms: BTreeMap<String, BTreeSet<String>>,
    pub metadata: BTreeMap<String, String>,
}

impl ShardTables {
    pub fn doc_count(&self) -> u64 {
        self.doc_lengths.len() as u64
    }

    pub fn avg_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        self.total_length as f64 / self.doc_lengths.len() as f64
    }

    pub fn contains(&self, docid: DocId) -> bool {
        self.doc_lengths.contains_key(&docid.0)
    }

    pub fn doc_length(&self, docid: DocId) -> Result<u64> {
        self.doc_lengths.get(&docid.0)
            .copied()
            .ok_or_else(|| Error::not_found(format!("Document {} not found", docid)))
    }

    pub fn term_freq(&self, term: &str) -> u64 {
        self.postings.get(term).map(|list| list.len() as u64).unwrap_or(0)
    }

    pub fn collection_freq(&self, term: &str) -> u64 {
        self.postings.get(term)
            .map(|list| list.values().map(|&wdf| wdf as u64).sum())
            .unwrap_or(0)
    }

    pub fn value_freq(&self, slot: ValueSlot) -> u64 {
        self.values.get(&slot).map(|v| v.len() as u64).unwrap_or(0)
    }

    pub fn value_lower_bound(&self, slot: ValueSlot) -> String {
        self.values.get(&slot)
            .and_then(|v| v.values().min().cloned())
            .unwrap_or_default()
    }

    pub fn value_upper_bound(&self, slot: ValueSlot) -> String {
        self.values.get(&slot)
            .and_then(|v| v.values().max().cloned())
            .unwrap_or_default()
    }

    pub fn has_positions(&self) -> bool {
        self.termlists.values()
            .any(|terms| terms.values().any(|t| !t.positions.is_empty()))
    }

    pub fn positions(&self, docid: DocId, term: &str) -> Result<Vec<u32>> {
        let terms = self.termlists.get(&docid.0)
            .ok_or_else(|| Error::not_found(format!("Document {} not found", docid)))?;
        Ok(terms.get(term).map(|t| t.positions.clone()).unwrap_or_default())
    }

    pub fn term_list(&self, docid: DocId) -> Result<VecTermStream> {
        let terms = self.termlists.get(&docid.0)
            .ok_or_else(|| Error::not_found(format!("Document {} not found", docid)))?;
        let entries = terms.iter()
            .map(|(term, data)| TermEntry {
                term: term.clone(),
                wdf: data.wdf,
                term_freq: self.term_freq(term),
                collection_freq: self.collection_freq(term),
            })
            .collect();
        Ok(VecTermStream::new(entries))
    }

    pub fn synonyms(&self, term: &str) -> VecTermStream {
        match self.synonyms.get(term) {
            Some(set) => VecTermStream::from_names(set.iter().cloned()),
            None => VecTermStream::new(Vec::new()),
        }
    }

    pub fn metadata(&self, key: &str) -> String {
        self.metadata.get(key).cloned().unwrap_or_default()
    }

    pub fn docids_for(&self, term: &str) -> Vec<DocId> {
        self.postings.get(term)
            .map(|list| list.keys().map(|&did| DocId(did)).collect())
            .unwrap_or_default()
    }

    // ---- mutation ----

    /// Apply a batch in order. Later records observe earlier ones.
    pub fn apply_batch(
        &mut self,
        documents: &mut BTreeMap<u64, Arc<Document>>,
        batch: &[Mutation],
        last_docid: DocId,
    ) {
        for mutation in batch {
            match mutation {
                Mutation::Add { docid, document }
                | Mutation::Replace { docid, document }
                | Mutation::ReplaceByTerm { docid, document, .. } => {
                    self.put_document(documents, *docid, document);
                }
                Mutation::Delete { docid } => {
                    if !self.remove_document(documents, *docid) {
                        tracing::debug!("delete of absent document {} ignored", docid);
                    }
                }
                Mutation::DeleteByTerm { term } => {
                    for docid in self.docids_for(term) {
                        self.remove_document(documents, docid);
                    }
                }
            }
        }
        self.last_docid = self.last_docid.max(last_docid.0);
    }

    fn put_document(
        &mut self,
        documents: &mut BTreeMap<u64, Arc<Document>>,
        docid: DocId,
        document: &Document,
    ) {
        self.remove_document(documents, docid);

        let did = docid.0;
        let length = document.length();
        self.doc_lengths.insert(did, length);
        self.total_length += length;
        for (term, data) in &document.terms {
            self.postings.entry(term.clone()).or_default().insert(did, data.wdf);
        }
        self.termlists.insert(did, document.terms.clone());
        for (slot, value) in &document.values {
            self.values.entry(*slot).or_default().insert(did, value.clone());
        }
        self.last_docid = self.last_docid.max(did);

        let mut stored = document.clone();
        stored.id = docid;
        documents.insert(did, Arc::new(stored));
    }

    fn remove_document(&mut self, documents: &mut BTreeMap<u64, Arc<Document>>, docid: DocId) -> bool {
        let did = docid.0;
        let Some(length) = self.doc_lengths.remove(&did) else {
            return false;
        };
        self.total_length -= length;

        if let Some(terms) = self.termlists.remove(&did) {
            for term in terms.keys() {
                if let Some(list) = self.postings.get_mut(term) {
                    list.remove(&did);
                    if list.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
        }
        self.values.retain(|_, slot| {
            slot.remove(&did);
            !slot.is_empty()
        });
        documents.remove(&did);
        true
    }

    pub fn apply_update(&mut self, update: &TableUpdate) {
        match update {
            TableUpdate::SetMetadata { key, value } => self.set_metadata(key, value),
            TableUpdate::AddSpelling { word, freq_inc } => self.add_spelling(word, *freq_inc),
            TableUpdate::RemoveSpelling { word, freq_dec } => self.remove_spelling(word, *freq_dec),
            TableUpdate::AddSynonym { term, synonym } => self.add_synonym(term, synonym),
            TableUpdate::RemoveSynonym { term, synonym } => self.remove_synonym(term, synonym),
            TableUpdate::ClearSynonyms { term } => self.clear_synonyms(term),
        }
    }

    pub fn add_spelling(&mut self, word: &str, freq_inc: u64) {
        let freq = self.spelling.entry(word.to_string()).or_insert(0);
        *freq = freq.saturating_add(freq_inc);
    }

    pub fn remove_spelling(&mut self, word: &str, freq_dec: u64) {
        if let Some(freq) = self.spelling.get_mut(word) {
            if *freq <= freq_dec {
                self.spelling.remove(word);
            } else {
                *freq -= freq_dec;
            }
        }
    }

    pub fn add_synonym(&mut self, term: &str, synonym: &str) {
        self.synonyms.entry(term.to_string()).or_default().insert(synonym.to_string());
    }

    pub fn remove_synonym(&mut self, term: &str, synonym: &str) {
        if let Some(set) = self.synonyms.get_mut(term) {
            set.remove(synonym);
            if set.is_empty() {
                self.synonyms.remove(term);
            }
        }
    }

    pub fn clear_synonyms(&mut self, term: &str) {
        self.synonyms.remove(term);
    }

    pub fn set_metadata(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.metadata.remove(key);
        } else {
            self.metadata.insert(key.to_string(), value.to_string());
        }
    }
}

// ---- cursors ----
//
// Each cursor owns an `Arc` of the tables it was created from and
// remembers where it stopped, so it is lazy and survives a reopen.

pub struct PostingCursor {
    tables: Arc<ShardTables>,
    term: String,
    next_from: u64,
}

impl PostingCursor {
    /// An empty term lists every document with a wdf of 1
    pub fn new(tables: Arc<ShardTables>, term: &str) -> Self {
        PostingCursor { tables, term: term.to_string(), next_from: 1 }
    }
}

impl Iterator for PostingCursor {
    type Item = Posting;

    fn next(&mut self) -> Option<Posting> {
        let (did, wdf) = if self.term.is_empty() {
            let (&did, _) = self.tables.doc_lengths.range(self.next_from..).next()?;
            (did, 1)
        } else {
            let list = self.tables.postings.get(&self.term)?;
            let (&did, &wdf) = list.range(self.next_from..).next()?;
            (did, wdf)
        };
        self.next_from = did + 1;
        Some(Posting {
            docid: DocId(did),
            wdf,
            doc_length: self.tables.doc_lengths.get(&did).copied().unwrap_or(0),
        })
    }
}

impl DocStream<Posting> for PostingCursor {
    fn skip_to(&mut self, target: DocId) {
        self.next_from = self.next_from.max(target.0);
    }
}

pub struct ValueCursor {
    tables: Arc<ShardTables>,
    slot: ValueSlot,
    next_from: u64,
}

impl ValueCursor {
    pub fn new(tables: Arc<ShardTables>, slot: ValueSlot) -> Self {
        ValueCursor { tables, slot, next_from: 1 }
    }
}

impl Iterator for ValueCursor {
    type Item = ValueEntry;

    fn next(&mut self) -> Option<ValueEntry> {
        let slot = self.tables.values.get(&self.slot)?;
        let (&did, value) = slot.range(self.next_from..).next()?;
        self.next_from = did + 1;
        Some(ValueEntry { docid: DocId(did), value: value.clone() })
    }
}

impl DocStream<ValueEntry> for ValueCursor {
    fn skip_to(&mut self, target: DocId) {
        self.next_from = self.next_from.max(target.0);
    }
}

/// Which string-keyed table a `KeyCursor` walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTable {
    Terms,
    Spelling,
    SynonymKeys,
    MetadataKeys,
}

pub struct KeyCursor {
    tables: Arc<ShardTables>,
    table: KeyTable,
    prefix: String,
    lower: Bound<String>,
}

impl KeyCursor {
    pub fn new(tables: Arc<ShardTables>, table: KeyTable, prefix: &str) -> Self {
        KeyCursor {
            tables,
            table,
            prefix: prefix.to_string(),
            lower: Bound::Included(prefix.to_string()),
        }
    }

    fn first_after<'a, V>(map: &'a BTreeMap<String, V>, lower: &Bound<String>) -> Option<(&'a String, &'a V)> {
        let lower = match lower {
            Bound::Included(key) => Bound::Included(key.as_str()),
            Bound::Excluded(key) => Bound::Excluded(key.as_str()),
            Bound::Unbounded => Bound::Unbounded,
        };
        map.range::<str, _>((lower, Bound::Unbounded)).next()
    }

    fn peek_entry(&self) -> Option<TermEntry> {
        let tables = &self.tables;
        match self.table {
            KeyTable::Terms => {
                let (term, list) = Self::first_after(&tables.postings, &self.lower)?;
                Some(TermEntry {
                    term: term.clone(),
                    wdf: 0,
                    term_freq: list.len() as u64,
                    collection_freq: list.values().map(|&wdf| wdf as u64).sum(),
                })
            }
            KeyTable::Spelling => {
                let (word, &freq) = Self::first_after(&tables.spelling, &self.lower)?;
                Some(TermEntry { term: word.clone(), term_freq: freq, ..Default::default() })
            }
            KeyTable::SynonymKeys => {
                let (term, _) = Self::first_after(&tables.synonyms, &self.lower)?;
                Some(TermEntry::new(term.clone()))
            }
            KeyTable::MetadataKeys => {
                let (key, _) = Self::first_after(&tables.metadata, &self.lower)?;
                Some(TermEntry::new(key.clone()))
            }
        }
    }
}

impl Iterator for KeyCursor {
    type Item = TermEntry;

    fn next(&mut self) -> Option<TermEntry> {
        let entry = self.peek_entry()?;
        if !entry.term.starts_with(&self.prefix) {
            return None;
        }
        self.lower = Bound::Excluded(entry.term.clone());
        Some(entry)
    }
}

impl TermStream for KeyCursor {
    fn skip_to(&mut self, target: &str) {
        let behind = match &self.lower {
            Bound::Included(key) => key.as_str() < target,
            Bound::Excluded(key) => key.as_str() < target,
            Bound::Unbounded => true,
        };
        if behind {
            self.lower = Bound::Included(target.to_string());
        }
    }
}
