use std::collections::{BTreeMap, BTreeSet};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document};

/// A buffered document-level change
#[derive(Debug, Clone)]
pub enum Mutation {
    Add { docid: DocId, document: Document },
    Delete { docid: DocId },
    DeleteByTerm { term: String },
    Replace { docid: DocId, document: Document },
    /// `docid` is resolved when the record is buffered: the lowest id
    /// indexed by `term` at that point in the batch, or a fresh id
    ReplaceByTerm { term: String, document: Document, docid: DocId },
}

/// Pending mutations for one writable shard plus its docid allocator
pub struct MutationBuffer {
    pub pending: Vec<Mutation>,
    pub last_allocated: u64,
    pub threshold: usize,
}

impl MutationBuffer {
    pub fn new(last_docid: DocId, threshold: usize) -> Self {
        MutationBuffer {
            pending: Vec::new(),
            last_allocated: last_docid.0,
            threshold: threshold.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.pending.push(mutation);
    }

    /// True once enough mutations are buffered to warrant a flush
    pub fn should_flush(&self) -> bool {
        self.pending.len() >= self.threshold
    }

    pub fn last_docid(&self) -> DocId {
        DocId(self.last_allocated)
    }

    pub fn allocate(&mut self) -> Result<DocId> {
        let next = self.last_allocated.checked_add(1)
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "Document id space exhausted".to_string()))?;
        self.last_allocated = next;
        Ok(DocId(next))
    }

    /// Move the allocator past `docid`. Returns how far it jumped.
    pub fn advance_past(&mut self, docid: DocId) -> u64 {
        if docid.0 <= self.last_allocated {
            return 0;
        }
        let jump = docid.0 - self.last_allocated;
        self.last_allocated = docid.0;
        jump
    }

    /// Drop every pending mutation and rewind the allocator
    pub fn discard(&mut self, persisted_last: DocId) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.last_allocated = persisted_last.0;
        dropped
    }

    /// Lowest id that would be indexed by `term` if the pending batch were
    /// flushed now.
    ///
    /// `flushed_docids` lists the ids indexed by a term in the flushed
    /// shard. Pending records are replayed in order, including deletes by
    /// other terms, so the answer matches what the flush will do.
    pub fn resolve_term<F>(&self, term: &str, flushed_docids: F) -> Option<DocId>
    where
        F: Fn(&str) -> Vec<DocId>,
    {
        let mut ids: BTreeSet<DocId> = flushed_docids(term).into_iter().collect();
        // Documents the batch has written so far; `None` once deleted
        let mut touched: BTreeMap<DocId, Option<&Document>> = BTreeMap::new();

        for mutation in &self.pending {
            match mutation {
                Mutation::Add { docid, document }
                | Mutation::Replace { docid, document }
                | Mutation::ReplaceByTerm { docid, document, .. } => {
                    if document.has_term(term) {
                        ids.insert(*docid);
                    } else {
                        ids.remove(docid);
                    }
                    touched.insert(*docid, Some(document));
                }
                Mutation::Delete { docid } => {
                    ids.remove(docid);
                    touched.insert(*docid, None);
                }
                Mutation::DeleteByTerm { term: other } => {
                    let removed: Vec<DocId> = if other == term {
                        ids.iter().copied().collect()
                    } else {
                        let flushed_other: BTreeSet<DocId> = flushed_docids(other).into_iter().collect();
                        ids.iter()
                            .copied()
                            .filter(|id| match touched.get(id) {
                                Some(Some(document)) => document.has_term(other),
                                Some(None) => false,
                                None => flushed_other.contains(id),
                            })
                            .collect()
                    };
                    for docid in removed {
                        ids.remove(&docid);
                        touched.insert(docid, None);
                    }
                }
            }
        }
        ids.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(term: &str) -> Document {
        let mut doc = Document::new();
        doc.add_term(term, 1);
        doc
    }

    #[test]
    fn test_allocate_is_monotonic() {
        let mut buffer = MutationBuffer::new(DocId(5), 10);
        assert_eq!(buffer.allocate().unwrap(), DocId(6));
        assert_eq!(buffer.allocate().unwrap(), DocId(7));
        assert_eq!(buffer.advance_past(DocId(20)), 13);
        assert_eq!(buffer.allocate().unwrap(), DocId(21));
        assert_eq!(buffer.advance_past(DocId(3)), 0);
    }

    #[test]
    fn test_allocate_overflow() {
        let mut buffer = MutationBuffer::new(DocId(u64::MAX), 10);
        let err = buffer.allocate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_should_flush_threshold() {
        let mut buffer = MutationBuffer::new(DocId(0), 2);
        buffer.push(Mutation::Delete { docid: DocId(1) });
        assert!(!buffer.should_flush());
        buffer.push(Mutation::Delete { docid: DocId(2) });
        assert!(buffer.should_flush());
        assert_eq!(buffer.discard(DocId(0)), 2);
        assert!(buffer.is_empty());
    }

    fn flushed(entries: &[(&str, &[u64])]) -> impl Fn(&str) -> Vec<DocId> + use<> {
        let table: BTreeMap<String, Vec<DocId>> = entries.iter()
            .map(|(term, ids)| (term.to_string(), ids.iter().map(|&id| DocId(id)).collect()))
            .collect();
        move |term| table.get(term).cloned().unwrap_or_default()
    }

    #[test]
    fn test_resolve_term_follows_pending() {
        let mut buffer = MutationBuffer::new(DocId(4), 10);
        assert_eq!(buffer.resolve_term("uid", flushed(&[])), None);

        buffer.push(Mutation::Add { docid: DocId(5), document: doc_with("uid") });
        assert_eq!(buffer.resolve_term("uid", flushed(&[])), Some(DocId(5)));
        assert_eq!(buffer.resolve_term("uid", flushed(&[("uid", &[2])])), Some(DocId(2)));

        buffer.push(Mutation::Delete { docid: DocId(2) });
        assert_eq!(buffer.resolve_term("uid", flushed(&[("uid", &[2])])), Some(DocId(5)));

        buffer.push(Mutation::DeleteByTerm { term: "uid".to_string() });
        assert_eq!(buffer.resolve_term("uid", flushed(&[("uid", &[2])])), None);
    }

    #[test]
    fn test_resolve_term_sees_delete_by_other_term() {
        // Flushed: 1 holds X and Y, 2 holds X
        let shard = flushed(&[("X", &[1, 2]), ("Y", &[1])]);
        let mut buffer = MutationBuffer::new(DocId(2), 10);
        buffer.push(Mutation::DeleteByTerm { term: "Y".to_string() });
        assert_eq!(buffer.resolve_term("X", &shard), Some(DocId(2)));

        // A pending rewrite of 2 that adds Y is caught by a later delete
        let mut tagged = doc_with("X");
        tagged.add_term("Y", 1);
        buffer.push(Mutation::Replace { docid: DocId(2), document: tagged });
        buffer.push(Mutation::DeleteByTerm { term: "Y".to_string() });
        assert_eq!(buffer.resolve_term("X", &shard), None);

        // A pending document without Y survives the delete
        buffer.push(Mutation::Add { docid: DocId(3), document: doc_with("X") });
        buffer.push(Mutation::DeleteByTerm { term: "Y".to_string() });
        assert_eq!(buffer.resolve_term("X", &shard), Some(DocId(3)));
    }
}
