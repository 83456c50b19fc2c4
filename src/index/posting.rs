use crate::core::types::DocId;

/// One entry of a postings list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub docid: DocId,
    pub wdf: u32,         // Occurrences of the term in the document
    pub doc_length: u64,  // Sum of wdf over the whole document
}

/// One document's value in a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    pub docid: DocId,
    pub value: String,
}

/// Items that are ordered by document id.
/// Merging rewrites the id from local to global.
pub trait DocKeyed {
    fn docid(&self) -> DocId;
    fn set_docid(&mut self, docid: DocId);
}

impl DocKeyed for Posting {
    fn docid(&self) -> DocId {
        self.docid
    }

    fn set_docid(&mut self, docid: DocId) {
        self.docid = docid;
    }
}

impl DocKeyed for ValueEntry {
    fn docid(&self) -> DocId {
        self.docid
    }

    fn set_docid(&mut self, docid: DocId) {
        self.docid = docid;
    }
}

/// Forward-only stream ordered by document id.
///
/// Streams own whatever snapshot they read from, so they stay valid after
/// the database that produced them is reopened or dropped.
pub trait DocStream<T>: Iterator<Item = T> + Send {
    /// Advance so that the next item returned has `docid >= target`.
    /// Never moves backwards.
    fn skip_to(&mut self, target: DocId);
}

pub type PostingStream = Box<dyn DocStream<Posting>>;
pub type ValueStream = Box<dyn DocStream<ValueEntry>>;

/// Stream over a fixed, already sorted vector
pub struct VecDocStream<T> {
    items: std::vec::IntoIter<T>,
    peeked: Option<T>,
}

impl<T: DocKeyed> VecDocStream<T> {
    pub fn new(items: Vec<T>) -> Self {
        VecDocStream {
            items: items.into_iter(),
            peeked: None,
        }
    }
}

impl<T: DocKeyed> Iterator for VecDocStream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.peeked.take().or_else(|| self.items.next())
    }
}

impl<T: DocKeyed + Send> DocStream<T> for VecDocStream<T> {
    fn skip_to(&mut self, target: DocId) {
        while let Some(item) = self.next() {
            if item.docid() >= target {
                self.peeked = Some(item);
                return;
            }
        }
    }
}

/// Positions of one term within one document
#[derive(Debug, Clone)]
pub struct PositionIter {
    positions: Vec<u32>,
    cursor: usize,
}

impl PositionIter {
    pub fn new(positions: Vec<u32>) -> Self {
        PositionIter { positions, cursor: 0 }
    }

    pub fn empty() -> Self {
        PositionIter::new(Vec::new())
    }

    /// Total number of positions, consumed or not
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn skip_to(&mut self, target: u32) {
        let rest = &self.positions[self.cursor..];
        self.cursor += rest.partition_point(|&p| p < target);
    }
}

impl Iterator for PositionIter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let pos = self.positions.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(pos)
    }
}
