use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use crate::core::types::DocId;
use crate::index::posting::{DocKeyed, DocStream, Posting};
use crate::index::term::{BoxTermStream, TermEntry, TermStream};

/// Mapping between global document ids and (shard, local id) pairs.
///
/// Shard `i` of `n` owns the global ids congruent to `i + 1` modulo `n`:
/// local id `l` becomes `(l - 1) * n + i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocidMap {
    pub shard_count: usize,
}

impl DocidMap {
    pub fn new(shard_count: usize) -> Self {
        DocidMap { shard_count: shard_count.max(1) }
    }

    /// `None` when the global id would not fit in a `u64`
    pub fn to_global(&self, shard: usize, local: DocId) -> Option<DocId> {
        let n = self.shard_count as u64;
        local.0.checked_sub(1)?
            .checked_mul(n)?
            .checked_add(shard as u64 + 1)
            .map(DocId)
    }

    /// Returns `(shard index, local id)`. `global` must be non-zero.
    pub fn to_local(&self, global: DocId) -> (usize, DocId) {
        let n = self.shard_count as u64;
        let shard = ((global.0 - 1) % n) as usize;
        (shard, DocId((global.0 - 1) / n + 1))
    }

    /// Smallest local id in `shard` whose global id is `>= target`
    pub fn local_lower_bound(&self, shard: usize, target: DocId) -> DocId {
        let n = self.shard_count as u64;
        let offset = shard as u64 + 1;
        if target.0 <= offset {
            return DocId(1);
        }
        DocId((target.0 - offset).div_ceil(n) + 1)
    }
}

struct DocHead<T> {
    global: DocId,
    shard: usize,
    item: T,
}

impl<T> PartialEq for DocHead<T> {
    fn eq(&self, other: &Self) -> bool {
        self.global == other.global
    }
}

impl<T> Eq for DocHead<T> {}

impl<T> PartialOrd for DocHead<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for DocHead<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.global.cmp(&other.global)
    }
}

/// K-way merge of per-shard streams into one stream ordered by global id.
///
/// Global ids from different shards never collide, so each step pops the
/// smallest head and refills from the shard it came from.
pub struct DocMerge<T> {
    map: DocidMap,
    streams: Vec<Box<dyn DocStream<T>>>,
    heap: BinaryHeap<Reverse<DocHead<T>>>,
    keep: Option<fn(&T) -> bool>,
}

impl<T: DocKeyed + Send + 'static> DocMerge<T> {
    pub fn new(map: DocidMap, streams: Vec<Box<dyn DocStream<T>>>) -> Self {
        let mut merge = DocMerge {
            map,
            heap: BinaryHeap::with_capacity(streams.len()),
            streams,
            keep: None,
        };
        for shard in 0..merge.streams.len() {
            merge.refill(shard);
        }
        merge
    }

    /// Drop items for which `keep` returns false
    pub fn with_filter(mut self, keep: fn(&T) -> bool) -> Self {
        self.keep = Some(keep);
        self
    }

    pub fn shard_count(&self) -> usize {
        self.streams.len()
    }

    fn refill(&mut self, shard: usize) {
        let Some(mut item) = self.streams[shard].next() else {
            return;
        };
        // Local ids ascend, so nothing after an unmappable id maps either
        let Some(global) = self.map.to_global(shard, item.docid()) else {
            tracing::warn!("shard {} holds document {} beyond the global id space", shard, item.docid());
            return;
        };
        item.set_docid(global);
        self.heap.push(Reverse(DocHead { global, shard, item }));
    }
}

impl<T: DocKeyed + Send + 'static> Iterator for DocMerge<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let Reverse(head) = self.heap.pop()?;
            self.refill(head.shard);
            match self.keep {
                Some(keep) if !keep(&head.item) => continue,
                _ => return Some(head.item),
            }
        }
    }
}

impl<T: DocKeyed + Send + 'static> DocStream<T> for DocMerge<T> {
    fn skip_to(&mut self, target: DocId) {
        let mut behind = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.global >= target {
                break;
            }
            if let Some(Reverse(head)) = self.heap.pop() {
                behind.push(head.shard);
            }
        }
        for shard in behind {
            let local = self.map.local_lower_bound(shard, target);
            self.streams[shard].skip_to(local);
            self.refill(shard);
        }
    }
}

pub type PostingMerge = DocMerge<Posting>;

struct TermHead {
    entry: TermEntry,
    shard: usize,
}

impl PartialEq for TermHead {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TermHead {}

impl PartialOrd for TermHead {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermHead {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry.term.cmp(&other.entry.term)
            .then(self.shard.cmp(&other.shard))
    }
}

/// K-way merge of term streams in byte order.
///
/// When several shards hold the same term the entries are folded into
/// one: frequencies and wdf are summed.
pub struct TermMerge {
    streams: Vec<BoxTermStream>,
    heap: BinaryHeap<Reverse<TermHead>>,
}

impl TermMerge {
    pub fn new(streams: Vec<BoxTermStream>) -> Self {
        let mut merge = TermMerge {
            heap: BinaryHeap::with_capacity(streams.len()),
            streams,
        };
        for shard in 0..merge.streams.len() {
            merge.refill(shard);
        }
        merge
    }

    fn refill(&mut self, shard: usize) {
        if let Some(entry) = self.streams[shard].next() {
            self.heap.push(Reverse(TermHead { entry, shard }));
        }
    }
}

impl Iterator for TermMerge {
    type Item = TermEntry;

    fn next(&mut self) -> Option<TermEntry> {
        let Reverse(first) = self.heap.pop()?;
        let mut merged = first.entry;
        self.refill(first.shard);

        while let Some(Reverse(head)) = self.heap.peek() {
            if head.entry.term != merged.term {
                break;
            }
            if let Some(Reverse(head)) = self.heap.pop() {
                merged.wdf += head.entry.wdf;
                merged.term_freq += head.entry.term_freq;
                merged.collection_freq += head.entry.collection_freq;
                self.refill(head.shard);
            }
        }

        Some(merged)
    }
}

impl TermStream for TermMerge {
    fn skip_to(&mut self, target: &str) {
        let mut behind = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.entry.term.as_str() >= target {
                break;
            }
            if let Some(Reverse(head)) = self.heap.pop() {
                behind.push(head.shard);
            }
        }
        for shard in behind {
            self.streams[shard].skip_to(target);
            self.refill(shard);
        }
    }
}
