/// One entry of a term sequence.
///
/// Which statistics are meaningful depends on the producer: term lists
/// fill `wdf`, all-terms and spelling streams fill `term_freq` (for
/// spellings this is the word frequency).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TermEntry {
    pub term: String,
    pub wdf: u32,
    pub term_freq: u64,
    pub collection_freq: u64,
}

impl TermEntry {
    pub fn new(term: impl Into<String>) -> Self {
        TermEntry {
            term: term.into(),
            ..Default::default()
        }
    }
}

/// Forward-only stream of terms in ascending byte order
pub trait TermStream: Iterator<Item = TermEntry> + Send {
    /// Advance so that the next term returned is `>= target`
    fn skip_to(&mut self, target: &str);
}

pub type BoxTermStream = Box<dyn TermStream>;

/// Term stream over a sorted vector
pub struct VecTermStream {
    terms: Vec<TermEntry>,
    cursor: usize,
}

impl VecTermStream {
    pub fn new(terms: Vec<TermEntry>) -> Self {
        VecTermStream { terms, cursor: 0 }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VecTermStream::new(names.into_iter().map(TermEntry::new).collect())
    }
}

impl Iterator for VecTermStream {
    type Item = TermEntry;

    fn next(&mut self) -> Option<TermEntry> {
        let entry = self.terms.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(entry)
    }
}

impl TermStream for VecTermStream {
    fn skip_to(&mut self, target: &str) {
        let rest = &self.terms[self.cursor..];
        self.cursor += rest.partition_point(|t| t.term.as_str() < target);
    }
}
