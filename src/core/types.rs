use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Utc};

/// Document id. Ids are positive; 0 means "not assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct DocId(pub u64);

impl DocId {
    pub fn new(id: u64) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type ValueSlot = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
}

/// Per-document data for one term
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermData {
    pub wdf: u32,
    pub positions: Vec<u32>,  // Sorted, no duplicates
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub fields: HashMap<String, FieldValue>,
    pub terms: BTreeMap<String, TermData>,
    pub values: BTreeMap<ValueSlot, String>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn add_field(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Index the document by `term`, increasing its wdf by `wdf_inc`.
    /// A wdf of 0 makes a boolean term: it indexes the document but
    /// does not count towards its length.
    pub fn add_term(&mut self, term: &str, wdf_inc: u32) {
        let data = self.terms.entry(term.to_string()).or_default();
        data.wdf = data.wdf.saturating_add(wdf_inc);
    }

    pub fn add_boolean_term(&mut self, term: &str) {
        self.add_term(term, 0);
    }

    pub fn add_posting(&mut self, term: &str, position: u32, wdf_inc: u32) {
        let data = self.terms.entry(term.to_string()).or_default();
        data.wdf = data.wdf.saturating_add(wdf_inc);
        if let Err(at) = data.positions.binary_search(&position) {
            data.positions.insert(at, position);
        }
    }

    pub fn remove_term(&mut self, term: &str) -> bool {
        self.terms.remove(term).is_some()
    }

    pub fn has_term(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn add_value(&mut self, slot: ValueSlot, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&slot);
        } else {
            self.values.insert(slot, value);
        }
    }

    pub fn get_value(&self, slot: ValueSlot) -> &str {
        self.values.get(&slot).map(String::as_str).unwrap_or("")
    }

    /// Sum of the wdf of every term
    pub fn length(&self) -> u64 {
        self.terms.values().map(|t| t.wdf as u64).sum()
    }
}
