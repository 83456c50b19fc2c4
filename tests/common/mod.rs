#![allow(dead_code)]

use std::path::{Path, PathBuf};
use shardenx::core::config::Config;
use shardenx::{DocId, Document, FieldValue, OpenMode, WritableDatabase};
use tempfile::TempDir;

pub fn text_doc(title: &str, terms: &[&str]) -> Document {
    let mut doc = Document::new();
    doc.add_field("title".to_string(), FieldValue::Text(title.to_string()));
    for (pos, term) in terms.iter().enumerate() {
        doc.add_posting(term, pos as u32 + 1, 1);
    }
    doc
}

pub fn doc_with_value(term: &str, slot: u32, value: &str) -> Document {
    let mut doc = Document::new();
    doc.add_term(term, 1);
    doc.add_value(slot, value);
    doc
}

pub fn shard_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

pub fn create_db(path: &Path) -> WritableDatabase {
    WritableDatabase::open(path, OpenMode::CreateOrOverwrite).unwrap()
}

pub fn create_db_with(path: &Path, config: Config) -> WritableDatabase {
    WritableDatabase::open_with_config(path, OpenMode::CreateOrOverwrite, config).unwrap()
}

/// Write a shard holding one document per entry of `docs`
pub fn build_shard(path: &Path, docs: &[Document]) {
    let db = create_db(path);
    for doc in docs {
        db.add_document(doc.clone()).unwrap();
    }
    db.close().unwrap();
}

pub fn ids(iter: impl Iterator<Item = DocId>) -> Vec<u64> {
    iter.map(|d| d.0).collect()
}
