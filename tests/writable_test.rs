mod common;

use std::collections::BTreeMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardenx::core::config::Config;
use shardenx::core::transaction::TransactionState;
use shardenx::{Database, DocId, ErrorKind, FieldValue, OpenMode, WritableDatabase};
use tempfile::TempDir;
use common::*;

fn title_of(db: &Database, docid: DocId) -> String {
    match db.get_document(docid).unwrap().get_field("title") {
        Some(FieldValue::Text(title)) => title.clone(),
        other => panic!("unexpected title {:?}", other),
    }
}

#[test]
fn test_random_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    let db = create_db_with(&path, Config::default().with_flush_threshold(25));

    let mut rng = StdRng::seed_from_u64(7);
    let mut model: BTreeMap<u64, String> = BTreeMap::new();

    for step in 0..400 {
        let existing: Vec<u64> = model.keys().copied().collect();
        match rng.gen_range(0..10) {
            0..=4 => {
                let title = format!("added {}", step);
                let id = db.add_document(text_doc(&title, &["body", "added"])).unwrap();
                model.insert(id.0, title);
            }
            5 | 6 if !existing.is_empty() => {
                let id = existing[rng.gen_range(0..existing.len())];
                let title = format!("replaced {}", step);
                db.replace_document(DocId(id), text_doc(&title, &["body", "replaced"])).unwrap();
                model.insert(id, title);
            }
            7 | 8 if !existing.is_empty() => {
                let id = existing[rng.gen_range(0..existing.len())];
                db.delete_document(DocId(id)).unwrap();
                model.remove(&id);
            }
            _ => db.flush().unwrap(),
        }
    }
    db.close().unwrap();

    let reader = Database::open(&path).unwrap();
    assert_eq!(reader.doc_count().unwrap(), model.len() as u64);
    let listed = ids(reader.postings("").unwrap().map(|p| p.docid));
    assert_eq!(listed, model.keys().copied().collect::<Vec<_>>());
    for (&id, title) in &model {
        assert_eq!(&title_of(&reader, DocId(id)), title);
    }
    assert_eq!(reader.term_freq("body").unwrap(), model.len() as u64);
}

#[test]
fn test_docids_are_monotonic() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    let db = create_db(&path);

    let first = db.add_document(text_doc("a", &["a"])).unwrap();
    db.flush().unwrap();
    db.delete_document(first).unwrap();
    db.flush().unwrap();
    let second = db.add_document(text_doc("b", &["b"])).unwrap();
    assert!(second > first);
    db.close().unwrap();

    let db = WritableDatabase::open(&path, OpenMode::Open).unwrap();
    let third = db.add_document(text_doc("c", &["c"])).unwrap();
    assert!(third > second);
    assert_eq!(db.last_docid().unwrap(), second);
}

#[test]
fn test_replace_by_term_without_match_adds() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("existing", &["keep"])).unwrap();
    db.flush().unwrap();

    let id = db.replace_document_by_term("Quid42", text_doc("new", &["Quid42"])).unwrap();
    assert_eq!(id, DocId(2));
    db.flush().unwrap();
    assert_eq!(db.doc_count().unwrap(), 2);
    assert_eq!(title_of(&db, id), "new");
    assert_eq!(db.add_document(text_doc("next", &["next"])).unwrap(), DocId(3));
}

#[test]
fn test_replace_by_term_replaces_lowest_only() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    for i in 1..=9u64 {
        let term = if matches!(i, 3 | 7 | 9) { "X" } else { "other" };
        db.add_document(text_doc(&format!("doc {}", i), &[term])).unwrap();
    }
    db.flush().unwrap();

    let id = db.replace_document_by_term("X", text_doc("replacement", &["X", "fresh"])).unwrap();
    assert_eq!(id, DocId(3));
    db.flush().unwrap();

    assert_eq!(ids(db.postings("fresh").unwrap().map(|p| p.docid)), vec![3]);
    assert_eq!(ids(db.postings("X").unwrap().map(|p| p.docid)), vec![3, 7, 9]);
    assert_eq!(title_of(&db, DocId(7)), "doc 7");
    assert_eq!(title_of(&db, DocId(9)), "doc 9");
    assert_eq!(db.doc_count().unwrap(), 9);
}

#[test]
fn test_replace_by_term_after_pending_delete_picks_survivor() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("both", &["X", "Y"])).unwrap();
    db.add_document(text_doc("only x", &["X"])).unwrap();
    db.flush().unwrap();

    db.delete_document_by_term("Y").unwrap();
    let id = db.replace_document_by_term("X", text_doc("new", &["X"])).unwrap();
    assert_eq!(id, DocId(2));
    db.flush().unwrap();

    assert_eq!(ids(db.postings("X").unwrap().map(|p| p.docid)), vec![2]);
    assert_eq!(title_of(&db, id), "new");
    assert_eq!(db.get_document(DocId(1)).unwrap_err().kind, ErrorKind::NotFound);
}

#[test]
fn test_replace_by_term_after_pending_delete_does_not_reuse_ids() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("both", &["X", "Y"])).unwrap();
    db.flush().unwrap();

    db.delete_document_by_term("Y").unwrap();
    let id = db.replace_document_by_term("X", text_doc("new", &["X"])).unwrap();
    assert_eq!(id, DocId(2));
    assert_eq!(db.add_document(text_doc("next", &["next"])).unwrap(), DocId(3));
    db.flush().unwrap();

    assert_eq!(db.doc_count().unwrap(), 2);
    assert_eq!(db.get_document(DocId(1)).unwrap_err().kind, ErrorKind::NotFound);
    assert_eq!(title_of(&db, id), "new");
}

#[test]
fn test_later_records_see_earlier_ones() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("temp", &["tmp"])).unwrap();
    db.add_document(text_doc("stays", &["keep"])).unwrap();
    db.delete_document_by_term("tmp").unwrap();
    db.flush().unwrap();
    assert_eq!(db.doc_count().unwrap(), 1);
    assert_eq!(db.term_freq("tmp").unwrap(), 0);
}

#[test]
fn test_replace_high_id_moves_allocator() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.replace_document(DocId(100), text_doc("far", &["far"])).unwrap();
    assert_eq!(db.add_document(text_doc("next", &["next"])).unwrap(), DocId(101));
    db.flush().unwrap();
    assert_eq!(db.last_docid().unwrap(), DocId(101));
    assert_eq!(db.delete_document(DocId(0)).unwrap_err().kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_unflushed_cancel_discards_earlier_work() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("before", &["before"])).unwrap();

    db.begin_transaction(false).unwrap();
    assert_eq!(db.transaction_state(), TransactionState::ActiveUnflushed);
    db.add_document(text_doc("inside", &["inside"])).unwrap();
    db.cancel_transaction().unwrap();

    assert_eq!(db.transaction_state(), TransactionState::Idle);
    assert_eq!(db.pending_mutations(), 0);
    db.flush().unwrap();
    assert_eq!(db.doc_count().unwrap(), 0);
    // The allocator is back at the persisted position
    assert_eq!(db.add_document(text_doc("after", &["after"])).unwrap(), DocId(1));
}

#[test]
fn test_unflushed_cancel_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    let db = create_db(&path);
    db.add_document(text_doc("A", &["a"])).unwrap();
    db.begin_transaction(false).unwrap();
    db.add_document(text_doc("B", &["b"])).unwrap();
    db.cancel_transaction().unwrap();
    db.close().unwrap();

    let reader = Database::open(&path).unwrap();
    assert_eq!(reader.doc_count().unwrap(), 0);
    assert_eq!(reader.term_freq("a").unwrap(), 0);
    assert_eq!(reader.term_freq("b").unwrap(), 0);
}

#[test]
fn test_flushed_transaction() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("before", &["before"])).unwrap();

    db.begin_transaction(true).unwrap();
    assert_eq!(db.doc_count().unwrap(), 1);
    db.add_document(text_doc("inside", &["inside"])).unwrap();
    db.commit_transaction().unwrap();
    assert_eq!(db.doc_count().unwrap(), 2);

    db.begin_transaction(true).unwrap();
    db.add_document(text_doc("dropped", &["dropped"])).unwrap();
    db.cancel_transaction().unwrap();
    assert_eq!(db.doc_count().unwrap(), 2);
    assert_eq!(db.add_document(text_doc("next", &["next"])).unwrap(), DocId(3));
}

#[test]
fn test_unflushed_commit_keeps_buffer() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("a", &["a"])).unwrap();
    db.begin_transaction(false).unwrap();
    db.add_document(text_doc("b", &["b"])).unwrap();
    db.commit_transaction().unwrap();

    assert_eq!(db.pending_mutations(), 2);
    assert_eq!(db.doc_count().unwrap(), 0);
    db.flush().unwrap();
    assert_eq!(db.doc_count().unwrap(), 2);
}

#[test]
fn test_transaction_misuse() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));

    assert_eq!(db.commit_transaction().unwrap_err().kind, ErrorKind::InvalidOperation);
    assert_eq!(db.cancel_transaction().unwrap_err().kind, ErrorKind::InvalidOperation);

    db.begin_transaction(false).unwrap();
    assert_eq!(db.begin_transaction(true).unwrap_err().kind, ErrorKind::InvalidOperation);
    assert_eq!(db.flush().unwrap_err().kind, ErrorKind::InvalidOperation);
    db.commit_transaction().unwrap();
    db.flush().unwrap();
}

#[test]
fn test_no_auto_flush_inside_transaction() {
    let dir = TempDir::new().unwrap();
    let db = create_db_with(&shard_path(&dir, "db"), Config::default().with_flush_threshold(2));
    db.begin_transaction(false).unwrap();
    for i in 0..5 {
        db.add_document(text_doc(&i.to_string(), &["t"])).unwrap();
    }
    assert_eq!(db.doc_count().unwrap(), 0);
    db.cancel_transaction().unwrap();
    assert_eq!(db.doc_count().unwrap(), 0);
}

#[test]
fn test_auxiliary_updates_ignore_transactions() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    let db = create_db(&path);

    db.begin_transaction(false).unwrap();
    db.set_metadata("owner", "search-team").unwrap();
    db.add_spelling("hello", 3).unwrap();
    db.add_synonym("car", "automobile").unwrap();
    db.cancel_transaction().unwrap();

    // Visible to a separate reader at once, and not undone by the cancel
    let reader = Database::open(&path).unwrap();
    assert_eq!(reader.metadata("owner").unwrap(), "search-team");
    assert_eq!(reader.spelling_suggestion("helo", 2).unwrap(), "hello");
    let synonyms: Vec<String> = reader.synonyms("car").unwrap().map(|t| t.term).collect();
    assert_eq!(synonyms, vec!["automobile"]);

    db.set_metadata("owner", "").unwrap();
    assert_eq!(db.metadata("owner").unwrap(), "");
    assert_eq!(db.metadata_keys("").unwrap().count(), 0);
}

#[test]
fn test_second_writer_gets_lock_error() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    let db = create_db(&path);

    let err = WritableDatabase::open(&path, OpenMode::CreateOrOpen).err().unwrap();
    assert_eq!(err.kind, ErrorKind::Lock);
    // Readers are not blocked by the writer
    assert!(Database::open(&path).is_ok());

    db.close().unwrap();
    assert!(WritableDatabase::open(&path, OpenMode::Open).is_ok());
}

#[test]
fn test_open_modes() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    let err = WritableDatabase::open(&path, OpenMode::Open).err().unwrap();
    assert_eq!(err.kind, ErrorKind::Opening);

    build_shard(&path, &[text_doc("one", &["one"])]);
    let err = WritableDatabase::open(&path, OpenMode::Create).err().unwrap();
    assert_eq!(err.kind, ErrorKind::Opening);

    let db = WritableDatabase::open(&path, OpenMode::CreateOrOpen).unwrap();
    assert_eq!(db.doc_count().unwrap(), 1);
    db.close().unwrap();

    let db = WritableDatabase::open(&path, OpenMode::CreateOrOverwrite).unwrap();
    assert_eq!(db.doc_count().unwrap(), 0);

    assert_eq!(OpenMode::try_from(3).unwrap(), OpenMode::CreateOrOverwrite);
    assert_eq!(OpenMode::try_from(7).unwrap_err().kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_drop_flushes_pending_work() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    {
        let db = create_db(&path);
        let clone = db.clone();
        clone.add_document(text_doc("kept", &["kept"])).unwrap();
        drop(clone);
        assert_eq!(db.pending_mutations(), 1);
    }
    assert_eq!(Database::open(&path).unwrap().doc_count().unwrap(), 1);

    {
        let db = WritableDatabase::open(&path, OpenMode::Open).unwrap();
        db.begin_transaction(false).unwrap();
        db.add_document(text_doc("lost", &["lost"])).unwrap();
    }
    assert_eq!(Database::open(&path).unwrap().doc_count().unwrap(), 1);
}

#[test]
fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db = create_db(&shard_path(&dir, "db"));
    db.add_document(text_doc("a", &["a"])).unwrap();
    db.close().unwrap();
    db.close().unwrap();

    assert_eq!(db.add_document(text_doc("b", &["b"])).unwrap_err().kind, ErrorKind::DatabaseClosed);
    assert_eq!(db.flush().unwrap_err().kind, ErrorKind::DatabaseClosed);
    assert_eq!(db.doc_count().unwrap_err().kind, ErrorKind::DatabaseClosed);
}

#[test]
fn test_positions_survive_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = shard_path(&dir, "db");
    build_shard(&path, &[text_doc("p", &["to", "be", "or", "not", "to", "be"])]);

    let db = Database::open(&path).unwrap();
    assert!(db.has_positions().unwrap());
    let positions: Vec<u32> = db.positions(DocId(1), "be").unwrap().collect();
    assert_eq!(positions, vec![2, 6]);
    let mut iter = db.positions(DocId(1), "to").unwrap();
    iter.skip_to(2);
    assert_eq!(iter.next(), Some(5));

    let terms: Vec<(String, u32)> = db.term_list(DocId(1)).unwrap().map(|t| (t.term, t.wdf)).collect();
    assert_eq!(terms, vec![
        ("be".to_string(), 2),
        ("not".to_string(), 1),
        ("or".to_string(), 1),
        ("to".to_string(), 2),
    ]);
    assert_eq!(db.doc_length(DocId(1)).unwrap(), 6);
}
