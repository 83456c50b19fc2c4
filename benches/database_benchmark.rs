use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use shardenx::core::config::Config;
use shardenx::core::types::{Document, FieldValue};
use shardenx::{Database, OpenMode, WritableDatabase};
use tempfile::TempDir;
use rand::Rng;

const WORDS: [&str; 8] = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog"];

/// Helper to create test documents
fn create_test_document(id: u64, content_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let mut doc = Document::new();
    doc.add_field("title".to_string(), FieldValue::Text(format!("Document {}", id)));
    doc.add_field("score".to_string(), FieldValue::Number(rng.gen_range(0.0..100.0)));
    for pos in 0..content_size {
        let word = WORDS[rng.gen_range(0..WORDS.len())];
        doc.add_posting(word, pos as u32 + 1, 1);
    }
    doc.add_boolean_term(&format!("Qdoc{}", id));
    doc.add_value(0, format!("category_{}", id % 10));
    doc
}

fn open_bench_db(dir: &TempDir, name: &str) -> WritableDatabase {
    let config = Config {
        sync_on_flush: false,
        ..Config::default()
    };
    WritableDatabase::open_with_config(dir.path().join(name), OpenMode::CreateOrOverwrite, config).unwrap()
}

/// Benchmark buffered document insertion
fn bench_single_insert(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = open_bench_db(&dir, "single");

    c.bench_function("single_document_insert", |b| {
        let mut id = 0;
        b.iter(|| {
            let doc = create_test_document(id, 100);
            db.add_document(doc).unwrap();
            id += 1;
        });
    });
}

/// Benchmark batch insertion followed by a flush
fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for batch_size in [10, 50, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let dir = TempDir::new().unwrap();
                let db = open_bench_db(&dir, "batch");
                let mut id_counter = 0u64;

                b.iter(|| {
                    for _ in 0..batch_size {
                        db.add_document(create_test_document(id_counter, 100)).unwrap();
                        id_counter += 1;
                    }
                    db.flush().unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark merged reads over several shards
fn bench_merged_reads(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut db = Database::new();
    for shard in 0..4 {
        let name = format!("shard{}", shard);
        let writer = open_bench_db(&dir, &name);
        for i in 0..500 {
            writer.add_document(create_test_document(i, 50)).unwrap();
        }
        writer.close().unwrap();
        db.add_database(&Database::open(dir.path().join(&name)).unwrap()).unwrap();
    }

    let mut group = c.benchmark_group("merged_reads");

    group.bench_function("postings", |b| {
        b.iter(|| db.postings(black_box("fox")).unwrap().count());
    });

    group.bench_function("all_terms", |b| {
        b.iter(|| db.all_terms(black_box("")).unwrap().count());
    });

    group.bench_function("statistics", |b| {
        b.iter(|| {
            (
                db.doc_count().unwrap(),
                db.term_freq(black_box("quick")).unwrap(),
                db.avg_length().unwrap(),
            )
        });
    });

    group.bench_function("value_stream", |b| {
        b.iter(|| db.value_stream(0).unwrap().count());
    });

    group.finish();
}

/// Benchmark spelling suggestions against a dictionary
fn bench_spelling(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = open_bench_db(&dir, "spelling");
    let mut rng = rand::thread_rng();
    for _ in 0..2000 {
        let word: String = (0..rng.gen_range(4..10))
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect();
        db.add_spelling(&word, rng.gen_range(1..50)).unwrap();
    }

    c.bench_function("spelling_suggestion", |b| {
        b.iter(|| db.spelling_suggestion(black_box("recieve"), 2).unwrap());
    });
}

/// Benchmark transaction round trips
fn bench_transactions(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = open_bench_db(&dir, "txn");

    c.bench_function("flushed_transaction_10_docs", |b| {
        let mut id = 0;
        b.iter(|| {
            db.begin_transaction(true).unwrap();
            for _ in 0..10 {
                db.add_document(create_test_document(id, 20)).unwrap();
                id += 1;
            }
            db.commit_transaction().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batch_insert,
    bench_merged_reads,
    bench_spelling,
    bench_transactions
);
criterion_main!(benches);
