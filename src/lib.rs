pub mod core;
pub mod storage;
pub mod index;
pub mod search;
pub mod shard;
pub mod writer;

pub use crate::core::database::{Database, LazyDocument};
pub use crate::core::database_rw::WritableDatabase;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocId, Document, FieldValue};
pub use crate::shard::OpenMode;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                          SHARDENX STRUCT ARCHITECTURE                        │
└──────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────── CORE LAYER ─────────────────────────────────┐
│                                                                              │
│  ┌──────────────────────────────┐      ┌──────────────────────────────────┐  │
│  │ struct Database              │      │ struct WritableDatabase          │  │
│  │ • shards: Vec<ShardHandle>   │◄─────│ • inner: Arc<Mutex<WriterInner>> │  │
│  │ • closed: bool               │ Deref│ • view: Database                 │  │
│  └──────────────────────────────┘      └──────────────────────────────────┘  │
│        │ fan out / merge                         │ buffer + txn              │
│        ▼                                         ▼                           │
│  ┌──────────────────────────────┐      ┌──────────────────────────────────┐  │
│  │ DocidMap  DocMerge<T>        │      │ MutationBuffer                   │  │
│  │ TermMerge                    │      │ TransactionMachine               │  │
│  └──────────────────────────────┘      └──────────────────────────────────┘  │
└──────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────── SHARD LAYER ────────────────────────────────┐
│                                                                              │
│  trait Shard (read, snapshot)          trait ShardWriter (single writer)     │
│  ┌──────────────┐ ┌──────────────┐     ┌──────────────┐ ┌──────────────┐     │
│  │ DiskShard    │ │ LiveShard    │◄────│ DiskWriter   │ │ MemoryWriter │     │
│  └──────────────┘ └──────────────┘     └──────────────┘ └──────────────┘     │
│         │              ShardTables (postings, termlists, values,             │
│         │              spelling, synonyms, metadata)                         │
└─────────┼────────────────────────────────────────────────────────────────────┘
          ▼
┌──────────────────────────────── STORAGE LAYER ───────────────────────────────┐
│  <dir>/.lock                     FileLock (flock, non-blocking)              │
│  <dir>/meta/checkpoint.bin       Checkpoint -> current revision              │
│  <dir>/revisions/rev_N.bin       header | tables (crc32) | lz4 documents     │
└──────────────────────────────────────────────────────────────────────────────┘
*/
