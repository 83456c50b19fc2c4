use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind as IoErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, Document};
use crate::shard::tables::ShardTables;
use crate::storage::checkpoint::Checkpoint;
use crate::storage::layout::StorageLayout;

/// Where a document body lives inside the documents section
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DocLocation {
    pub offset: u64,
    pub len: u32,
}

pub type DocIndex = BTreeMap<u64, DocLocation>;

#[derive(Serialize, Deserialize)]
struct TablesSection {
    tables: ShardTables,
    doc_index: DocIndex,
}

/// Revision file header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionHeader {
    pub magic: u32,
    pub format_version: u32,
    pub revision: u64,
    pub tables_len: u64,
    pub docs_len: u64,
    pub checksum: u32,  // CRC32 of the tables section
}

impl RevisionHeader {
    pub const MAGIC: u32 = 0x5348_5244;
    pub const SIZE: usize = 36;  // Fixed-width bincode encoding

    pub fn docs_start(&self) -> u64 {
        Self::SIZE as u64 + self.tables_len
    }
}

// [ HEADER ]
// [ TABLES (bincode, checksummed) ]
// [ DOCUMENT 1 (lz4 + bincode) ]
// [ DOCUMENT 2 ]
// ...
pub fn write_revision(
    storage: &StorageLayout,
    revision: u64,
    tables: &ShardTables,
    documents: &BTreeMap<u64, Arc<Document>>,
    sync: bool,
) -> Result<PathBuf> {
    let mut docs = Vec::new();
    let mut doc_index = DocIndex::new();
    for (&did, doc) in documents {
        let data = bincode::serialize(doc.as_ref())?;
        let compressed = lz4_flex::compress_prepend_size(&data);
        doc_index.insert(did, DocLocation { offset: docs.len() as u64, len: compressed.len() as u32 });
        docs.extend_from_slice(&compressed);
    }

    let section = bincode::serialize(&TablesSection { tables: tables.clone(), doc_index })?;
    let header = RevisionHeader {
        magic: RevisionHeader::MAGIC,
        format_version: Checkpoint::FORMAT_VERSION,
        revision,
        tables_len: section.len() as u64,
        docs_len: docs.len() as u64,
        checksum: crc32fast::hash(&section),
    };

    let path = storage.revision_path(revision);
    let mut tmp = NamedTempFile::new_in(&storage.revisions_dir)?;
    tmp.write_all(&bincode::serialize(&header)?)?;
    tmp.write_all(&section)?;
    tmp.write_all(&docs)?;
    if sync {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(&path)?;

    Ok(path)
}

/// Tables of one revision plus the means to fetch its document bodies
pub struct RevisionReader {
    pub path: PathBuf,
    pub header: RevisionHeader,
    pub tables: ShardTables,
    pub doc_index: DocIndex,
}

impl RevisionReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                Error::corrupt(format!("Revision file {} is missing", path.display()))
            } else {
                Error::from(e)
            }
        })?;

        let mut header_buf = [0u8; RevisionHeader::SIZE];
        file.read_exact(&mut header_buf)
            .map_err(|_| Error::corrupt(format!("Truncated revision header in {}", path.display())))?;
        let header: RevisionHeader = bincode::deserialize(&header_buf)?;

        if header.magic != RevisionHeader::MAGIC {
            return Err(Error::corrupt(format!("Bad magic in {}", path.display())));
        }
        if header.format_version != Checkpoint::FORMAT_VERSION {
            return Err(Error::new(
                ErrorKind::Version,
                format!("Revision format version {} is not supported", header.format_version),
            ));
        }

        let mut section = vec![0u8; header.tables_len as usize];
        file.read_exact(&mut section)
            .map_err(|_| Error::corrupt(format!("Truncated tables section in {}", path.display())))?;
        if crc32fast::hash(&section) != header.checksum {
            return Err(Error::corrupt(format!("Checksum mismatch in {}", path.display())));
        }
        let TablesSection { tables, doc_index } = bincode::deserialize(&section)
            .map_err(|e| Error::corrupt(format!("Undecodable tables in {}: {}", path.display(), e)))?;

        Ok(RevisionReader {
            path: path.to_path_buf(),
            header,
            tables,
            doc_index,
        })
    }

    /// Read every document body. Writers keep them all in memory.
    pub fn load_documents(&self) -> Result<BTreeMap<u64, Arc<Document>>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.header.docs_start()))?;
        let mut docs = vec![0u8; self.header.docs_len as usize];
        file.read_exact(&mut docs)
            .map_err(|_| Error::corrupt(format!("Truncated documents section in {}", self.path.display())))?;

        let mut documents = BTreeMap::new();
        for (&did, loc) in &self.doc_index {
            let start = loc.offset as usize;
            let end = start + loc.len as usize;
            let bytes = docs.get(start..end)
                .ok_or_else(|| Error::corrupt(format!("Document {} lies outside its section", did)))?;
            documents.insert(did, Arc::new(decode_document(bytes)?));
        }
        Ok(documents)
    }
}

/// Fetch one document body from revision `revision`.
///
/// The file may have been removed by a writer that moved on, or replaced
/// by a different revision after an overwrite. Both are reported as
/// `Modified` so the reader knows to reopen.
pub fn read_document(path: &Path, revision: u64, docid: DocId, loc: DocLocation) -> Result<Document> {
    let superseded = || {
        Error::new(
            ErrorKind::Modified,
            format!("Revision {} has been superseded; reopen the database", path.display()),
        )
    };
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == IoErrorKind::NotFound {
            superseded()
        } else {
            Error::from(e)
        }
    })?;

    let mut header_buf = [0u8; RevisionHeader::SIZE];
    file.read_exact(&mut header_buf).map_err(|_| superseded())?;
    let header: RevisionHeader = bincode::deserialize(&header_buf).map_err(|_| superseded())?;
    if header.magic != RevisionHeader::MAGIC || header.revision != revision {
        return Err(superseded());
    }

    file.seek(SeekFrom::Start(header.docs_start() + loc.offset))?;
    let mut bytes = vec![0u8; loc.len as usize];
    file.read_exact(&mut bytes)
        .map_err(|_| Error::corrupt(format!("Truncated body for document {}", docid)))?;

    let mut doc = decode_document(&bytes)?;
    doc.id = docid;
    Ok(doc)
}

fn decode_document(bytes: &[u8]) -> Result<Document> {
    let data = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| Error::corrupt(format!("Bad document compression: {}", e)))?;
    Ok(bincode::deserialize(&data)?)
}

/// Delete all but the newest `keep` revision files. Returns how many
/// were removed; failures are logged and leave the files in place.
pub fn prune_revisions(storage: &StorageLayout, keep: usize) -> usize {
    let revisions = match storage.list_revisions() {
        Ok(revisions) => revisions,
        Err(e) => {
            tracing::warn!("failed to list revisions in {}: {}", storage.revisions_dir.display(), e);
            return 0;
        }
    };
    let excess = revisions.len().saturating_sub(keep.max(1));
    let mut removed = 0;
    for &revision in &revisions[..excess] {
        match std::fs::remove_file(storage.revision_path(revision)) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("failed to remove stale revision {}: {}", revision, e),
        }
    }
    removed
}
