//! Document metadata table.
//!
//! Maps monotonically assigned doc ids to per-document metadata, with a
//! reverse key lookup. Deletion only unlinks the metadata — posting
//! entries referencing a dead id stay behind until the garbage collector
//! repairs their blocks, which is why "live" here means simply "still in
//! the table".

use enumflags2::{BitFlags, bitflags};
use rustc_hash::FxHashMap;

use crate::DocId;
use crate::byte_offsets::ByteOffsets;
use crate::sorting_vector::SortingVector;

/// Per-document marker flags.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFlag {
    /// Document has entries (geo) that must be cleaned at deletion time.
    HasOnDemandDeletable = 0b1,
}

pub type DocFlags = BitFlags<DocFlag>;

#[derive(Debug, Default)]
pub struct DocumentMetadata {
    pub id: DocId,
    pub key: String,
    pub score: f64,
    pub payload: Option<Vec<u8>>,
    pub sort_vector: Option<SortingVector>,
    pub byte_offsets: Option<ByteOffsets>,
    pub flags: DocFlags,
}

impl DocumentMetadata {
    pub fn has_on_demand_deletable(&self) -> bool {
        self.flags.contains(DocFlag::HasOnDemandDeletable)
    }
}

#[derive(Debug, Default)]
pub struct DocTable {
    max_doc_id: DocId,
    docs: FxHashMap<DocId, DocumentMetadata>,
    key_to_id: FxHashMap<String, DocId>,
}

impl DocTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Highest id ever assigned; ids start at 1 and never recycle.
    pub fn max_doc_id(&self) -> DocId {
        self.max_doc_id
    }

    /// Register a document and assign its id. The key must not be
    /// present; replacement flows delete the old entry first.
    pub fn put(&mut self, mut md: DocumentMetadata) -> DocId {
        debug_assert!(
            !self.key_to_id.contains_key(&md.key),
            "key must be deleted before re-insertion"
        );
        self.max_doc_id += 1;
        let id = self.max_doc_id;
        md.id = id;
        self.key_to_id.insert(md.key.clone(), id);
        self.docs.insert(id, md);
        id
    }

    pub fn get(&self, id: DocId) -> Option<&DocumentMetadata> {
        self.docs.get(&id)
    }

    pub fn get_mut(&mut self, id: DocId) -> Option<&mut DocumentMetadata> {
        self.docs.get_mut(&id)
    }

    /// Resolve a key to its id; 0 when absent.
    pub fn id_by_key(&self, key: &str) -> DocId {
        self.key_to_id.get(key).copied().unwrap_or(0)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&DocumentMetadata> {
        self.docs.get(self.key_to_id.get(key)?)
    }

    pub fn is_live(&self, id: DocId) -> bool {
        self.docs.contains_key(&id)
    }

    /// Unlink a document. Its id becomes dead immediately; posting
    /// entries are reclaimed later by GC block repair.
    pub fn delete_by_key(&mut self, key: &str) -> Option<DocumentMetadata> {
        let id = self.key_to_id.remove(key)?;
        self.docs.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(key: &str, score: f64) -> DocumentMetadata {
        DocumentMetadata {
            key: key.to_string(),
            score,
            ..Default::default()
        }
    }

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let mut table = DocTable::new();
        assert_eq!(table.put(md("a", 1.0)), 1);
        assert_eq!(table.put(md("b", 1.0)), 2);
        table.delete_by_key("b");
        // deleted ids are never reused
        assert_eq!(table.put(md("c", 1.0)), 3);
        assert_eq!(table.max_doc_id(), 3);
    }

    #[test]
    fn test_key_lookup_and_liveness() {
        let mut table = DocTable::new();
        let id = table.put(md("doc:1", 0.5));
        assert_eq!(table.id_by_key("doc:1"), id);
        assert_eq!(table.id_by_key("missing"), 0);
        assert!(table.is_live(id));

        let removed = table.delete_by_key("doc:1").unwrap();
        assert_eq!(removed.id, id);
        assert!(!table.is_live(id));
        assert!(table.get_by_key("doc:1").is_none());
    }
}
