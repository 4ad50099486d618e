//! Per-document forward index.
//!
//! Scratch space filled by text preprocessing and folded into the
//! spec's inverted indexes by the serial indexer. One forward index is
//! owned by each ingest context and reset — not reallocated — between
//! documents, so recycled contexts keep their map capacity.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::byte_offsets::ByteOffsetWriter;
use crate::synonyms::SynonymMap;
use crate::tokenize::{Token, TokenFlag, TokenFlags, phonetic_fold};

#[derive(Debug, Default, Clone)]
pub struct ForwardIndexEntry {
    pub freq: u32,
    /// Mask of the text fields (by `ft_id` bit) the term occurred in.
    pub field_mask: u64,
    /// Global 1-based token positions across the document.
    pub positions: Vec<u32>,
}

#[derive(Default)]
pub struct ForwardIndex {
    entries: FxHashMap<String, ForwardIndexEntry>,
    /// Read-only synonym snapshot, safe to use off the spec lock.
    pub synonyms: Option<Arc<SynonymMap>>,
}

impl ForwardIndex {
    pub fn new(synonyms: Option<Arc<SynonymMap>>) -> Self {
        Self {
            entries: FxHashMap::default(),
            synonyms,
        }
    }

    /// Clear for the next document, keeping allocations and refreshing
    /// the synonym snapshot.
    pub fn reset(&mut self, synonyms: Option<Arc<SynonymMap>>) {
        self.entries.clear();
        self.synonyms = synonyms;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&ForwardIndexEntry> {
        self.entries.get(term)
    }

    /// Terms in id-stable iteration order for the merge. Sorted so the
    /// serial indexer folds deterministically.
    pub fn drain_sorted(&mut self) -> Vec<(String, ForwardIndexEntry)> {
        let mut out: Vec<_> = self.entries.drain().collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn upsert(&mut self, term: &str, freq: u32, field_bit: u64, position: u32) {
        let entry = self.entries.entry(term.to_string()).or_default();
        entry.freq += freq;
        entry.field_mask |= field_bit;
        entry.positions.push(position);
    }
}

/// Bridges the document tokenizer into a forward index for one field,
/// carrying the field's text ordinal and weight.
pub struct ForwardIndexTokenizer<'a> {
    idx: &'a mut ForwardIndex,
    offsets: Option<&'a mut ByteOffsetWriter>,
    ft_id: u16,
    weight: f32,
    options: TokenFlags,
}

impl<'a> ForwardIndexTokenizer<'a> {
    pub fn new(
        idx: &'a mut ForwardIndex,
        offsets: Option<&'a mut ByteOffsetWriter>,
        ft_id: u16,
        weight: f32,
        options: TokenFlags,
    ) -> Self {
        Self {
            idx,
            offsets,
            ft_id,
            weight,
            options,
        }
    }

    /// Fold one emitted token into the forward index.
    pub fn handle(&mut self, tok: &Token, position: u32) {
        let freq = (self.weight.max(1.0)) as u32;
        let field_bit = 1u64 << (self.ft_id as u64 & 63);
        self.idx.upsert(&tok.term, freq, field_bit, position);

        if self.options.contains(TokenFlag::Phonetics) {
            let code = phonetic_fold(&tok.term);
            if !code.is_empty() {
                self.idx
                    .upsert(&format!("\u{1}{}", code), freq, field_bit, position);
            }
        }

        if let Some(group) = self
            .idx
            .synonyms
            .clone()
            .and_then(|map| map.group_of(&tok.term))
        {
            self.idx
                .upsert(&SynonymMap::group_term(group), freq, field_bit, position);
        }

        if let Some(offsets) = self.offsets.as_deref_mut() {
            offsets.push(tok.byte_offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use enumflags2::BitFlags;

    use super::*;

    fn tok(term: &str, byte_offset: u32) -> Token {
        Token {
            term: term.to_string(),
            byte_offset,
        }
    }

    #[test]
    fn test_upsert_accumulates() {
        let mut fwd = ForwardIndex::new(None);
        {
            let mut t = ForwardIndexTokenizer::new(&mut fwd, None, 0, 1.0, BitFlags::empty());
            t.handle(&tok("hello", 0), 1);
            t.handle(&tok("hello", 12), 3);
            t.handle(&tok("world", 6), 2);
        }
        let entry = fwd.get("hello").unwrap();
        assert_eq!(entry.freq, 2);
        assert_eq!(entry.positions, vec![1, 3]);
        assert_eq!(entry.field_mask, 1);
        assert_eq!(fwd.len(), 2);
    }

    #[test]
    fn test_field_mask_accumulates_across_fields() {
        let mut fwd = ForwardIndex::new(None);
        {
            let mut t = ForwardIndexTokenizer::new(&mut fwd, None, 0, 1.0, BitFlags::empty());
            t.handle(&tok("shared", 0), 1);
        }
        {
            let mut t = ForwardIndexTokenizer::new(&mut fwd, None, 1, 1.0, BitFlags::empty());
            t.handle(&tok("shared", 0), 2);
        }
        assert_eq!(fwd.get("shared").unwrap().field_mask, 0b11);
    }

    #[test]
    fn test_reset_keeps_no_entries() {
        let mut fwd = ForwardIndex::new(None);
        {
            let mut t = ForwardIndexTokenizer::new(&mut fwd, None, 0, 1.0, BitFlags::empty());
            t.handle(&tok("x", 0), 1);
        }
        fwd.reset(None);
        assert!(fwd.is_empty());
    }

    #[test]
    fn test_phonetics_adds_folded_term() {
        let mut fwd = ForwardIndex::new(None);
        {
            let mut t =
                ForwardIndexTokenizer::new(&mut fwd, None, 0, 1.0, TokenFlag::Phonetics.into());
            t.handle(&tok("robert", 0), 1);
        }
        assert!(fwd.get("robert").is_some());
        assert!(fwd.get("\u{1}R163").is_some());
    }

    #[test]
    fn test_synonym_group_term_indexed() {
        let mut map = SynonymMap::new();
        let gid = map.add_group(["car".to_string(), "auto".to_string()]);
        let mut fwd = ForwardIndex::new(Some(Arc::new(map)));
        {
            let mut t = ForwardIndexTokenizer::new(&mut fwd, None, 0, 1.0, BitFlags::empty());
            t.handle(&tok("car", 0), 1);
        }
        assert!(fwd.get(&SynonymMap::group_term(gid)).is_some());
    }

    #[test]
    fn test_offsets_writer_receives_byte_offsets() {
        let mut fwd = ForwardIndex::new(None);
        let mut writer = ByteOffsetWriter::default();
        {
            let mut t =
                ForwardIndexTokenizer::new(&mut fwd, Some(&mut writer), 0, 1.0, BitFlags::empty());
            t.handle(&tok("a", 0), 1);
            t.handle(&tok("b", 4), 2);
        }
        assert_eq!(writer.len(), 2);
    }
}
