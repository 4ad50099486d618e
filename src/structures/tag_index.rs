//! Tag field index: exact-match values mapped to posting lists.

use enumflags2::{BitFlags, bitflags};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::inverted_index::{InvertedIndex, TagCodec};
use super::trie::TrieMap;
use crate::DocId;

/// Tag parsing behavior, from the field's schema entry.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagFlag {
    /// Keep the original case instead of folding to lowercase.
    CaseSensitive = 0b01,
    /// Strip leading/trailing whitespace around each value.
    TrimSpace = 0b10,
}

pub type TagFlags = BitFlags<TagFlag>;

/// Parsed tag values of one field, deduplicated, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Split `text` on `sep` and normalize per `flags`. Empty values vanish.
pub fn parse_tags(text: &str, sep: char, flags: TagFlags) -> Tags {
    let mut out: Vec<String> = Vec::new();
    for raw in text.split(sep) {
        let piece = if flags.contains(TagFlag::TrimSpace) {
            raw.trim()
        } else {
            raw
        };
        if piece.is_empty() {
            continue;
        }
        let value = if flags.contains(TagFlag::CaseSensitive) {
            piece.to_string()
        } else {
            piece.to_lowercase()
        };
        if !out.contains(&value) {
            out.push(value);
        }
    }
    Tags(out)
}

/// Per-field map from tag value to its posting list.
#[derive(Debug, Clone)]
pub struct TagIndex {
    pub values: TrieMap<InvertedIndex<TagCodec>>,
    pub sep: char,
    pub flags: TagFlags,
    num_docs: u32,
}

impl TagIndex {
    pub fn new(sep: char, flags: TagFlags) -> Self {
        Self {
            values: TrieMap::new(),
            sep,
            flags,
            num_docs: 0,
        }
    }

    /// Add one document's tags, returning total posting bytes written.
    pub fn index(&mut self, tags: &Tags, doc_id: DocId) -> usize {
        let mut bytes = 0;
        for tag in tags.iter() {
            let postings = self
                .values
                .get_or_insert_with(tag.as_bytes(), InvertedIndex::new);
            bytes += postings.add(doc_id, &());
        }
        if !tags.is_empty() {
            self.num_docs += 1;
        }
        bytes
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn postings(&self, tag: &str) -> Option<&InvertedIndex<TagCodec>> {
        self.values.find(tag.as_bytes())
    }

    pub fn postings_mut(&mut self, tag: &str) -> Option<&mut InvertedIndex<TagCodec>> {
        self.values.find_mut(tag.as_bytes())
    }

    /// Uniformly random tag value, for GC scans.
    pub fn random_value(&self, rng: &mut impl Rng) -> Option<String> {
        self.values
            .random_key(rng)
            .map(|(key, _)| String::from_utf8_lossy(&key).into_owned())
    }
}
