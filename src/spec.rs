//! Index schema and runtime state.
//!
//! An [`IndexSpec`] owns everything that makes up one logical index: the
//! ordered field schema, the document metadata table, the term dictionary
//! with its per-term posting lists, the per-field numeric/tag/geo indexes,
//! and the stats counters the garbage collector reconciles. Specs are
//! resolved through the [`Host`](crate::host::Host) by key name; holders
//! that survive across yields (the GC) keep the key plus the spec's
//! `unique_id` and re-resolve instead of holding pointers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use enumflags2::{BitFlags, bitflags};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::config::GC_TERM_SAMPLE_TRIALS;
use crate::doc_table::DocTable;
use crate::structures::{
    GeoIndex, InvertedIndex, NumericRangeTree, TagFlag, TagIndex, TermCodec, TrieMap,
};
use crate::synonyms::SynonymMap;
use crate::tokenize::Language;

/// Next `unique_id` handed to a spec. Monotonic across drops and
/// recreations so a GC scanning a dead spec can detect the replacement.
static NEXT_SPEC_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// The index types a field can be indexed as.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Fulltext = 0b0001,
    Numeric = 0b0010,
    Geo = 0b0100,
    Tag = 0b1000,
}

pub type FieldTypeMask = BitFlags<FieldType>;

/// Per-field behavior modifiers.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOption {
    Sortable = 0b00001,
    NoStem = 0b00010,
    Phonetics = 0b00100,
    /// Added at query time rather than declared in the schema.
    Dynamic = 0b01000,
    /// Kept for sorting only; never enters an index.
    NoIndex = 0b10000,
}

pub type FieldOptions = BitFlags<FieldOption>;

/// Spec-wide behavior flags.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecFlag {
    /// Record per-field byte-offset regions in document metadata.
    StoreByteOffsets = 0b01,
    /// Record token positions inside term posting records.
    StoreTermOffsets = 0b10,
}

pub type SpecFlags = BitFlags<SpecFlag>;

/// Schema entry for a single named field.
///
/// `index` is a dense, stable slot in `[0, field_count)`, reused across
/// ingests — the per-ingest dedupe bit-set is keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub index: u16,
    pub types: FieldTypeMask,
    pub options: FieldOptions,
    /// Text field ordinal; bit position inside posting-record field masks.
    pub ft_id: u16,
    pub ft_weight: f32,
    pub tag_sep: char,
    pub tag_flags: BitFlags<TagFlag>,
    /// Slot in the per-document sorting vector, when sortable.
    pub sort_idx: u16,
}

impl FieldSpec {
    pub fn is_sortable(&self) -> bool {
        self.options.contains(FieldOption::Sortable)
    }

    pub fn is_indexable(&self) -> bool {
        !self.options.contains(FieldOption::NoIndex)
    }

    pub fn is_no_stem(&self) -> bool {
        self.options.contains(FieldOption::NoStem)
    }

    pub fn is_phonetics(&self) -> bool {
        self.options.contains(FieldOption::Phonetics)
    }

    pub fn is_dynamic(&self) -> bool {
        self.options.contains(FieldOption::Dynamic)
    }

    pub fn has_type(&self, t: FieldType) -> bool {
        self.types.contains(t)
    }
}

/// Aggregate index counters. Ingest grows them, the GC shrinks them;
/// both only under the spec write lock.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Records across every inverted/numeric/tag index of the spec.
    pub num_records: usize,
    /// Bytes held by posting data.
    pub inverted_size: usize,
}

/// Schema plus runtime state for one index.
pub struct IndexSpec {
    pub name: String,
    unique_id: u64,
    pub flags: SpecFlags,
    fields: Vec<FieldSpec>,
    /// Sortable field names, positioned by sort slot.
    pub sortables: Vec<String>,
    pub synonyms: Option<Arc<SynonymMap>>,
    pub stop_words: Arc<FxHashSet<String>>,
    pub default_language: Language,
    pub docs: DocTable,
    pub stats: IndexStats,
    /// Term dictionary: term bytes -> posting list.
    pub(crate) terms: TrieMap<InvertedIndex<TermCodec>>,
    pub(crate) numeric: FxHashMap<u16, NumericRangeTree>,
    pub(crate) tags: FxHashMap<u16, TagIndex>,
    pub(crate) geo: FxHashMap<u16, GeoIndex>,
}

impl IndexSpec {
    /// Monotonic identity; a dropped-and-recreated spec under the same
    /// key gets a different value.
    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Resolve a field spec by name, case-insensitively.
    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Sort slot for a field name, if the field is sortable.
    pub fn sorting_index(&self, name: &str) -> Option<usize> {
        self.sortables.iter().position(|s| s.eq_ignore_ascii_case(name))
    }

    /// Dense field slots carrying the given type, in schema order.
    pub fn fields_by_type(&self, t: FieldType) -> Vec<u16> {
        self.fields
            .iter()
            .filter(|f| f.has_type(t))
            .map(|f| f.index)
            .collect()
    }

    fn field_by_index(&self, index: u16) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.index == index)
    }

    /// Posting list for a term, if it exists.
    pub fn term_index(&self, term: &str) -> Option<&InvertedIndex<TermCodec>> {
        self.terms.find(term.as_bytes())
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Open (creating on first use) the numeric range tree for a field slot.
    pub fn open_numeric_index(&mut self, field_index: u16) -> &mut NumericRangeTree {
        self.numeric
            .entry(field_index)
            .or_insert_with(NumericRangeTree::new)
    }

    pub fn numeric_index(&self, field_index: u16) -> Option<&NumericRangeTree> {
        self.numeric.get(&field_index)
    }

    /// Open (creating on first use) the tag index for a field slot. The
    /// separator and flags come from the field's schema entry.
    pub fn open_tag_index(&mut self, field_index: u16) -> &mut TagIndex {
        let (sep, flags) = self
            .field_by_index(field_index)
            .map(|f| (f.tag_sep, f.tag_flags))
            .unwrap_or((',', BitFlags::from_flag(TagFlag::TrimSpace)));
        self.tags
            .entry(field_index)
            .or_insert_with(|| TagIndex::new(sep, flags))
    }

    pub fn tag_index(&self, field_index: u16) -> Option<&TagIndex> {
        self.tags.get(&field_index)
    }

    /// Open (creating on first use) the geo index for a field slot.
    pub fn open_geo_index(&mut self, field_index: u16) -> &mut GeoIndex {
        self.geo.entry(field_index).or_insert_with(GeoIndex::new)
    }

    pub fn geo_index(&self, field_index: u16) -> Option<&GeoIndex> {
        self.geo.get(&field_index)
    }

    /// Draw a term with probability roughly proportional to its posting
    /// size, approximated by [`GC_TERM_SAMPLE_TRIALS`] uniform trials.
    /// Returns `None` on an empty dictionary.
    pub fn get_random_term(&self, rng: &mut impl rand::Rng) -> Option<String> {
        self.terms
            .sample_weighted(rng, GC_TERM_SAMPLE_TRIALS, |idx| idx.num_docs() as u64)
            .map(|(key, _)| String::from_utf8_lossy(&key).into_owned())
    }

    /// Split borrows for the GC's repair loops: the three posting-index
    /// families, the document table (liveness oracle), and the stats
    /// counters, all mutable at once.
    #[allow(clippy::type_complexity)]
    pub(crate) fn gc_parts(
        &mut self,
    ) -> (
        &mut TrieMap<InvertedIndex<TermCodec>>,
        &mut FxHashMap<u16, NumericRangeTree>,
        &mut FxHashMap<u16, TagIndex>,
        &mut DocTable,
        &mut IndexStats,
    ) {
        (
            &mut self.terms,
            &mut self.numeric,
            &mut self.tags,
            &mut self.docs,
            &mut self.stats,
        )
    }

    /// Drop a document by key: removes its metadata (making its posting
    /// entries dead for the GC) and runs on-demand geo cleanup when the
    /// document was flagged for it.
    pub fn delete_document(&mut self, key: &str) -> bool {
        let Some(md) = self.docs.delete_by_key(key) else {
            return false;
        };
        if md.has_on_demand_deletable() {
            for geo in self.geo.values_mut() {
                geo.remove_doc(md.id);
            }
        }
        log::debug!("[spec] deleted document `{}` (id={})", key, md.id);
        true
    }
}

/// Builder assembling an [`IndexSpec`]: dense field slots, text-field
/// ordinals and sort slots are assigned in declaration order.
pub struct IndexSpecBuilder {
    name: String,
    flags: SpecFlags,
    fields: Vec<FieldSpec>,
    language: Language,
    stop_words: Option<FxHashSet<String>>,
    synonyms: Option<SynonymMap>,
    next_ft_id: u16,
}

impl IndexSpecBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: SpecFlag::StoreByteOffsets | SpecFlag::StoreTermOffsets,
            fields: Vec::new(),
            language: Language::default(),
            stop_words: None,
            synonyms: None,
            next_ft_id: 0,
        }
    }

    pub fn flags(mut self, flags: SpecFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn stop_words(mut self, words: impl IntoIterator<Item = String>) -> Self {
        self.stop_words = Some(words.into_iter().collect());
        self
    }

    pub fn synonyms(mut self, map: SynonymMap) -> Self {
        self.synonyms = Some(map);
        self
    }

    pub fn add_text_field(self, name: &str, weight: f32, options: FieldOptions) -> Self {
        self.push_field(name, FieldType::Fulltext.into(), options, weight, ',')
    }

    pub fn add_numeric_field(self, name: &str, options: FieldOptions) -> Self {
        self.push_field(name, FieldType::Numeric.into(), options, 1.0, ',')
    }

    pub fn add_geo_field(self, name: &str) -> Self {
        self.push_field(name, FieldType::Geo.into(), BitFlags::empty(), 1.0, ',')
    }

    pub fn add_tag_field(self, name: &str, sep: char, options: FieldOptions) -> Self {
        self.push_field(name, FieldType::Tag.into(), options, 1.0, sep)
    }

    /// Add a field carrying several index types at once.
    pub fn add_field(self, name: &str, types: FieldTypeMask, options: FieldOptions) -> Self {
        self.push_field(name, types, options, 1.0, ',')
    }

    fn push_field(
        mut self,
        name: &str,
        types: FieldTypeMask,
        options: FieldOptions,
        weight: f32,
        tag_sep: char,
    ) -> Self {
        let ft_id = if types.contains(FieldType::Fulltext) {
            let id = self.next_ft_id;
            self.next_ft_id += 1;
            id
        } else {
            0
        };
        self.fields.push(FieldSpec {
            name: name.to_string(),
            index: self.fields.len() as u16,
            types,
            options,
            ft_id,
            ft_weight: weight,
            tag_sep,
            tag_flags: BitFlags::from_flag(TagFlag::TrimSpace),
            sort_idx: 0,
        });
        self
    }

    pub fn build(mut self) -> IndexSpec {
        let mut sortables = Vec::new();
        for field in &mut self.fields {
            if field.is_sortable() {
                field.sort_idx = sortables.len() as u16;
                sortables.push(field.name.clone());
            }
        }
        let stop_words = self
            .stop_words
            .unwrap_or_else(|| self.language.stop_words());
        IndexSpec {
            name: self.name,
            unique_id: NEXT_SPEC_UNIQUE_ID.fetch_add(1, Ordering::Relaxed),
            flags: self.flags,
            fields: self.fields,
            sortables,
            synonyms: self.synonyms.map(Arc::new),
            stop_words: Arc::new(stop_words),
            default_language: self.language,
            docs: DocTable::new(),
            stats: IndexStats::default(),
            terms: TrieMap::new(),
            numeric: FxHashMap::default(),
            tags: FxHashMap::default(),
            geo: FxHashMap::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> IndexSpec {
        IndexSpecBuilder::new("idx")
            .add_text_field("title", 1.0, FieldOption::Sortable.into())
            .add_numeric_field("price", FieldOption::Sortable.into())
            .add_geo_field("loc")
            .add_tag_field("tags", ',', BitFlags::empty())
            .build()
    }

    #[test]
    fn test_field_slots_are_dense() {
        let spec = sample_spec();
        for (i, field) in spec.fields().iter().enumerate() {
            assert_eq!(field.index as usize, i);
        }
    }

    #[test]
    fn test_get_field_case_insensitive() {
        let spec = sample_spec();
        assert_eq!(spec.get_field("TITLE").unwrap().name, "title");
        assert!(spec.get_field("missing").is_none());
    }

    #[test]
    fn test_sortable_slots() {
        let spec = sample_spec();
        assert_eq!(spec.sortables, vec!["title", "price"]);
        assert_eq!(spec.sorting_index("price"), Some(1));
        assert_eq!(spec.sorting_index("loc"), None);
        assert_eq!(spec.get_field("price").unwrap().sort_idx, 1);
    }

    #[test]
    fn test_unique_id_advances_on_recreate() {
        let first = sample_spec().unique_id();
        let second = sample_spec().unique_id();
        assert!(second > first);
    }

    #[test]
    fn test_fields_by_type() {
        let spec = sample_spec();
        assert_eq!(spec.fields_by_type(FieldType::Numeric), vec![1]);
        assert_eq!(spec.fields_by_type(FieldType::Tag), vec![3]);
    }
}
