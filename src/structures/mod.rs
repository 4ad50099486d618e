//! Core index data structures.

pub mod geo_index;
pub mod inverted_index;
pub mod numeric_index;
pub mod tag_index;
pub mod trie;
pub mod varint;

pub use geo_index::GeoIndex;
pub use inverted_index::{
    INDEX_BLOCK_CAP, InvertedIndex, NumericCodec, RecordCodec, RepairParams, RepairSummary,
    TagCodec, TermCodec, TermRecord,
};
pub use numeric_index::{NumericRange, NumericRangeTree};
pub use tag_index::{TagFlag, TagIndex, Tags, parse_tags};
pub use trie::{TRIE_ENCVER_CURRENT, TRIE_ENCVER_NOPAYLOADS, TrieMap};
