//! Quarry — the indexing and maintenance core of an embedded full-text
//! search engine.
//!
//! The engine attaches to a key-value host (see [`host::Host`]) and
//! provides:
//! - A document ingestion pipeline: per-field preprocessing (text
//!   tokenization, numeric/geo/tag parsing), worker-pool offload for
//!   large documents, and a serialized merge into block-structured
//!   posting lists with at-most-once field dedupe and partial-update
//!   semantics.
//! - A garbage collector that reclaims space from deleted documents by
//!   repairing inverted-index blocks in place at an adaptive rate.
//!
//! Query parsing and ranked retrieval live elsewhere; this crate only
//! carries the small IF-predicate evaluator used by conditional
//! updates.

pub mod byte_offsets;
pub mod config;
pub mod doc_table;
pub mod document;
pub mod error;
pub mod expr;
pub mod forward_index;
pub mod gc;
pub mod host;
pub mod ingest;
pub mod sorting_vector;
pub mod spec;
pub mod structures;
pub mod synonyms;
pub mod tokenize;

pub use config::IndexingConfig;
pub use document::{Document, DocumentField};
pub use error::{Error, Result};
pub use expr::eval_expression;
pub use gc::{GarbageCollector, GcRunner, GcStats, GcStatsSnapshot};
pub use host::{Host, InMemoryHost, SearchCtx, SpecHandle};
pub use ingest::{AddDocumentCtx, AddOption, AddOptions, IngestPipeline, StateFlag, StateFlags};
pub use sorting_vector::{SortableValue, SortingVector};
pub use spec::{
    FieldOption, FieldOptions, FieldSpec, FieldType, FieldTypeMask, IndexSpec, IndexSpecBuilder,
};
pub use structures::{TRIE_ENCVER_CURRENT, TRIE_ENCVER_NOPAYLOADS};
pub use synonyms::SynonymMap;
pub use tokenize::Language;

/// Document identifier, assigned by the serial indexer at ingest.
/// `0` denotes "not yet assigned".
pub type DocId = u64;
