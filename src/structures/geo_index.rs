//! Geospatial field index.
//!
//! Stores one coordinate pair per document. Geo entries are removed
//! eagerly at document deletion (the metadata flag
//! `HasOnDemandDeletable` marks documents that need it) rather than by
//! the block-repair GC, since coordinates live outside posting blocks.

use rustc_hash::FxHashMap;

use crate::DocId;
use crate::error::{Error, Result};

const LON_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;
const LAT_RANGE: std::ops::RangeInclusive<f64> = -85.05112878..=85.05112878;

#[derive(Debug, Clone, Default)]
pub struct GeoIndex {
    entries: FxHashMap<DocId, (f64, f64)>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and insert the two coordinate halves produced by the geo
    /// preprocessor's split.
    pub fn add_strings(&mut self, doc_id: DocId, lon: &str, lat: &str) -> Result<()> {
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| Error::Generic("Could not index geo value".to_string()))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| Error::Generic("Could not index geo value".to_string()))?;
        if !LON_RANGE.contains(&lon) || !LAT_RANGE.contains(&lat) {
            return Err(Error::Generic("Could not index geo value".to_string()));
        }
        self.entries.insert(doc_id, (lon, lat));
        Ok(())
    }

    pub fn get(&self, doc_id: DocId) -> Option<(f64, f64)> {
        self.entries.get(&doc_id).copied()
    }

    pub fn remove_doc(&mut self, doc_id: DocId) -> bool {
        self.entries.remove(&doc_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
