//! Non-text bulk commit.
//!
//! Runs on the serial indexer under the spec write lock, after the doc
//! id exists. Handlers open the per-field index on first touch (creating
//! it if this is the field's first document) and note the opened kind in
//! the bulk so `cleanup` can release everything once per commit.

use enumflags2::BitFlags;

use crate::DocId;
use crate::document::DocumentField;
use crate::error::Result;
use crate::spec::{FieldSpec, FieldType, FieldTypeMask, IndexSpec};

use super::preprocess::FieldIndexerData;

/// Nominal posting footprint of one geo entry (two doubles).
const GEO_ENTRY_BYTES: usize = 16;

/// Batches one document's numeric/tag/geo writes for a single field.
#[derive(Debug, Default)]
pub struct IndexBulkData {
    /// Index kinds opened during this commit.
    opened: FieldTypeMask,
}

impl IndexBulkData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch every type bit set on the field, in fixed order. The
    /// fulltext bit is a no-op here: text reaches the inverted index
    /// through the forward-index merge, never the bulk. The four arms
    /// are exhaustive over the type mask, so an unknown bit cannot
    /// reach the dispatch.
    pub fn add(
        &mut self,
        spec: &mut IndexSpec,
        doc_id: DocId,
        field: &DocumentField,
        fs: &FieldSpec,
        fdata: &mut FieldIndexerData,
    ) -> Result<()> {
        for kind in field.index_as.iter() {
            match kind {
                FieldType::Fulltext => {}
                FieldType::Numeric => self.numeric_indexer(spec, doc_id, fs, fdata)?,
                FieldType::Geo => self.geo_indexer(spec, doc_id, fs, fdata)?,
                FieldType::Tag => self.tag_indexer(spec, doc_id, fs, fdata)?,
            }
        }
        Ok(())
    }

    fn numeric_indexer(
        &mut self,
        spec: &mut IndexSpec,
        doc_id: DocId,
        fs: &FieldSpec,
        fdata: &FieldIndexerData,
    ) -> Result<()> {
        self.opened |= FieldType::Numeric;
        let grew = spec.open_numeric_index(fs.index).add(doc_id, fdata.numeric);
        spec.stats.inverted_size += grew;
        spec.stats.num_records += 1;
        Ok(())
    }

    fn geo_indexer(
        &mut self,
        spec: &mut IndexSpec,
        doc_id: DocId,
        fs: &FieldSpec,
        fdata: &mut FieldIndexerData,
    ) -> Result<()> {
        let Some((lon, lat)) = fdata.geo.take() else {
            return Ok(());
        };
        self.opened |= FieldType::Geo;
        spec.open_geo_index(fs.index)
            .add_strings(doc_id, &lon, &lat)?;
        spec.stats.inverted_size += GEO_ENTRY_BYTES;
        spec.stats.num_records += 1;
        Ok(())
    }

    fn tag_indexer(
        &mut self,
        spec: &mut IndexSpec,
        doc_id: DocId,
        fs: &FieldSpec,
        fdata: &FieldIndexerData,
    ) -> Result<()> {
        let Some(tags) = fdata.tags.as_ref() else {
            return Ok(());
        };
        self.opened |= FieldType::Tag;
        let grew = spec.open_tag_index(fs.index).index(tags, doc_id);
        spec.stats.inverted_size += grew;
        spec.stats.num_records += 1;
        Ok(())
    }

    /// Release every handle opened during the commit.
    pub fn cleanup(&mut self) {
        self.opened = BitFlags::empty();
    }
}
