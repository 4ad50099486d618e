//! Per-field-type preprocessors.
//!
//! Preprocessing is the CPU-heavy half of an ingest and touches only
//! context-local state (forward index, sort vector, indexer data), so it
//! can run on a worker thread without the spec lock. Handlers run in a
//! fixed order per field: FULLTEXT, NUMERIC, GEO, TAG.

use enumflags2::BitFlags;

use crate::byte_offsets::{ByteOffsetWriter, ByteOffsets};
use crate::document::DocumentField;
use crate::error::{Error, Result};
use crate::forward_index::{ForwardIndex, ForwardIndexTokenizer};
use crate::sorting_vector::SortingVector;
use crate::spec::{FieldSpec, FieldType};
use crate::structures::{Tags, parse_tags};
use crate::tokenize::{DocumentTokenizer, Token, TokenFlag};

/// Non-text values a preprocessor extracted for the bulk commit.
///
/// Slots are reset between ingests on a recycled context so teardown
/// never observes tag state from a previous document.
#[derive(Debug, Default)]
pub struct FieldIndexerData {
    pub numeric: f64,
    /// `(lon, lat)` halves of a geo field's text.
    pub geo: Option<(String, String)>,
    pub tags: Option<Tags>,
}

/// Mutable context-local state the preprocessors write into.
pub(crate) struct PreprocessCtx<'a> {
    pub sv: &'a mut Option<SortingVector>,
    pub fwd: &'a mut ForwardIndex,
    pub tokenizer: &'a mut DocumentTokenizer,
    pub offsets_writer: &'a mut ByteOffsetWriter,
    pub byte_offsets: &'a mut Option<ByteOffsets>,
    pub total_tokens: &'a mut u32,
}

/// Dispatch one field through its type handlers. Any failure aborts the
/// whole document.
pub(crate) fn preprocess_field(
    fs: &FieldSpec,
    field: &DocumentField,
    fdata: &mut FieldIndexerData,
    pp: &mut PreprocessCtx<'_>,
) -> Result<()> {
    let Some(text) = field.text.as_deref() else {
        return Ok(());
    };
    if field.index_as.contains(FieldType::Fulltext) {
        fulltext_preprocessor(fs, text, pp)?;
    }
    if field.index_as.contains(FieldType::Numeric) {
        numeric_preprocessor(fs, text, fdata, pp)?;
    }
    if field.index_as.contains(FieldType::Geo) {
        geo_preprocessor(text, fdata)?;
    }
    if field.index_as.contains(FieldType::Tag) {
        tag_preprocessor(fs, text, fdata, pp)?;
    }
    Ok(())
}

fn fulltext_preprocessor(fs: &FieldSpec, text: &str, pp: &mut PreprocessCtx<'_>) -> Result<()> {
    if fs.is_sortable()
        && let Some(sv) = pp.sv.as_mut()
    {
        sv.put_str(fs.sort_idx as usize, text);
    }

    if fs.is_indexable() {
        let mut options = BitFlags::empty();
        if fs.is_no_stem() {
            options |= TokenFlag::NoStem;
        }
        if fs.is_phonetics() {
            options |= TokenFlag::Phonetics;
        }

        let mut stream = pp.tokenizer.start(text, options);
        let mut fwd = ForwardIndexTokenizer::new(
            &mut *pp.fwd,
            Some(&mut *pp.offsets_writer),
            fs.ft_id,
            fs.ft_weight,
            options,
        );
        let mut tok = Token::default();
        loop {
            // position 0 marks end of stream
            let pos = stream.next(&mut tok);
            if pos == 0 {
                break;
            }
            fwd.handle(&tok, pos);
        }
        drop(stream);

        let last_offset = pp.tokenizer.last_offset;
        if let Some(offsets) = pp.byte_offsets.as_mut() {
            offsets.add_field(fs.ft_id, *pp.total_tokens + 1, last_offset);
        }
        *pp.total_tokens = last_offset;
    }
    Ok(())
}

fn numeric_preprocessor(
    fs: &FieldSpec,
    text: &str,
    fdata: &mut FieldIndexerData,
    pp: &mut PreprocessCtx<'_>,
) -> Result<()> {
    // parse first: a failed parse must leave the sort vector untouched
    let value: f64 = text.trim().parse().map_err(|_| Error::NotNumeric)?;
    fdata.numeric = value;
    if fs.is_sortable()
        && let Some(sv) = pp.sv.as_mut()
    {
        sv.put_num(fs.sort_idx as usize, value);
    }
    Ok(())
}

fn geo_preprocessor(text: &str, fdata: &mut FieldIndexerData) -> Result<()> {
    let Some(pos) = text.find([' ', ',']) else {
        return Err(Error::GeoFormat);
    };
    let (lon, rest) = text.split_at(pos);
    let lat = &rest[1..];
    fdata.geo = Some((lon.to_string(), lat.to_string()));
    Ok(())
}

fn tag_preprocessor(
    fs: &FieldSpec,
    text: &str,
    fdata: &mut FieldIndexerData,
    pp: &mut PreprocessCtx<'_>,
) -> Result<()> {
    let tags = parse_tags(text, fs.tag_sep, fs.tag_flags);
    if tags.is_empty() {
        return Ok(());
    }
    fdata.tags = Some(tags);
    if fs.is_sortable()
        && let Some(sv) = pp.sv.as_mut()
    {
        sv.put_str(fs.sort_idx as usize, text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::spec::FieldOption;
    use crate::structures::TagFlag;
    use crate::tokenize::Language;

    struct Fixture {
        sv: Option<SortingVector>,
        fwd: ForwardIndex,
        tokenizer: DocumentTokenizer,
        offsets_writer: ByteOffsetWriter,
        byte_offsets: Option<ByteOffsets>,
        total_tokens: u32,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sv: Some(SortingVector::new(4)),
                fwd: ForwardIndex::new(None),
                tokenizer: DocumentTokenizer::new(
                    Language::English,
                    Arc::new(Language::English.stop_words()),
                ),
                offsets_writer: ByteOffsetWriter::default(),
                byte_offsets: Some(ByteOffsets::with_field_capacity(2)),
                total_tokens: 0,
            }
        }

        fn ctx(&mut self) -> PreprocessCtx<'_> {
            PreprocessCtx {
                sv: &mut self.sv,
                fwd: &mut self.fwd,
                tokenizer: &mut self.tokenizer,
                offsets_writer: &mut self.offsets_writer,
                byte_offsets: &mut self.byte_offsets,
                total_tokens: &mut self.total_tokens,
            }
        }
    }

    fn text_field(sort_idx: u16, options: enumflags2::BitFlags<FieldOption>) -> FieldSpec {
        FieldSpec {
            name: "title".to_string(),
            index: 0,
            types: FieldType::Fulltext.into(),
            options,
            ft_id: 0,
            ft_weight: 1.0,
            tag_sep: ',',
            tag_flags: TagFlag::TrimSpace.into(),
            sort_idx,
        }
    }

    #[test]
    fn test_fulltext_fills_forward_index_and_sort_vector() {
        let mut fx = Fixture::new();
        let fs = text_field(0, FieldOption::Sortable | FieldOption::NoStem);
        fulltext_preprocessor(&fs, "Widget deluxe", &mut fx.ctx()).unwrap();

        assert_eq!(fx.sv.as_ref().unwrap().get(0).unwrap().as_str(), Some("Widget deluxe"));
        assert!(fx.fwd.get("widget").is_some());
        assert!(fx.fwd.get("deluxe").is_some());
        assert_eq!(fx.total_tokens, 2);
        let region = fx.byte_offsets.as_ref().unwrap().field_region(0).unwrap();
        assert_eq!((region.first_tok, region.last_tok), (1, 2));
    }

    #[test]
    fn test_fulltext_regions_chain_across_fields() {
        let mut fx = Fixture::new();
        let first = text_field(0, FieldOption::NoStem.into());
        fulltext_preprocessor(&first, "one two three", &mut fx.ctx()).unwrap();
        let mut second = text_field(0, FieldOption::NoStem.into());
        second.ft_id = 1;
        fulltext_preprocessor(&second, "four five", &mut fx.ctx()).unwrap();

        let offsets = fx.byte_offsets.as_ref().unwrap();
        let r0 = offsets.field_region(0).unwrap();
        let r1 = offsets.field_region(1).unwrap();
        assert_eq!((r0.first_tok, r0.last_tok), (1, 3));
        assert_eq!((r1.first_tok, r1.last_tok), (4, 5));
    }

    #[test]
    fn test_numeric_roundtrip_and_failure() {
        let mut fx = Fixture::new();
        let fs = FieldSpec {
            name: "price".to_string(),
            types: FieldType::Numeric.into(),
            options: FieldOption::Sortable.into(),
            sort_idx: 1,
            ..text_field(0, FieldOption::Sortable.into())
        };
        let mut fdata = FieldIndexerData::default();
        numeric_preprocessor(&fs, "42.5", &mut fdata, &mut fx.ctx()).unwrap();
        assert_eq!(fdata.numeric, 42.5);
        assert_eq!(fx.sv.as_ref().unwrap().get(1).unwrap().as_num(), Some(42.5));

        let mut fdata = FieldIndexerData::default();
        let err = numeric_preprocessor(&fs, "not-a-number", &mut fdata, &mut fx.ctx());
        assert!(matches!(err, Err(Error::NotNumeric)));
        // sort vector slot untouched by the failed parse
        assert_eq!(fx.sv.as_ref().unwrap().get(1).unwrap().as_num(), Some(42.5));
    }

    #[test]
    fn test_geo_split_variants() {
        for text in ["40.7,-74.0", "40.7 -74.0"] {
            let mut fdata = FieldIndexerData::default();
            geo_preprocessor(text, &mut fdata).unwrap();
            let (lon, lat) = fdata.geo.unwrap();
            assert_eq!(lon, "40.7");
            assert_eq!(lat, "-74.0");
        }

        let mut fdata = FieldIndexerData::default();
        assert!(matches!(
            geo_preprocessor("40.7", &mut fdata),
            Err(Error::GeoFormat)
        ));
        assert!(fdata.geo.is_none());
    }

    #[test]
    fn test_tag_parse_and_sortable() {
        let mut fx = Fixture::new();
        let fs = FieldSpec {
            name: "tags".to_string(),
            types: FieldType::Tag.into(),
            options: FieldOption::Sortable.into(),
            sort_idx: 2,
            ..text_field(0, FieldOption::Sortable.into())
        };
        let mut fdata = FieldIndexerData::default();
        tag_preprocessor(&fs, "red,blue", &mut fdata, &mut fx.ctx()).unwrap();
        let tags = fdata.tags.unwrap();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["red", "blue"]);
        assert_eq!(fx.sv.as_ref().unwrap().get(2).unwrap().as_str(), Some("red,blue"));

        // empty tag text leaves both the data and the sort slot alone
        let mut fdata = FieldIndexerData::default();
        tag_preprocessor(&fs, " , ,", &mut fdata, &mut fx.ctx()).unwrap();
        assert!(fdata.tags.is_none());
    }
}
