//! Documents as submitted for ingestion.

use crate::DocId;
use crate::spec::FieldTypeMask;
use crate::tokenize::Language;

/// One named field of a document.
///
/// `index_as` narrows which of the schema's declared types this ingest
/// should use; empty means "everything the schema declares".
#[derive(Debug, Clone, Default)]
pub struct DocumentField {
    pub name: String,
    pub text: Option<String>,
    pub index_as: FieldTypeMask,
}

/// A document to be indexed. `id == 0` means not yet assigned; ids are
/// handed out by the serial indexer, monotonically per spec.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub key: String,
    pub id: DocId,
    pub score: f64,
    pub payload: Option<Vec<u8>>,
    pub language: Language,
    pub fields: Vec<DocumentField>,
}

impl Document {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id: 0,
            score: 1.0,
            payload: None,
            language: Language::default(),
            ..Default::default()
        }
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Add a field indexed as whatever the schema declares for it.
    pub fn field(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.field_as(name, text, FieldTypeMask::empty())
    }

    /// Add a field with an explicit index-type override.
    pub fn field_as(
        mut self,
        name: impl Into<String>,
        text: impl Into<String>,
        index_as: FieldTypeMask,
    ) -> Self {
        self.fields.push(DocumentField {
            name: name.into(),
            text: Some(text.into()),
            index_as,
        });
        self
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Look a field up by name, case-insensitively.
    pub fn get_field(&self, name: &str) -> Option<&DocumentField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Drop all fields, keeping key/score/payload. Used when a partial
    /// update degrades to a replace and the stored field set is reloaded.
    pub fn clear_fields(&mut self) {
        self.fields.clear();
    }

    /// The field set as `(name, text)` pairs, for handing to the host's
    /// document store. Fields without text are skipped.
    pub fn stored_fields(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter_map(|f| f.text.as_ref().map(|t| (f.name.clone(), t.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_shape() {
        let doc = Document::new("doc:1")
            .score(0.5)
            .field("title", "hello")
            .field("price", "3.5");
        assert_eq!(doc.id, 0);
        assert_eq!(doc.num_fields(), 2);
        assert_eq!(doc.get_field("TITLE").unwrap().text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_stored_fields_skip_textless() {
        let mut doc = Document::new("doc:1").field("a", "x");
        doc.fields.push(DocumentField {
            name: "b".into(),
            text: None,
            index_as: FieldTypeMask::empty(),
        });
        assert_eq!(doc.stored_fields(), vec![("a".into(), "x".into())]);
    }
}
