//! Byte-offset recording for text fields.
//!
//! While tokenizing, the writer collects the byte offset of every token
//! in document order. At publish time the offsets are frozen into a
//! varint-delta buffer together with the per-field token regions, and
//! stored on the document metadata for highlighting.

use serde::{Deserialize, Serialize};

use crate::structures::varint;

/// Accumulates raw token byte offsets for one document. Reused across
/// ingests by the same context; `reset` keeps the allocation.
#[derive(Debug, Default)]
pub struct ByteOffsetWriter {
    offsets: Vec<u32>,
}

impl ByteOffsetWriter {
    pub fn push(&mut self, offset: u32) {
        self.offsets.push(offset);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn reset(&mut self) {
        self.offsets.clear();
    }
}

/// Token region of one text field: global token positions are contiguous
/// per field, so `[first_tok, last_tok]` addresses its slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldByteRegion {
    pub ft_id: u16,
    pub first_tok: u32,
    pub last_tok: u32,
}

/// Frozen per-document byte offsets: field regions plus one
/// varint-delta-encoded run of token byte offsets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ByteOffsets {
    fields: Vec<FieldByteRegion>,
    data: Vec<u8>,
    num_tokens: u32,
}

impl ByteOffsets {
    pub fn with_field_capacity(num_fields: usize) -> Self {
        Self {
            fields: Vec::with_capacity(num_fields),
            data: Vec::new(),
            num_tokens: 0,
        }
    }

    /// Record a field's token region.
    pub fn add_field(&mut self, ft_id: u16, first_tok: u32, last_tok: u32) {
        self.fields.push(FieldByteRegion {
            ft_id,
            first_tok,
            last_tok,
        });
    }

    /// Encode the writer's collected offsets and reset it for reuse.
    pub fn freeze(&mut self, writer: &mut ByteOffsetWriter) {
        self.num_tokens = writer.offsets.len() as u32;
        self.data.clear();
        let mut prev = 0u32;
        for &off in &writer.offsets {
            varint::write(&mut self.data, off.wrapping_sub(prev) as u64);
            prev = off;
        }
        writer.reset();
    }

    pub fn field_region(&self, ft_id: u16) -> Option<FieldByteRegion> {
        self.fields.iter().find(|f| f.ft_id == ft_id).copied()
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn num_tokens(&self) -> u32 {
        self.num_tokens
    }

    /// Decode the token byte offsets back out.
    pub fn decode(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.num_tokens as usize);
        let mut pos = 0;
        let mut prev = 0u32;
        while pos < self.data.len() {
            let Some(delta) = varint::read(&self.data, &mut pos) else {
                break;
            };
            prev = prev.wrapping_add(delta as u32);
            out.push(prev);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_and_decode() {
        let mut writer = ByteOffsetWriter::default();
        for off in [0u32, 6, 13, 40] {
            writer.push(off);
        }
        let mut offsets = ByteOffsets::with_field_capacity(1);
        offsets.add_field(0, 1, 4);
        offsets.freeze(&mut writer);

        assert!(writer.is_empty());
        assert_eq!(offsets.num_tokens(), 4);
        assert_eq!(offsets.decode(), vec![0, 6, 13, 40]);
        let region = offsets.field_region(0).unwrap();
        assert_eq!((region.first_tok, region.last_tok), (1, 4));
    }
}
