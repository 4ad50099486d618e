//! Block-structured inverted index.
//!
//! A posting list is an ordered run of fixed-capacity blocks. Each block
//! holds a varint-delta-encoded byte run of `(doc_id, payload)` records
//! bracketed by `first_id`/`last_id`. Blocks are sorted by `first_id`
//! and ids strictly increase within a block, so appends only ever touch
//! the tail while repair rewrites interior blocks in place.
//!
//! The payload shape differs per index kind (term records, numeric
//! values, bare tags); a [`RecordCodec`] instantiation fixes it.

use std::marker::PhantomData;

use byteorder::{LittleEndian, ReadBytesExt};

use super::varint;
use crate::DocId;

/// Entries per block before a new block is started.
pub const INDEX_BLOCK_CAP: usize = 100;

/// Encoding of one record kind inside a block's byte run.
pub trait RecordCodec {
    type Payload: Clone + std::fmt::Debug;

    fn encode(buf: &mut Vec<u8>, delta: u64, payload: &Self::Payload);

    /// Decode one record at `*pos`, advancing it. `None` on truncation.
    fn decode(data: &[u8], pos: &mut usize) -> Option<(u64, Self::Payload)>;
}

/// Payload of a fulltext posting: term frequency, mask of the text
/// fields the term appeared in, and its positions in the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermRecord {
    pub freq: u32,
    pub field_mask: u64,
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TermCodec;

impl RecordCodec for TermCodec {
    type Payload = TermRecord;

    fn encode(buf: &mut Vec<u8>, delta: u64, payload: &Self::Payload) {
        varint::write(buf, delta);
        varint::write(buf, payload.freq as u64);
        varint::write(buf, payload.field_mask);
        varint::write(buf, payload.positions.len() as u64);
        let mut prev = 0u32;
        for &pos in &payload.positions {
            varint::write(buf, pos.wrapping_sub(prev) as u64);
            prev = pos;
        }
    }

    fn decode(data: &[u8], pos: &mut usize) -> Option<(u64, Self::Payload)> {
        let delta = varint::read(data, pos)?;
        let freq = varint::read(data, pos)? as u32;
        let field_mask = varint::read(data, pos)?;
        let count = varint::read(data, pos)? as usize;
        let mut positions = Vec::with_capacity(count);
        let mut prev = 0u32;
        for _ in 0..count {
            prev = prev.wrapping_add(varint::read(data, pos)? as u32);
            positions.push(prev);
        }
        Some((
            delta,
            TermRecord {
                freq,
                field_mask,
                positions,
            },
        ))
    }
}

/// Payload of a numeric posting: the field's value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericCodec;

impl RecordCodec for NumericCodec {
    type Payload = f64;

    fn encode(buf: &mut Vec<u8>, delta: u64, payload: &Self::Payload) {
        varint::write(buf, delta);
        buf.extend_from_slice(&payload.to_le_bytes());
    }

    fn decode(data: &[u8], pos: &mut usize) -> Option<(u64, Self::Payload)> {
        let delta = varint::read(data, pos)?;
        let mut rest = data.get(*pos..)?;
        let value = rest.read_f64::<LittleEndian>().ok()?;
        *pos += std::mem::size_of::<f64>();
        Some((delta, value))
    }
}

/// Payload-less posting used by tag indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagCodec;

impl RecordCodec for TagCodec {
    type Payload = ();

    fn encode(buf: &mut Vec<u8>, delta: u64, _payload: &Self::Payload) {
        varint::write(buf, delta);
    }

    fn decode(data: &[u8], pos: &mut usize) -> Option<(u64, Self::Payload)> {
        Some((varint::read(data, pos)?, ()))
    }
}

/// One fixed-capacity segment of a posting list.
#[derive(Debug, Clone, Default)]
pub struct IndexBlock {
    pub first_id: DocId,
    pub last_id: DocId,
    pub num_entries: u32,
    data: Vec<u8>,
}

impl IndexBlock {
    fn new(first_id: DocId) -> Self {
        Self {
            first_id,
            last_id: first_id,
            num_entries: 0,
            data: Vec::new(),
        }
    }
}

/// Bounds of one repair batch.
#[derive(Debug, Clone, Copy)]
pub struct RepairParams {
    /// Blocks walked before the batch ends.
    pub limit: usize,
}

/// Outcome of one repair batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Index of the next block to repair; `None` when the scan is done.
    pub next_block: Option<usize>,
    pub docs_collected: usize,
    pub bytes_collected: usize,
}

/// Ordered block list forming one posting list.
#[derive(Debug, Clone)]
pub struct InvertedIndex<C: RecordCodec> {
    blocks: Vec<IndexBlock>,
    num_docs: u32,
    _codec: PhantomData<C>,
}

impl<C: RecordCodec> Default for InvertedIndex<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RecordCodec> InvertedIndex<C> {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            num_docs: 0,
            _codec: PhantomData,
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }

    /// Bytes held by posting data.
    pub fn size_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).sum()
    }

    /// Append a record. `doc_id` must exceed every id already present.
    /// Returns the number of bytes the index grew by.
    pub fn add(&mut self, doc_id: DocId, payload: &C::Payload) -> usize {
        let start_new = self
            .blocks
            .last()
            .is_none_or(|b| b.num_entries as usize >= INDEX_BLOCK_CAP);
        if start_new {
            self.blocks.push(IndexBlock::new(doc_id));
        }
        let block = self.blocks.last_mut().expect("block ensured above");
        let before = block.data.len();
        if block.num_entries == 0 {
            // fresh or fully-repaired tail block adopts the new id range
            block.first_id = doc_id;
            C::encode(&mut block.data, 0, payload);
        } else {
            debug_assert!(doc_id > block.last_id, "posting ids must increase");
            C::encode(&mut block.data, doc_id - block.last_id, payload);
        }
        block.last_id = doc_id;
        block.num_entries += 1;
        self.num_docs += 1;
        block.data.len() - before
    }

    /// Decode every record. Intended for range scans and tests; repair
    /// works block-at-a-time instead.
    pub fn entries(&self) -> Vec<(DocId, C::Payload)> {
        let mut out = Vec::with_capacity(self.num_docs as usize);
        for block in &self.blocks {
            Self::decode_block(block, &mut out);
        }
        out
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.entries().into_iter().map(|(id, _)| id).collect()
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.blocks
            .iter()
            .filter(|b| b.num_entries > 0 && b.first_id <= doc_id && doc_id <= b.last_id)
            .any(|b| {
                let mut entries = Vec::new();
                Self::decode_block(b, &mut entries);
                entries.iter().any(|(id, _)| *id == doc_id)
            })
    }

    fn decode_block(block: &IndexBlock, out: &mut Vec<(DocId, C::Payload)>) {
        let mut pos = 0;
        let mut id = block.first_id;
        for i in 0..block.num_entries {
            let Some((delta, payload)) = C::decode(&block.data, &mut pos) else {
                break;
            };
            if i > 0 {
                id += delta;
            }
            out.push((id, payload));
        }
    }

    /// Walk up to `params.limit` blocks starting at `from_block`,
    /// dropping records whose doc id fails `is_live` (the caller closes
    /// over the spec's document table) and compacting survivors in
    /// place. Emptied blocks are unlinked, except the final block, which
    /// stays as the append target.
    pub fn repair(
        &mut self,
        from_block: usize,
        params: RepairParams,
        mut is_live: impl FnMut(DocId) -> bool,
    ) -> RepairSummary {
        if from_block >= self.blocks.len() || params.limit == 0 {
            return RepairSummary::default();
        }
        let end = (from_block + params.limit).min(self.blocks.len());
        let mut docs_collected = 0usize;
        let mut bytes_collected = 0usize;

        for block in &mut self.blocks[from_block..end] {
            let mut entries = Vec::with_capacity(block.num_entries as usize);
            Self::decode_block(block, &mut entries);
            let before_count = entries.len();
            entries.retain(|(id, _)| is_live(*id));
            if entries.len() == before_count {
                continue;
            }
            docs_collected += before_count - entries.len();
            let old_bytes = block.data.len();
            block.data.clear();
            block.num_entries = entries.len() as u32;
            if let Some(&(first, _)) = entries.first() {
                block.first_id = first;
                let mut prev = first;
                for (i, (id, payload)) in entries.iter().enumerate() {
                    let delta = if i == 0 { 0 } else { *id - prev };
                    C::encode(&mut block.data, delta, payload);
                    prev = *id;
                }
                block.last_id = prev;
            }
            bytes_collected += old_bytes.saturating_sub(block.data.len());
        }

        self.num_docs -= docs_collected as u32;

        // Unlink emptied blocks inside the batch range; the overall last
        // block survives so appends keep a tail to land in.
        let last_idx = self.blocks.len() - 1;
        let mut idx = 0usize;
        let mut removed_in_range = 0usize;
        self.blocks.retain(|b| {
            let i = idx;
            idx += 1;
            let dead = b.num_entries == 0 && i >= from_block && i < end && i != last_idx;
            if dead {
                removed_in_range += 1;
            }
            !dead
        });

        let next = end - removed_in_range;
        RepairSummary {
            next_block: (next < self.blocks.len()).then_some(next),
            docs_collected,
            bytes_collected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(freq: u32) -> TermRecord {
        TermRecord {
            freq,
            field_mask: 1,
            positions: vec![1, 5],
        }
    }

    #[test]
    fn test_add_and_decode() {
        let mut idx = InvertedIndex::<TermCodec>::new();
        idx.add(1, &term(2));
        idx.add(7, &term(1));
        let entries = idx.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, 1);
        assert_eq!(entries[1].0, 7);
        assert_eq!(entries[0].1.positions, vec![1, 5]);
        assert!(idx.contains(7));
        assert!(!idx.contains(4));
    }

    #[test]
    fn test_block_rollover() {
        let mut idx = InvertedIndex::<TagCodec>::new();
        for id in 1..=(INDEX_BLOCK_CAP as u64 * 2 + 10) {
            idx.add(id, &());
        }
        assert_eq!(idx.num_blocks(), 3);
        assert_eq!(idx.num_docs(), INDEX_BLOCK_CAP as u32 * 2 + 10);
        // blocks sorted by first_id, contiguous coverage
        let ids = idx.doc_ids();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_numeric_payload_roundtrip() {
        let mut idx = InvertedIndex::<NumericCodec>::new();
        idx.add(3, &9.99);
        idx.add(4, &-1.5);
        let entries = idx.entries();
        assert_eq!(entries, vec![(3, 9.99), (4, -1.5)]);
    }

    #[test]
    fn test_repair_noop_when_all_live() {
        let mut idx = InvertedIndex::<TagCodec>::new();
        for id in 1..=250u64 {
            idx.add(id, &());
        }
        let before = idx.entries();
        let summary = idx.repair(0, RepairParams { limit: 100 }, |_| true);
        assert_eq!(summary.docs_collected, 0);
        assert_eq!(summary.bytes_collected, 0);
        assert_eq!(summary.next_block, None);
        assert_eq!(idx.entries(), before);
    }

    #[test]
    fn test_repair_drops_dead_and_batches() {
        let mut idx = InvertedIndex::<TagCodec>::new();
        for id in 1..=(INDEX_BLOCK_CAP as u64 * 3) {
            idx.add(id, &());
        }
        // kill even ids; repair one block per batch
        let live = |id: DocId| id % 2 == 1;
        let s1 = idx.repair(0, RepairParams { limit: 1 }, live);
        assert_eq!(s1.docs_collected, INDEX_BLOCK_CAP / 2);
        assert_eq!(s1.next_block, Some(1));
        let s2 = idx.repair(1, RepairParams { limit: 1 }, live);
        assert_eq!(s2.next_block, Some(2));
        let s3 = idx.repair(2, RepairParams { limit: 1 }, live);
        assert_eq!(s3.next_block, None);
        assert!(idx.doc_ids().iter().all(|id| id % 2 == 1));
        assert_eq!(
            idx.num_docs() as usize,
            INDEX_BLOCK_CAP * 3 - (s1.docs_collected + s2.docs_collected + s3.docs_collected)
        );
    }

    #[test]
    fn test_repair_unlinks_empty_blocks_but_keeps_tail() {
        let mut idx = InvertedIndex::<TagCodec>::new();
        for id in 1..=(INDEX_BLOCK_CAP as u64 * 2) {
            idx.add(id, &());
        }
        let summary = idx.repair(0, RepairParams { limit: 10 }, |_| false);
        assert_eq!(summary.docs_collected, INDEX_BLOCK_CAP * 2);
        assert_eq!(idx.num_docs(), 0);
        assert_eq!(idx.num_blocks(), 1);
        // tail block still accepts appends and restarts its id range
        idx.add(500, &());
        assert_eq!(idx.doc_ids(), vec![500]);
    }

    #[test]
    fn test_repair_out_of_range_is_done() {
        let mut idx = InvertedIndex::<TagCodec>::new();
        idx.add(1, &());
        let summary = idx.repair(5, RepairParams { limit: 10 }, |_| true);
        assert_eq!(summary, RepairSummary::default());
    }
}
