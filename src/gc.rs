//! Garbage collection of deleted documents.
//!
//! Deletion only unlinks document metadata; the posting entries stay in
//! the inverted/numeric/tag indexes until a collector rewrites their
//! blocks. Each pass repairs one weighted-random term, one leaf of one
//! random numeric field, and one random tag value, yielding the spec
//! lock between block batches so writers keep making progress. The pass
//! rate adapts to what it finds: removals speed it up, dry passes slow
//! it down.
//!
//! A collector never holds pointers into the spec across a yield. It
//! keeps the spec's key name and `unique_id`, re-resolves through the
//! host after every yield, and aborts the pass when the spec was
//! dropped or recreated under it. Numeric cursors are doubly guarded:
//! a tree's `tree_id` detects replacement and its `revision_id`
//! detects structural drift.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLockWriteGuard};
use rand::Rng;

use crate::config::IndexingConfig;
use crate::host::{Host, SpecHandle};
use crate::spec::{FieldType, IndexSpec};
use crate::structures::{NumericRangeTree, RepairParams};

/// Counters accumulated across passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Bytes reclaimed from posting blocks.
    pub total_collected: usize,
    pub num_cycles: usize,
    /// Cycles that removed at least one record.
    pub effective_cycles: usize,
}

/// Rendered stats for the host's info surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcStatsSnapshot {
    pub current_hz: f32,
    pub bytes_collected: usize,
    pub effective_cycles_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GcStatus {
    Ok,
    Invalid,
}

/// Per-numeric-field cursor state. Holds ids, never references: the
/// tree is re-resolved and re-validated against these on every pass.
struct NumericFieldGc {
    tree_id: u64,
    revision_id: u64,
    cursor: VecDeque<u64>,
}

impl NumericFieldGc {
    fn new(rt: &NumericRangeTree) -> Self {
        Self {
            tree_id: rt.tree_id,
            revision_id: rt.revision_id,
            cursor: rt.leaf_range_ids().into(),
        }
    }

    /// Next leaf to repair. On exhaustion the cursor restarts from the
    /// root exactly once; a tree always has at least one leaf, so a
    /// second empty sweep is a broken invariant.
    fn next_node(&mut self, rt: &NumericRangeTree) -> u64 {
        let mut restarted = false;
        loop {
            while let Some(range_id) = self.cursor.pop_front() {
                if rt.range_by_id(range_id).is_some() {
                    return range_id;
                }
            }
            assert!(
                !restarted,
                "numeric GC iterator must yield a range after restarting"
            );
            self.cursor = rt.leaf_range_ids().into();
            restarted = true;
        }
    }
}

/// One spec's garbage collector.
pub struct GarbageCollector<H: Host> {
    host: Arc<H>,
    spec_key: String,
    spec_unique_id: u64,
    hz: f32,
    stats: GcStats,
    /// True until the host reports "not loading" once; passes are
    /// skipped while a snapshot may still be loading.
    rdb_possibly_loading: bool,
    /// When set, never block on the spec lock: contended passes are
    /// skipped instead (for hosts that serialize access themselves).
    no_lock_mode: bool,
    numeric_gcs: Vec<NumericFieldGc>,
    config: IndexingConfig,
}

impl<H: Host> GarbageCollector<H> {
    /// Create a collector for the spec registered under `spec_key`.
    /// `spec_unique_id` pins the exact spec instance this collector
    /// serves; a recreated spec needs a new collector.
    pub fn new(
        host: Arc<H>,
        spec_key: impl Into<String>,
        spec_unique_id: u64,
        config: IndexingConfig,
    ) -> Self {
        let hz = config.clamp_hz(config.gc_initial_hz);
        Self {
            host,
            spec_key: spec_key.into(),
            spec_unique_id,
            hz,
            stats: GcStats::default(),
            rdb_possibly_loading: true,
            no_lock_mode: false,
            numeric_gcs: Vec::with_capacity(crate::config::NUMERIC_GC_INITIAL_CAPACITY),
            config,
        }
    }

    pub fn set_no_lock_mode(&mut self, enabled: bool) {
        self.no_lock_mode = enabled;
    }

    pub fn current_hz(&self) -> f32 {
        self.hz
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Sleep time until the next pass.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.hz)
    }

    /// Hint from the deletion path: collectable garbage just appeared.
    pub fn on_delete(&mut self) {
        self.hz = (self.hz * 1.5).min(self.config.gc_max_hz);
    }

    pub fn stats_snapshot(&self) -> GcStatsSnapshot {
        GcStatsSnapshot {
            current_hz: self.hz,
            bytes_collected: self.stats.total_collected,
            effective_cycles_rate: self.stats.effective_cycles as f64
                / self.stats.num_cycles.max(1) as f64,
        }
    }

    /// Run one pass. Returns false when the spec is gone and the
    /// driver should stop rescheduling this collector.
    pub fn periodic_callback(&mut self) -> bool {
        if self.rdb_possibly_loading {
            if self.host.is_loading_snapshot() {
                log::info!("[gc] snapshot loading in progress, not collecting");
                return true;
            }
            // will not load again; skip the check from now on
            self.rdb_possibly_loading = false;
        }

        let mut status = GcStatus::Ok;
        let mut total_removed = 0usize;
        total_removed += self.collect_random_term(&mut status);
        total_removed += self.collect_numeric_index(&mut status);
        total_removed += self.collect_tag_index(&mut status);

        self.stats.num_cycles += 1;
        if total_removed > 0 {
            self.stats.effective_cycles += 1;
            self.hz = (self.hz * 1.2).min(self.config.gc_max_hz);
        } else {
            self.hz = (self.hz * 0.99).max(self.config.gc_min_hz);
        }
        log::debug!(
            "[gc] cycle done: removed={} hz={:.2} status={:?}",
            total_removed,
            self.hz,
            status
        );
        status == GcStatus::Ok
    }

    fn lock_spec<'a>(&self, handle: &'a SpecHandle) -> Option<RwLockWriteGuard<'a, IndexSpec>> {
        if self.no_lock_mode {
            handle.try_write()
        } else {
            Some(handle.write())
        }
    }

    fn resolve_spec(&self, status: &mut GcStatus) -> Option<SpecHandle> {
        let handle = self.host.open_spec(&self.spec_key);
        if handle.is_none() {
            log::warn!("[gc] no index spec for {}", self.spec_key);
            *status = GcStatus::Invalid;
        }
        handle
    }

    fn check_unique_id(&self, spec: &IndexSpec, status: &mut GcStatus) -> bool {
        if spec.unique_id() != self.spec_unique_id {
            log::warn!("[gc] index spec {} was recreated", self.spec_key);
            *status = GcStatus::Invalid;
            return false;
        }
        true
    }

    /// Repair blocks of one weighted-random term.
    fn collect_random_term(&mut self, status: &mut GcStatus) -> usize {
        let mut rng = rand::thread_rng();
        let Some(mut handle) = self.resolve_spec(status) else {
            return 0;
        };
        let Some(mut spec) = self.lock_spec(&handle) else {
            return 0;
        };
        if !self.check_unique_id(&spec, status) {
            return 0;
        }
        // empty dictionary yields nothing to collect
        let Some(term) = spec.get_random_term(&mut rng) else {
            return 0;
        };
        log::debug!("[gc] collecting term `{}`", term);

        let mut block = 0usize;
        let mut total_removed = 0usize;
        let mut total_bytes = 0usize;
        loop {
            let params = RepairParams {
                limit: self.config.gc_scan_size,
            };
            let (terms, _, _, docs, stats) = spec.gc_parts();
            let Some(index) = terms.find_mut(term.as_bytes()) else {
                break;
            };
            let summary = index.repair(block, params, |id| docs.is_live(id));
            stats.num_records = stats.num_records.saturating_sub(summary.docs_collected);
            stats.inverted_size = stats.inverted_size.saturating_sub(summary.bytes_collected);
            self.stats.total_collected += summary.bytes_collected;
            total_removed += summary.docs_collected;
            total_bytes += summary.bytes_collected;

            let Some(next) = summary.next_block else {
                break;
            };
            block = next;

            // yield between batches: release the spec so writers make
            // progress, then re-resolve and re-validate
            drop(spec);
            let Some(reopened) = self.resolve_spec(status) else {
                return total_removed;
            };
            handle = reopened;
            let Some(relocked) = self.lock_spec(&handle) else {
                return total_removed;
            };
            spec = relocked;
            if !self.check_unique_id(&spec, status) {
                return total_removed;
            }
        }
        if total_removed > 0 {
            log::debug!(
                "[gc] collected {} bytes in {} records for term `{}`",
                total_bytes,
                total_removed,
                term
            );
        }
        total_removed
    }

    /// Repair blocks of one leaf of one random numeric field.
    fn collect_numeric_index(&mut self, status: &mut GcStatus) -> usize {
        let mut rng = rand::thread_rng();
        let Some(mut handle) = self.resolve_spec(status) else {
            return 0;
        };
        let Some(mut spec) = self.lock_spec(&handle) else {
            return 0;
        };
        if !self.check_unique_id(&spec, status) {
            return 0;
        }
        let numeric_fields = spec.fields_by_type(FieldType::Numeric);
        if numeric_fields.is_empty() {
            return 0;
        }

        if numeric_fields.len() != self.numeric_gcs.len() {
            // spec fields are append-only
            assert!(
                numeric_fields.len() > self.numeric_gcs.len(),
                "numeric fields cannot be removed from a spec"
            );
            self.numeric_gcs.clear();
            for &field_index in &numeric_fields {
                let rt = spec.open_numeric_index(field_index);
                self.numeric_gcs.push(NumericFieldGc::new(rt));
            }
        }

        let pick = rng.gen_range(0..self.numeric_gcs.len());
        let field_index = numeric_fields[pick];

        let range_id = {
            let rt = spec.open_numeric_index(field_index);
            let field_gc = &mut self.numeric_gcs[pick];
            if field_gc.tree_id != rt.tree_id || field_gc.revision_id != rt.revision_id {
                debug_assert!(
                    field_gc.tree_id != rt.tree_id || field_gc.revision_id < rt.revision_id,
                    "captured revision must trail the live tree"
                );
                // tree replaced or structurally changed; rebuild the cursor
                *field_gc = NumericFieldGc::new(rt);
            }
            field_gc.next_node(rt)
        };

        let mut block = 0usize;
        let mut total_removed = 0usize;
        loop {
            let params = RepairParams {
                limit: self.config.gc_scan_size,
            };
            let (_, numeric, _, docs, stats) = spec.gc_parts();
            let Some(rt) = numeric.get_mut(&field_index) else {
                break;
            };
            let Some(range) = rt.range_by_id_mut(range_id) else {
                break;
            };
            let summary = range.entries.repair(block, params, |id| docs.is_live(id));
            rt.num_entries = rt.num_entries.saturating_sub(summary.docs_collected);
            stats.num_records = stats.num_records.saturating_sub(summary.docs_collected);
            stats.inverted_size = stats.inverted_size.saturating_sub(summary.bytes_collected);
            self.stats.total_collected += summary.bytes_collected;
            total_removed += summary.docs_collected;

            let Some(next) = summary.next_block else {
                break;
            };
            block = next;

            drop(spec);
            let Some(reopened) = self.resolve_spec(status) else {
                return total_removed;
            };
            handle = reopened;
            let Some(relocked) = self.lock_spec(&handle) else {
                return total_removed;
            };
            spec = relocked;
            if !self.check_unique_id(&spec, status) {
                return total_removed;
            }
            // structural drift invalidates the cursor mid-pass
            let stale = spec
                .numeric_index(field_index)
                .is_none_or(|rt| rt.revision_id != self.numeric_gcs[pick].revision_id);
            if stale {
                break;
            }
        }
        total_removed
    }

    /// Repair blocks of one random value of one random tag field.
    fn collect_tag_index(&mut self, status: &mut GcStatus) -> usize {
        let mut rng = rand::thread_rng();
        let Some(mut handle) = self.resolve_spec(status) else {
            return 0;
        };
        let Some(mut spec) = self.lock_spec(&handle) else {
            return 0;
        };
        if !self.check_unique_id(&spec, status) {
            return 0;
        }
        let tag_fields = spec.fields_by_type(FieldType::Tag);
        if tag_fields.is_empty() {
            return 0;
        }
        let field_index = tag_fields[rng.gen_range(0..tag_fields.len())];
        let Some(tag_index) = spec.tag_index(field_index) else {
            return 0;
        };
        let Some(tag_value) = tag_index.random_value(&mut rng) else {
            return 0;
        };

        let mut block = 0usize;
        let mut total_removed = 0usize;
        loop {
            let params = RepairParams {
                limit: self.config.gc_scan_size,
            };
            let (_, _, tags, docs, stats) = spec.gc_parts();
            let Some(tag_index) = tags.get_mut(&field_index) else {
                break;
            };
            // the value may have vanished between yields
            let Some(postings) = tag_index.postings_mut(&tag_value) else {
                break;
            };
            let summary = postings.repair(block, params, |id| docs.is_live(id));
            stats.num_records = stats.num_records.saturating_sub(summary.docs_collected);
            stats.inverted_size = stats.inverted_size.saturating_sub(summary.bytes_collected);
            self.stats.total_collected += summary.bytes_collected;
            total_removed += summary.docs_collected;

            let Some(next) = summary.next_block else {
                break;
            };
            block = next;

            drop(spec);
            let Some(reopened) = self.resolve_spec(status) else {
                return total_removed;
            };
            handle = reopened;
            let Some(relocked) = self.lock_spec(&handle) else {
                return total_removed;
            };
            spec = relocked;
            if !self.check_unique_id(&spec, status) {
                return total_removed;
            }
        }
        total_removed
    }
}

/// Timer-thread driver for one collector: sleep `1/hz`, run a pass,
/// repeat until stopped or the spec disappears.
pub struct GcRunner<H: Host> {
    gc: Arc<Mutex<GarbageCollector<H>>>,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl<H: Host> GcRunner<H> {
    pub fn start(gc: GarbageCollector<H>) -> Self {
        let gc = Arc::new(Mutex::new(gc));
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_gc = Arc::clone(&gc);
        let thread_shutdown = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("quarry-gc".to_string())
            .spawn(move || {
                loop {
                    let interval = thread_gc.lock().interval();
                    {
                        let (stopped, cvar) = &*thread_shutdown;
                        let mut stopped = stopped.lock();
                        if *stopped {
                            return;
                        }
                        cvar.wait_for(&mut stopped, interval);
                        if *stopped {
                            return;
                        }
                    }
                    if !thread_gc.lock().periodic_callback() {
                        log::info!("[gc] spec invalid, stopping collector");
                        return;
                    }
                }
            })
            .expect("failed to spawn gc thread");
        Self {
            gc,
            shutdown,
            thread: Some(thread),
        }
    }

    /// Deletion hint passthrough.
    pub fn on_delete(&self) {
        self.gc.lock().on_delete();
    }

    pub fn stats(&self) -> GcStats {
        self.gc.lock().stats()
    }

    pub fn stats_snapshot(&self) -> GcStatsSnapshot {
        self.gc.lock().stats_snapshot()
    }

    /// Run one pass immediately on the calling thread (bypassing the
    /// timer), returning whether the collector is still valid.
    pub fn force_cycle(&self) -> bool {
        self.gc.lock().periodic_callback()
    }

    pub fn stop(mut self) {
        self.shutdown_now();
    }

    fn shutdown_now(&mut self) {
        {
            let (stopped, cvar) = &*self.shutdown;
            *stopped.lock() = true;
            cvar.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<H: Host> Drop for GcRunner<H> {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use enumflags2::BitFlags;

    use super::*;
    use crate::config::IndexingConfig;
    use crate::document::Document;
    use crate::host::{InMemoryHost, SearchCtx};
    use crate::ingest::{AddOption, IngestPipeline};
    use crate::spec::{FieldOption, IndexSpecBuilder};

    fn seeded_host() -> (Arc<InMemoryHost>, u64) {
        let host = InMemoryHost::new();
        let spec = IndexSpecBuilder::new("idx")
            .add_text_field("title", 1.0, BitFlags::empty())
            .add_numeric_field("price", FieldOption::Sortable.into())
            .add_tag_field("tags", ',', BitFlags::empty())
            .build();
        let unique_id = spec.unique_id();
        host.create_spec("idx", spec);
        (host, unique_id)
    }

    fn ingest_docs(host: &Arc<InMemoryHost>, count: usize) {
        let pipeline = IngestPipeline::new(Arc::clone(host), IndexingConfig::default());
        let mut sctx = SearchCtx::new(Arc::clone(host), "idx");
        for i in 0..count {
            let doc = Document::new(format!("doc:{}", i))
                .field("title", "quartz widget")
                .field("price", format!("{}", i))
                .field("tags", "red,blue");
            pipeline
                .add_document(&mut sctx, doc, AddOption::NoBlock.into())
                .unwrap();
        }
    }

    fn gc_for(host: &Arc<InMemoryHost>, unique_id: u64) -> GarbageCollector<InMemoryHost> {
        GarbageCollector::new(
            Arc::clone(host),
            "idx",
            unique_id,
            IndexingConfig {
                gc_scan_size: 2,
                ..IndexingConfig::default()
            },
        )
    }

    #[test]
    fn test_idle_pass_decays_hz_and_touches_nothing() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 20);
        let mut gc = gc_for(&host, unique_id);
        let hz_before = gc.current_hz();
        let (records_before, postings_before) = {
            let spec = host.open_spec("idx").unwrap();
            let spec = spec.read();
            (
                spec.stats.num_records,
                spec.term_index("widget").unwrap().doc_ids(),
            )
        };

        assert!(gc.periodic_callback());

        let spec = host.open_spec("idx").unwrap();
        let spec = spec.read();
        assert_eq!(spec.stats.num_records, records_before);
        assert_eq!(spec.term_index("widget").unwrap().doc_ids(), postings_before);
        assert!((gc.current_hz() - hz_before * 0.99).abs() < 1e-4);
        assert_eq!(gc.stats.effective_cycles, 0);
        assert_eq!(gc.stats.num_cycles, 1);
    }

    #[test]
    fn test_collection_after_deletions() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 50);
        {
            let spec = host.open_spec("idx").unwrap();
            let mut spec = spec.write();
            for i in 0..40 {
                assert!(spec.delete_document(&format!("doc:{}", i)));
            }
        }
        let mut gc = gc_for(&host, unique_id);
        let hz_before = gc.current_hz();

        // every document shares the term values, so the weighted pick
        // always lands on a posting list with dead entries
        assert!(gc.periodic_callback());
        assert_eq!(gc.stats.effective_cycles, 1);
        assert!(gc.stats.total_collected > 0);
        assert!((gc.current_hz() - hz_before * 1.2).abs() < 1e-4);

        // soundness: surviving posting ids are all live
        let spec = host.open_spec("idx").unwrap();
        let spec = spec.read();
        for id in spec.term_index("widget").unwrap().doc_ids() {
            assert!(spec.docs.is_live(id), "doc {} still in postings", id);
        }
    }

    #[test]
    fn test_full_drain_restores_counters() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 30);
        {
            let spec = host.open_spec("idx").unwrap();
            let mut spec = spec.write();
            for i in 0..30 {
                spec.delete_document(&format!("doc:{}", i));
            }
        }
        let mut gc = gc_for(&host, unique_id);
        // enough cycles to visit every term and tag value
        for _ in 0..200 {
            assert!(gc.periodic_callback());
        }
        let spec = host.open_spec("idx").unwrap();
        let spec = spec.read();
        assert!(spec.term_index("widget").unwrap().is_empty());
        assert!(spec.term_index("quartz").unwrap().is_empty());
    }

    #[test]
    fn test_rate_adaptivity_bounds() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 5);
        let mut gc = gc_for(&host, unique_id);
        for _ in 0..2_000 {
            gc.periodic_callback();
        }
        // long dry stretch converges to the floor
        assert!((gc.current_hz() - gc.config.gc_min_hz).abs() < 0.2);

        gc.on_delete();
        let bumped = gc.current_hz();
        assert!(bumped > gc.config.gc_min_hz);
        assert!(bumped <= gc.config.gc_max_hz);
    }

    #[test]
    fn test_on_delete_saturates_at_max() {
        let (host, unique_id) = seeded_host();
        let mut gc = gc_for(&host, unique_id);
        for _ in 0..100 {
            gc.on_delete();
        }
        assert_eq!(gc.current_hz(), gc.config.gc_max_hz);
    }

    #[test]
    fn test_spec_recreated_invalidates_pass() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 5);
        // recreate the spec under the same key: new unique id
        let replacement = IndexSpecBuilder::new("idx")
            .add_text_field("title", 1.0, BitFlags::empty())
            .build();
        host.create_spec("idx", replacement);

        let mut gc = gc_for(&host, unique_id);
        // pass reports invalid so the driver stops rescheduling
        assert!(!gc.periodic_callback());

        // the new spec was never touched
        let spec = host.open_spec("idx").unwrap();
        let spec = spec.read();
        assert_eq!(spec.stats.num_records, 0);
    }

    #[test]
    fn test_spec_dropped_invalidates_pass() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 5);
        host.drop_spec("idx");
        let mut gc = gc_for(&host, unique_id);
        assert!(!gc.periodic_callback());
    }

    #[test]
    fn test_snapshot_loading_guard_clears_once() {
        let (host, unique_id) = seeded_host();
        host.set_loading(true);
        let mut gc = gc_for(&host, unique_id);
        assert!(gc.periodic_callback());
        assert_eq!(gc.stats.num_cycles, 0); // skipped entirely
        assert!(gc.rdb_possibly_loading);

        host.set_loading(false);
        assert!(gc.periodic_callback());
        assert!(!gc.rdb_possibly_loading);
        assert_eq!(gc.stats.num_cycles, 1);

        // once cleared, a later load no longer pauses collection
        host.set_loading(true);
        assert!(gc.periodic_callback());
        assert_eq!(gc.stats.num_cycles, 2);
    }

    #[test]
    fn test_numeric_tree_replacement_rebuilds_cursor() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 30);
        let mut gc = gc_for(&host, unique_id);
        assert!(gc.periodic_callback());
        let captured_tree = gc.numeric_gcs[0].tree_id;

        // swap the numeric tree wholesale (new tree_id, fresh revision)
        {
            let spec = host.open_spec("idx").unwrap();
            let mut spec = spec.write();
            let field_index = spec.fields_by_type(FieldType::Numeric)[0];
            let mut replacement = NumericRangeTree::new();
            replacement.add(1, 1.0);
            spec.numeric.insert(field_index, replacement);
        }

        assert!(gc.periodic_callback());
        assert_ne!(gc.numeric_gcs[0].tree_id, captured_tree);
    }

    #[test]
    fn test_numeric_revision_drift_rebuilds_cursor() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 5);
        let mut gc = gc_for(&host, unique_id);
        assert!(gc.periodic_callback());
        let captured_revision = gc.numeric_gcs[0].revision_id;

        // grow the tree until it splits: same tree, new revision
        {
            let spec = host.open_spec("idx").unwrap();
            let mut spec = spec.write();
            let field_index = spec.fields_by_type(FieldType::Numeric)[0];
            let rt = spec.open_numeric_index(field_index);
            let start = 1_000;
            for i in 0..40u64 {
                rt.add(start + i, i as f64 * 3.5);
            }
            assert!(rt.revision_id > captured_revision);
        }

        assert!(gc.periodic_callback());
        assert!(gc.numeric_gcs[0].revision_id > captured_revision);
    }

    #[test]
    fn test_stats_snapshot_rate() {
        let (host, unique_id) = seeded_host();
        let mut gc = gc_for(&host, unique_id);
        let snap = gc.stats_snapshot();
        assert_eq!(snap.effective_cycles_rate, 0.0);
        gc.stats.num_cycles = 4;
        gc.stats.effective_cycles = 1;
        let snap = gc.stats_snapshot();
        assert!((snap.effective_cycles_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_runner_thread_cycles_and_stops() {
        let (host, unique_id) = seeded_host();
        ingest_docs(&host, 3);
        let gc = GarbageCollector::new(
            Arc::clone(&host),
            "idx",
            unique_id,
            IndexingConfig {
                gc_initial_hz: 100.0,
                ..IndexingConfig::default()
            },
        );
        let runner = GcRunner::start(gc);
        std::thread::sleep(Duration::from_millis(300));
        let cycles = runner.stats().num_cycles;
        runner.stop();
        // at 100 Hz a 300ms window fits several cycles
        assert!(cycles >= 1, "runner never ticked");
    }
}
