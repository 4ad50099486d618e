//! Serial index merger.
//!
//! Preprocessing may fan out across worker threads, but exactly one
//! merger advances a spec's canonical posting lists: producers enqueue
//! prepared contexts and a dedicated consumer thread drains them in
//! order. Everything observable follows from that — doc ids are
//! monotonic, posting lists only ever grow at the tail, and readers
//! never see a half-merged document. NOBLOCK contexts bypass the queue
//! and run the same merge inline on the calling thread.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use crate::doc_table::DocumentMetadata;
use crate::error::{Error, Result};
use crate::host::{Host, SpecHandle};
use crate::spec::{IndexSpec, SpecFlag};
use crate::structures::{InvertedIndex, TermRecord};

use super::{AddDocumentCtx, AddOption, IndexBulkData};

/// Queued contexts before producers start blocking.
const INDEXER_QUEUE_CAP: usize = 1024;

/// Single-consumer merge queue for one spec.
pub struct Indexer<H: Host> {
    sender: async_channel::Sender<Box<AddDocumentCtx<H>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    spec: Weak<RwLock<IndexSpec>>,
    host: Arc<H>,
}

impl<H: Host> Indexer<H> {
    /// Spawn the merger thread for a spec. The indexer holds only a
    /// weak reference: dropping the spec drains the queue into errors
    /// instead of keeping the index alive.
    pub fn spawn(host: Arc<H>, handle: &SpecHandle) -> Arc<Self> {
        let (sender, receiver) = async_channel::bounded(INDEXER_QUEUE_CAP);
        let weak = Arc::downgrade(handle);
        let thread_weak = Weak::clone(&weak);
        let thread_host = Arc::clone(&host);
        let name = handle.read().name.clone();
        let thread = std::thread::Builder::new()
            .name(format!("quarry-indexer-{}", name))
            .spawn(move || {
                while let Ok(ctx) = receiver.recv_blocking() {
                    Self::process(&thread_weak, &thread_host, ctx);
                }
            })
            .expect("failed to spawn indexer thread");

        Arc::new(Self {
            sender,
            thread: Mutex::new(Some(thread)),
            spec: weak,
            host,
        })
    }

    /// Whether this indexer was spawned for the given spec instance.
    pub fn serves(&self, handle: &SpecHandle) -> bool {
        self.spec.ptr_eq(&Arc::downgrade(handle))
    }

    /// Take ownership of a prepared context. Blockable contexts are
    /// queued for the merger thread; NOBLOCK contexts merge inline.
    pub fn add(&self, ctx: Box<AddDocumentCtx<H>>) {
        if !ctx.is_blockable() {
            Self::process(&self.spec, &self.host, ctx);
            return;
        }
        if let Err(async_channel::SendError(mut ctx)) = self.sender.send_blocking(ctx) {
            ctx.fail(Error::QueueClosed);
            ctx.finish();
        }
    }

    /// Merge one context under the spec write lock, then fire its
    /// completion.
    fn process(spec: &Weak<RwLock<IndexSpec>>, host: &Arc<H>, mut ctx: Box<AddDocumentCtx<H>>) {
        let Some(handle) = spec.upgrade() else {
            ctx.fail(Error::QueueClosed);
            ctx.finish();
            return;
        };
        let result = {
            let mut spec = handle.write();
            Self::index_document(&mut spec, host.as_ref(), &mut ctx)
        };
        if let Err(err) = result {
            ctx.fail(err);
        }
        ctx.finish();
    }

    /// The canonical merge: replace any previous document under the
    /// key, assign the next doc id, fold the forward index into the
    /// term dictionary, commit non-text data, publish metadata, and
    /// store the body.
    fn index_document(
        spec: &mut IndexSpec,
        host: &H,
        ctx: &mut AddDocumentCtx<H>,
    ) -> Result<()> {
        if spec.docs.id_by_key(&ctx.doc.key) != 0 {
            if !ctx
                .options
                .intersects(AddOption::Replace | AddOption::Partial)
            {
                return Err(Error::Generic("Document already exists".to_string()));
            }
            spec.delete_document(&ctx.doc.key);
        }

        let byte_offsets = ctx.byte_offsets.take().map(|mut offsets| {
            offsets.freeze(&mut ctx.offsets_writer);
            offsets
        });
        let doc_id = spec.docs.put(DocumentMetadata {
            id: 0,
            key: ctx.doc.key.clone(),
            score: ctx.doc.score,
            payload: ctx.doc.payload.take(),
            sort_vector: ctx.sv.take(),
            byte_offsets,
            flags: ctx.doc_flags,
        });
        ctx.doc.id = doc_id;
        log::debug!("[indexer] merging `{}` as doc {}", ctx.doc.key, doc_id);

        // Fold text postings. Terms land in sorted order so the merge
        // is deterministic for identical forward indexes.
        let store_offsets = spec.flags.contains(SpecFlag::StoreTermOffsets);
        for (term, entry) in ctx.fwd.drain_sorted() {
            let record = TermRecord {
                freq: entry.freq,
                field_mask: entry.field_mask,
                positions: if store_offsets {
                    entry.positions
                } else {
                    Vec::new()
                },
            };
            let grew = spec
                .terms
                .get_or_insert_with(term.as_bytes(), InvertedIndex::new)
                .add(doc_id, &record);
            spec.stats.num_records += 1;
            spec.stats.inverted_size += grew;
        }

        // Commit numeric/tag/geo data collected by the preprocessors.
        let mut bulk = IndexBulkData::new();
        let commit_result = (|| {
            for i in 0..ctx.doc.fields.len() {
                let Some(fs) = ctx.fspecs.get(i).and_then(Option::as_ref) else {
                    continue;
                };
                let field = &ctx.doc.fields[i];
                if field.index_as.is_empty() {
                    continue;
                }
                bulk.add(spec, doc_id, field, fs, &mut ctx.fdatas[i])?;
            }
            Ok(())
        })();
        bulk.cleanup();
        commit_result?;

        if !ctx.options.contains(AddOption::NoSave) {
            host.store_document(&ctx.doc.key, &ctx.doc.stored_fields());
        }
        Ok(())
    }
}

impl<H: Host> Drop for Indexer<H> {
    fn drop(&mut self) {
        self.sender.close();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}
