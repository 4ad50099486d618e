//! Document ingestion pipeline.
//!
//! # Architecture
//!
//! ```text
//! submit() ──partial?──► update_no_index / replace_merge
//!    │
//!    ├─ small doc ───────────────► add_to_indexes (inline)
//!    └─ large doc ──try_send──► [worker pool] ──► add_to_indexes
//!                                                     │
//!                                 preprocessors fill ForwardIndex
//!                                 + FieldIndexerData, then
//!                                                     ▼
//!                              [Indexer queue] ── single merger thread
//!                              assigns doc id, folds postings, commits
//!                              bulk data, publishes metadata, fires the
//!                              completion callback
//! ```
//!
//! An [`AddDocumentCtx`] owns one document through the whole pipeline
//! and is destroyed exactly once: after the merge, or on the completion
//! path of an error. The `Document` moves in at construction and never
//! gets cloned.

mod bulk;
mod indexer;
mod pool;
mod preprocess;


pub use bulk::IndexBulkData;
pub use indexer::Indexer;
pub use preprocess::FieldIndexerData;

use std::sync::Arc;
use std::sync::mpsc;

use enumflags2::{BitFlags, bitflags};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::DocId;
use crate::byte_offsets::{ByteOffsetWriter, ByteOffsets};
use crate::config::IndexingConfig;
use crate::doc_table::{DocFlag, DocFlags};
use crate::document::{Document, DocumentField};
use crate::error::{Error, Result};
use crate::forward_index::ForwardIndex;
use crate::host::{BlockedClient, Host, SearchCtx, SpecHandle};
use crate::sorting_vector::SortingVector;
use crate::spec::{FieldSpec, FieldType, IndexSpec, SpecFlag};
use crate::tokenize::DocumentTokenizer;

use pool::WorkerPool;
use preprocess::PreprocessCtx;

/// Ingest options supplied at submit time.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOption {
    /// Skip storing the document body in the host.
    NoSave = 0b0001,
    /// Metadata-or-reindex update semantics.
    Partial = 0b0010,
    /// Replace an existing document under the same key.
    Replace = 0b0100,
    /// Never offload; the ingest completes on the calling thread.
    NoBlock = 0b1000,
}

pub type AddOptions = BitFlags<AddOption>;

/// Context state derived by `set_document` and fixed thereafter.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFlag {
    /// At least one field will enter an index.
    Indexables = 0b000001,
    /// No text work remains.
    TextIndexed = 0b000010,
    /// No non-text work remains.
    OtherIndexed = 0b000100,
    /// At least one sortable field is present.
    Sortables = 0b001000,
    /// Nothing to do at all.
    Empty = 0b010000,
    /// Must complete synchronously.
    NoBlock = 0b100000,
}

pub type StateFlags = BitFlags<StateFlag>;

/// Completion callback; fires exactly once per context.
pub type DoneCallback<H> = Box<dyn FnOnce(&AddDocumentCtx<H>) + Send>;

/// Shared pipeline state: host access, config, the preprocessing worker
/// pool, and one serial indexer per spec.
pub(crate) struct PipelineShared<H: Host> {
    pub host: Arc<H>,
    pub config: IndexingConfig,
    pool: WorkerPool<H>,
    indexers: Mutex<FxHashMap<String, Arc<Indexer<H>>>>,
}

impl<H: Host> PipelineShared<H> {
    /// The serial indexer for a spec, spawned on first use and replaced
    /// if the spec under the key was recreated.
    fn indexer_for(&self, key: &str, handle: &SpecHandle) -> Arc<Indexer<H>> {
        let mut map = self.indexers.lock();
        if let Some(existing) = map.get(key)
            && existing.serves(handle)
        {
            return Arc::clone(existing);
        }
        let indexer = Indexer::spawn(Arc::clone(&self.host), handle);
        map.insert(key.to_string(), Arc::clone(&indexer));
        indexer
    }
}

/// Entry point for ingest: builds contexts and owns the worker pool.
pub struct IngestPipeline<H: Host> {
    shared: Arc<PipelineShared<H>>,
}

impl<H: Host> IngestPipeline<H> {
    pub fn new(host: Arc<H>, config: IndexingConfig) -> Self {
        let pool = WorkerPool::spawn(config.index_pool_threads);
        Self {
            shared: Arc::new(PipelineShared {
                host,
                config,
                pool,
                indexers: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.shared.config
    }

    /// Build an ingest context for a document, taking ownership of it.
    /// Field validation happens here; an invalid document never yields
    /// a context.
    pub fn new_context(
        &self,
        sctx: &SearchCtx<H>,
        doc: Document,
    ) -> Result<Box<AddDocumentCtx<H>>> {
        let handle = sctx
            .spec
            .clone()
            .ok_or_else(|| Error::Generic(format!("Unknown index `{}`", sctx.key)))?;
        let indexer = self.shared.indexer_for(&sctx.key, &handle);
        let spec = handle.read();

        let mut ctx = Box::new(AddDocumentCtx {
            pipeline: Arc::clone(&self.shared),
            indexer,
            status: None,
            options: AddOptions::empty(),
            state: StateFlags::empty(),
            doc_flags: DocFlags::empty(),
            doc: Document::default(),
            fspecs: Vec::new(),
            fdatas: Vec::new(),
            sv: None,
            fwd: ForwardIndex::new(spec.synonyms.clone()),
            tokenizer: DocumentTokenizer::new(doc.language, Arc::clone(&spec.stop_words)),
            byte_offsets: None,
            offsets_writer: ByteOffsetWriter::default(),
            total_tokens: 0,
            client: None,
            done: None,
        });
        // first call: the context holds no previous fields yet
        ctx.set_document(&spec, doc, 0)?;
        ctx.doc.id = 0;
        Ok(ctx)
    }

    /// Submit a document and block until its completion callback fires.
    /// Convenience over `new_context` + `submit` for synchronous
    /// callers; must not be called while holding the spec lock.
    pub fn add_document(
        &self,
        sctx: &mut SearchCtx<H>,
        doc: Document,
        options: AddOptions,
    ) -> Result<DocId> {
        let mut ctx = self.new_context(sctx, doc)?;
        let (tx, rx) = mpsc::channel();
        ctx.set_done(move |done: &AddDocumentCtx<H>| {
            let _ = tx.send((done.doc.id, done.status.clone()));
        });
        ctx.submit(sctx, options);
        match rx.recv() {
            Ok((_, Some(err))) => Err(err),
            Ok((id, None)) => Ok(id),
            Err(_) => Err(Error::QueueClosed),
        }
    }
}

/// State for one document moving through ingestion.
pub struct AddDocumentCtx<H: Host> {
    pipeline: Arc<PipelineShared<H>>,
    indexer: Arc<Indexer<H>>,
    /// Failure cause; `None` on the success path. The first specific
    /// code wins — later layers only fill this when it is empty.
    pub status: Option<Error>,
    options: AddOptions,
    state: StateFlags,
    doc_flags: DocFlags,
    pub doc: Document,
    /// Resolved schema entry per document field; `None` for fields the
    /// schema does not know (they are skipped, not errors).
    fspecs: Vec<Option<FieldSpec>>,
    fdatas: Vec<FieldIndexerData>,
    sv: Option<SortingVector>,
    fwd: ForwardIndex,
    tokenizer: DocumentTokenizer,
    byte_offsets: Option<ByteOffsets>,
    offsets_writer: ByteOffsetWriter,
    total_tokens: u32,
    client: Option<BlockedClient>,
    done: Option<DoneCallback<H>>,
}

impl<H: Host> AddDocumentCtx<H> {
    /// Register the completion callback. It fires exactly once, on
    /// success or failure, after which the context is destroyed.
    pub fn set_done(&mut self, done: impl FnOnce(&AddDocumentCtx<H>) + Send + 'static) {
        self.done = Some(Box::new(done));
    }

    pub fn state(&self) -> StateFlags {
        self.state
    }

    fn is_blockable(&self) -> bool {
        !self.state.contains(StateFlag::NoBlock)
    }

    /// Record a failure, keeping any earlier (more specific) code.
    fn fail(&mut self, err: Error) {
        if self.status.is_none() {
            self.status = Some(err);
        }
    }

    /// Validate and classify the document's fields against the spec,
    /// deriving the context state flags. Pure with respect to
    /// `(spec, doc, old_field_count)`: repeated calls produce identical
    /// flags. On success the document moves into the context.
    pub(crate) fn set_document(
        &mut self,
        spec: &IndexSpec,
        mut doc: Document,
        old_field_count: usize,
    ) -> Result<()> {
        self.state
            .remove(StateFlag::Indexables | StateFlag::TextIndexed | StateFlag::OtherIndexed);

        let num_fields = doc.num_fields();
        if old_field_count < num_fields {
            self.fspecs.reserve(num_fields);
            self.fdatas.reserve(num_fields);
        }
        // Reset every indexer-data slot: a recycled context may hold tag
        // collections from the previous ingest, and teardown inspects
        // them, so each slot must be re-initialized before use.
        self.fdatas.clear();
        self.fdatas.resize_with(num_fields, FieldIndexerData::default);
        self.fspecs.clear();

        let mut dedupe = vec![false; spec.num_fields()];
        let mut has_text_fields = false;
        let mut has_other_fields = false;
        let mut num_text_indexable = 0usize;

        for field in doc.fields.iter_mut() {
            let resolved = spec.get_field(&field.name);
            let Some(fs) = resolved else {
                self.fspecs.push(None);
                continue;
            };
            if field.text.is_none() {
                self.fspecs.push(None);
                continue;
            }

            if dedupe[fs.index as usize] {
                return Err(Error::DupField(fs.name.clone()));
            }
            dedupe[fs.index as usize] = true;
            self.fspecs.push(Some(fs.clone()));

            if fs.is_sortable() {
                self.state.insert(StateFlag::Sortables);
            }

            if field.index_as.is_empty() {
                field.index_as = fs.types;
            } else if !fs.types.contains(field.index_as) {
                return Err(Error::UnsupportedType(fs.name.clone()));
            }

            if fs.is_indexable() {
                if field.index_as.contains(FieldType::Fulltext) {
                    num_text_indexable += 1;
                    has_text_fields = true;
                }
                if field
                    .index_as
                    .intersects(FieldType::Numeric | FieldType::Geo | FieldType::Tag)
                {
                    has_other_fields = true;
                }
                if field.index_as.contains(FieldType::Geo) {
                    self.doc_flags.insert(DocFlag::HasOnDemandDeletable);
                }
            }
        }

        if has_text_fields || has_other_fields {
            self.state.insert(StateFlag::Indexables);
        }
        if !has_text_fields {
            self.state.insert(StateFlag::TextIndexed);
        }
        if !has_other_fields {
            self.state.insert(StateFlag::OtherIndexed);
        }

        if self.state.contains(StateFlag::Sortables) && self.sv.is_none() {
            self.sv = Some(SortingVector::new(spec.sortables.len()));
        }

        if self.sv.is_none() && !has_text_fields && !has_other_fields {
            self.state.insert(StateFlag::Empty);
        }

        if !self.options.contains(AddOption::NoSave)
            && num_text_indexable > 0
            && spec.flags.contains(SpecFlag::StoreByteOffsets)
        {
            self.byte_offsets = Some(ByteOffsets::with_field_capacity(num_text_indexable));
        }

        self.doc = doc;
        Ok(())
    }

    /// Hand the context to the pipeline. From here on, the pipeline
    /// owns the reply: the completion callback fires exactly once and
    /// the context destroys itself afterwards.
    pub fn submit(mut self: Box<Self>, sctx: &mut SearchCtx<H>, options: AddOptions) {
        self.options = options;
        if options.contains(AddOption::NoBlock) {
            self.state.insert(StateFlag::NoBlock);
        }

        if options.contains(AddOption::Partial) {
            match self.handle_partial_update(sctx) {
                Some(ctx) => self = ctx,
                None => return,
            }
        }

        // Field strings are owned by the Document already; nothing to
        // pin before worker handoff.
        if self.is_blockable() {
            self.client = self.pipeline.host.block_client();
        }

        let total_size: usize = self
            .doc
            .fields
            .iter()
            .zip(&self.fspecs)
            .filter(|(field, fs)| {
                fs.is_some()
                    && field
                        .index_as
                        .intersects(FieldType::Fulltext | FieldType::Tag)
            })
            .filter_map(|(field, _)| field.text.as_ref().map(String::len))
            .sum();

        if total_size >= self.pipeline.config.self_exec_threshold
            && self.is_blockable()
            && self.client.is_some()
        {
            let pool = Arc::clone(&self.pipeline);
            pool.pool.run(self);
        } else {
            add_to_indexes(self);
        }
    }

    /// PARTIAL semantics: reindex when indexable fields changed, else a
    /// metadata-only update. Returns the context back when the caller
    /// should fall through to a full ingest.
    fn handle_partial_update(self: Box<Self>, sctx: &mut SearchCtx<H>) -> Option<Box<Self>> {
        if self.state.contains(StateFlag::Indexables) {
            self.replace_merge(sctx)
        } else {
            self.update_no_index(sctx);
            None
        }
    }

    /// A PARTIAL update touching indexed fields degrades to a full
    /// replace: reload the stored field set, overlay it, and reindex
    /// under a fresh doc id.
    fn replace_merge(mut self: Box<Self>, sctx: &mut SearchCtx<H>) -> Option<Box<Self>> {
        let old_field_count = self.doc.num_fields();

        // The submitted fields win; everything else comes from the store.
        let submitted: Vec<DocumentField> = std::mem::take(&mut self.doc.fields);
        let Some(stored) = sctx.host.load_document(&self.doc.key) else {
            self.fail(Error::NoDoc("Could not load existing document".to_string()));
            self.finish();
            return None;
        };
        for (name, text) in stored {
            if submitted.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
                continue;
            }
            self.doc.fields.push(DocumentField {
                name,
                text: Some(text),
                index_as: BitFlags::empty(),
            });
        }
        self.doc.fields.extend(submitted);

        let Some(handle) = sctx.spec.clone() else {
            self.fail(Error::Generic(format!("Unknown index `{}`", sctx.key)));
            self.finish();
            return None;
        };
        let result = {
            let spec = handle.read();
            let doc = std::mem::take(&mut self.doc);
            self.set_document(&spec, doc, old_field_count)
        };
        if let Err(err) = result {
            self.fail(err);
            self.finish();
            return None;
        }
        Some(self)
    }

    /// Metadata-only update: score, payload, and declared sortables.
    /// Consumes the context; the completion callback fires on every
    /// path out of here.
    fn update_no_index(mut self: Box<Self>, sctx: &mut SearchCtx<H>) {
        let Some(handle) = sctx.spec.clone() else {
            self.fail(Error::Generic("Couldn't load old document".to_string()));
            self.finish();
            return;
        };

        let err = {
            let mut spec = handle.write();
            Self::apply_no_index_update(&mut spec, &mut self)
        };
        if let Some(err) = err {
            self.fail(err);
        }
        self.finish();
    }

    fn apply_no_index_update(spec: &mut IndexSpec, ctx: &mut Self) -> Option<Error> {
        let doc_id = spec.docs.id_by_key(&ctx.doc.key);
        if doc_id == 0 {
            return Some(Error::Generic("Couldn't load old document".to_string()));
        }
        if spec.docs.get(doc_id).is_none() {
            return Some(Error::Generic(
                "Couldn't load document metadata".to_string(),
            ));
        }

        let sortables_len = spec.sortables.len();
        if let Some(md) = spec.docs.get_mut(doc_id) {
            md.score = ctx.doc.score;
            if let Some(payload) = ctx.doc.payload.take() {
                md.payload = Some(payload);
            }
        }
        ctx.doc.id = doc_id;

        if !ctx.state.contains(StateFlag::Sortables) {
            return None;
        }

        let mut dedupe = vec![false; spec.num_fields()];
        for field in &ctx.doc.fields {
            let Some(fs) = spec.get_field(&field.name).cloned() else {
                continue;
            };
            if !fs.is_sortable() {
                continue;
            }
            if dedupe[fs.index as usize] {
                return Some(Error::Generic("Requested to index field twice".to_string()));
            }
            dedupe[fs.index as usize] = true;

            let Some(sort_idx) = spec.sorting_index(&field.name) else {
                continue;
            };
            if fs.is_dynamic() {
                return Some(Error::Generic(
                    "Dynamic field cannot use PARTIAL".to_string(),
                ));
            }
            let Some(text) = field.text.as_deref() else {
                continue;
            };

            let Some(md) = spec.docs.get_mut(doc_id) else {
                continue;
            };
            let sv = md
                .sort_vector
                .get_or_insert_with(|| SortingVector::new(sortables_len));

            if fs.types == FieldType::Fulltext || fs.types == FieldType::Tag {
                sv.put_str(sort_idx, text);
            } else if fs.types == FieldType::Numeric {
                let Ok(value) = text.trim().parse::<f64>() else {
                    return Some(Error::Generic(
                        "Could not parse numeric index value".to_string(),
                    ));
                };
                sv.put_num(sort_idx, value);
            } else {
                return Some(Error::Generic("Unsupported sortable type".to_string()));
            }
        }
        None
    }

    /// Fire the completion callback and destroy the context: inline for
    /// synchronous ingests, through the host's unblock path otherwise.
    pub(crate) fn finish(mut self: Box<Self>) {
        match self.client.take() {
            Some(client) if !self.state.contains(StateFlag::NoBlock) => {
                let host = Arc::clone(&self.pipeline.host);
                host.unblock_client(
                    client,
                    Box::new(move || {
                        let mut ctx = self;
                        if let Some(done) = ctx.done.take() {
                            done(&ctx);
                        }
                    }),
                );
            }
            _ => {
                if let Some(done) = self.done.take() {
                    done(&self);
                }
            }
        }
    }
}

/// Run the per-field preprocessors and hand the context to the serial
/// indexer. Runs on a worker thread for large documents, inline
/// otherwise. On failure the pipeline's generic code is recorded only
/// when the preprocessor left no more specific one, the completion
/// callback fires, and the context is destroyed.
pub(crate) fn add_to_indexes<H: Host>(mut ctx: Box<AddDocumentCtx<H>>) {
    let result = preprocess_document(&mut ctx);
    match result {
        Ok(()) => {
            let indexer = Arc::clone(&ctx.indexer);
            indexer.add(ctx);
        }
        Err(err) => {
            log::debug!("[ingest] preprocess failed for `{}`: {}", ctx.doc.key, err);
            ctx.fail(err);
            ctx.fail(Error::Generic("Could not index document".to_string()));
            ctx.finish();
        }
    }
}

fn preprocess_document<H: Host>(ctx: &mut AddDocumentCtx<H>) -> Result<()> {
    let AddDocumentCtx {
        doc,
        fspecs,
        fdatas,
        sv,
        fwd,
        tokenizer,
        byte_offsets,
        offsets_writer,
        total_tokens,
        ..
    } = &mut *ctx;

    let mut pp = PreprocessCtx {
        sv,
        fwd,
        tokenizer,
        offsets_writer,
        byte_offsets,
        total_tokens,
    };

    for (i, field) in doc.fields.iter().enumerate() {
        let Some(fs) = fspecs.get(i).and_then(Option::as_ref) else {
            log::debug!("[ingest] skipping field `{}` not in index", field.name);
            continue;
        };
        if field.index_as.is_empty() {
            continue;
        }
        preprocess::preprocess_field(fs, field, &mut fdatas[i], &mut pp)?;
    }
    Ok(())
}
