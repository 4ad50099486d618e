//! The key-value host the engine embeds into.
//!
//! The core never talks to a concrete store; everything it needs from
//! its surroundings goes through the narrow [`Host`] trait: spec
//! resolution by key name, snapshot-load status, document body storage,
//! and the blocked-client bridge for asynchronous completion. The
//! bundled [`InMemoryHost`] is the default for tests and embedders
//! without a real store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::spec::IndexSpec;

/// Shared handle to a spec. Writers (the serial indexer, the GC) take
/// the write lock; that lock is the single-writer discipline of the
/// original host, so dropping and re-acquiring it is how long scans
/// yield to ingest.
pub type SpecHandle = Arc<RwLock<IndexSpec>>;

/// Opaque token for a client the host has parked while its ingest runs
/// on background threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedClient(pub u64);

pub trait Host: Send + Sync + 'static {
    /// Resolve a spec by key name. `None` once the spec is dropped;
    /// long-running scans call this again after every yield.
    fn open_spec(&self, key: &str) -> Option<SpecHandle>;

    /// True while the host is loading a snapshot; GC passes skip until
    /// this reports false once.
    fn is_loading_snapshot(&self) -> bool {
        false
    }

    /// Stored field set of a document body, for replace-merge reloads
    /// and expression evaluation.
    fn load_document(&self, key: &str) -> Option<Vec<(String, String)>>;

    /// Persist a document body after a successful ingest (skipped under
    /// NOSAVE).
    fn store_document(&self, key: &str, fields: &[(String, String)]);

    /// Park the submitting client. `None` means the host cannot block
    /// here and the ingest must complete synchronously.
    fn block_client(&self) -> Option<BlockedClient>;

    /// Release a parked client; the host must run `done` exactly once
    /// on whatever thread replies to the client.
    fn unblock_client(&self, client: BlockedClient, done: Box<dyn FnOnce() + Send>);
}

/// Process-local host: a spec registry plus a hash-field document store.
#[derive(Default)]
pub struct InMemoryHost {
    specs: RwLock<FxHashMap<String, SpecHandle>>,
    store: RwLock<FxHashMap<String, Vec<(String, String)>>>,
    loading: AtomicBool,
    next_client: AtomicU64,
}

impl InMemoryHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register (or replace) a spec under a key and return its handle.
    pub fn create_spec(&self, key: impl Into<String>, spec: IndexSpec) -> SpecHandle {
        let handle = Arc::new(RwLock::new(spec));
        self.specs.write().insert(key.into(), Arc::clone(&handle));
        handle
    }

    /// Drop a spec. In-flight GC passes observe this at their next
    /// yield and abort.
    pub fn drop_spec(&self, key: &str) -> bool {
        self.specs.write().remove(key).is_some()
    }

    /// Toggle the snapshot-loading guard (tests).
    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Release);
    }
}

impl Host for InMemoryHost {
    fn open_spec(&self, key: &str) -> Option<SpecHandle> {
        self.specs.read().get(key).cloned()
    }

    fn is_loading_snapshot(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    fn load_document(&self, key: &str) -> Option<Vec<(String, String)>> {
        self.store.read().get(key).cloned()
    }

    fn store_document(&self, key: &str, fields: &[(String, String)]) {
        self.store.write().insert(key.to_string(), fields.to_vec());
    }

    fn block_client(&self) -> Option<BlockedClient> {
        Some(BlockedClient(
            self.next_client.fetch_add(1, Ordering::Relaxed),
        ))
    }

    fn unblock_client(&self, _client: BlockedClient, done: Box<dyn FnOnce() + Send>) {
        // no event loop to marshal onto; reply inline
        done();
    }
}

/// Per-operation view of a spec resolved through the host, in the shape
/// long scans need: drop the guard, call [`SearchCtx::refresh`], take
/// the guard again.
pub struct SearchCtx<H: Host> {
    pub host: Arc<H>,
    pub key: String,
    pub spec: Option<SpecHandle>,
}

impl<H: Host> SearchCtx<H> {
    pub fn new(host: Arc<H>, key: impl Into<String>) -> Self {
        let key = key.into();
        let spec = host.open_spec(&key);
        Self { host, key, spec }
    }

    /// Re-resolve the spec through the host. Returns false when the
    /// spec no longer exists.
    pub fn refresh(&mut self) -> bool {
        self.spec = self.host.open_spec(&self.key);
        self.spec.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::IndexSpecBuilder;

    #[test]
    fn test_spec_registry() {
        let host = InMemoryHost::new();
        assert!(host.open_spec("idx").is_none());
        host.create_spec("idx", IndexSpecBuilder::new("idx").build());
        assert!(host.open_spec("idx").is_some());
        assert!(host.drop_spec("idx"));
        assert!(host.open_spec("idx").is_none());
    }

    #[test]
    fn test_document_store_roundtrip() {
        let host = InMemoryHost::new();
        host.store_document("doc:1", &[("title".into(), "hi".into())]);
        let fields = host.load_document("doc:1").unwrap();
        assert_eq!(fields[0].1, "hi");
        assert!(host.load_document("doc:2").is_none());
    }

    #[test]
    fn test_search_ctx_refresh_sees_drop() {
        let host = InMemoryHost::new();
        host.create_spec("idx", IndexSpecBuilder::new("idx").build());
        let mut sctx = SearchCtx::new(Arc::clone(&host), "idx");
        assert!(sctx.spec.is_some());
        host.drop_spec("idx");
        assert!(!sctx.refresh());
    }
}
