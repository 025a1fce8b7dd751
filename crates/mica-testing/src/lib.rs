//! Testing harness for mica.
//!
//! [`TestHost`] wires a [`Runtime`] to an in-memory backend, mounts
//! descriptor trees under a synthetic root view and exposes the backend
//! state for assertions. Flushes are driven explicitly, so tests control
//! exactly when invalidated components re-render.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mica_core::{
    mount, Dom, FlushScheduler, MemoryBackend, ReconcileError, Runtime, RuntimeConfig, Scope,
    VNode, Value, ViewId, VIEW,
};

/// Counts how many deferred flushes the runtime asked for.
#[derive(Default)]
pub struct CountingScheduler {
    requests: AtomicUsize,
}

impl CountingScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl FlushScheduler for CountingScheduler {
    fn schedule_flush(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestHost {
    runtime: Runtime,
    scheduler: Arc<CountingScheduler>,
    root: Scope,
    root_view: ViewId,
}

impl TestHost {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let scheduler = Arc::new(CountingScheduler::default());
        let runtime = Runtime::with_config(
            scheduler.clone(),
            Box::new(MemoryBackend::new()),
            config,
        );
        let root_view = runtime.with_backend(|backend| backend.create_view(VIEW));
        let root = Scope::root(&runtime);
        Self {
            runtime,
            scheduler,
            root,
            root_view,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn root(&self) -> &Scope {
        &self.root
    }

    pub fn root_view(&self) -> ViewId {
        self.root_view
    }

    pub fn flush_requests(&self) -> usize {
        self.scheduler.requests()
    }

    /// Realize `vnode` under the synthetic root view.
    pub fn mount(&self, vnode: &Rc<VNode>) -> Result<Dom, ReconcileError> {
        mount(vnode, self.root_view, &self.root)
    }

    pub fn flush(&self) -> Result<(), ReconcileError> {
        self.runtime.flush()
    }

    /// Flush until the queue stays empty. Panics after `limit` rounds so a
    /// render loop shows up as a test failure instead of a hang.
    pub fn flush_until_idle(&self, limit: usize) -> Result<(), ReconcileError> {
        for _ in 0..limit {
            self.runtime.flush()?;
            if !self.runtime.has_pending() {
                return Ok(());
            }
        }
        panic!("runtime still pending after {limit} flushes");
    }

    fn backend<R>(&self, f: impl FnOnce(&MemoryBackend) -> R) -> R {
        self.runtime.with_backend(|backend| {
            let memory = backend
                .as_any()
                .downcast_ref::<MemoryBackend>()
                .unwrap_or_else(|| panic!("test runtime backend is not a MemoryBackend"));
            f(memory)
        })
    }

    pub fn children_of(&self, id: ViewId) -> Vec<ViewId> {
        self.backend(|memory| match memory.view(id) {
            Some(view) => view.children().to_vec(),
            None => Vec::new(),
        })
    }

    pub fn text_of(&self, id: ViewId) -> Option<String> {
        self.backend(|memory| memory.view(id)?.text().map(str::to_owned))
    }

    pub fn prop_of(&self, id: ViewId, name: &str) -> Option<Value> {
        self.backend(|memory| memory.view(id)?.prop(name).cloned())
    }

    pub fn prop_sets_of(&self, id: ViewId) -> usize {
        self.backend(|memory| memory.view(id).map_or(0, |view| view.prop_sets()))
    }

    pub fn parent_of(&self, id: ViewId) -> Option<ViewId> {
        self.backend(|memory| memory.view(id)?.parent())
    }

    pub fn view_exists(&self, id: ViewId) -> bool {
        self.backend(|memory| memory.view(id).is_some())
    }

    /// Number of live views in the backend. Stable across a diff means no
    /// view was created or torn down.
    pub fn backend_len(&self) -> usize {
        self.backend(MemoryBackend::len)
    }

    /// Texts of the root's direct children, in attachment order. The common
    /// assertion for label rows.
    pub fn root_texts(&self) -> Vec<String> {
        self.texts_under(self.root_view)
    }

    /// Texts of every text view under `id`, in depth-first order.
    pub fn texts_under(&self, id: ViewId) -> Vec<String> {
        self.backend(|memory| {
            let mut out = Vec::new();
            collect_texts(memory, id, &mut out);
            out
        })
    }

    pub fn dump(&self) -> String {
        self.backend(|memory| memory.dump_tree(self.root_view))
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_texts(memory: &MemoryBackend, id: ViewId, out: &mut Vec<String>) {
    let Some(view) = memory.view(id) else { return };
    if let Some(text) = view.text() {
        out.push(text.to_owned());
    }
    for &child in view.children() {
        collect_texts(memory, child, out);
    }
}
