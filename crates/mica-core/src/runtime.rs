//! Render scheduling.
//!
//! A [`Runtime`] owns the view backend, a deduplicated queue of invalidated
//! component scopes and a draining flag. Invalidation from an idle queue asks
//! the host (through [`FlushScheduler`]) for exactly one deferred flush;
//! further invalidations coalesce into it. The flush drains the queue live,
//! so scopes invalidated mid-pass are serviced in the same pass, bounded by
//! [`RuntimeConfig::max_drain_passes`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use hashbrown::HashSet;

use crate::component::{rerender, Scope};
use crate::view::ViewBackend;
use crate::ReconcileError;

/// Host hook asked to schedule one deferred flush on its event loop.
pub trait FlushScheduler: Send + Sync {
    fn schedule_flush(&self);
}

#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Re-renders allowed within one flush before the rest of the queue is
    /// deferred to a freshly scheduled flush. Guards against components that
    /// keep invalidating each other in the same pass.
    pub max_drain_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_drain_passes: 64,
        }
    }
}

pub(crate) const WARN_IMPLICIT_KEY: &str = "implicit-key";
pub(crate) const WARN_DRAIN_CAP: &str = "drain-cap";

fn warning_text(id: &str) -> &'static str {
    match id {
        WARN_IMPLICIT_KEY => "collection child has no explicit key, using its position instead",
        WARN_DRAIN_CAP => "flush pass cap reached, remaining invalidations deferred",
        _ => "unknown warning",
    }
}

struct RuntimeInner {
    scheduler: Arc<dyn FlushScheduler>,
    backend: RefCell<Box<dyn ViewBackend>>,
    queue: RefCell<VecDeque<Scope>>,
    draining: Cell<bool>,
    warned: RefCell<HashSet<&'static str>>,
    config: RuntimeConfig,
}

impl RuntimeInner {
    fn invalidate(&self, scope: &Scope) {
        if scope.is_destroyed() || scope.mark_enqueued() {
            return;
        }
        self.queue.borrow_mut().push_back(scope.clone());
        if !self.draining.replace(true) {
            self.scheduler.schedule_flush();
        }
    }

    fn warn_once(&self, id: &'static str) {
        if self.warned.borrow_mut().insert(id) {
            log::warn!("{}", warning_text(id));
        }
    }
}

/// Clears the draining flag when a flush pass unwinds, normally or not.
struct DrainGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn FlushScheduler>, backend: Box<dyn ViewBackend>) -> Self {
        Self::with_config(scheduler, backend, RuntimeConfig::default())
    }

    pub fn with_config(
        scheduler: Arc<dyn FlushScheduler>,
        backend: Box<dyn ViewBackend>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                scheduler,
                backend: RefCell::new(backend),
                queue: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                warned: RefCell::new(HashSet::new()),
                config,
            }),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.queue.borrow().is_empty()
    }

    pub fn with_backend<R>(&self, f: impl FnOnce(&mut dyn ViewBackend) -> R) -> R {
        f(&mut **self.inner.backend.borrow_mut())
    }

    /// Drain the pending queue: re-render every invalidated scope, including
    /// those invalidated while draining. Failures are isolated per scope and
    /// the pass continues best effort; the first error is reported once the
    /// pass completes.
    pub fn flush(&self) -> Result<(), ReconcileError> {
        let inner = &self.inner;
        inner.draining.set(true);
        let guard = DrainGuard {
            flag: &inner.draining,
        };
        let mut passes = 0usize;
        let mut first_err: Option<ReconcileError> = None;

        loop {
            let next = inner.queue.borrow_mut().pop_front();
            let Some(scope) = next else { break };
            if !scope.is_enqueued() {
                // Already serviced by a synchronous re-render.
                continue;
            }
            if passes >= inner.config.max_drain_passes {
                inner.queue.borrow_mut().push_front(scope);
                inner.warn_once(WARN_DRAIN_CAP);
                break;
            }
            passes += 1;
            if let Err(err) = rerender(&scope) {
                log::error!("re-render failed during flush: {err}");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }

        drop(guard);
        if !inner.queue.borrow().is_empty() {
            inner.draining.set(true);
            inner.scheduler.schedule_flush();
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub(crate) fn invalidate(&self, scope: &Scope) {
        if let Some(inner) = self.0.upgrade() {
            inner.invalidate(scope);
        }
    }

    pub(crate) fn with_backend<R>(
        &self,
        f: impl FnOnce(&mut dyn ViewBackend) -> R,
    ) -> Result<R, ReconcileError> {
        let inner = self.0.upgrade().ok_or(ReconcileError::RuntimeGone)?;
        let mut backend = inner.backend.borrow_mut();
        Ok(f(&mut **backend))
    }

    pub(crate) fn warn_once(&self, id: &'static str) {
        if let Some(inner) = self.0.upgrade() {
            inner.warn_once(id);
        }
    }
}

/// No-op scheduler for hosts that poll [`Runtime::flush`] themselves.
#[derive(Default)]
pub struct ManualScheduler;

impl FlushScheduler for ManualScheduler {
    fn schedule_flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::MemoryBackend;

    #[test]
    fn warnings_are_deduplicated_per_runtime() {
        let runtime = Runtime::new(
            Arc::new(ManualScheduler),
            Box::new(MemoryBackend::new()),
        );
        runtime.inner.warn_once(WARN_IMPLICIT_KEY);
        runtime.inner.warn_once(WARN_IMPLICIT_KEY);
        runtime.inner.warn_once(WARN_DRAIN_CAP);
        assert_eq!(runtime.inner.warned.borrow().len(), 2);
    }

    #[test]
    fn flush_on_an_idle_runtime_is_a_no_op() {
        let runtime = Runtime::new(
            Arc::new(ManualScheduler),
            Box::new(MemoryBackend::new()),
        );
        assert!(runtime.flush().is_ok());
        assert!(!runtime.has_pending());
        assert!(!runtime.inner.draining.get());
    }
}
