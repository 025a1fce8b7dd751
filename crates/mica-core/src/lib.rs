#![doc = r"Retained-tree reconciliation runtime.

A component renders an immutable descriptor tree ([`VNode`]); `mica` realizes
that tree into live native views through a [`ViewBackend`] and, on every state
change, diffs the fresh tree against the previous one to compute the minimal
set of native mutations. Structural hashes make the common no-change case an
O(1) skip."]

pub mod component;
pub mod diff;
pub mod dom;
pub mod hash;
pub mod runtime;
pub mod value;
pub mod view;
pub mod vnode;

pub use component::{Component, ComponentType, Load, Scope};
pub use diff::{diff, mount};
pub use dom::Dom;
pub use runtime::{FlushScheduler, ManualScheduler, Runtime, RuntimeConfig, RuntimeHandle};
pub use value::{Props, Value};
pub use view::{MemoryBackend, MemoryView, ViewBackend, ViewType, LABEL, VIEW};
pub use vnode::{Child, VNode, VNodeKind};

use std::sync::atomic::{AtomicUsize, Ordering};

/// Identity of a live native view inside a [`ViewBackend`].
pub type ViewId = usize;

pub(crate) type ScopeId = usize;

static NEXT_SCOPE_ID: AtomicUsize = AtomicUsize::new(1);

pub(crate) fn next_scope_id() -> ScopeId {
    NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Two children of one keyed collection resolved to the same key.
    DuplicateKey { key: String },
    /// A descriptor was realized a second time.
    AlreadyRealized,
    /// A descriptor's native handle was read before it was realized.
    Unrealized,
    /// The backend has no live view with this id.
    MissingView { id: ViewId },
    /// The view exists but is not attached to any parent.
    Detached { id: ViewId },
    /// The runtime behind a handle has been dropped.
    RuntimeGone,
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::DuplicateKey { key } => {
                write!(f, "duplicate key {key:?} in keyed collection")
            }
            ReconcileError::AlreadyRealized => write!(f, "descriptor already realized"),
            ReconcileError::Unrealized => write!(f, "descriptor not yet realized"),
            ReconcileError::MissingView { id } => write!(f, "view {id} missing"),
            ReconcileError::Detached { id } => write!(f, "view {id} has no parent"),
            ReconcileError::RuntimeGone => write!(f, "runtime has been dropped"),
        }
    }
}

impl std::error::Error for ReconcileError {}
