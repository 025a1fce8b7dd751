//! Component instances and their lifecycle.
//!
//! A [`Component`] is the user-supplied behavior: `render` plus optional
//! hooks. A [`Scope`] is the reconciler-owned instance wrapped around it,
//! holding props, state, the last rendered tree, the per-owner ref registry
//! and the lifecycle flags. Scopes are cheap clonable handles over a shared
//! inner, in the same shape the runtime uses for its own handle.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::diff::{diff, realize, remove_dom};
use crate::dom::Dom;
use crate::hash::hash_one;
use crate::runtime::{Runtime, RuntimeHandle};
use crate::value::{Props, Value};
use crate::vnode::{normalize, Child, VNode};
use crate::{next_scope_id, ReconcileError, ScopeId, ViewId};

/// Result of the load hook. `Pending` leaves the instance unloaded until the
/// host calls [`Scope::finish_load`], which schedules a re-render.
pub enum Load {
    Ready,
    Pending,
}

pub trait Component: 'static {
    fn render(&mut self, cx: &Scope) -> Child;

    fn on_load(&mut self, _cx: &Scope) -> Load {
        Load::Ready
    }

    fn on_mounted(&mut self, _cx: &Scope) {}

    fn on_updated(&mut self, _cx: &Scope, _old: &Rc<VNode>, _new: &Rc<VNode>) {}

    fn on_destroy(&mut self, _cx: &Scope) {}
}

/// Stable identity and factory of a component type. Two descriptors describe
/// the same component exactly when the underlying Rust types match.
#[derive(Clone, Copy, Debug)]
pub struct ComponentType {
    name: &'static str,
    type_id: TypeId,
    create: fn() -> Box<dyn Component>,
}

fn create_default<C: Component + Default>() -> Box<dyn Component> {
    Box::new(C::default())
}

impl ComponentType {
    pub fn of<C: Component + Default>(name: &'static str) -> Self {
        Self {
            name,
            type_id: TypeId::of::<C>(),
            create: create_default::<C>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn hash_code(&self) -> u64 {
        hash_one(&self.type_id)
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Component> {
        (self.create)()
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentType {}

pub(crate) struct ScopeInner {
    id: ScopeId,
    runtime: RuntimeHandle,
    behavior: RefCell<Box<dyn Component>>,
    props: RefCell<Props>,
    outer_children: RefCell<Vec<Option<Rc<VNode>>>>,
    state: RefCell<Props>,
    state_hashes: RefCell<HashMap<Rc<str>, u64>>,
    last_output: RefCell<Option<Rc<VNode>>>,
    refs: RefCell<IndexMap<Rc<str>, Dom>>,
    view_ref_names: RefCell<HashMap<ViewId, Rc<str>>>,
    ref_name: RefCell<Rc<str>>,
    owner: Weak<ScopeInner>,
    loaded: Cell<bool>,
    mounted: Cell<bool>,
    destroyed: Cell<bool>,
    enqueued: Cell<bool>,
    after_flush: RefCell<Vec<Box<dyn FnOnce()>>>,
}

#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Rc<ScopeInner>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("mounted", &self.inner.mounted.get())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Option<Scope> {
        self.0.upgrade().map(|inner| Scope { inner })
    }
}

struct RootHost;

impl Component for RootHost {
    fn render(&mut self, _cx: &Scope) -> Child {
        Child::Empty
    }
}

impl Scope {
    pub(crate) fn new(
        runtime: RuntimeHandle,
        behavior: Box<dyn Component>,
        props: Props,
        outer_children: Vec<Option<Rc<VNode>>>,
        owner: Weak<ScopeInner>,
    ) -> Scope {
        Scope {
            inner: Rc::new(ScopeInner {
                id: next_scope_id(),
                runtime,
                behavior: RefCell::new(behavior),
                props: RefCell::new(props),
                outer_children: RefCell::new(outer_children),
                state: RefCell::new(Props::new()),
                state_hashes: RefCell::new(HashMap::new()),
                last_output: RefCell::new(None),
                refs: RefCell::new(IndexMap::new()),
                view_ref_names: RefCell::new(HashMap::new()),
                ref_name: RefCell::new(Rc::from("")),
                owner,
                loaded: Cell::new(false),
                mounted: Cell::new(false),
                destroyed: Cell::new(false),
                enqueued: Cell::new(false),
                after_flush: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Detached owner scope for trees mounted directly by the host. It never
    /// renders; it only anchors refs and scheduling for the subtree below it.
    pub fn root(runtime: &Runtime) -> Scope {
        Scope::new(
            runtime.handle(),
            Box::new(RootHost),
            Props::new(),
            Vec::new(),
            Weak::new(),
        )
    }

    pub(crate) fn downgrade(&self) -> Weak<ScopeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn weak(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.inner))
    }

    /// Pointer identity of the underlying instance.
    pub fn same_instance(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn runtime(&self) -> RuntimeHandle {
        self.inner.runtime.clone()
    }

    pub(crate) fn owner(&self) -> Option<Scope> {
        self.inner.owner.upgrade().map(|inner| Scope { inner })
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub(crate) fn is_enqueued(&self) -> bool {
        self.inner.enqueued.get()
    }

    pub(crate) fn mark_enqueued(&self) -> bool {
        self.inner.enqueued.replace(true)
    }

    pub fn prop(&self, name: &str) -> Option<Value> {
        self.inner.props.borrow().get(name).cloned()
    }

    pub fn with_props<R>(&self, f: impl FnOnce(&Props) -> R) -> R {
        f(&self.inner.props.borrow())
    }

    pub fn state_value(&self, name: &str) -> Option<Value> {
        self.inner.state.borrow().get(name).cloned()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&Props) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    /// Children passed to this component by whoever rendered it.
    pub fn outer_children(&self) -> Vec<Option<Rc<VNode>>> {
        self.inner.outer_children.borrow().clone()
    }

    pub fn ref_dom(&self, name: &str) -> Option<Dom> {
        self.inner.refs.borrow().get(name).cloned()
    }

    pub fn ref_view(&self, name: &str) -> Option<ViewId> {
        match self.ref_dom(name)? {
            Dom::View(id) => Some(id),
            _ => None,
        }
    }

    pub fn has_ref(&self, name: &str) -> bool {
        self.inner.refs.borrow().contains_key(name)
    }

    pub fn with_refs<R>(&self, f: impl FnOnce(&IndexMap<Rc<str>, Dom>) -> R) -> R {
        f(&self.inner.refs.borrow())
    }

    /// Tree this instance rendered last.
    pub(crate) fn rendered(&self) -> Result<Rc<VNode>, ReconcileError> {
        self.inner
            .last_output
            .borrow()
            .clone()
            .ok_or(ReconcileError::Unrealized)
    }

    pub fn meta_view(&self) -> Result<ViewId, ReconcileError> {
        self.rendered()?.dom()?.meta_view()
    }

    /// Merge a partial state update. Only keys whose value hash changed are
    /// applied; if any did, a re-render is scheduled, otherwise the call is a
    /// no-op.
    pub fn set_state(&self, partial: Props) {
        self.set_state_impl(partial, None);
    }

    /// Like [`Scope::set_state`], running `callback` after the re-render this
    /// update causes, or synchronously when nothing changed.
    pub fn set_state_with(&self, partial: Props, callback: impl FnOnce() + 'static) {
        self.set_state_impl(partial, Some(Box::new(callback)));
    }

    fn set_state_impl(&self, partial: Props, callback: Option<Box<dyn FnOnce()>>) {
        if self.is_destroyed() {
            return;
        }
        let mut changed = false;
        {
            let mut state = self.inner.state.borrow_mut();
            let mut hashes = self.inner.state_hashes.borrow_mut();
            for (name, value) in partial {
                let hash = value.hash_code();
                if hashes.get(&name).copied() != Some(hash) {
                    state.insert(name.clone(), value);
                    hashes.insert(name, hash);
                    changed = true;
                }
            }
        }
        if changed {
            self.update_impl(callback);
        } else if let Some(callback) = callback {
            callback();
        }
    }

    /// Unconditionally schedule a re-render.
    pub fn update(&self) {
        self.update_impl(None);
    }

    pub fn update_with(&self, callback: impl FnOnce() + 'static) {
        self.update_impl(Some(Box::new(callback)));
    }

    fn update_impl(&self, callback: Option<Box<dyn FnOnce()>>) {
        if self.is_destroyed() {
            return;
        }
        if let Some(callback) = callback {
            self.inner.after_flush.borrow_mut().push(callback);
        }
        self.inner.runtime.invalidate(self);
    }

    /// Completes a deferred load, scheduling the re-render the instance was
    /// waiting for.
    pub fn finish_load(&self) {
        if self.is_destroyed() || self.inner.loaded.replace(true) {
            return;
        }
        self.inner.runtime.invalidate(self);
    }

    /// Rename this instance in its owner's ref registry.
    pub fn set_ref_name(&self, name: &str) {
        if let Some(owner) = self.owner() {
            set_ref(&owner, &Dom::Component(self.clone()), name);
        }
    }

    pub(crate) fn mark_loaded(&self) {
        self.inner.loaded.set(true);
    }

    pub(crate) fn with_behavior_mut<R>(&self, f: impl FnOnce(&mut dyn Component) -> R) -> R {
        let mut behavior = self.inner.behavior.borrow_mut();
        f(behavior.as_mut())
    }

    pub(crate) fn replace_outer(&self, props: Props, children: Vec<Option<Rc<VNode>>>) {
        *self.inner.props.borrow_mut() = props;
        *self.inner.outer_children.borrow_mut() = children;
    }

    /// Tear down this instance: pre-destroy hook, subtree teardown, ref
    /// rollback. Terminal and idempotent.
    pub fn destroy(&self) -> Result<(), ReconcileError> {
        if self.inner.destroyed.replace(true) {
            return Ok(());
        }
        let output = self.inner.last_output.borrow_mut().take();
        let Some(output) = output else {
            return Ok(());
        };
        self.inner.behavior.borrow_mut().on_destroy(self);
        remove_dom(&output, self)?;
        if let Some(owner) = self.owner() {
            set_ref(&owner, &Dom::Component(self.clone()), "");
        }
        self.inner.refs.borrow_mut().clear();
        Ok(())
    }
}

/// Re-render one instance and reconcile the result against its previous
/// output. First render instantiates unconditionally; a null render replaces
/// the previous subtree with an empty placeholder.
pub(crate) fn rerender(scope: &Scope) -> Result<(), ReconcileError> {
    let inner = &scope.inner;
    inner.enqueued.set(false);
    if inner.destroyed.get() {
        return Ok(());
    }
    let rt = scope.runtime();
    let old = inner.last_output.borrow().clone();
    let new = normalize(inner.behavior.borrow_mut().render(scope));

    let mut replaced: Option<Rc<VNode>> = None;
    match (old, new) {
        (Some(old), Some(new)) => {
            if old.hash() != new.hash() {
                *inner.last_output.borrow_mut() = Some(new.clone());
                diff(scope, &old, &new)?;
                replaced = Some(old);
            }
        }
        (Some(old), None) => {
            let prev = old.dom()?.meta_view()?;
            let placeholder = VNode::empty_view();
            *inner.last_output.borrow_mut() = Some(placeholder.clone());
            realize(&placeholder, scope)?;
            placeholder.dom()?.attach_after(prev, &rt)?;
            remove_dom(&old, scope)?;
            replaced = Some(old);
        }
        (None, new) => {
            let output = new.unwrap_or_else(VNode::empty_view);
            *inner.last_output.borrow_mut() = Some(output.clone());
            realize(&output, scope)?;
        }
    }

    if !inner.mounted.replace(true) {
        inner.behavior.borrow_mut().on_mounted(scope);
    }
    if let (Some(old), Some(new)) = (replaced, inner.last_output.borrow().clone()) {
        inner.behavior.borrow_mut().on_updated(scope, &old, &new);
    }
    let callbacks: Vec<Box<dyn FnOnce()>> = inner.after_flush.borrow_mut().drain(..).collect();
    for callback in callbacks {
        callback();
    }
    Ok(())
}

/// Rename `entity` in `owner`'s ref registry. The old mapping is removed only
/// while it still points at this entity, so a name reassigned to someone else
/// is left alone.
pub(crate) fn set_ref(owner: &Scope, entity: &Dom, name: &str) {
    let current = recorded_ref_name(owner, entity);
    if &*current == name {
        return;
    }
    {
        let mut refs = owner.inner.refs.borrow_mut();
        if !current.is_empty() {
            if refs.get(&current).is_some_and(|existing| existing == entity) {
                refs.shift_remove(&current);
            }
        }
        if !name.is_empty() {
            refs.insert(Rc::from(name), entity.clone());
        }
    }
    record_ref_name(owner, entity, name);
}

/// Remove `entity`'s mapping from `owner`'s registry if it still holds it.
pub(crate) fn clear_ref_entry(owner: &Scope, entity: &Dom) {
    set_ref(owner, entity, "");
}

fn recorded_ref_name(owner: &Scope, entity: &Dom) -> Rc<str> {
    match entity {
        Dom::Component(scope) => scope.inner.ref_name.borrow().clone(),
        Dom::View(id) => owner
            .inner
            .view_ref_names
            .borrow()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Rc::from("")),
        Dom::Collection(_) => Rc::from(""),
    }
}

fn record_ref_name(owner: &Scope, entity: &Dom, name: &str) {
    match entity {
        Dom::Component(scope) => {
            *scope.inner.ref_name.borrow_mut() = Rc::from(name);
        }
        Dom::View(id) => {
            let mut names = owner.inner.view_ref_names.borrow_mut();
            if name.is_empty() {
                names.remove(id);
            } else {
                names.insert(*id, Rc::from(name));
            }
        }
        Dom::Collection(_) => {}
    }
}
