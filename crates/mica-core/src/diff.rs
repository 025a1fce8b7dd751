//! Tree reconciliation.
//!
//! [`realize`] instantiates a descriptor tree depth first; [`diff`] walks an
//! old and a new tree in lock step, mutating live views in place where types
//! match and replacing subtrees where they do not. Keyed collections diff by
//! key identity instead of position. Replacement inserts the new subtree
//! before tearing the old one down so the mount point never goes empty.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::{clear_ref_entry, rerender, set_ref, Load, Scope};
use crate::dom::{CollectionDom, Dom};
use crate::runtime::WARN_IMPLICIT_KEY;
use crate::value::REF_PROP;
use crate::vnode::{VNode, VNodeKind};
use crate::{ReconcileError, ViewId};

/// First-time instantiation entry point: realize `vnode` under `owner` and
/// attach it to an already-live parent view.
pub fn mount(vnode: &Rc<VNode>, parent: ViewId, owner: &Scope) -> Result<Dom, ReconcileError> {
    realize(vnode, owner)?;
    let dom = vnode.dom()?;
    dom.attach_first(parent, &owner.runtime())?;
    Ok(dom)
}

/// Instantiate a descriptor subtree into native views. Attachment to the
/// surrounding tree is the caller's job; children are attached under their
/// parent here, in descriptor order.
pub(crate) fn realize(vnode: &Rc<VNode>, owner: &Scope) -> Result<(), ReconcileError> {
    if vnode.is_realized() {
        return Err(ReconcileError::AlreadyRealized);
    }
    let rt = owner.runtime();
    match vnode.kind() {
        VNodeKind::View(ty) => {
            let id = rt.with_backend(|backend| backend.create_view(*ty))?;
            vnode.set_dom(Dom::View(id))?;
            let mut prev: Option<ViewId> = None;
            for child in vnode.children().into_iter().flatten() {
                realize(&child, owner)?;
                let dom = child.dom()?;
                prev = Some(match prev {
                    Some(prev) => dom.attach_after(prev, &rt)?,
                    None => dom.attach_first(id, &rt)?,
                });
            }
            for (name, value) in vnode.props() {
                if &**name == REF_PROP {
                    continue;
                }
                rt.with_backend(|backend| backend.set_prop(id, name, value))??;
            }
            let ref_name = vnode.ref_name();
            if !ref_name.is_empty() {
                set_ref(owner, &Dom::View(id), ref_name);
            }
        }
        VNodeKind::Text(value) => {
            let id = rt.with_backend(|backend| backend.create_text(value))?;
            vnode.set_dom(Dom::View(id))?;
        }
        VNodeKind::Component(ty) => {
            let scope = Scope::new(
                rt.clone(),
                ty.instantiate(),
                vnode.props().clone(),
                vnode.children(),
                owner.downgrade(),
            );
            vnode.set_dom(Dom::Component(scope.clone()))?;
            if let Load::Ready = scope.with_behavior_mut(|behavior| behavior.on_load(&scope)) {
                scope.mark_loaded();
            }
            set_ref(owner, &Dom::Component(scope.clone()), vnode.ref_name());
            rerender(&scope)?;
        }
        VNodeKind::Collection => {
            let members: Vec<Rc<VNode>> = vnode.children().into_iter().flatten().collect();
            vnode.set_dom(Dom::Collection(Rc::new(CollectionDom {
                owner: owner.weak(),
                members: std::cell::RefCell::new(members.clone()),
            })))?;
            let mut keys = IndexMap::new();
            for (index, member) in members.iter().enumerate() {
                let (key, implicit) = member.collection_key(index);
                if implicit {
                    rt.warn_once(WARN_IMPLICIT_KEY);
                }
                if keys.contains_key(&key) {
                    return Err(ReconcileError::DuplicateKey { key });
                }
                realize(member, owner)?;
                keys.insert(key, member.clone());
            }
            *vnode.keys.borrow_mut() = keys;
        }
    }
    Ok(())
}

/// Reconcile `new` against `old` at the same mount point, returning the view
/// anchoring the result.
pub fn diff(owner: &Scope, old: &Rc<VNode>, new: &Rc<VNode>) -> Result<ViewId, ReconcileError> {
    let rt = owner.runtime();

    if !old.kind().same_type(new.kind()) {
        // Insert the replacement right after the old subtree, then tear the
        // old one down, so the position is never visibly empty.
        let prev = old.dom()?.meta_view()?;
        realize(new, owner)?;
        let anchor = new.dom()?.attach_after(prev, &rt)?;
        remove_dom(old, owner)?;
        return Ok(anchor);
    }

    let dom = old.dom()?;
    new.set_dom(dom.clone())?;

    match new.kind() {
        VNodeKind::Component(_) => {
            let Dom::Component(scope) = &dom else {
                unreachable!("component descriptor realized into a non-component handle");
            };
            scope.replace_outer(new.props().clone(), new.children());
            set_ref(owner, &dom, new.ref_name());
            rerender(scope)?;
        }
        VNodeKind::Text(value) => {
            if old.prop_hash("value") != Some(new.hash()) {
                if let Dom::View(id) = &dom {
                    rt.with_backend(|backend| backend.set_text(*id, value))??;
                }
            }
        }
        VNodeKind::Collection => diff_collection(owner, old, new)?,
        VNodeKind::View(_) => {
            let Dom::View(id) = &dom else {
                unreachable!("view descriptor realized into a non-view handle");
            };
            let id = *id;
            if new.props_hash() != old.props_hash() {
                for (name, value) in new.props() {
                    if &**name == REF_PROP {
                        continue;
                    }
                    if old.prop_hash(name) != new.prop_hash(name) {
                        rt.with_backend(|backend| backend.set_prop(id, name, value))??;
                    }
                }
            }
            set_ref(owner, &dom, new.ref_name());
            diff_children(owner, old, new, id)?;
        }
    }

    dom.meta_view()
}

/// Positional walk over two non-keyed child lists.
fn diff_children(
    owner: &Scope,
    old: &Rc<VNode>,
    new: &Rc<VNode>,
    parent: ViewId,
) -> Result<(), ReconcileError> {
    let rt = owner.runtime();
    let old_children = old.children();
    let new_children = new.children();
    let len = old_children.len().max(new_children.len());
    let mut prev: Option<ViewId> = None;

    for index in 0..len {
        let old_child = old_children.get(index).cloned().flatten();
        let new_child = new_children.get(index).cloned().flatten();
        match (old_child, new_child) {
            (Some(old_child), Some(new_child)) => {
                if old_child.hash() != new_child.hash() {
                    prev = Some(diff(owner, &old_child, &new_child)?);
                } else {
                    // Hash-equal fresh descriptor: keep the realized old one.
                    new.adopt_child(index, old_child.clone());
                    prev = Some(old_child.dom()?.meta_view()?);
                }
            }
            (Some(old_child), None) => remove_dom(&old_child, owner)?,
            (None, Some(new_child)) => {
                realize(&new_child, owner)?;
                let dom = new_child.dom()?;
                prev = Some(match prev {
                    Some(prev) => dom.attach_after(prev, &rt)?,
                    None => dom.attach_first(parent, &rt)?,
                });
            }
            (None, None) => {}
        }
    }
    Ok(())
}

/// Keyed reconciliation: match members by key, move what survived, realize
/// what is new, tear down what disappeared.
pub(crate) fn diff_collection(
    owner: &Scope,
    old: &Rc<VNode>,
    new: &Rc<VNode>,
) -> Result<(), ReconcileError> {
    let rt = owner.runtime();
    let dom = new.dom()?;
    let Dom::Collection(collection) = &dom else {
        unreachable!("collection descriptor realized into a non-collection handle");
    };

    let mut old_keys = old.keys.borrow().clone();
    let mut prev = dom.meta_view()?;
    let members: Vec<Rc<VNode>> = new.children().into_iter().flatten().collect();
    let mut new_keys: IndexMap<String, Rc<VNode>> = IndexMap::new();

    for (index, member) in members.iter().enumerate() {
        let (key, implicit) = member.collection_key(index);
        if implicit {
            rt.warn_once(WARN_IMPLICIT_KEY);
        }
        if new_keys.contains_key(&key) {
            return Err(ReconcileError::DuplicateKey { key });
        }
        match old_keys.shift_remove(&key) {
            Some(old_member) => {
                if old_member.hash() != member.hash() {
                    new_keys.insert(key, member.clone());
                    prev = diff(owner, &old_member, member)?;
                } else {
                    new_keys.insert(key, old_member.clone());
                    new.adopt_child(index, old_member.clone());
                    prev = old_member.dom()?.attach_after(prev, &rt)?;
                }
            }
            None => {
                new_keys.insert(key, member.clone());
                realize(member, owner)?;
                prev = member.dom()?.attach_after(prev, &rt)?;
            }
        }
    }

    for (_, stale) in old_keys {
        remove_dom(&stale, owner)?;
    }

    *new.keys.borrow_mut() = new_keys;
    *collection.members.borrow_mut() = new.children().into_iter().flatten().collect();
    Ok(())
}

/// Tear a realized subtree out of the native tree: destroy nested component
/// instances, roll their ref entries back, then detach the native root.
pub(crate) fn remove_dom(vnode: &Rc<VNode>, owner: &Scope) -> Result<(), ReconcileError> {
    clear_subtree_refs(vnode, owner)?;
    if let Ok(dom) = vnode.dom() {
        dom.detach(&owner.runtime())?;
    }
    Ok(())
}

fn clear_subtree_refs(vnode: &Rc<VNode>, owner: &Scope) -> Result<(), ReconcileError> {
    match vnode.kind() {
        VNodeKind::Component(_) => {
            // Destroy walks the instance's own output and rolls its ref back.
            if let Ok(Dom::Component(scope)) = vnode.dom() {
                scope.destroy()?;
            }
            return Ok(());
        }
        VNodeKind::Collection => {
            // Members register against the same owner, so they need the same
            // walk even when only an ancestor view is being torn down.
            if let Ok(Dom::Collection(collection)) = vnode.dom() {
                let members = collection.members.borrow().clone();
                for member in members {
                    clear_subtree_refs(&member, owner)?;
                }
            }
            return Ok(());
        }
        _ => {}
    }
    for child in vnode.children().into_iter().flatten() {
        clear_subtree_refs(&child, owner)?;
    }
    if let Ok(dom) = vnode.dom() {
        clear_ref_entry(owner, &dom);
    }
    Ok(())
}
