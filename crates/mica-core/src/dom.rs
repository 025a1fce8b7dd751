//! Realized native handles.
//!
//! A [`Dom`] is what a descriptor becomes once instantiated: a plain view id,
//! a component scope, or a collection of sibling members. All three share the
//! attach/detach surface the diff walks against, expressed relative to an
//! explicit previous-sibling cursor so document order stays deterministic.

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::{Scope, WeakScope};
use crate::diff::remove_dom;
use crate::runtime::RuntimeHandle;
use crate::vnode::VNode;
use crate::{ReconcileError, ViewId};

#[derive(Clone)]
pub enum Dom {
    View(ViewId),
    Component(Scope),
    Collection(Rc<CollectionDom>),
}

/// Live state of a realized keyed collection: the owner whose refs its members
/// registered under, and the member list in document order. The member list is
/// replaced wholesale after every collection diff.
pub struct CollectionDom {
    pub(crate) owner: WeakScope,
    pub(crate) members: RefCell<Vec<Rc<VNode>>>,
}

impl PartialEq for Dom {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Dom::View(a), Dom::View(b)) => a == b,
            (Dom::Component(a), Dom::Component(b)) => a.same_instance(b),
            (Dom::Collection(a), Dom::Collection(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Dom {
    /// The concrete view anchoring this handle in the native tree: itself for
    /// a view, the rendered root for a component, the last member's anchor for
    /// a collection.
    pub fn meta_view(&self) -> Result<ViewId, ReconcileError> {
        match self {
            Dom::View(id) => Ok(*id),
            Dom::Component(scope) => scope.rendered()?.dom()?.meta_view(),
            Dom::Collection(collection) => {
                let members = collection.members.borrow();
                let last = members.last().ok_or(ReconcileError::Unrealized)?;
                last.dom()?.meta_view()
            }
        }
    }

    /// Attach immediately after `prev`, returning the anchor for the next
    /// sibling.
    pub(crate) fn attach_after(
        &self,
        prev: ViewId,
        rt: &RuntimeHandle,
    ) -> Result<ViewId, ReconcileError> {
        match self {
            Dom::View(id) => {
                rt.with_backend(|backend| backend.attach_after(*id, prev))??;
                Ok(*id)
            }
            Dom::Component(scope) => scope.rendered()?.dom()?.attach_after(prev, rt),
            Dom::Collection(collection) => {
                let members = collection.members.borrow().clone();
                let mut anchor = prev;
                for member in members {
                    anchor = member.dom()?.attach_after(anchor, rt)?;
                }
                Ok(anchor)
            }
        }
    }

    /// Attach as the first child of `parent`, returning the anchor for the
    /// next sibling.
    pub(crate) fn attach_first(
        &self,
        parent: ViewId,
        rt: &RuntimeHandle,
    ) -> Result<ViewId, ReconcileError> {
        match self {
            Dom::View(id) => {
                rt.with_backend(|backend| backend.attach_first(*id, parent))??;
                Ok(*id)
            }
            Dom::Component(scope) => scope.rendered()?.dom()?.attach_first(parent, rt),
            Dom::Collection(collection) => {
                let members = collection.members.borrow().clone();
                let mut iter = members.into_iter();
                let first = iter.next().ok_or(ReconcileError::Unrealized)?;
                let mut anchor = first.dom()?.attach_first(parent, rt)?;
                for member in iter {
                    anchor = member.dom()?.attach_after(anchor, rt)?;
                }
                Ok(anchor)
            }
        }
    }

    /// Tear this handle out of the native tree. Components are destroyed,
    /// collection members are torn down one by one.
    pub(crate) fn detach(&self, rt: &RuntimeHandle) -> Result<(), ReconcileError> {
        match self {
            Dom::View(id) => rt.with_backend(|backend| backend.detach(*id))?,
            Dom::Component(scope) => scope.destroy(),
            Dom::Collection(collection) => {
                let members = std::mem::take(&mut *collection.members.borrow_mut());
                if let Some(owner) = collection.owner.upgrade() {
                    for member in members {
                        remove_dom(&member, &owner)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Dom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dom::View(id) => write!(f, "Dom::View({id})"),
            Dom::Component(_) => write!(f, "Dom::Component(..)"),
            Dom::Collection(collection) => {
                write!(f, "Dom::Collection(len={})", collection.members.borrow().len())
            }
        }
    }
}
