//! Native-side collaborator boundary.
//!
//! The reconciler never touches concrete view objects directly; it drives a
//! [`ViewBackend`] through a minimal mutation surface: create, attach relative
//! to a sibling or as first child, detach, and property assignment.
//! [`MemoryBackend`] is the in-process implementation used by hosts without a
//! windowing system and by every test.

use std::any::Any;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::hash::hash_str;
use crate::value::Value;
use crate::{ReconcileError, ViewId};

/// Stable identity of a concrete native view type. Two descriptors are
/// considered the same kind of node exactly when their `ViewType`s are equal.
#[derive(Clone, Copy, Debug)]
pub struct ViewType {
    name: &'static str,
}

impl ViewType {
    pub const fn named(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn hash_code(&self) -> u64 {
        hash_str(self.name)
    }
}

impl PartialEq for ViewType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ViewType {}

/// Bare container view; also used as the empty placeholder a component leaves
/// behind when it renders nothing.
pub const VIEW: ViewType = ViewType::named("view");

/// Text label view backing text leaf descriptors.
pub const LABEL: ViewType = ViewType::named("label");

pub trait ViewBackend: Any {
    fn create_view(&mut self, ty: ViewType) -> ViewId;
    fn create_text(&mut self, value: &str) -> ViewId;
    fn set_text(&mut self, id: ViewId, value: &str) -> Result<(), ReconcileError>;
    fn set_prop(&mut self, id: ViewId, name: &str, value: &Value) -> Result<(), ReconcileError>;
    /// Detach `id` from its current parent, if any, and insert it immediately
    /// after `prev` under `prev`'s parent.
    fn attach_after(&mut self, id: ViewId, prev: ViewId) -> Result<(), ReconcileError>;
    /// Detach `id` from its current parent, if any, and insert it as the first
    /// child of `parent`.
    fn attach_first(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError>;
    /// Remove `id` and its whole subtree from the backend.
    fn detach(&mut self, id: ViewId) -> Result<(), ReconcileError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub struct MemoryView {
    ty: ViewType,
    text: Option<String>,
    props: IndexMap<Rc<str>, Value>,
    parent: Option<ViewId>,
    children: Vec<ViewId>,
    prop_sets: usize,
}

impl MemoryView {
    fn new(ty: ViewType) -> Self {
        Self {
            ty,
            text: None,
            props: IndexMap::new(),
            parent: None,
            children: Vec::new(),
            prop_sets: 0,
        }
    }

    pub fn ty(&self) -> ViewType {
        self.ty
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn parent(&self) -> Option<ViewId> {
        self.parent
    }

    pub fn children(&self) -> &[ViewId] {
        &self.children
    }

    /// Number of property assignments this view has received, the probe behind
    /// selective-diff assertions.
    pub fn prop_sets(&self) -> usize {
        self.prop_sets
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    nodes: Vec<Option<MemoryView>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn view(&self, id: ViewId) -> Option<&MemoryView> {
        self.nodes.get(id).and_then(|slot| slot.as_ref())
    }

    /// Count of live views.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dump_tree(&self, root: ViewId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, root, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: ViewId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.view(id) {
            Some(view) => {
                match view.text() {
                    Some(text) => {
                        output.push_str(&format!("{}[{}] {} {:?}\n", indent, id, view.ty.name, text))
                    }
                    None => output.push_str(&format!("{}[{}] {}\n", indent, id, view.ty.name)),
                }
                for child in view.children.clone() {
                    self.dump_node(output, child, depth + 1);
                }
            }
            None => output.push_str(&format!("{}[{}] (missing)\n", indent, id)),
        }
    }

    fn slot_mut(&mut self, id: ViewId) -> Result<&mut MemoryView, ReconcileError> {
        self.nodes
            .get_mut(id)
            .and_then(|slot| slot.as_mut())
            .ok_or(ReconcileError::MissingView { id })
    }

    fn push(&mut self, view: MemoryView) -> ViewId {
        let id = self.nodes.len();
        self.nodes.push(Some(view));
        id
    }

    /// Unlink `id` from its parent without freeing it.
    fn unlink(&mut self, id: ViewId) -> Result<(), ReconcileError> {
        let parent = self.slot_mut(id)?.parent.take();
        if let Some(parent) = parent {
            if let Ok(slot) = self.slot_mut(parent) {
                slot.children.retain(|child| *child != id);
            }
        }
        Ok(())
    }

    fn free(&mut self, id: ViewId) {
        let children = match self.nodes.get_mut(id).and_then(|slot| slot.take()) {
            Some(view) => view.children,
            None => return,
        };
        for child in children {
            self.free(child);
        }
    }
}

impl ViewBackend for MemoryBackend {
    fn create_view(&mut self, ty: ViewType) -> ViewId {
        self.push(MemoryView::new(ty))
    }

    fn create_text(&mut self, value: &str) -> ViewId {
        let mut view = MemoryView::new(LABEL);
        view.text = Some(value.to_string());
        self.push(view)
    }

    fn set_text(&mut self, id: ViewId, value: &str) -> Result<(), ReconcileError> {
        self.slot_mut(id)?.text = Some(value.to_string());
        Ok(())
    }

    fn set_prop(&mut self, id: ViewId, name: &str, value: &Value) -> Result<(), ReconcileError> {
        let view = self.slot_mut(id)?;
        view.props.insert(Rc::from(name), value.clone());
        view.prop_sets += 1;
        Ok(())
    }

    fn attach_after(&mut self, id: ViewId, prev: ViewId) -> Result<(), ReconcileError> {
        if id == prev {
            return Ok(());
        }
        self.unlink(id)?;
        let parent = self
            .slot_mut(prev)?
            .parent
            .ok_or(ReconcileError::Detached { id: prev })?;
        let index = {
            let slot = self.slot_mut(parent)?;
            slot.children
                .iter()
                .position(|child| *child == prev)
                .ok_or(ReconcileError::Detached { id: prev })?
        };
        self.slot_mut(parent)?.children.insert(index + 1, id);
        self.slot_mut(id)?.parent = Some(parent);
        Ok(())
    }

    fn attach_first(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError> {
        self.unlink(id)?;
        self.slot_mut(parent)?.children.insert(0, id);
        self.slot_mut(id)?.parent = Some(parent);
        Ok(())
    }

    fn detach(&mut self, id: ViewId) -> Result<(), ReconcileError> {
        self.unlink(id)?;
        self.free(id);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_after_preserves_sibling_order() {
        let mut backend = MemoryBackend::new();
        let root = backend.create_view(VIEW);
        let a = backend.create_view(VIEW);
        let b = backend.create_view(VIEW);
        let c = backend.create_view(VIEW);
        backend.attach_first(a, root).unwrap();
        backend.attach_after(b, a).unwrap();
        backend.attach_after(c, b).unwrap();
        assert_eq!(backend.view(root).unwrap().children(), &[a, b, c]);

        // moving an attached view re-anchors it
        backend.attach_after(a, c).unwrap();
        assert_eq!(backend.view(root).unwrap().children(), &[b, c, a]);
    }

    #[test]
    fn attach_after_self_is_a_no_op() {
        let mut backend = MemoryBackend::new();
        let root = backend.create_view(VIEW);
        let a = backend.create_view(VIEW);
        backend.attach_first(a, root).unwrap();
        backend.attach_after(a, a).unwrap();
        assert_eq!(backend.view(root).unwrap().children(), &[a]);
    }

    #[test]
    fn detach_frees_the_subtree() {
        let mut backend = MemoryBackend::new();
        let root = backend.create_view(VIEW);
        let child = backend.create_view(VIEW);
        let grandchild = backend.create_text("hi");
        backend.attach_first(child, root).unwrap();
        backend.attach_first(grandchild, child).unwrap();

        backend.detach(child).unwrap();
        assert!(backend.view(child).is_none());
        assert!(backend.view(grandchild).is_none());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn prop_assignment_counter_tracks_writes() {
        let mut backend = MemoryBackend::new();
        let id = backend.create_view(VIEW);
        backend.set_prop(id, "width", &Value::Int(10)).unwrap();
        backend.set_prop(id, "width", &Value::Int(11)).unwrap();
        assert_eq!(backend.view(id).unwrap().prop_sets(), 2);
        assert_eq!(backend.view(id).unwrap().prop("width"), Some(&Value::Int(11)));
    }

    #[test]
    fn attach_after_detached_prev_is_an_error() {
        let mut backend = MemoryBackend::new();
        let a = backend.create_view(VIEW);
        let b = backend.create_view(VIEW);
        assert_eq!(
            backend.attach_after(b, a),
            Err(ReconcileError::Detached { id: a })
        );
    }
}
