//! Immutable tree descriptors.
//!
//! A [`VNode`] describes one tree position: a kind tag, a property bag, an
//! ordered child list and a structural hash fixed at construction. The only
//! state attached after construction is the write-once realized slot holding
//! the native handle the descriptor was instantiated into, plus the key map a
//! collection derives while it is being realized or diffed.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::component::ComponentType;
use crate::dom::Dom;
use crate::hash::{combine, hash_str, HASH_SEED};
use crate::value::{Props, KEY_PROP, REF_PROP};
use crate::view::{ViewType, VIEW};
use crate::ReconcileError;

#[derive(Clone)]
pub enum VNodeKind {
    /// Plain native view.
    View(ViewType),
    /// Stateful component instance.
    Component(ComponentType),
    /// Literal text content.
    Text(Rc<str>),
    /// Keyed list of siblings occupying one mount point.
    Collection,
}

impl VNodeKind {
    /// Type-identity test of the replacement rule: the value carried by
    /// `Text` is content, not identity, so any two text leaves match.
    pub fn same_type(&self, other: &VNodeKind) -> bool {
        match (self, other) {
            (VNodeKind::View(a), VNodeKind::View(b)) => a == b,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => a == b,
            (VNodeKind::Text(_), VNodeKind::Text(_)) => true,
            (VNodeKind::Collection, VNodeKind::Collection) => true,
            _ => false,
        }
    }

    fn hash_code(&self) -> u64 {
        match self {
            VNodeKind::View(ty) => ty.hash_code(),
            VNodeKind::Component(ty) => ty.hash_code(),
            VNodeKind::Text(_) => hash_str("label"),
            VNodeKind::Collection => hash_str("collection"),
        }
    }
}

/// Write-once slot linking a descriptor to the native handle it became.
pub enum Realized {
    Unrealized,
    Realized(Dom),
}

pub struct VNode {
    kind: VNodeKind,
    props: Props,
    prop_hashes: HashMap<Rc<str>, u64>,
    props_hash: u64,
    hash: u64,
    children: RefCell<Vec<Option<Rc<VNode>>>>,
    pub(crate) keys: RefCell<IndexMap<String, Rc<VNode>>>,
    realized: RefCell<Realized>,
}

impl VNode {
    fn with_kind(kind: VNodeKind, props: Props, children: Vec<Option<Rc<VNode>>>) -> Self {
        let mut prop_hashes = HashMap::new();
        let mut props_hash = HASH_SEED;
        for (name, value) in &props {
            let prop_hash = combine(hash_str(name), value.hash_code());
            prop_hashes.insert(name.clone(), prop_hash);
            props_hash = combine(props_hash, prop_hash);
        }
        let mut hash = combine(kind.hash_code(), props_hash);
        for child in children.iter().flatten() {
            hash = combine(hash, child.hash);
        }
        Self {
            kind,
            props,
            prop_hashes,
            props_hash,
            hash,
            children: RefCell::new(children),
            keys: RefCell::new(IndexMap::new()),
            realized: RefCell::new(Realized::Unrealized),
        }
    }

    /// Descriptor for a plain native view.
    pub fn view(ty: ViewType, props: Props, children: Vec<Child>) -> Rc<VNode> {
        let children = children.into_iter().map(normalize).collect();
        Rc::new(Self::with_kind(VNodeKind::View(ty), props, children))
    }

    /// Descriptor for a component instance.
    pub fn component(ty: ComponentType, props: Props, children: Vec<Child>) -> Rc<VNode> {
        let children = children.into_iter().map(normalize).collect();
        Rc::new(Self::with_kind(VNodeKind::Component(ty), props, children))
    }

    /// Text leaf, hashed by its value alone.
    pub fn text(value: &str) -> Rc<VNode> {
        let hash = hash_str(value);
        Rc::new(Self {
            kind: VNodeKind::Text(Rc::from(value)),
            props: Props::new(),
            prop_hashes: HashMap::new(),
            props_hash: hash,
            hash,
            children: RefCell::new(Vec::new()),
            keys: RefCell::new(IndexMap::new()),
            realized: RefCell::new(Realized::Unrealized),
        })
    }

    /// Keyed collection over the given members. An empty list is replaced by a
    /// single placeholder view so the collection always occupies its mount
    /// point.
    pub fn collection(members: Vec<Option<Rc<VNode>>>) -> Rc<VNode> {
        let mut kept: Vec<Rc<VNode>> = members.into_iter().flatten().collect();
        if kept.is_empty() {
            kept.push(VNode::empty_view());
        }
        let mut node = Self::with_kind(VNodeKind::Collection, Props::new(), Vec::new());
        for member in &kept {
            node.hash = combine(node.hash, member.hash);
        }
        node.children = RefCell::new(kept.into_iter().map(Some).collect());
        Rc::new(node)
    }

    /// Placeholder rendered where a component produced no output.
    pub fn empty_view() -> Rc<VNode> {
        VNode::view(VIEW, Props::new(), Vec::new())
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.kind
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn prop(&self, name: &str) -> Option<&crate::value::Value> {
        self.props.get(name)
    }

    /// The ref name requested by this descriptor, empty when absent.
    pub(crate) fn ref_name(&self) -> &str {
        self.prop(REF_PROP).and_then(|v| v.as_str()).unwrap_or("")
    }

    pub(crate) fn props_hash(&self) -> u64 {
        self.props_hash
    }

    /// Hash recorded for one property. A text leaf answers its value hash for
    /// any name, mirroring its single implicit "value" property.
    pub(crate) fn prop_hash(&self, name: &str) -> Option<u64> {
        match &self.kind {
            VNodeKind::Text(_) => Some(self.hash),
            _ => self.prop_hashes.get(name).copied(),
        }
    }

    pub fn children(&self) -> Vec<Option<Rc<VNode>>> {
        self.children.borrow().clone()
    }

    /// Replace the child at `index` with the structurally identical old
    /// descriptor, preserving the realized identity it carries.
    pub(crate) fn adopt_child(&self, index: usize, child: Rc<VNode>) {
        self.children.borrow_mut()[index] = Some(child);
    }

    pub fn is_realized(&self) -> bool {
        matches!(&*self.realized.borrow(), Realized::Realized(_))
    }

    /// Live native handle of this descriptor.
    pub fn dom(&self) -> Result<Dom, ReconcileError> {
        match &*self.realized.borrow() {
            Realized::Realized(dom) => Ok(dom.clone()),
            Realized::Unrealized => Err(ReconcileError::Unrealized),
        }
    }

    pub(crate) fn set_dom(&self, dom: Dom) -> Result<(), ReconcileError> {
        let mut slot = self.realized.borrow_mut();
        match &*slot {
            Realized::Realized(_) => Err(ReconcileError::AlreadyRealized),
            Realized::Unrealized => {
                *slot = Realized::Realized(dom);
                Ok(())
            }
        }
    }

    /// Identity key of a collection member: the explicit `key` property when
    /// present, else the positional index. Returns whether the key was
    /// implicit.
    pub(crate) fn collection_key(&self, index: usize) -> (String, bool) {
        match self.prop(KEY_PROP) {
            Some(value) => (value.to_string(), false),
            None => (index.to_string(), true),
        }
    }
}

/// One child position as produced by `render`, before normalization.
pub enum Child {
    Node(Rc<VNode>),
    Text(String),
    List(Vec<Child>),
    Empty,
}

impl From<Rc<VNode>> for Child {
    fn from(node: Rc<VNode>) -> Self {
        Child::Node(node)
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Child::Text(value.to_string())
    }
}

impl From<String> for Child {
    fn from(value: String) -> Self {
        Child::Text(value)
    }
}

impl From<Vec<Child>> for Child {
    fn from(items: Vec<Child>) -> Self {
        Child::List(items)
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Child::Empty,
        }
    }
}

/// Normalizes one render result position: lists collapse to their single
/// element or become a keyed collection, non-empty strings become text leaves,
/// everything empty vanishes.
pub fn normalize(child: Child) -> Option<Rc<VNode>> {
    match child {
        Child::Node(node) => Some(node),
        Child::Text(value) => {
            if value.is_empty() {
                None
            } else {
                Some(VNode::text(&value))
            }
        }
        Child::List(items) => match items.len() {
            0 => None,
            1 => normalize(items.into_iter().next()?),
            _ => Some(VNode::collection(
                items.into_iter().map(normalize).collect(),
            )),
        },
        Child::Empty => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use crate::value::Value;
    use crate::view::LABEL;

    #[test]
    fn equal_inputs_hash_equal() {
        let a = VNode::view(VIEW, props! { "width" => 10 }, vec![Child::from("hi")]);
        let b = VNode::view(VIEW, props! { "width" => 10 }, vec![Child::from("hi")]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_is_sensitive_to_every_part() {
        let base = VNode::view(VIEW, props! { "width" => 10 }, vec![Child::from("hi")]);
        let other_prop = VNode::view(VIEW, props! { "width" => 11 }, vec![Child::from("hi")]);
        let other_child = VNode::view(VIEW, props! { "width" => 10 }, vec![Child::from("ho")]);
        let other_type = VNode::view(LABEL, props! { "width" => 10 }, vec![Child::from("hi")]);
        assert_ne!(base.hash(), other_prop.hash());
        assert_ne!(base.hash(), other_child.hash());
        assert_ne!(base.hash(), other_type.hash());
    }

    #[test]
    fn text_leaf_hashes_by_value_only() {
        assert_eq!(VNode::text("a").hash(), VNode::text("a").hash());
        assert_ne!(VNode::text("a").hash(), VNode::text("b").hash());
        assert_eq!(VNode::text("a").prop_hash("anything"), Some(VNode::text("a").hash()));
    }

    #[test]
    fn normalize_collapses_singleton_lists() {
        let node = VNode::view(VIEW, Props::new(), vec![]);
        let out = normalize(Child::List(vec![Child::Node(node.clone())])).unwrap();
        assert!(Rc::ptr_eq(&out, &node));
    }

    #[test]
    fn normalize_drops_empties() {
        assert!(normalize(Child::Empty).is_none());
        assert!(normalize(Child::Text(String::new())).is_none());
        assert!(normalize(Child::List(Vec::new())).is_none());
    }

    #[test]
    fn multi_element_lists_become_collections() {
        let out = normalize(Child::List(vec![Child::from("a"), Child::from("b")])).unwrap();
        assert!(matches!(out.kind(), VNodeKind::Collection));
        assert_eq!(out.children().len(), 2);
    }

    #[test]
    fn empty_collection_gets_a_placeholder() {
        let collection = VNode::collection(vec![None, None]);
        let members = collection.children();
        assert_eq!(members.len(), 1);
        let member = members[0].as_ref().unwrap();
        assert!(matches!(member.kind(), VNodeKind::View(ty) if *ty == VIEW));
    }

    #[test]
    fn collection_key_prefers_explicit_key() {
        let keyed = VNode::view(VIEW, props! { "key" => "k1" }, vec![]);
        assert_eq!(keyed.collection_key(3), ("k1".to_string(), false));
        let unkeyed = VNode::view(VIEW, Props::new(), vec![]);
        assert_eq!(unkeyed.collection_key(3), ("3".to_string(), true));
    }

    #[test]
    fn realized_slot_is_write_once() {
        let node = VNode::view(VIEW, Props::new(), vec![]);
        node.set_dom(Dom::View(0)).unwrap();
        assert_eq!(node.set_dom(Dom::View(1)), Err(ReconcileError::AlreadyRealized));
        assert_eq!(node.dom().unwrap(), Dom::View(0));
    }

    #[test]
    fn prop_value_null_still_counts_as_a_key() {
        let keyed = VNode::view(VIEW, props! { "key" => "x" }, vec![]);
        assert_eq!(keyed.prop("key"), Some(&Value::from("x")));
    }
}
