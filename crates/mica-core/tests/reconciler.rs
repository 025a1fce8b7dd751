//! End-to-end reconciliation behavior against the in-memory backend.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mica_core::{
    diff, props, Child, Component, ComponentType, Dom, Load, Props, ReconcileError, RuntimeConfig,
    Scope, VNode, Value, ViewId, VIEW,
};
use mica_testing::TestHost;

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

fn take_events() -> Vec<String> {
    EVENTS.with(|events| events.borrow_mut().drain(..).collect())
}

fn row(key: &str, text: &str) -> Child {
    Child::from(VNode::view(VIEW, props! { "key" => key }, vec![
        Child::from(text),
    ]))
}

fn mounted_view(host: &TestHost, vnode: &Rc<VNode>) -> ViewId {
    match host.mount(vnode) {
        Ok(Dom::View(id)) => id,
        Ok(_) => panic!("expected a view handle"),
        Err(err) => panic!("mount failed: {err}"),
    }
}

fn mounted_scope(host: &TestHost, vnode: &Rc<VNode>) -> Scope {
    match host.mount(vnode) {
        Ok(Dom::Component(scope)) => scope,
        Ok(_) => panic!("expected a component handle"),
        Err(err) => panic!("mount failed: {err}"),
    }
}

#[test]
fn mount_builds_the_native_tree_in_order() {
    let host = TestHost::new();
    let tree = VNode::view(VIEW, props! { "width" => 100 }, vec![
        Child::from("first"),
        Child::from("second"),
    ]);
    let container = mounted_view(&host, &tree);

    assert_eq!(host.parent_of(container), Some(host.root_view()));
    assert_eq!(host.texts_under(container), ["first", "second"]);
    assert_eq!(host.prop_of(container, "width"), Some(Value::Int(100)));
}

#[test]
fn equal_hash_child_is_adopted_without_mutation() {
    let host = TestHost::new();
    let child = |label: &str| VNode::view(VIEW, props! { "pad" => 4 }, vec![Child::from(label)]);
    let old = VNode::view(VIEW, Props::new(), vec![Child::from(child("same"))]);
    let new = VNode::view(VIEW, Props::new(), vec![Child::from(child("same"))]);

    let container = mounted_view(&host, &old);
    let child_id = host.children_of(container)[0];
    let sets_before = host.prop_sets_of(child_id);

    diff(host.root(), &old, &new).unwrap();

    assert_eq!(host.children_of(container), [child_id]);
    assert_eq!(host.prop_sets_of(child_id), sets_before);
    // The untouched position now carries the previously realized descriptor.
    let adopted = new.children()[0].clone().unwrap();
    let original = old.children()[0].clone().unwrap();
    assert!(Rc::ptr_eq(&adopted, &original));
}

#[test]
fn changing_one_prop_applies_exactly_one_assignment() {
    let host = TestHost::new();
    let build = |height: i64| {
        VNode::view(
            VIEW,
            props! { "width" => 10, "height" => height, "color" => "red" },
            Vec::new(),
        )
    };
    let old = build(20);
    let new = build(21);

    let id = mounted_view(&host, &old);
    let sets_before = host.prop_sets_of(id);

    diff(host.root(), &old, &new).unwrap();

    assert_eq!(host.prop_sets_of(id), sets_before + 1);
    assert_eq!(host.prop_of(id, "height"), Some(Value::Int(21)));
    assert_eq!(host.prop_of(id, "width"), Some(Value::Int(10)));
}

#[test]
fn text_change_updates_the_label_in_place() {
    let host = TestHost::new();
    let old = VNode::view(VIEW, Props::new(), vec![Child::from("before")]);
    let new = VNode::view(VIEW, Props::new(), vec![Child::from("after")]);

    let container = mounted_view(&host, &old);
    let label = host.children_of(container)[0];

    diff(host.root(), &old, &new).unwrap();

    assert_eq!(host.children_of(container), [label]);
    assert_eq!(host.text_of(label), Some("after".to_owned()));
}

#[test]
fn type_mismatch_replaces_the_subtree_at_the_same_position() {
    let host = TestHost::new();
    let old = VNode::view(VIEW, Props::new(), vec![
        Child::from(VNode::view(VIEW, Props::new(), Vec::new())),
        Child::from("tail"),
    ]);
    let new = VNode::view(VIEW, Props::new(), vec![
        Child::from("head"),
        Child::from("tail"),
    ]);

    let container = mounted_view(&host, &old);
    let replaced = host.children_of(container)[0];

    diff(host.root(), &old, &new).unwrap();

    assert!(!host.view_exists(replaced));
    assert_eq!(host.texts_under(container), ["head", "tail"]);
}

#[test]
fn unkeyed_tail_removal_leaves_the_head_untouched() {
    let host = TestHost::new();
    let old = VNode::view(VIEW, Props::new(), vec![
        Child::from("x"),
        Child::from("y"),
    ]);
    let new = VNode::view(VIEW, Props::new(), vec![Child::from("x")]);

    let container = mounted_view(&host, &old);
    let head = host.children_of(container)[0];
    let tail = host.children_of(container)[1];

    diff(host.root(), &old, &new).unwrap();

    assert_eq!(host.children_of(container), [head]);
    assert!(!host.view_exists(tail));
}

#[test]
fn keyed_reorder_moves_live_views_without_reinstantiation() {
    let host = TestHost::new();
    let old = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        row("1", "A"),
        row("2", "B"),
        row("3", "C"),
    ])]);
    let new = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        row("3", "C"),
        row("1", "A"),
        row("2", "B"),
    ])]);

    let container = mounted_view(&host, &old);
    let before = host.children_of(container);
    let views_before = host.backend_len();

    diff(host.root(), &old, &new).unwrap();

    let after = host.children_of(container);
    assert_eq!(after, [before[2], before[0], before[1]]);
    assert_eq!(host.texts_under(container), ["C", "A", "B"]);
    assert_eq!(host.backend_len(), views_before);
}

#[test]
fn keyed_insert_creates_only_the_new_member() {
    let host = TestHost::new();
    let old = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        row("1", "A"),
        row("3", "C"),
    ])]);
    let new = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        row("1", "A"),
        row("2", "B"),
        row("3", "C"),
    ])]);

    let container = mounted_view(&host, &old);
    let before = host.children_of(container);

    diff(host.root(), &old, &new).unwrap();

    let after = host.children_of(container);
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[1]);
    assert_eq!(host.texts_under(container), ["A", "B", "C"]);
}

#[test]
fn keyed_removal_tears_down_only_the_missing_member() {
    let host = TestHost::new();
    let old = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        row("1", "A"),
        row("2", "B"),
        row("3", "C"),
    ])]);
    let new = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        row("1", "A"),
        row("3", "C"),
    ])]);

    let container = mounted_view(&host, &old);
    let before = host.children_of(container);

    diff(host.root(), &old, &new).unwrap();

    assert_eq!(host.children_of(container), [before[0], before[2]]);
    assert!(!host.view_exists(before[1]));
}

#[test]
fn duplicate_keys_are_a_structural_error() {
    let host = TestHost::new();
    let tree = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        row("x", "A"),
        row("x", "B"),
    ])]);

    let err = host.mount(&tree).unwrap_err();
    assert_eq!(err, ReconcileError::DuplicateKey { key: "x".into() });
}

#[test]
fn empty_collection_occupies_its_position_with_a_placeholder() {
    let host = TestHost::new();
    let empty = VNode::collection(Vec::new());

    host.mount(&empty).unwrap();

    let children = host.children_of(host.root_view());
    assert_eq!(children.len(), 1);
    assert_eq!(host.text_of(children[0]), None);
}

#[derive(Default)]
struct Counter;

impl Component for Counter {
    fn render(&mut self, cx: &Scope) -> Child {
        let name = cx
            .prop("name")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "counter".to_owned());
        record(format!("render:{name}"));
        let count = cx
            .state_value("count")
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        Child::from(VNode::view(VIEW, Props::new(), vec![
            Child::from(format!("count={count}")),
        ]))
    }
}

fn counter(name: &str) -> Rc<VNode> {
    VNode::component(ComponentType::of::<Counter>("Counter"), props! { "name" => name }, Vec::new())
}

#[test]
fn set_state_rerenders_and_patches_the_output() {
    let host = TestHost::new();
    let scope = mounted_scope(&host, &counter("a"));
    take_events();

    let container = scope.meta_view().unwrap();
    let label = host.children_of(container)[0];
    assert_eq!(host.text_of(label), Some("count=0".to_owned()));

    scope.set_state(props! { "count" => 5 });
    host.flush().unwrap();

    assert_eq!(take_events(), ["render:a"]);
    assert_eq!(scope.meta_view().unwrap(), container);
    assert_eq!(host.children_of(container), [label]);
    assert_eq!(host.text_of(label), Some("count=5".to_owned()));
}

#[test]
fn three_invalidations_coalesce_into_one_flush() {
    let host = TestHost::new();
    let a = mounted_scope(&host, &counter("a"));
    let b = mounted_scope(&host, &counter("b"));
    let c = mounted_scope(&host, &counter("c"));
    take_events();
    let requests_before = host.flush_requests();

    a.set_state(props! { "count" => 1 });
    b.set_state(props! { "count" => 1 });
    c.set_state(props! { "count" => 1 });

    assert_eq!(host.flush_requests(), requests_before + 1);
    assert!(take_events().is_empty());

    host.flush().unwrap();

    let mut renders = take_events();
    renders.sort();
    assert_eq!(renders, ["render:a", "render:b", "render:c"]);
    assert!(!host.runtime().has_pending());
}

#[test]
fn set_state_with_an_unchanged_value_is_a_no_op() {
    let host = TestHost::new();
    let scope = mounted_scope(&host, &counter("a"));
    scope.set_state(props! { "count" => 1 });
    host.flush().unwrap();
    take_events();

    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    scope.set_state_with(props! { "count" => 1 }, move || flag.set(true));

    assert!(ran.get(), "callback runs synchronously when nothing changed");
    assert!(!host.runtime().has_pending());
    assert!(take_events().is_empty());
}

#[test]
fn update_callback_runs_after_the_rerender() {
    let host = TestHost::new();
    let scope = mounted_scope(&host, &counter("a"));
    take_events();

    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    scope.update_with(move || flag.set(true));
    assert!(!ran.get());

    host.flush().unwrap();
    assert!(ran.get());
    assert_eq!(take_events(), ["render:a"]);
}

#[derive(Default)]
struct Probe;

impl Component for Probe {
    fn render(&mut self, cx: &Scope) -> Child {
        let n = cx.state_value("n").and_then(|v| v.as_int()).unwrap_or(0);
        Child::from(format!("n={n}"))
    }

    fn on_load(&mut self, _cx: &Scope) -> Load {
        record("load");
        Load::Ready
    }

    fn on_mounted(&mut self, _cx: &Scope) {
        record("mounted");
    }

    fn on_updated(&mut self, _cx: &Scope, _old: &Rc<VNode>, _new: &Rc<VNode>) {
        record("updated");
    }

    fn on_destroy(&mut self, _cx: &Scope) {
        record("destroy");
    }
}

#[test]
fn lifecycle_hooks_fire_in_order() {
    let host = TestHost::new();
    let vnode = VNode::component(ComponentType::of::<Probe>("Probe"), Props::new(), Vec::new());
    let scope = mounted_scope(&host, &vnode);

    assert_eq!(take_events(), ["load", "mounted"]);
    assert!(scope.is_loaded());
    assert!(scope.is_mounted());

    // Same output hash, so no diff and no update notification.
    scope.update();
    host.flush().unwrap();
    assert!(take_events().is_empty());

    scope.set_state(props! { "n" => 1 });
    host.flush().unwrap();
    assert_eq!(take_events(), ["updated"]);
    assert_eq!(host.root_texts(), ["n=1"]);

    scope.destroy().unwrap();
    assert_eq!(take_events(), ["destroy"]);
    assert!(scope.is_destroyed());
    assert!(host.children_of(host.root_view()).is_empty());

    // Destroy is terminal and idempotent.
    scope.destroy().unwrap();
    assert!(take_events().is_empty());
}

#[derive(Default)]
struct Deferred;

impl Component for Deferred {
    fn render(&mut self, cx: &Scope) -> Child {
        if cx.is_loaded() {
            Child::from("ready")
        } else {
            Child::from("loading")
        }
    }

    fn on_load(&mut self, _cx: &Scope) -> Load {
        Load::Pending
    }
}

#[test]
fn pending_load_rerenders_once_finished() {
    let host = TestHost::new();
    let vnode = VNode::component(
        ComponentType::of::<Deferred>("Deferred"),
        Props::new(),
        Vec::new(),
    );
    let scope = mounted_scope(&host, &vnode);

    assert!(!scope.is_loaded());
    assert_eq!(host.root_texts(), ["loading"]);

    scope.finish_load();
    host.flush().unwrap();

    assert!(scope.is_loaded());
    assert_eq!(host.root_texts(), ["ready"]);

    // Finishing twice does not queue another render.
    scope.finish_load();
    assert!(!host.runtime().has_pending());
}

#[derive(Default)]
struct Ghost;

impl Component for Ghost {
    fn render(&mut self, cx: &Scope) -> Child {
        match cx.state_value("show").and_then(|v| v.as_bool()) {
            Some(true) => Child::from("visible"),
            _ => Child::Empty,
        }
    }
}

#[test]
fn null_render_leaves_a_placeholder_until_output_appears() {
    let host = TestHost::new();
    let vnode = VNode::component(ComponentType::of::<Ghost>("Ghost"), Props::new(), Vec::new());
    let scope = mounted_scope(&host, &vnode);

    let children = host.children_of(host.root_view());
    assert_eq!(children.len(), 1);
    assert_eq!(host.text_of(children[0]), None);

    scope.set_state(props! { "show" => true });
    host.flush().unwrap();

    assert!(!host.view_exists(children[0]));
    assert_eq!(host.root_texts(), ["visible"]);
}

#[derive(Default)]
struct RefHolder;

impl Component for RefHolder {
    fn render(&mut self, cx: &Scope) -> Child {
        let name = cx
            .state_value("name")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "a".to_owned());
        let mut props = Props::new();
        props.insert(Rc::from("ref"), Value::from(name));
        Child::from(VNode::view(VIEW, props, Vec::new()))
    }
}

#[test]
fn refs_follow_renames_and_clear_on_destroy() {
    let host = TestHost::new();
    let vnode = VNode::component(
        ComponentType::of::<RefHolder>("RefHolder"),
        Props::new(),
        Vec::new(),
    );
    let scope = mounted_scope(&host, &vnode);

    let held = scope.ref_view("a").unwrap_or_else(|| panic!("ref a missing"));

    scope.set_state(props! { "name" => "b" });
    host.flush().unwrap();

    assert!(!scope.has_ref("a"));
    assert_eq!(scope.ref_view("b"), Some(held));

    scope.destroy().unwrap();
    assert!(!scope.has_ref("b"));
}

#[test]
fn component_descriptors_register_refs_with_their_owner() {
    let host = TestHost::new();
    let vnode = VNode::component(
        ComponentType::of::<Counter>("Counter"),
        props! { "name" => "a", "ref" => "child" },
        Vec::new(),
    );
    let scope = mounted_scope(&host, &vnode);
    take_events();

    let root = host.root();
    assert!(root.has_ref("child"));
    match root.ref_dom("child") {
        Some(Dom::Component(held)) => assert!(held.same_instance(&scope)),
        other => panic!("expected a component ref, got {other:?}"),
    }
}

#[derive(Default)]
struct Tracked;

impl Component for Tracked {
    fn render(&mut self, _cx: &Scope) -> Child {
        Child::from("tracked")
    }

    fn on_destroy(&mut self, _cx: &Scope) {
        record("tracked-destroy");
    }
}

#[test]
fn removing_a_view_tears_down_collection_members_inside_it() {
    let host = TestHost::new();
    let member = VNode::component(
        ComponentType::of::<Tracked>("Tracked"),
        props! { "key" => "t", "ref" => "held" },
        Vec::new(),
    );
    let wrapper = VNode::view(VIEW, Props::new(), vec![Child::List(vec![
        Child::from(member),
        row("r", "R"),
    ])]);
    let old = VNode::view(VIEW, Props::new(), vec![Child::from(wrapper)]);
    let new = VNode::view(VIEW, Props::new(), Vec::new());

    let container = mounted_view(&host, &old);
    assert!(host.root().has_ref("held"));
    take_events();

    diff(host.root(), &old, &new).unwrap();

    assert_eq!(take_events(), ["tracked-destroy"]);
    assert!(!host.root().has_ref("held"));
    assert!(host.children_of(container).is_empty());
}

#[derive(Default)]
struct Restless;

impl Component for Restless {
    fn render(&mut self, cx: &Scope) -> Child {
        record("render");
        cx.update();
        Child::from("spin")
    }
}

#[test]
fn flush_pass_cap_defers_a_render_loop() {
    let host = TestHost::with_config(RuntimeConfig {
        max_drain_passes: 3,
    });
    let vnode = VNode::component(
        ComponentType::of::<Restless>("Restless"),
        Props::new(),
        Vec::new(),
    );
    mounted_scope(&host, &vnode);
    take_events();
    let requests_before = host.flush_requests();

    host.flush().unwrap();

    assert_eq!(take_events().len(), 3);
    assert!(host.runtime().has_pending());
    // The remainder was handed to a freshly scheduled flush.
    assert_eq!(host.flush_requests(), requests_before + 1);
}
