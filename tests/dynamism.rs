//! Connections that follow a changing component structure.
//!
//! Run with: cargo test --test dynamism

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use spark_event::{
    Component, ComponentType, PropInit, PropSpec, Value, iter, reset_runtime, run_until_idle,
};

type Log = Rc<RefCell<Vec<String>>>;

fn setup() -> (ComponentType, Log) {
    reset_runtime();
    let ty = ComponentType::builder("Node")
        .property("val", PropSpec::int(0).settable())
        .property("selected", PropSpec::bool(false).settable())
        .property("parent", PropSpec::component().settable())
        .property("children", PropSpec::tuple(vec![]).settable())
        .build()
        .unwrap();
    (ty, Rc::new(RefCell::new(Vec::new())))
}

fn node(ty: &ComponentType, val: i64) -> Component {
    Component::new(ty, vec![("val", val.into())]).unwrap()
}

fn with_children(ty: &ComponentType, children: &[Component]) -> Component {
    let list = Value::List(children.iter().map(|&c| c.into()).collect());
    Component::new(ty, vec![("children", list.into())]).unwrap()
}

fn set(c: Component, prop: &str, value: impl Into<Value>) {
    c.invoke(&format!("set_{prop}"), &[value.into()]).unwrap();
}

fn set_children(c: Component, children: &[Component]) {
    set(c, "children", Value::List(children.iter().map(|&c| c.into()).collect()));
}

/// Records `<source>:<new value>` for every event.
fn watch(anchor: Component, connection: &str, log: &Log) {
    let log = log.clone();
    anchor
        .reaction(&[connection], move |_, events| {
            for ev in events {
                let value = ev.new_value().cloned().unwrap_or_default();
                log.borrow_mut().push(format!("{}:{value}", ev.source().id()));
            }
            Ok(())
        })
        .unwrap();
}

fn tag(c: Component, value: impl std::fmt::Display) -> String {
    format!("{}:{value}", c.id())
}

// =============================================================================
// Explicit connections
// =============================================================================

#[test]
fn test_follows_replaced_reference() {
    let (ty, log) = setup();
    let n1 = node(&ty, 17);
    let n2 = node(&ty, 18);
    let child = Component::new(&ty, vec![("parent", n1.into())]).unwrap();
    iter().unwrap();

    watch(child, "parent.val", &log);
    set(n1, "val", 20);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(n1, 20)]);

    set(child, "parent", n2);
    iter().unwrap();
    set(n1, "val", 21);
    set(n2, "val", 29);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(n1, 20), tag(n2, 29)]);
}

#[test]
fn test_null_reference_connects_later() {
    let (ty, log) = setup();
    let child = node(&ty, 0);
    let n1 = node(&ty, 1);
    iter().unwrap();

    // Nothing to reach yet, but the marker on `parent` keeps it alive
    watch(child, "parent.val", &log);
    set(child, "parent", n1);
    iter().unwrap();
    set(n1, "val", 2);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(n1, 2)]);
}

#[test]
fn test_fan_out_tracks_list() {
    let (ty, log) = setup();
    let c1 = node(&ty, 1);
    let c2 = node(&ty, 2);
    let c3 = node(&ty, 3);
    let a = with_children(&ty, &[c1, c2, c3]);
    iter().unwrap();

    watch(a, "children*.selected", &log);
    for c in [c1, c2, c3] {
        assert_eq!(c.event_handlers("selected").len(), 1);
    }

    set(c2, "selected", true);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(c2, true)]);

    // Drop c2, add c4
    let c4 = node(&ty, 4);
    set_children(a, &[c1, c3, c4]);
    iter().unwrap();
    assert!(c2.event_handlers("selected").is_empty());
    assert_eq!(c4.event_handlers("selected").len(), 1);

    set(c2, "selected", false);
    set(c4, "selected", true);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(c2, true), tag(c4, true)]);
}

#[test]
fn test_deep_fan_out_tracks_nested_lists() {
    let (ty, log) = setup();
    let leaf = node(&ty, 0);
    let mid = with_children(&ty, &[leaf]);
    let root = with_children(&ty, &[mid]);
    iter().unwrap();

    watch(root, "children**.val", &log);
    set(leaf, "val", 3);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(leaf, 3)]);

    // A grandchild added one level down is picked up too
    let leaf2 = node(&ty, 0);
    set_children(mid, &[leaf, leaf2]);
    iter().unwrap();
    set(leaf2, "val", 4);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(leaf, 3), tag(leaf2, 4)]);
}

#[test]
fn test_deep_fan_out_on_cyclic_structure() {
    let (ty, log) = setup();
    let a = node(&ty, 0);
    let b = with_children(&ty, &[a]);
    set_children(a, &[a, b]);
    iter().unwrap();

    watch(a, "children**.val", &log);
    set(a, "val", 1);
    set(b, "val", 2);
    iter().unwrap();
    // One subscription each, however often the cycle reaches them
    assert_eq!(*log.borrow(), vec![tag(a, 1), tag(b, 2)]);
}

#[test]
fn test_attribute_in_path() {
    reset_runtime();
    let node_ty = ComponentType::builder("Leaf")
        .property("val", PropSpec::int(0).settable())
        .build()
        .unwrap();
    let holder_ty = ComponentType::builder("Holder")
        .attribute("target", spark_event::AttrSpec::default())
        .build()
        .unwrap();
    let leaf = Component::new(&node_ty, vec![]).unwrap();
    let holder = Component::new(&holder_ty, vec![("target", leaf.into())]).unwrap();
    iter().unwrap();

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    watch(holder, "target.val", &log);
    set(leaf, "val", 5);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec![tag(leaf, 5)]);
}

#[test]
fn test_star_on_reference_is_unresolvable() {
    let (ty, _log) = setup();
    let n1 = node(&ty, 0);
    let child = Component::new(&ty, vec![("parent", n1.into())]).unwrap();
    let err = child.reaction(&["parent*.val"], |_, _| Ok(()));
    assert!(matches!(err, Err(spark_event::Error::UnresolvableConnection { .. })));
}

// =============================================================================
// Implicit reactions
// =============================================================================

#[test]
fn test_implicit_drops_unread_dependency() {
    let (ty, _log) = setup();
    let c = node(&ty, 0);
    iter().unwrap();

    let read_val = Rc::new(Cell::new(true));
    let runs = Rc::new(Cell::new(0));
    let (read_flag, run_count) = (read_val.clone(), runs.clone());
    let r = c
        .implicit_reaction(move |this| {
            if read_flag.get() {
                this.get("val")?;
            }
            this.get("selected")?;
            run_count.set(run_count.get() + 1);
            Ok(())
        })
        .unwrap();
    iter().unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(c.event_handlers("val"), vec![r.clone()]);
    assert_eq!(c.event_handlers("selected"), vec![r.clone()]);

    read_val.set(false);
    set(c, "selected", true);
    iter().unwrap();
    assert_eq!(runs.get(), 2);
    assert!(c.event_handlers("val").is_empty());
    assert_eq!(c.event_handlers("selected"), vec![r]);

    set(c, "val", 5);
    iter().unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_implicit_follows_references() {
    let (ty, log) = setup();
    let p1 = node(&ty, 1);
    let p2 = node(&ty, 2);
    let child = Component::new(&ty, vec![("parent", p1.into())]).unwrap();
    iter().unwrap();

    let out = log.clone();
    child
        .implicit_reaction(move |this| {
            if let Some(parent) = this.get("parent")?.as_component() {
                out.borrow_mut().push(parent.get("val")?.to_string());
            }
            Ok(())
        })
        .unwrap();
    iter().unwrap();
    assert_eq!(*log.borrow(), vec!["1"]);

    set(child, "parent", p2);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec!["1", "2"]);

    set(p1, "val", 10);
    iter().unwrap();
    assert_eq!(log.borrow().len(), 2);

    set(p2, "val", 20);
    iter().unwrap();
    assert_eq!(*log.borrow(), vec!["1", "2", "20"]);
}

#[test]
fn test_implicit_runs_once_per_iteration() {
    let (ty, _log) = setup();
    let a = node(&ty, 0);
    let b = node(&ty, 0);
    iter().unwrap();

    let runs = Rc::new(Cell::new(0));
    let run_count = runs.clone();
    a.implicit_reaction(move |this| {
        this.get("val")?;
        b.get("val")?;
        run_count.set(run_count.get() + 1);
        Ok(())
    })
    .unwrap();
    iter().unwrap();

    set(a, "val", 1);
    set(b, "val", 1);
    set(a, "val", 2);
    iter().unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_getter_property_tracks_source() {
    let (ty, _log) = setup();
    let src = node(&ty, 3);
    let dst = Component::new(
        &ty,
        vec![("val", PropInit::getter(move || src.get("val").unwrap_or_default()))],
    )
    .unwrap();
    run_until_idle(10).unwrap();
    assert_eq!(dst.get("val").unwrap(), Value::Int(3));

    set(src, "val", 8);
    run_until_idle(10).unwrap();
    assert_eq!(dst.get("val").unwrap(), Value::Int(8));
}
