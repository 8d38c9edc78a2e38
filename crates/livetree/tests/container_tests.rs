//! Container shape, lookup and iteration

use std::rc::Rc;

use livetree::*;
use pretty_assertions::assert_eq;

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

#[test]
fn test_add_then_get_agree() {
    let root = Container::shared();
    let node = Variable::shared("v");
    root.add(&path("a.b.c"), node.clone()).unwrap();

    let found = root.get_child_ptr(&path("a.b.c")).unwrap();
    assert!(Rc::ptr_eq(&found, &node));
    let a = root.child("a").unwrap();
    assert!(Rc::ptr_eq(&a.get_child_ptr(&path("b.c")).unwrap(), &node));
    assert!(root.get_child_ptr(&path("a.b")).is_none());
    assert!(root.get_child_ptr(&path("a.x.c")).is_none());
}

#[test]
fn test_lookup_ignores_climb() {
    let root = Container::shared();
    root.insert("k", Constant::shared("v")).unwrap();
    assert_eq!(root.get_child("^^k").unwrap().as_deref(), Some("v"));
}

#[test]
fn test_value_then_section_with_same_name() {
    let mut scope = Scope::default();
    scope.define("server", "primary").unwrap();
    scope.define("server.port", "80").unwrap();
    scope.define("server_name", "${server}:${server.port}").unwrap();
    let root = scope.root();

    assert_eq!(
        root.get_child("server_name").unwrap().as_deref(),
        Some("primary:80")
    );
    let server = root.child("server").unwrap();
    assert_eq!(server.evaluate().unwrap(), Value::from("primary"));
    assert_eq!(server.keys(), vec!["port"]);
}

#[test]
fn test_declare_nested() {
    let root = Container::shared();
    root.declare(&path("a.b")).unwrap();
    root.declare(&path("a.b")).unwrap();
    let a = root.child("a").unwrap();
    assert!(a.contains("b"));
    assert_eq!(a.len(), 1);
    assert!(root.get_child("a.b").unwrap().is_none());

    root.add(&path("a.b"), Constant::shared(1)).unwrap();
    assert_eq!(root.get_value("a.b").unwrap(), Some(Value::Int(1)));
}

#[test]
fn test_shape_errors() {
    let root = Container::shared();
    root.insert("k", Constant::shared("v")).unwrap();
    assert!(matches!(
        root.insert("k", Constant::shared("w")),
        Err(TreeError::DuplicateKey { .. })
    ));
    assert!(matches!(
        root.insert("bad key", Constant::shared("w")),
        Err(TreeError::InvalidName { .. })
    ));
    assert!(matches!(
        root.insert("k.sub", Constant::shared("w")),
        Ok(())
    ));
    assert_eq!(root.get_child("k").unwrap().as_deref(), Some("v"));
    assert_eq!(root.get_child("k.sub").unwrap().as_deref(), Some("w"));
}

#[test]
fn test_iterate_children_sees_slots() {
    let mut scope = Scope::default();
    scope.define("a", "1").unwrap();
    scope.declare("b").unwrap();
    scope.section("c").unwrap().define("d", "2").unwrap();
    let root = scope.root();

    let mut seen = Vec::new();
    root.iterate_children(|name, slot| {
        let shape = match slot {
            Slot::Empty => "empty",
            Slot::Node(_) => "node",
            Slot::Container(_) => "container",
            Slot::Detached => "detached",
        };
        seen.push(format!("{}:{}", name, shape));
    });
    assert_eq!(seen, vec!["a:node", "b:empty", "c:container"]);
}

#[test]
fn test_iteration_may_mutate() {
    let root = Container::shared();
    root.insert("a", Constant::shared(1)).unwrap();
    root.insert("b", Constant::shared(2)).unwrap();
    let target = root.clone();
    root.iterate_children(|name, _| {
        target
            .insert(&format!("{}_copy", name), Constant::shared(0))
            .unwrap();
    });
    assert_eq!(root.keys(), vec!["a", "b", "a_copy", "b_copy"]);
}

#[test]
fn test_walk_reports_dotted_paths() {
    let mut scope = Scope::default();
    scope.define("top", "t").unwrap();
    {
        let mut outer = scope.section("outer").unwrap();
        outer.define("x", "${^top}-x").unwrap();
        let mut inner = outer.section("inner").unwrap();
        inner.define("y", "y").unwrap();
    }
    let root = scope.root();

    let mut seen = Vec::new();
    root.walk(|path, node| {
        seen.push(format!("{}={}", path, node.evaluate_string().unwrap()));
    });
    assert_eq!(seen, vec!["top=t", "outer.x=t-x", "outer.inner.y=y"]);
}

#[test]
fn test_debug_output() {
    let root = Container::shared();
    root.insert("k", Constant::shared("v")).unwrap();
    root.declare(&path("later")).unwrap();
    assert_eq!(
        format!("{:?}", root),
        r#"{"k": Node(constant), "later": Empty}"#
    );
}
