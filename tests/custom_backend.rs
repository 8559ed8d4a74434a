//! Evaluation over a tree type the crate knows nothing about.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use zpath::{
    Adapter, AdapterFactory, Configuration, EvalContext, Item, Key, NodeKind, NodeRef, ZPath,
    ZTemplate,
};

enum Leaf {
    Empty,
    Int(i64),
    Text(&'static str),
}

struct Tree {
    name: &'static str,
    value: Leaf,
    children: Vec<Tree>,
}

fn branch(name: &'static str, children: Vec<Tree>) -> Tree {
    Tree { name, value: Leaf::Empty, children }
}

fn int(name: &'static str, i: i64) -> Tree {
    Tree { name, value: Leaf::Int(i), children: Vec::new() }
}

fn text(name: &'static str, s: &'static str) -> Tree {
    Tree { name, value: Leaf::Text(s), children: Vec::new() }
}

fn org() -> Tree {
    let member = |name, age, role| branch("member", vec![text("name", name), int("age", age), text("role", role)]);
    branch(
        "org",
        vec![member("Ann", 29, "dev"), member("Ben", 41, "ops"), member("Cy", 35, "dev")],
    )
}

/// Children are looked up by name; parents are remembered as children are handed out.
#[derive(Default)]
struct TreeAdapter<'a> {
    parents: RefCell<HashMap<usize, NodeRef<'a>>>,
}

impl<'a> TreeAdapter<'a> {
    fn tree(node: NodeRef<'a>) -> Option<&'a Tree> {
        node.downcast::<Tree>()
    }

    fn adopt(&self, parent: NodeRef<'a>, child: &'a Tree) -> NodeRef<'a> {
        let node = NodeRef::new(child);
        self.parents.borrow_mut().insert(node.addr(), parent);
        node
    }
}

impl<'a> Adapter<'a> for TreeAdapter<'a> {
    fn get(&self, node: NodeRef<'a>, key: Key<'_>) -> Vec<NodeRef<'a>> {
        let Some(tree) = Self::tree(node) else {
            return Vec::new();
        };
        let picked: Vec<&'a Tree> = match key {
            Key::Name(name) => tree.children.iter().filter(|c| c.name == name).collect(),
            Key::Index(i) => {
                let i = if i < 0 { tree.children.len() as i64 + i } else { i };
                usize::try_from(i).ok().and_then(|i| tree.children.get(i)).into_iter().collect()
            }
            Key::Wildcard => tree.children.iter().collect(),
        };
        picked.into_iter().map(|child| self.adopt(node, child)).collect()
    }

    fn parent(&self, node: NodeRef<'a>) -> Option<NodeRef<'a>> {
        self.parents.borrow().get(&node.addr()).copied()
    }

    fn key(&self, node: NodeRef<'a>) -> Option<String> {
        self.parent(node)?;
        Self::tree(node).map(|t| t.name.to_string())
    }

    fn index(&self, _node: NodeRef<'a>) -> Option<usize> {
        None
    }

    fn kind(&self, node: NodeRef<'a>) -> NodeKind {
        match Self::tree(node) {
            Some(t) if !t.children.is_empty() => NodeKind::Map,
            Some(Tree { value: Leaf::Int(_), .. }) => NodeKind::Number,
            Some(Tree { value: Leaf::Text(_), .. }) => NodeKind::String,
            _ => NodeKind::Null,
        }
    }

    fn value(&self, node: NodeRef<'a>) -> Option<Item<'a>> {
        match Self::tree(node)?.value {
            Leaf::Int(i) => Some(Item::Int(i)),
            Leaf::Text(s) => Some(Item::from(s)),
            Leaf::Empty => None,
        }
    }
}

struct TreeFactory;

impl AdapterFactory for TreeFactory {
    fn create<'a>(
        &self,
        root: &'a (dyn Any + 'static),
        _config: &Configuration,
    ) -> Option<Box<dyn Adapter<'a> + 'a>> {
        root.downcast_ref::<Tree>()?;
        Some(Box::new(TreeAdapter::default()))
    }
}

/// Accepts every root and sees a single opaque node.
struct Greedy;

struct GreedyAdapter;

impl<'a> Adapter<'a> for GreedyAdapter {
    fn get(&self, _node: NodeRef<'a>, _key: Key<'_>) -> Vec<NodeRef<'a>> {
        Vec::new()
    }
    fn parent(&self, _node: NodeRef<'a>) -> Option<NodeRef<'a>> {
        None
    }
    fn key(&self, _node: NodeRef<'a>) -> Option<String> {
        None
    }
    fn index(&self, _node: NodeRef<'a>) -> Option<usize> {
        None
    }
    fn kind(&self, _node: NodeRef<'a>) -> NodeKind {
        NodeKind::Other("opaque")
    }
    fn value(&self, _node: NodeRef<'a>) -> Option<Item<'a>> {
        Some(Item::from("opaque"))
    }
}

impl AdapterFactory for Greedy {
    fn create<'a>(
        &self,
        _root: &'a (dyn Any + 'static),
        _config: &Configuration,
    ) -> Option<Box<dyn Adapter<'a> + 'a>> {
        Some(Box::new(GreedyAdapter))
    }
}

fn tree_config() -> Arc<Configuration> {
    Arc::new(Configuration::default().with_factory(TreeFactory))
}

fn eval(expr: &str, root: &Tree) -> Vec<Item<'static>> {
    let path = ZPath::compile_with(expr, tree_config()).unwrap();
    let matches = path.eval(root).unwrap();
    matches
        .unwrap()
        .into_iter()
        .map(|item| match item {
            Item::Node(_) => panic!("{expr} produced a container"),
            Item::Null => Item::Null,
            Item::Bool(b) => Item::Bool(b),
            Item::Int(i) => Item::Int(i),
            Item::Real(r) => Item::Real(r),
            Item::Str(s) => Item::Str(s),
        })
        .collect()
}

fn strs(values: &[&str]) -> Vec<Item<'static>> {
    values.iter().map(|s| Item::from(*s)).collect()
}

#[test]
fn paths_over_a_custom_tree() {
    let root = org();
    assert_eq!(eval("$.member.name", &root), strs(&["Ann", "Ben", "Cy"]));
    assert_eq!(eval("$..age", &root), vec![Item::Int(29), Item::Int(41), Item::Int(35)]);
    assert_eq!(eval("sum($.member.age)", &root), vec![Item::Int(105)]);
    assert_eq!(eval("$.member[?(@.age > 30)].name", &root), strs(&["Ben", "Cy"]));
    assert_eq!(eval("$.member[?(@.role == 'dev')].age.max()", &root), vec![Item::Int(35)]);
}

#[test]
fn node_metadata_comes_from_the_adapter() {
    let root = org();
    assert_eq!(eval("$.member.key()", &root), strs(&["member", "member", "member"]));
    assert_eq!(eval("count($.member.age.parent())", &root), vec![Item::Int(3)]);
    assert_eq!(eval("$.member.name.parent().parent().type()", &root), strs(&["map"]));
    assert_eq!(eval("$.member.age.first().type()", &root), strs(&["number"]));
    assert!(eval("$.key()", &root).is_empty());
}

#[test]
fn explicit_adapter_without_a_factory() {
    let root = org();
    let path = ZPath::compile("$.member[?(@.age > 40)].name").unwrap();
    let ctx = EvalContext::with_adapter(
        Box::new(TreeAdapter::default()),
        NodeRef::new(&root),
        Arc::new(Configuration::default()),
    );
    let matches = path.eval_with(ctx).unwrap();
    assert_eq!(matches.first_string().as_deref(), Some("Ben"));
}

#[test]
fn templates_over_a_custom_tree() {
    let root = org();
    let template = ZTemplate::compile_with(
        "{{# $.member[?(@.role == 'dev')] }}{{ name }}:{{ age }};{{/}}",
        tree_config(),
    )
    .unwrap();
    assert_eq!(template.apply(&root).unwrap(), "Ann:29;Cy:35;");
}

#[test]
fn preferred_factories_are_consulted_first() {
    let doc = json!({"a": 1});
    let preferred = Configuration::default().with_preferred_factory(Greedy);
    let path = ZPath::compile_with("type($)", preferred).unwrap();
    assert_eq!(path.eval(&doc).unwrap().first(), Item::from("opaque"));

    let fallback = Configuration::default().with_factory(Greedy);
    let path = ZPath::compile_with("type($)", fallback).unwrap();
    assert_eq!(path.eval(&doc).unwrap().first(), Item::from("map"));
    assert_eq!(path.eval(&5u32).unwrap().first(), Item::from("opaque"));
}

#[repr(C)]
struct Outer {
    inner: Inner,
    tag: i64,
}

struct Inner {
    v: i64,
}

/// `Outer` exposes its first field as the only child `inner`, so parent and
/// child live at the same address.
struct NestedAdapter;

impl<'a> Adapter<'a> for NestedAdapter {
    fn get(&self, node: NodeRef<'a>, key: Key<'_>) -> Vec<NodeRef<'a>> {
        match (node.downcast::<Outer>(), key) {
            (Some(outer), Key::Name("inner") | Key::Wildcard) => vec![NodeRef::new(&outer.inner)],
            _ => Vec::new(),
        }
    }
    fn parent(&self, _node: NodeRef<'a>) -> Option<NodeRef<'a>> {
        None
    }
    fn key(&self, _node: NodeRef<'a>) -> Option<String> {
        None
    }
    fn index(&self, _node: NodeRef<'a>) -> Option<usize> {
        None
    }
    fn kind(&self, node: NodeRef<'a>) -> NodeKind {
        if node.downcast::<Outer>().is_some() {
            NodeKind::Map
        } else {
            NodeKind::Number
        }
    }
    fn value(&self, node: NodeRef<'a>) -> Option<Item<'a>> {
        node.downcast::<Inner>().map(|inner| Item::Int(inner.v))
    }
}

fn nested_eval<'a>(expr: &str, root: &'a Outer) -> Vec<Item<'a>> {
    let path = ZPath::compile(expr).unwrap();
    let ctx = EvalContext::with_adapter(
        Box::new(NestedAdapter),
        NodeRef::new(root),
        Arc::new(Configuration::default()),
    );
    path.eval_with(ctx).unwrap().unwrap()
}

#[test]
fn a_first_field_is_distinct_from_its_parent() {
    let root = Outer { inner: Inner { v: 7 }, tag: 1 };
    assert_eq!(root.tag, 1);
    assert_eq!(nested_eval("$..*", &root), vec![Item::Int(7)]);
    assert_eq!(nested_eval("$.inner", &root), vec![Item::Int(7)]);

    let both = nested_eval("$, $.inner", &root);
    assert_eq!(both.len(), 2);
    assert!(matches!(both[0], Item::Node(_)));
    assert_eq!(both[1], Item::Int(7));
}
