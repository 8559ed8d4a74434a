//! The capability contract a backend tree implements so expressions can walk it.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::config::Configuration;

/// A borrowed, type-erased node of some backend tree.
#[derive(Clone, Copy)]
pub struct NodeRef<'a>(&'a (dyn Any + 'static));

impl<'a> NodeRef<'a> {
    pub fn new<T: Any>(node: &'a T) -> Self {
        NodeRef(node)
    }

    pub fn from_dyn(node: &'a (dyn Any + 'static)) -> Self {
        NodeRef(node)
    }

    pub fn downcast<T: Any>(&self) -> Option<&'a T> {
        self.0.downcast_ref::<T>()
    }

    /// Address of the node, stable for the lifetime of the borrow.
    pub fn addr(&self) -> usize {
        self.0 as *const dyn Any as *const () as usize
    }

    /// Identity of the node. A field at offset 0 shares its parent's
    /// address, so the concrete type takes part too.
    pub fn id(&self) -> (TypeId, usize) {
        (Any::type_id(self.0), self.addr())
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for NodeRef<'_> {}

impl Hash for NodeRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:#x})", self.addr())
    }
}

/// One entry of a result list: either a node of the backend tree or a value
/// computed by the evaluator. `Null` doubles as the NULL sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum Item<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Node(NodeRef<'a>),
}

impl<'a> Item<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, Item::Null)
    }

    pub fn as_node(&self) -> Option<NodeRef<'a>> {
        match self {
            Item::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Item::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Item<'_> {
    fn from(b: bool) -> Self {
        Item::Bool(b)
    }
}

impl From<i64> for Item<'_> {
    fn from(i: i64) -> Self {
        Item::Int(i)
    }
}

impl From<f64> for Item<'_> {
    fn from(r: f64) -> Self {
        Item::Real(r)
    }
}

impl From<String> for Item<'_> {
    fn from(s: String) -> Self {
        Item::Str(s)
    }
}

impl From<&str> for Item<'_> {
    fn from(s: &str) -> Self {
        Item::Str(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Map,
    List,
    String,
    Number,
    Boolean,
    Null,
    Other(&'static str),
}

impl NodeKind {
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Map | NodeKind::List)
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Map => "map",
            NodeKind::List => "list",
            NodeKind::String => "string",
            NodeKind::Number => "number",
            NodeKind::Boolean => "boolean",
            NodeKind::Null => "null",
            NodeKind::Other(name) => name,
        }
    }
}

/// A child selector handed to [`Adapter::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'k> {
    Name(&'k str),
    /// List position (negative counts from the end); on maps, the key spelled as digits.
    Index(i64),
    Wildcard,
}

/// Read-only view over one backend tree. An adapter is created per
/// evaluation, so it may cache what it learns (such as parent links).
pub trait Adapter<'a> {
    /// Children of `node` selected by `key`, in document order. Misses are empty.
    fn get(&self, node: NodeRef<'a>, key: Key<'_>) -> Vec<NodeRef<'a>>;

    fn parent(&self, node: NodeRef<'a>) -> Option<NodeRef<'a>>;

    /// The key `node` sits under, if its parent is a map.
    fn key(&self, node: NodeRef<'a>) -> Option<String>;

    /// The position of `node`, if its parent is a list.
    fn index(&self, node: NodeRef<'a>) -> Option<usize>;

    fn kind(&self, node: NodeRef<'a>) -> NodeKind;

    /// The scalar held by `node`; `None` for containers.
    fn value(&self, node: NodeRef<'a>) -> Option<Item<'a>>;

    /// Text rendering of a container node. Scalars go through [`Adapter::value`].
    fn string_value(&self, _node: NodeRef<'a>) -> Option<String> {
        None
    }

    fn same(&self, a: NodeRef<'a>, b: NodeRef<'a>) -> bool {
        a == b
    }
}

/// Builds an adapter for roots whose runtime type it recognises.
pub trait AdapterFactory: Send + Sync {
    fn create<'a>(
        &self,
        root: &'a (dyn Any + 'static),
        config: &Configuration,
    ) -> Option<Box<dyn Adapter<'a> + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[repr(C)]
    struct Outer {
        inner: u64,
        other: u64,
    }

    #[test]
    fn first_field_is_not_its_parent() {
        let outer = Outer { inner: 7, other: 8 };
        let parent = NodeRef::new(&outer);
        let child = NodeRef::new(&outer.inner);
        assert_eq!(parent.addr(), child.addr());
        assert_ne!(parent, child);
        assert_ne!(NodeRef::new(&outer.other), child);
        assert_eq!(NodeRef::new(&outer.inner), child);
        let seen: HashSet<_> = [parent, child, NodeRef::new(&outer)].into_iter().collect();
        assert_eq!(seen.len(), 2);
    }
}
