use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use crate::comparison;
use crate::config::{Configuration, Logger};
use crate::errors::EvalError;
use crate::node::{Adapter, Item, Key, NodeKind, NodeRef};

/// State for one evaluation call. Never shared between calls.
///
/// The context index is 0-based: inside `[?(...)]` or a template loop it is
/// the position of the node being evaluated within its candidate list, and
/// `None` everywhere else.
pub struct EvalContext<'a> {
    adapter: Box<dyn Adapter<'a> + 'a>,
    config: Arc<Configuration>,
    root: NodeRef<'a>,
    context: Vec<Item<'a>>,
    context_index: Option<usize>,
    scopes: Vec<HashSet<NodeRef<'a>>>,
}

/// A context list and index saved by [`EvalContext::enter_context`].
pub struct SavedContext<'a> {
    context: Vec<Item<'a>>,
    index: Option<usize>,
}

impl<'a> EvalContext<'a> {
    /// Picks the first registered factory that accepts `root`.
    pub fn new(root: &'a (dyn Any + 'static), config: Arc<Configuration>) -> Result<Self, EvalError> {
        let adapter = config
            .factories()
            .iter()
            .find_map(|factory| factory.create(root, &config))
            .ok_or(EvalError::NoAdapter)?;
        Ok(Self::with_adapter(adapter, NodeRef::from_dyn(root), config))
    }

    pub fn with_adapter(
        adapter: Box<dyn Adapter<'a> + 'a>,
        root: NodeRef<'a>,
        config: Arc<Configuration>,
    ) -> Self {
        Self {
            adapter,
            config,
            root,
            context: vec![Item::Node(root)],
            context_index: None,
            scopes: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeRef<'a> {
        self.root
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn adapter(&self) -> &dyn Adapter<'a> {
        self.adapter.as_ref()
    }

    pub fn logger(&self) -> Option<Arc<dyn Logger>> {
        self.config.logger().cloned()
    }

    pub fn min_double(&self) -> f64 {
        self.config.min_double()
    }

    pub fn get(&self, node: NodeRef<'a>, key: Key<'_>) -> Vec<NodeRef<'a>> {
        self.adapter.get(node, key)
    }

    pub fn parent(&self, node: NodeRef<'a>) -> Option<NodeRef<'a>> {
        self.adapter.parent(node)
    }

    pub fn key(&self, node: NodeRef<'a>) -> Option<String> {
        self.adapter.key(node)
    }

    pub fn index(&self, node: NodeRef<'a>) -> Option<usize> {
        self.adapter.index(node)
    }

    /// Classifies nodes through the adapter and computed values by their variant.
    pub fn kind(&self, item: &Item<'a>) -> NodeKind {
        match item {
            Item::Null => NodeKind::Null,
            Item::Bool(_) => NodeKind::Boolean,
            Item::Int(_) | Item::Real(_) => NodeKind::Number,
            Item::Str(_) => NodeKind::String,
            Item::Node(node) => self.adapter.kind(*node),
        }
    }

    /// Replaces a scalar node by its value. Containers and computed values pass through.
    pub fn scalar(&self, item: &Item<'a>) -> Item<'a> {
        match item {
            Item::Node(node) => self.adapter.value(*node).unwrap_or(Item::Node(*node)),
            other => other.clone(),
        }
    }

    pub fn string_value(&self, item: &Item<'a>) -> Option<String> {
        comparison::string_value(self, item)
    }

    pub fn number_value(&self, item: &Item<'a>) -> Option<f64> {
        comparison::number_value(self, item)
    }

    pub fn boolean_value(&self, item: &Item<'a>) -> bool {
        comparison::boolean_value(self, item)
    }

    pub fn same(&self, a: NodeRef<'a>, b: NodeRef<'a>) -> bool {
        self.adapter.same(a, b)
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// True the first time a node is seen in the innermost uniqueness scope.
    /// Computed values are never treated as duplicates.
    pub fn is_unique(&mut self, item: &Item<'a>) -> bool {
        match (item, self.scopes.last_mut()) {
            (Item::Node(node), Some(seen)) => seen.insert(*node),
            _ => true,
        }
    }

    pub fn context(&self) -> &[Item<'a>] {
        &self.context
    }

    pub fn context_index(&self) -> Option<usize> {
        self.context_index
    }

    pub fn set_context_index(&mut self, index: Option<usize>) {
        self.context_index = index;
    }

    /// Installs a new context list; hand the returned value to
    /// [`EvalContext::leave_context`] to restore the previous one.
    pub fn enter_context(&mut self, context: Vec<Item<'a>>) -> SavedContext<'a> {
        SavedContext {
            context: std::mem::replace(&mut self.context, context),
            index: self.context_index.take(),
        }
    }

    pub fn leave_context(&mut self, saved: SavedContext<'a>) {
        self.context = saved.context;
        self.context_index = saved.index;
    }
}
