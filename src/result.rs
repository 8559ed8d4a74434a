use std::fmt;

use crate::context::EvalContext;
use crate::expression::ZPath;
use crate::node::Item;

/// The outcome of one evaluation: the matched items plus the context they
/// were produced in, so nodes can still be inspected through the adapter.
pub struct Matches<'a> {
    items: Vec<Item<'a>>,
    zpath: ZPath,
    context: EvalContext<'a>,
}

impl<'a> Matches<'a> {
    pub(crate) fn new(items: Vec<Item<'a>>, zpath: ZPath, context: EvalContext<'a>) -> Self {
        Self {
            items,
            zpath,
            context,
        }
    }

    /// The first item, or [`Item::Null`] when nothing matched.
    pub fn first(&self) -> Item<'a> {
        self.items.first().cloned().unwrap_or(Item::Null)
    }

    pub fn all(&self) -> &[Item<'a>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn zpath(&self) -> &ZPath {
        &self.zpath
    }

    pub fn context(&self) -> &EvalContext<'a> {
        &self.context
    }

    /// Items with scalar nodes replaced by their values. Containers stay nodes.
    pub fn unwrap(&self) -> Vec<Item<'a>> {
        self.items
            .iter()
            .map(|item| self.context.scalar(item))
            .collect()
    }

    /// String value of the first item.
    pub fn first_string(&self) -> Option<String> {
        self.items
            .first()
            .and_then(|item| self.context.string_value(item))
    }

    pub fn into_items(self) -> Vec<Item<'a>> {
        self.items
    }
}

impl fmt::Debug for Matches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matches")
            .field("zpath", &self.zpath)
            .field("items", &self.items)
            .finish()
    }
}

impl<'a> IntoIterator for Matches<'a> {
    type Item = Item<'a>;
    type IntoIter = std::vec::IntoIter<Item<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
