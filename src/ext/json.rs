use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use crate::config::Configuration;
use crate::node::{Adapter, AdapterFactory, Item, Key, NodeKind, NodeRef};

/// Accepts any `serde_json::Value` root.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFactory;

impl AdapterFactory for JsonFactory {
    fn create<'a>(
        &self,
        root: &'a (dyn Any + 'static),
        _config: &Configuration,
    ) -> Option<Box<dyn Adapter<'a> + 'a>> {
        root.downcast_ref::<Value>()?;
        Some(Box::new(JsonAdapter::default()))
    }
}

struct Link<'a> {
    parent: NodeRef<'a>,
    key: Option<String>,
    index: Option<usize>,
}

/// `serde_json` has no upward pointers, so parents are recorded as `get` hands out children.
#[derive(Default)]
pub struct JsonAdapter<'a> {
    links: RefCell<HashMap<usize, Link<'a>>>,
}

impl<'a> JsonAdapter<'a> {
    fn record(&self, child: &'a Value, parent: NodeRef<'a>, key: Option<&str>, index: Option<usize>) -> NodeRef<'a> {
        let node = NodeRef::new(child);
        self.links.borrow_mut().entry(node.addr()).or_insert_with(|| Link {
            parent,
            key: key.map(str::to_string),
            index,
        });
        node
    }
}

fn json<'a>(node: NodeRef<'a>) -> Option<&'a Value> {
    node.downcast::<Value>()
}

impl<'a> Adapter<'a> for JsonAdapter<'a> {
    fn get(&self, node: NodeRef<'a>, key: Key<'_>) -> Vec<NodeRef<'a>> {
        let Some(value) = json(node) else {
            return Vec::new();
        };
        match (value, key) {
            (Value::Object(map), Key::Name(name)) => map
                .get(name)
                .map(|child| self.record(child, node, Some(name), None))
                .into_iter()
                .collect(),
            (Value::Object(map), Key::Index(i)) => {
                let name = i.to_string();
                map.get(&name)
                    .map(|child| self.record(child, node, Some(name.as_str()), None))
                    .into_iter()
                    .collect()
            }
            (Value::Object(map), Key::Wildcard) => map
                .iter()
                .map(|(k, child)| self.record(child, node, Some(k.as_str()), None))
                .collect(),
            (Value::Array(items), Key::Index(i)) => {
                let len = items.len() as i64;
                let idx = if i < 0 { len + i } else { i };
                if (0..len).contains(&idx) {
                    let idx = idx as usize;
                    vec![self.record(&items[idx], node, None, Some(idx))]
                } else {
                    Vec::new()
                }
            }
            (Value::Array(items), Key::Wildcard) => items
                .iter()
                .enumerate()
                .map(|(i, child)| self.record(child, node, None, Some(i)))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn parent(&self, node: NodeRef<'a>) -> Option<NodeRef<'a>> {
        self.links.borrow().get(&node.addr()).map(|link| link.parent)
    }

    fn key(&self, node: NodeRef<'a>) -> Option<String> {
        self.links.borrow().get(&node.addr()).and_then(|link| link.key.clone())
    }

    fn index(&self, node: NodeRef<'a>) -> Option<usize> {
        self.links.borrow().get(&node.addr()).and_then(|link| link.index)
    }

    fn kind(&self, node: NodeRef<'a>) -> NodeKind {
        match json(node) {
            Some(Value::Object(_)) => NodeKind::Map,
            Some(Value::Array(_)) => NodeKind::List,
            Some(Value::String(_)) => NodeKind::String,
            Some(Value::Number(_)) => NodeKind::Number,
            Some(Value::Bool(_)) => NodeKind::Boolean,
            Some(Value::Null) => NodeKind::Null,
            None => NodeKind::Other("foreign"),
        }
    }

    fn value(&self, node: NodeRef<'a>) -> Option<Item<'a>> {
        match json(node)? {
            Value::Null => Some(Item::Null),
            Value::Bool(b) => Some(Item::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Item::Int)
                .or_else(|| n.as_f64().map(Item::Real)),
            Value::String(s) => Some(Item::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn string_value(&self, node: NodeRef<'a>) -> Option<String> {
        json(node).and_then(|v| serde_json::to_string(v).ok())
    }
}

/// Converts a result item into an owned JSON value. Foreign nodes become `null`.
pub fn to_json(item: &Item<'_>) -> Value {
    match item {
        Item::Null => Value::Null,
        Item::Bool(b) => Value::Bool(*b),
        Item::Int(i) => Value::from(*i),
        Item::Real(r) => serde_json::Number::from_f64(*r)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Item::Str(s) => Value::String(s.clone()),
        Item::Node(node) => json(*node).cloned().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn children_remember_their_parent() {
        let doc = json!({"a": [10, 20, {"b": true}]});
        let adapter = JsonAdapter::default();
        let root = NodeRef::new(&doc);
        let a = adapter.get(root, Key::Name("a"))[0];
        let last = adapter.get(a, Key::Index(-1))[0];
        assert_eq!(adapter.parent(last), Some(a));
        assert_eq!(adapter.index(last), Some(2));
        assert_eq!(adapter.key(a).as_deref(), Some("a"));
        assert_eq!(adapter.kind(last), NodeKind::Map);
        assert_eq!(adapter.parent(root), None);
    }

    #[test]
    fn index_on_map_reads_numeric_key() {
        let doc = json!({"1": "one", "2": "two"});
        let adapter = JsonAdapter::default();
        let hit = adapter.get(NodeRef::new(&doc), Key::Index(2));
        assert_eq!(adapter.value(hit[0]), Some(Item::Str("two".into())));
    }

    #[test]
    fn scalars_unwrap_and_containers_serialise() {
        let doc = json!({"n": 2.5, "list": [1, 2]});
        let adapter = JsonAdapter::default();
        let root = NodeRef::new(&doc);
        let n = adapter.get(root, Key::Name("n"))[0];
        let list = adapter.get(root, Key::Name("list"))[0];
        assert_eq!(adapter.value(n), Some(Item::Real(2.5)));
        assert_eq!(adapter.value(list), None);
        assert_eq!(adapter.string_value(list).as_deref(), Some("[1,2]"));
        assert_eq!(to_json(&Item::Node(list)), json!([1, 2]));
    }

    #[test]
    fn factory_rejects_foreign_roots() {
        let config = Configuration::default();
        let doc = json!(null);
        assert!(JsonFactory.create(&doc, &config).is_some());
        assert!(JsonFactory.create(&42u8, &config).is_none());
    }
}
