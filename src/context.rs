//! Path-addressable context for expression evaluation.
//!
//! Mirrors `context.py`'s dict-of-dicts traversal, extended to also step
//! through list indices (a decimal path segment against a `Value::List`),
//! which the dict-only original can't express.

use indexmap::IndexMap;

use crate::model::Value;

/// A path-addressable store an expression can read from (and, outside of
/// expression evaluation, be written to).
pub trait Context {
    fn get(&self, path: &str) -> Option<Value>;
    fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }
    fn set(&mut self, path: &str, value: Value);
    fn as_dict(&self) -> &IndexMap<String, Value>;
}

/// The default `Context` implementation: a flat `IndexMap` at the root,
/// with `.`-separated paths descending into nested `Object`/`List` values.
#[derive(Clone, Debug, Default)]
pub struct MapContext {
    root: IndexMap<String, Value>,
}

impl MapContext {
    pub fn new() -> Self {
        MapContext {
            root: IndexMap::new(),
        }
    }

    pub fn from_map(root: IndexMap<String, Value>) -> Self {
        MapContext { root }
    }

    fn navigate<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
        match value {
            Value::Object(map) => map.get(segment),
            Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }
}

impl Context for MapContext {
    fn get(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = Self::navigate(current, segment)?;
        }
        Some(current.clone())
    }

    fn set(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() == 1 {
            self.root.insert(segments[0].to_string(), value);
            return;
        }
        let mut current = self
            .root
            .entry(segments[0].to_string())
            .or_insert_with(|| Value::Object(IndexMap::new()));
        for segment in &segments[1..segments.len() - 1] {
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(IndexMap::new());
            }
            let Value::Object(map) = current else {
                unreachable!()
            };
            current = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(IndexMap::new()));
        }
        if !matches!(current, Value::Object(_)) {
            *current = Value::Object(IndexMap::new());
        }
        let Value::Object(map) = current else {
            unreachable!()
        };
        map.insert(segments[segments.len() - 1].to_string(), value);
    }

    fn as_dict(&self) -> &IndexMap<String, Value> {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_flat_path() {
        let mut ctx = MapContext::new();
        ctx.set("x", Value::Int(5));
        assert_eq!(ctx.get("x"), Some(Value::Int(5)));
        assert!(ctx.has("x"));
        assert!(!ctx.has("y"));
    }

    #[test]
    fn get_nested_path() {
        let mut ctx = MapContext::new();
        ctx.set("agent.status", Value::String("ready".into()));
        assert_eq!(ctx.get("agent.status"), Some(Value::String("ready".into())));
        assert_eq!(ctx.get("agent.missing"), None);
    }

    #[test]
    fn get_list_index() {
        let mut root = IndexMap::new();
        root.insert(
            "items".to_string(),
            Value::List(vec![Value::Int(10), Value::Int(20)]),
        );
        let ctx = MapContext::from_map(root);
        assert_eq!(ctx.get("items.1"), Some(Value::Int(20)));
    }
}
