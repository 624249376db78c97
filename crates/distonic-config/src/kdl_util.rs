//! Helpers for extracting values from KDL nodes.

use kdl::{KdlNode, KdlValue};
use serde_json::{Map, Value};

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

pub(crate) fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn kdl_to_json(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

/// Insert `value` under `key`, turning repeated keys into an array.
pub(crate) fn insert_accumulating(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

/// Properties and child nodes of `node` as a JSON object.
///
/// Positional arguments go under `args` when `with_args` is set.
pub(crate) fn node_to_object(node: &KdlNode, with_args: bool) -> Map<String, Value> {
    let mut map = Map::new();

    for entry in node.entries() {
        if let Some(name) = entry.name() {
            insert_accumulating(&mut map, name.value().to_string(), kdl_to_json(entry.value()));
        }
    }

    if with_args {
        let args: Vec<Value> = node
            .entries()
            .iter()
            .filter(|e| e.name().is_none())
            .map(|e| kdl_to_json(e.value()))
            .collect();
        if !args.is_empty() {
            map.insert("args".to_string(), Value::Array(args));
        }
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            insert_accumulating(&mut map, child.name().value().to_string(), node_to_value(child));
        }
    }

    map
}

/// Value of a nested parameter node.
///
/// A node with one argument is that scalar, several arguments an array, and
/// properties or children an object.
pub(crate) fn node_to_value(node: &KdlNode) -> Value {
    let args: Vec<Value> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| kdl_to_json(e.value()))
        .collect();
    let has_props = node.entries().iter().any(|e| e.name().is_some());
    let has_children = node.children().is_some_and(|c| !c.nodes().is_empty());

    if has_props || has_children {
        return Value::Object(node_to_object(node, true));
    }

    match args.len() {
        0 => Value::Null,
        1 => args.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(args),
    }
}
