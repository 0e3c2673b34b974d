//! Instance document helpers
//!
//! Documents are RFC 7951 JSON trees. Paths are identifier paths such as
//! `/toaster:toaster/darkness`; list entries are not addressed by key here.

use serde_json::{Map, Value};

/// Split an identifier path into member names
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Get a value by identifier path
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in split_path(path) {
        current = match current.get(part) {
            Some(v) => v,
            None => {
                // Members in the parent's module may be written without prefix
                let leaf_name = part.split(':').next_back().unwrap_or(part);
                current.get(leaf_name)?
            }
        };
    }
    Some(current)
}

/// Merge `source` into `target`: objects member-wise, arrays by appending
/// entries not already present, scalars replaced
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                match into.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        into.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(into), Value::Array(from)) => {
            for item in from {
                if !into.contains(item) {
                    into.push(item.clone());
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Local name of a member key
pub fn local_name(key: &str) -> &str {
    key.rsplit_once(':').map_or(key, |(_, name)| name)
}

/// Find a member by key, accepting a prefixed or unprefixed spelling
pub fn find_member<'a>(map: &'a Map<String, Value>, name: &str) -> Option<(&'a String, &'a Value)> {
    map.get_key_value(name)
        .or_else(|| map.iter().find(|(k, _)| local_name(k) == local_name(name)))
}

/// Whether two list entries carry the same key values
pub fn same_entry(a: &Value, b: &Value, keys: &[&str]) -> bool {
    if keys.is_empty() {
        return a == b;
    }
    keys.iter().all(|k| {
        let left = a.as_object().and_then(|m| find_member(m, k)).map(|(_, v)| v);
        let right = b.as_object().and_then(|m| find_member(m, k)).map(|(_, v)| v);
        left.is_some() && left == right
    })
}

/// Whether a member key is an RFC 7952 annotation
pub fn is_annotation(key: &str) -> bool {
    key.starts_with('@')
}

/// Visit every data node with its identifier path and instance path.
///
/// Lists (arrays of objects) are visited once per entry; leaf-lists are
/// visited once with the whole array.
pub fn walk<F>(doc: &Value, visit: &mut F)
where
    F: FnMut(&str, &str, &Value),
{
    if let Value::Object(map) = doc {
        walk_members(map, "", "", visit);
    }
}

fn walk_members<F>(map: &Map<String, Value>, schema: &str, instance: &str, visit: &mut F)
where
    F: FnMut(&str, &str, &Value),
{
    for (key, value) in map {
        if is_annotation(key) {
            continue;
        }
        let schema_path = format!("{schema}/{key}");
        match value {
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                for (i, item) in items.iter().enumerate() {
                    let instance_path = format!("{instance}/{key}[{}]", i + 1);
                    visit(&schema_path, &instance_path, item);
                    if let Value::Object(child) = item {
                        walk_members(child, &schema_path, &instance_path, visit);
                    }
                }
            }
            _ => {
                let instance_path = format!("{instance}/{key}");
                visit(&schema_path, &instance_path, value);
                if let Value::Object(child) = value {
                    walk_members(child, &schema_path, &instance_path, visit);
                }
            }
        }
    }
}

/// Collect every value found at an identifier path, descending into lists
pub fn collect_values<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for part in split_path(path) {
        let mut next = Vec::new();
        for node in current {
            let Some(value) = node.as_object().and_then(|m| find_member(m, part)).map(|(_, v)| v)
            else {
                continue;
            };
            match value {
                Value::Array(items) => next.extend(items.iter()),
                other => next.push(other),
            }
        }
        current = next;
    }
    current
}
