//! edit-config semantics
//!
//! Applies an annotated edit document onto stored content. The operation of
//! a node comes from its RFC 7952 annotation (`"@"` inside objects and list
//! entries, `"@leaf"` beside a leaf) and is inherited by its descendants.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NetconfError, Result};
use crate::schema::{EffectiveSchema, SchemaNode};
use crate::tree::{self, is_annotation};

const OPERATION: &str = "operation";
const QUALIFIED_OPERATION: &str = "ietf-netconf:operation";

/// Per-node edit operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditOperation {
    #[default]
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
    None,
}

impl std::str::FromStr for EditOperation {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(EditOperation::Merge),
            "replace" => Ok(EditOperation::Replace),
            "create" => Ok(EditOperation::Create),
            "delete" => Ok(EditOperation::Delete),
            "remove" => Ok(EditOperation::Remove),
            "none" => Ok(EditOperation::None),
            other => Err(NetconfError::InvalidValue(format!("unknown edit operation {other}"))),
        }
    }
}

/// Operation carried by an annotation object, if any
fn operation_of(annotation: Option<&Value>) -> Result<Option<EditOperation>> {
    let Some(annotation) = annotation.and_then(Value::as_object) else {
        return Ok(None);
    };
    match annotation
        .get(OPERATION)
        .or_else(|| annotation.get(QUALIFIED_OPERATION))
    {
        Some(Value::String(op)) => op.parse().map(Some),
        Some(other) => Err(NetconfError::InvalidValue(format!(
            "edit operation must be a string, found {other}"
        ))),
        None => Ok(None),
    }
}

/// Copy of a document with every annotation removed
pub fn strip_annotations(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !is_annotation(k))
                .map(|(k, v)| (k.clone(), strip_annotations(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_annotations).collect()),
        other => other.clone(),
    }
}

/// Where schema lookups for a member happen
#[derive(Clone, Copy)]
enum Level<'s> {
    Root(Option<&'s EffectiveSchema>),
    Node(Option<&'s SchemaNode>),
}

impl<'s> Level<'s> {
    fn child(self, key: &str) -> Option<&'s SchemaNode> {
        match self {
            Level::Root(schema) => schema.and_then(|s| s.root(key)),
            Level::Node(node) => node.and_then(|n| n.data_child(key)),
        }
    }
}

/// Apply an edit document onto `target`
///
/// The edit is all-or-nothing: on error `target` is left untouched.
pub fn apply_edit(
    target: &mut Value,
    edit: &Value,
    default_operation: EditOperation,
    schema: Option<&EffectiveSchema>,
) -> Result<()> {
    let edit = edit
        .as_object()
        .ok_or_else(|| NetconfError::InvalidValue("edit-config payload must be an object".into()))?;

    let (mut work, inherited) = match (default_operation, target.as_object()) {
        (EditOperation::Replace, _) => (Map::new(), EditOperation::Merge),
        (op, Some(map)) => (map.clone(), op),
        (op, None) => (Map::new(), op),
    };
    edit_members(&mut work, edit, inherited, Level::Root(schema), "")?;
    *target = Value::Object(work);
    Ok(())
}

fn edit_members(
    target: &mut Map<String, Value>,
    edit: &Map<String, Value>,
    inherited: EditOperation,
    level: Level<'_>,
    path: &str,
) -> Result<()> {
    for (key, value) in edit {
        if is_annotation(key) {
            continue;
        }
        let leaf_op = operation_of(edit.get(&format!("@{key}")))?;
        let node = level.child(key);
        let path = format!("{path}/{key}");
        edit_member(target, key, value, leaf_op.unwrap_or(inherited), node, &path)?;
    }
    Ok(())
}

fn edit_member(
    target: &mut Map<String, Value>,
    key: &str,
    value: &Value,
    inherited: EditOperation,
    node: Option<&SchemaNode>,
    path: &str,
) -> Result<()> {
    let existing = tree::find_member(target, key).map(|(k, _)| k.clone());
    let is_list = match node {
        Some(n) => n.is("list"),
        None => matches!(value, Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object)),
    };

    match value {
        Value::Object(obj) => {
            let op = operation_of(obj.get("@"))?.unwrap_or(inherited);
            edit_container(target, key, existing, obj, op, node, path)
        }
        Value::Array(items) if is_list && node.is_some() => {
            edit_list(target, key, existing, items, inherited, node, path)
        }
        Value::Array(items) if node.is_some_and(|n| n.is("leaf-list")) => {
            edit_leaf_list(target, key, existing, items, inherited, path)
        }
        other => edit_leaf(target, key, existing, other, inherited, path),
    }
}

fn edit_leaf(
    target: &mut Map<String, Value>,
    key: &str,
    existing: Option<String>,
    value: &Value,
    op: EditOperation,
    path: &str,
) -> Result<()> {
    match op {
        EditOperation::Merge | EditOperation::Replace => {
            if let Some(old) = existing {
                target.remove(&old);
            }
            target.insert(key.to_string(), strip_annotations(value));
        }
        EditOperation::Create => {
            if existing.is_some() {
                return Err(NetconfError::DataExists(path.to_string()));
            }
            target.insert(key.to_string(), strip_annotations(value));
        }
        EditOperation::Delete => {
            let old = existing.ok_or_else(|| NetconfError::DataMissing(path.to_string()))?;
            target.remove(&old);
        }
        EditOperation::Remove => {
            if let Some(old) = existing {
                target.remove(&old);
            }
        }
        EditOperation::None => {}
    }
    Ok(())
}

fn edit_leaf_list(
    target: &mut Map<String, Value>,
    key: &str,
    existing: Option<String>,
    items: &[Value],
    op: EditOperation,
    path: &str,
) -> Result<()> {
    if op != EditOperation::Merge {
        return edit_leaf(target, key, existing, &Value::Array(items.to_vec()), op, path);
    }
    let slot = match existing {
        Some(old) => target.entry(old),
        None => target.entry(key.to_string()),
    }
    .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    if let Value::Array(current) = slot {
        for item in items {
            if !current.contains(item) {
                current.push(item.clone());
            }
        }
    }
    Ok(())
}

fn edit_container(
    target: &mut Map<String, Value>,
    key: &str,
    existing: Option<String>,
    obj: &Map<String, Value>,
    op: EditOperation,
    node: Option<&SchemaNode>,
    path: &str,
) -> Result<()> {
    let level = Level::Node(node);
    match op {
        EditOperation::Create if existing.is_some() => {
            return Err(NetconfError::DataExists(path.to_string()));
        }
        EditOperation::Create | EditOperation::Replace => {
            let mut fresh = Map::new();
            edit_members(&mut fresh, obj, EditOperation::Merge, level, path)?;
            if let Some(old) = existing {
                target.remove(&old);
            }
            target.insert(key.to_string(), Value::Object(fresh));
        }
        EditOperation::Delete | EditOperation::Remove => {
            match existing {
                Some(old) => {
                    target.remove(&old);
                }
                None if op == EditOperation::Delete => {
                    return Err(NetconfError::DataMissing(path.to_string()));
                }
                None => {}
            }
        }
        EditOperation::Merge | EditOperation::None => {
            let present = existing.is_some();
            let slot_key = existing.unwrap_or_else(|| key.to_string());
            let mut child = match target.remove(&slot_key) {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            edit_members(&mut child, obj, op, level, path)?;
            if present || op == EditOperation::Merge || !child.is_empty() {
                target.insert(slot_key, Value::Object(child));
            }
        }
    }
    Ok(())
}

fn edit_list(
    target: &mut Map<String, Value>,
    key: &str,
    existing: Option<String>,
    items: &[Value],
    inherited: EditOperation,
    node: Option<&SchemaNode>,
    path: &str,
) -> Result<()> {
    let keys = node.map(SchemaNode::keys).unwrap_or_default();
    let slot_key = existing.unwrap_or_else(|| key.to_string());
    let mut entries = match target.remove(&slot_key) {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    };
    let level = Level::Node(node);

    for item in items {
        let entry = item
            .as_object()
            .ok_or_else(|| NetconfError::InvalidValue(format!("{path}: list entry must be an object")))?;
        for k in &keys {
            if tree::find_member(entry, k).is_none() {
                return Err(NetconfError::InvalidValue(format!(
                    "{path}: list entry without key {k}"
                )));
            }
        }
        let op = operation_of(entry.get("@"))?.unwrap_or(inherited);
        let position = entries.iter().position(|e| tree::same_entry(e, item, &keys));
        let entry_path = format!("{path}{}", predicate(entry, &keys));

        match (op, position) {
            (EditOperation::Create, Some(_)) => return Err(NetconfError::DataExists(entry_path)),
            (EditOperation::Delete, None) => return Err(NetconfError::DataMissing(entry_path)),
            (EditOperation::Delete | EditOperation::Remove, Some(i)) => {
                entries.remove(i);
            }
            (EditOperation::Remove, None) => {}
            (EditOperation::Create | EditOperation::Replace, position) => {
                let mut fresh = Map::new();
                edit_members(&mut fresh, entry, EditOperation::Merge, level, &entry_path)?;
                match position {
                    Some(i) => entries[i] = Value::Object(fresh),
                    None => entries.push(Value::Object(fresh)),
                }
            }
            (EditOperation::Merge | EditOperation::None, position) => {
                let mut current = match position.map(|i| &entries[i]) {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                edit_members(&mut current, entry, op, level, &entry_path)?;
                match position {
                    Some(i) => entries[i] = Value::Object(current),
                    None if op == EditOperation::Merge || !current.is_empty() => {
                        entries.push(Value::Object(current))
                    }
                    None => {}
                }
            }
        }
    }

    if !entries.is_empty() {
        target.insert(slot_key, Value::Array(entries));
    }
    Ok(())
}

/// `[name='eth0']` style predicate for error paths
fn predicate(entry: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| tree::find_member(entry, k).map(|(_, v)| (k, v)))
        .map(|(k, v)| match v {
            Value::String(s) => format!("[{k}='{s}']"),
            other => format!("[{k}='{other}']"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;
    use serde_json::json;

    const IFACES: &str = r#"<module name="if" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <namespace uri="urn:if"/><prefix value="if"/>
  <container name="interfaces">
    <list name="interface">
      <key value="name"/>
      <leaf name="name"><type name="string"/></leaf>
      <leaf name="mtu"><type name="uint16"/></leaf>
      <leaf-list name="tag"><type name="string"/></leaf-list>
    </list>
  </container>
</module>"#;

    fn schema() -> EffectiveSchema {
        let mut registry = ModelRegistry::new();
        let key = registry.add_model_yin(IFACES).unwrap();
        registry.effective_schema(&key, &[]).unwrap()
    }

    fn base() -> Value {
        json!({"if:interfaces": {"interface": [
            {"name": "eth0", "mtu": 1500, "tag": ["a"]},
            {"name": "eth1", "mtu": 1500}
        ]}})
    }

    #[test]
    fn test_merge_matches_list_entries_by_key() {
        let schema = schema();
        let mut doc = base();
        let edit = json!({"if:interfaces": {"interface": [
            {"name": "eth0", "mtu": 9000, "tag": ["b"]},
            {"name": "eth2"}
        ]}});
        apply_edit(&mut doc, &edit, EditOperation::Merge, Some(&schema)).unwrap();

        let list = doc["if:interfaces"]["interface"].as_array().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], json!({"name": "eth0", "mtu": 9000, "tag": ["a", "b"]}));
        assert_eq!(list[1]["mtu"], json!(1500));
    }

    #[test]
    fn test_entry_operations() {
        let schema = schema();
        let mut doc = base();
        let edit = json!({"if:interfaces": {"interface": [
            {"@": {"operation": "delete"}, "name": "eth1"},
            {"@": {"ietf-netconf:operation": "replace"}, "name": "eth0"}
        ]}});
        apply_edit(&mut doc, &edit, EditOperation::Merge, Some(&schema)).unwrap();
        assert_eq!(doc, json!({"if:interfaces": {"interface": [{"name": "eth0"}]}}));

        let again = json!({"if:interfaces": {"interface": [
            {"@": {"operation": "delete"}, "name": "eth1"}
        ]}});
        assert!(matches!(
            apply_edit(&mut doc, &again, EditOperation::Merge, Some(&schema)),
            Err(NetconfError::DataMissing(path)) if path.ends_with("[name='eth1']")
        ));

        let create = json!({"if:interfaces": {"interface": [
            {"@": {"operation": "create"}, "name": "eth0"}
        ]}});
        assert!(matches!(
            apply_edit(&mut doc, &create, EditOperation::Merge, Some(&schema)),
            Err(NetconfError::DataExists(_))
        ));
    }

    #[test]
    fn test_failed_edit_leaves_document_untouched() {
        let schema = schema();
        let mut doc = json!({"if:interfaces": {"interface": [{"name": "eth0", "mtu": 1500}]}});
        let before = doc.clone();
        let edit = json!({"if:interfaces": {"interface": [
            {"name": "eth0", "mtu": 9000},
            {"@": {"operation": "delete"}, "name": "eth1"}
        ]}});
        assert!(matches!(
            apply_edit(&mut doc, &edit, EditOperation::Merge, Some(&schema)),
            Err(NetconfError::DataMissing(_))
        ));
        assert_eq!(doc, before);

        let nested = json!({"if:interfaces": {"@": {"operation": "create"}}});
        assert!(matches!(
            apply_edit(&mut doc, &nested, EditOperation::Merge, Some(&schema)),
            Err(NetconfError::DataExists(_))
        ));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_replace_container() {
        let schema = schema();
        let mut doc = base();
        let edit = json!({"if:interfaces": {
            "@": {"operation": "replace"},
            "interface": [{"name": "eth9"}]
        }});
        apply_edit(&mut doc, &edit, EditOperation::Merge, Some(&schema)).unwrap();
        assert_eq!(doc, json!({"if:interfaces": {"interface": [{"name": "eth9"}]}}));
    }

    #[test]
    fn test_leaf_annotations() {
        let schema = schema();
        let mut doc = base();
        let edit = json!({"if:interfaces": {"interface": [
            {"name": "eth1", "mtu": 0, "@mtu": {"operation": "remove"}}
        ]}});
        apply_edit(&mut doc, &edit, EditOperation::Merge, Some(&schema)).unwrap();
        assert_eq!(doc["if:interfaces"]["interface"][1], json!({"name": "eth1"}));
    }

    #[test]
    fn test_default_operation_none_and_replace() {
        let schema = schema();
        let mut doc = json!({});
        let edit = json!({"if:interfaces": {"interface": [{"name": "eth0", "mtu": 1}]}});
        apply_edit(&mut doc, &edit, EditOperation::None, Some(&schema)).unwrap();
        assert_eq!(doc, json!({}));

        let mut doc = base();
        apply_edit(&mut doc, &edit, EditOperation::Replace, Some(&schema)).unwrap();
        assert_eq!(doc, json!({"if:interfaces": {"interface": [{"name": "eth0", "mtu": 1}]}}));
    }

    #[test]
    fn test_missing_key_rejected() {
        let schema = schema();
        let mut doc = base();
        let edit = json!({"if:interfaces": {"interface": [{"mtu": 1}]}});
        assert!(matches!(
            apply_edit(&mut doc, &edit, EditOperation::Merge, Some(&schema)),
            Err(NetconfError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_schemaless_edit() {
        let mut doc = json!({"m:x": {"a": 1, "l": [1, 2]}});
        let edit = json!({"m:x": {"b": 2, "l": [3]}, "m:y": {"@": {"operation": "delete"}}});
        assert!(matches!(
            apply_edit(&mut doc, &edit, EditOperation::Merge, None),
            Err(NetconfError::DataMissing(_))
        ));

        let edit = json!({"m:x": {"b": 2, "l": [3]}});
        apply_edit(&mut doc, &edit, EditOperation::Merge, None).unwrap();
        assert_eq!(doc, json!({"m:x": {"a": 1, "b": 2, "l": [3]}}));
    }
}
