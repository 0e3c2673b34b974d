//! with-defaults handling (RFC 6243 modes)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{EffectiveSchema, SchemaNode};
use crate::tree::find_member;
use crate::types::YangType;
use crate::validation::DefaultsTable;

/// Reporting mode for default values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithDefaults {
    /// Return stored content unchanged
    #[default]
    Explicit,
    /// Add absent leaves that have a default
    ReportAll,
    /// Drop leaves equal to their default
    Trim,
}

struct Defaults<'a> {
    table: Option<&'a DefaultsTable>,
    mode: WithDefaults,
}

impl Defaults<'_> {
    fn value_for(&self, path: &str, leaf: &SchemaNode) -> Option<Value> {
        if let Some(value) = self.table.and_then(|t| t.get(path)) {
            return Some(value.clone());
        }
        let text = leaf.default_value()?;
        let yang_type = leaf
            .first("type")
            .map(YangType::from_schema)
            .unwrap_or(YangType::String);
        Some(yang_type.coerce_default(text))
    }

    fn visit(&self, map: &mut Map<String, Value>, node: &SchemaNode, path: &str) {
        for child in node.data_children() {
            let key = if child.module.is_some() && child.module != node.module {
                format!("{}:{}", child.module.as_deref().unwrap_or_default(), child.name())
            } else {
                child.name().to_string()
            };
            let child_path = format!("{path}/{key}");
            let present = find_member(map, &key).map(|(k, _)| k.clone());

            match child.keyword.as_str() {
                "leaf" => {
                    let Some(default) = self.value_for(&child_path, child) else {
                        continue;
                    };
                    match (self.mode, present) {
                        (WithDefaults::ReportAll, None) => {
                            map.insert(key, default);
                        }
                        (WithDefaults::Trim, Some(found)) => {
                            if map.get(&found).is_some_and(|v| same_value(v, &default)) {
                                map.remove(&found);
                            }
                        }
                        _ => {}
                    }
                }
                "container" => {
                    let Some(found) = present else { continue };
                    if let Some(Value::Object(inner)) = map.get_mut(&found) {
                        self.visit(inner, child, &child_path);
                    }
                }
                "list" => {
                    let Some(found) = present else { continue };
                    if let Some(Value::Array(entries)) = map.get_mut(&found) {
                        for entry in entries.iter_mut() {
                            if let Value::Object(inner) = entry {
                                self.visit(inner, child, &child_path);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn same_value(stored: &Value, default: &Value) -> bool {
    let text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    stored == default || text(stored) == text(default)
}

/// Apply a with-defaults mode to a document in place
pub fn apply_defaults(
    doc: &mut Value,
    schema: &EffectiveSchema,
    table: Option<&DefaultsTable>,
    mode: WithDefaults,
) {
    if mode == WithDefaults::Explicit {
        return;
    }
    let Value::Object(map) = doc else {
        return;
    };
    let defaults = Defaults { table, mode };
    for (key, value) in map.iter_mut() {
        let Some(root) = schema.root(key) else {
            continue;
        };
        let path = format!("/{key}");
        match value {
            Value::Object(inner) => defaults.visit(inner, root, &path),
            Value::Array(entries) => {
                for entry in entries.iter_mut() {
                    if let Value::Object(inner) = entry {
                        defaults.visit(inner, root, &path);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;
    use serde_json::json;
    use std::collections::HashMap;

    const TOASTER: &str = r#"<module name="toaster" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <namespace uri="urn:toaster"/><prefix value="t"/>
  <container name="toaster">
    <leaf name="darkness"><type name="uint32"/><default value="5"/></leaf>
    <leaf name="mode"><type name="string"/><default value="bagel"/></leaf>
    <leaf name="name"><type name="string"/></leaf>
  </container>
</module>"#;

    fn schema() -> EffectiveSchema {
        let mut registry = ModelRegistry::new();
        let key = registry.add_model_yin(TOASTER).unwrap();
        registry.effective_schema(&key, &[]).unwrap()
    }

    #[test]
    fn test_report_all_adds_defaults() {
        let mut doc = json!({"toaster:toaster": {"name": "t1"}});
        apply_defaults(&mut doc, &schema(), None, WithDefaults::ReportAll);
        assert_eq!(
            doc,
            json!({"toaster:toaster": {"name": "t1", "darkness": 5, "mode": "bagel"}})
        );
    }

    #[test]
    fn test_trim_removes_defaults() {
        let mut doc = json!({"toaster:toaster": {"darkness": 5, "mode": "toast"}});
        apply_defaults(&mut doc, &schema(), None, WithDefaults::Trim);
        assert_eq!(doc, json!({"toaster:toaster": {"mode": "toast"}}));
    }

    #[test]
    fn test_table_overrides_schema_default() {
        let table = DefaultsTable {
            values: HashMap::from([("/toaster:toaster/darkness".to_string(), json!(7))]),
        };
        let mut doc = json!({"toaster:toaster": {}});
        apply_defaults(&mut doc, &schema(), Some(&table), WithDefaults::ReportAll);
        assert_eq!(doc["toaster:toaster"]["darkness"], json!(7));
    }

    #[test]
    fn test_explicit_is_untouched() {
        let mut doc = json!({"toaster:toaster": {}});
        apply_defaults(&mut doc, &schema(), None, WithDefaults::Explicit);
        assert_eq!(doc, json!({"toaster:toaster": {}}));
    }
}
