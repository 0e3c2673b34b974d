//! Subtree filtering for get and get-config
//!
//! Filters use the same JSON shape as the data: `null` or `{}` selects a
//! whole subtree, an object selects children, and a scalar member is a
//! content-match node that must equal the data for its parent to be kept.

use serde_json::{Map, Value};

use crate::tree::{find_member, is_annotation};

fn is_selection(filter: &Value) -> bool {
    matches!(filter, Value::Null | Value::Object(_) | Value::Array(_))
}

fn content_matches(data: &Value, expected: &Value) -> bool {
    match data {
        Value::Array(items) => items.contains(expected),
        other => other == expected,
    }
}

/// Filter a document; a missing or empty filter keeps everything
pub fn apply_filter(doc: &Value, filter: Option<&Value>) -> Value {
    match (doc, filter) {
        (_, None | Some(Value::Null)) => doc.clone(),
        (Value::Object(data), Some(Value::Object(f))) if !f.is_empty() => {
            Value::Object(filter_object(data, f).unwrap_or_default())
        }
        (_, Some(Value::Object(_))) => doc.clone(),
        _ => Value::Object(Map::new()),
    }
}

/// Top-level member names a filter selects
pub fn selected_roots(filter: &Value) -> Vec<&str> {
    filter
        .as_object()
        .map(|f| f.keys().filter(|k| !is_annotation(k)).map(String::as_str).collect())
        .unwrap_or_default()
}

fn filter_object(data: &Map<String, Value>, filter: &Map<String, Value>) -> Option<Map<String, Value>> {
    let members = filter.iter().filter(|(k, _)| !is_annotation(k));

    let mut out = Map::new();
    let mut selections = Vec::new();
    for (key, expected) in members {
        if is_selection(expected) {
            selections.push((key, expected));
            continue;
        }
        let (found, value) = find_member(data, key)?;
        if !content_matches(value, expected) {
            return None;
        }
        out.insert(found.clone(), value.clone());
    }

    if selections.is_empty() {
        return Some(data.clone());
    }

    let mut selected_any = false;
    for (key, selection) in selections {
        let Some((found, value)) = find_member(data, key) else {
            continue;
        };
        if let Some(kept) = select(value, selection) {
            out.insert(found.clone(), kept);
            selected_any = true;
        }
    }

    selected_any.then_some(out)
}

fn select(value: &Value, selection: &Value) -> Option<Value> {
    match selection {
        Value::Null => Some(value.clone()),
        Value::Object(f) if f.is_empty() => Some(value.clone()),
        Value::Object(f) => match value {
            Value::Object(data) => filter_object(data, f).map(Value::Object),
            Value::Array(items) => {
                let kept: Vec<Value> = items
                    .iter()
                    .filter_map(|item| item.as_object().and_then(|m| filter_object(m, f)))
                    .map(Value::Object)
                    .collect();
                (!kept.is_empty()).then_some(Value::Array(kept))
            }
            _ => None,
        },
        // several alternative entry filters for one list
        Value::Array(alternatives) => {
            let items = value.as_array()?;
            let kept: Vec<Value> = items
                .iter()
                .filter_map(|item| {
                    alternatives
                        .iter()
                        .find_map(|alt| select(&Value::Array(vec![item.clone()]), alt))
                        .and_then(|v| v.as_array().and_then(|a| a.first().cloned()))
                })
                .collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Value {
        json!({
            "if:interfaces": {"interface": [
                {"name": "eth0", "mtu": 1500, "enabled": true},
                {"name": "eth1", "mtu": 9000, "enabled": false}
            ]},
            "sys:system": {"hostname": "r1", "clock": {"tz": "UTC"}}
        })
    }

    #[test]
    fn test_no_filter_keeps_everything() {
        assert_eq!(apply_filter(&data(), None), data());
        assert_eq!(apply_filter(&data(), Some(&json!({}))), data());
    }

    #[test]
    fn test_select_subtree() {
        let out = apply_filter(&data(), Some(&json!({"sys:system": {"clock": {}}})));
        assert_eq!(out, json!({"sys:system": {"clock": {"tz": "UTC"}}}));
    }

    #[test]
    fn test_content_match_on_list() {
        let filter = json!({"if:interfaces": {"interface": {"name": "eth1", "mtu": null}}});
        let out = apply_filter(&data(), Some(&filter));
        assert_eq!(
            out,
            json!({"if:interfaces": {"interface": [{"name": "eth1", "mtu": 9000}]}})
        );
    }

    #[test]
    fn test_content_match_only_returns_whole_entry() {
        let filter = json!({"if:interfaces": {"interface": {"name": "eth0"}}});
        let out = apply_filter(&data(), Some(&filter));
        assert_eq!(
            out["if:interfaces"]["interface"],
            json!([{"name": "eth0", "mtu": 1500, "enabled": true}])
        );
    }

    #[test]
    fn test_alternative_entries() {
        let filter = json!({"if:interfaces": {"interface": [{"name": "eth0"}, {"name": "eth1"}]}});
        let out = apply_filter(&data(), Some(&filter));
        assert_eq!(out["if:interfaces"]["interface"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_no_match() {
        let filter = json!({"sys:system": {"hostname": "r2", "clock": null}});
        assert_eq!(apply_filter(&data(), Some(&filter)), json!({}));
        assert_eq!(selected_roots(&filter), vec!["sys:system"]);
    }
}
