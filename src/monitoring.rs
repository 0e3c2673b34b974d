//! Built-in `ietf-netconf-monitoring` state served by the internal datastore

use serde_json::{Map, Value, json};

use crate::lock::LockInfo;
use crate::model::DataModel;
use crate::store::Part;

pub const MODULE: &str = "ietf-netconf-monitoring";

/// Top-level member of the monitoring state document
pub const STATE_ROOT: &str = "ietf-netconf-monitoring:netconf-state";

/// Reduced `ietf-netconf-monitoring` model: datastore locks and schemas
pub const MONITORING_YIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<module name="ietf-netconf-monitoring"
        xmlns="urn:ietf:params:xml:ns:yang:yin:1"
        xmlns:ncm="urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring">
  <namespace uri="urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring"/>
  <prefix value="ncm"/>
  <revision date="2010-10-04"/>
  <container name="netconf-state">
    <config value="false"/>
    <container name="datastores">
      <list name="datastore">
        <key value="name"/>
        <leaf name="name">
          <type name="enumeration">
            <enum name="running"/>
            <enum name="candidate"/>
            <enum name="startup"/>
          </type>
        </leaf>
        <container name="locks">
          <container name="global-lock">
            <leaf name="locked-by-session">
              <type name="string"/>
            </leaf>
            <leaf name="locked-time">
              <type name="string"/>
            </leaf>
          </container>
        </container>
      </list>
    </container>
    <container name="schemas">
      <list name="schema">
        <key value="identifier version format"/>
        <leaf name="identifier">
          <type name="string"/>
        </leaf>
        <leaf name="version">
          <type name="string"/>
        </leaf>
        <leaf name="format">
          <type name="string"/>
        </leaf>
        <leaf name="namespace">
          <type name="string"/>
        </leaf>
        <leaf-list name="location">
          <type name="string"/>
        </leaf-list>
      </list>
    </container>
  </container>
  <rpc name="get-schema">
    <input>
      <leaf name="identifier">
        <type name="string"/>
      </leaf>
      <leaf name="version">
        <type name="string"/>
      </leaf>
      <leaf name="format">
        <type name="string"/>
      </leaf>
    </input>
  </rpc>
</module>
"#;

fn datastore_entry(part: Part, lock: Option<&LockInfo>) -> Value {
    let mut entry = Map::new();
    entry.insert("name".into(), Value::String(part.to_string()));
    if let Some(lock) = lock {
        entry.insert(
            "locks".into(),
            json!({
                "global-lock": {
                    "locked-by-session": lock.session.as_str(),
                    "locked-time": lock.acquired.to_rfc3339(),
                }
            }),
        );
    }
    Value::Object(entry)
}

fn schema_entry(model: &DataModel) -> Value {
    json!({
        "identifier": model.name,
        "version": model.revision.clone().unwrap_or_default(),
        "format": "yin",
        "namespace": model.namespace,
        "location": ["NETCONF"],
    })
}

/// Build the `netconf-state` document.
///
/// `locks` carries the holder of each part; submodules are not listed as
/// schemas of their own.
pub fn netconf_state<'a>(
    locks: &[(Part, Option<LockInfo>)],
    models: impl IntoIterator<Item = &'a DataModel>,
) -> Value {
    let datastores: Vec<Value> = locks
        .iter()
        .map(|(part, lock)| datastore_entry(*part, lock.as_ref()))
        .collect();
    let schemas: Vec<Value> = models
        .into_iter()
        .filter(|m| !m.is_submodule())
        .map(schema_entry)
        .collect();

    json!({
        STATE_ROOT: {
            "datastores": { "datastore": datastores },
            "schemas": { "schema": schemas },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use chrono::Utc;

    #[test]
    fn test_builtin_model_parses() {
        let model = DataModel::from_yin_str(MONITORING_YIN).unwrap();
        assert_eq!(model.name, MODULE);
        assert_eq!(model.revision.as_deref(), Some("2010-10-04"));
        assert_eq!(model.rpcs, vec!["get-schema".to_string()]);
    }

    #[test]
    fn test_state_reports_locks_and_schemas() {
        let model = DataModel::from_yin_str(MONITORING_YIN).unwrap();
        let lock = LockInfo {
            session: SessionId::from("4"),
            acquired: Utc::now(),
        };
        let locks = vec![
            (Part::Running, Some(lock)),
            (Part::Startup, None),
            (Part::Candidate, None),
        ];
        let state = netconf_state(&locks, [&model]);

        let datastores = &state[STATE_ROOT]["datastores"]["datastore"];
        assert_eq!(datastores.as_array().unwrap().len(), 3);
        assert_eq!(datastores[0]["locks"]["global-lock"]["locked-by-session"], "4");
        assert!(datastores[1].get("locks").is_none());

        let schema = &state[STATE_ROOT]["schemas"]["schema"][0];
        assert_eq!(schema["identifier"], MODULE);
        assert_eq!(schema["format"], "yin");
    }
}
