//! Data models loaded from YIN
//!
//! A [`DataModel`] keeps the raw statement tree of one module or submodule
//! plus the metadata consolidation needs: prefixes, imports, includes and
//! features with their enabled flags.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{NetconfError, Result};
use crate::schema::SchemaNode;
use crate::validation::ValidatorPaths;
use crate::yin;

/// Registry key of a model: name plus optional revision
pub type ModelKey = (String, Option<String>);

/// A feature declared by a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub enabled: bool,
    /// `if-feature` arguments of the feature statement itself
    pub if_features: Vec<String>,
}

/// An `import` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub prefix: String,
    pub revision: Option<String>,
}

/// Parsed YANG module or submodule
#[derive(Debug, Clone)]
pub struct DataModel {
    pub name: String,
    /// Empty for submodules; they share their parent's namespace
    pub namespace: String,
    pub prefix: String,
    /// Newest revision date, if any
    pub revision: Option<String>,
    /// Parent module for submodules
    pub belongs_to: Option<String>,
    pub features: Vec<Feature>,
    pub imports: Vec<Import>,
    pub includes: Vec<String>,
    pub rpcs: Vec<String>,
    pub notifications: Vec<String>,
    /// Raw statement tree
    pub tree: SchemaNode,
    /// Source file, when loaded from disk
    pub path: Option<PathBuf>,
    /// Companion validator artifacts found next to the source file
    pub validators: ValidatorPaths,
    /// Companion artifacts that were looked for and not found
    pub missing: Vec<PathBuf>,
}

impl DataModel {
    /// Parse a model from YIN text
    pub fn from_yin_str(content: &str) -> Result<Self> {
        let tree = yin::parse(content)?;
        let name = tree.name().to_string();
        if name.is_empty() {
            return Err(NetconfError::Parse("YIN: module without a name".into()));
        }

        let submodule = tree.is("submodule");
        let belongs = tree.first("belongs-to");
        let prefix = if submodule {
            belongs.and_then(|b| b.arg_of("prefix"))
        } else {
            tree.arg_of("prefix")
        }
        .unwrap_or_default()
        .to_string();

        let namespace = if submodule {
            String::new()
        } else {
            tree.arg_of("namespace")
                .ok_or_else(|| NetconfError::Parse(format!("module {name} has no namespace")))?
                .to_string()
        };

        let revision = tree
            .statements("revision")
            .filter_map(|r| r.argument.clone())
            .max();

        let features = tree
            .statements("feature")
            .map(|f| Feature {
                name: f.name().to_string(),
                enabled: false,
                if_features: f
                    .statements("if-feature")
                    .map(|i| i.name().to_string())
                    .collect(),
            })
            .collect();

        let imports = tree
            .statements("import")
            .map(|i| Import {
                module: i.name().to_string(),
                prefix: i.arg_of("prefix").unwrap_or_default().to_string(),
                revision: i.arg_of("revision-date").map(str::to_string),
            })
            .collect();

        let names = |keyword: &str| -> Vec<String> {
            tree.statements(keyword)
                .map(|s| s.name().to_string())
                .collect()
        };

        Ok(Self {
            belongs_to: belongs.map(|b| b.name().to_string()),
            includes: names("include"),
            rpcs: names("rpc"),
            notifications: names("notification"),
            name,
            namespace,
            prefix,
            revision,
            features,
            imports,
            path: None,
            validators: ValidatorPaths::default(),
            missing: Vec::new(),
            tree,
        })
    }

    /// Load a model from a YIN file and discover its companion artifacts
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            NetconfError::InvalidConfig(format!("cannot read model {}: {e}", path.display()))
        })?;
        let mut model = Self::from_yin_str(&content)?;

        let (found, missing) = ValidatorPaths::by_convention(path);
        for artifact in &missing {
            warn!(
                "{}",
                NetconfError::MissingArtifact {
                    model: model.name.clone(),
                    path: artifact.clone(),
                }
            );
        }
        debug!(
            "Loaded model {} (revision {:?}) from {}",
            model.name,
            model.revision,
            path.display()
        );

        model.path = Some(path.to_path_buf());
        model.validators = found;
        model.missing = missing;
        Ok(model)
    }

    pub fn key(&self) -> ModelKey {
        (self.name.clone(), self.revision.clone())
    }

    pub fn is_submodule(&self) -> bool {
        self.belongs_to.is_some()
    }

    /// Module owning this model's namespace
    pub fn owner(&self) -> &str {
        self.belongs_to.as_deref().unwrap_or(&self.name)
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Module a prefix refers to in this model's context
    pub fn module_for_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == self.prefix {
            return Some(self.owner());
        }
        self.imports
            .iter()
            .find(|i| i.prefix == prefix)
            .map(|i| i.module.as_str())
    }

    /// Revision pinned by the import of `module`, if any
    pub fn import_revision(&self, module: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|i| i.module == module)
            .and_then(|i| i.revision.as_deref())
    }

    /// Companion artifacts that were not found, as errors
    pub fn missing_artifacts(&self) -> Vec<NetconfError> {
        self.missing
            .iter()
            .map(|path| NetconfError::MissingArtifact {
                model: self.name.clone(),
                path: path.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"<module name="toaster" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <namespace uri="urn:toaster"/>
  <prefix value="t"/>
  <import module="ietf-inet-types"><prefix value="inet"/><revision-date date="2013-07-15"/></import>
  <include module="toaster-types"/>
  <revision date="2008-01-01"/>
  <revision date="2009-11-20"/>
  <feature name="heater"/>
  <feature name="turbo"><if-feature name="heater"/></feature>
  <rpc name="make-toast"/>
  <notification name="toast-done"/>
</module>"#;

    const SUBMODULE: &str = r#"<submodule name="toaster-types" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <belongs-to module="toaster"><prefix value="t"/></belongs-to>
</submodule>"#;

    #[test]
    fn test_module_metadata() {
        let model = DataModel::from_yin_str(MODULE).unwrap();
        assert_eq!(model.name, "toaster");
        assert_eq!(model.namespace, "urn:toaster");
        assert_eq!(model.revision.as_deref(), Some("2009-11-20"));
        assert_eq!(model.includes, vec!["toaster-types"]);
        assert_eq!(model.rpcs, vec!["make-toast"]);
        assert_eq!(model.notifications, vec!["toast-done"]);
        assert_eq!(model.feature("turbo").unwrap().if_features, vec!["heater"]);
        assert!(!model.feature("heater").unwrap().enabled);
        assert_eq!(model.module_for_prefix("inet"), Some("ietf-inet-types"));
        assert_eq!(model.module_for_prefix("t"), Some("toaster"));
        assert_eq!(model.import_revision("ietf-inet-types"), Some("2013-07-15"));
    }

    #[test]
    fn test_submodule_prefix_points_to_parent() {
        let model = DataModel::from_yin_str(SUBMODULE).unwrap();
        assert!(model.is_submodule());
        assert_eq!(model.module_for_prefix("t"), Some("toaster"));
        assert!(model.namespace.is_empty());
    }

    #[test]
    fn test_module_without_namespace_rejected() {
        let yin = r#"<module name="x" xmlns="urn:ietf:params:xml:ns:yang:yin:1"><prefix value="x"/></module>"#;
        assert!(matches!(
            DataModel::from_yin_str(yin),
            Err(NetconfError::Parse(_))
        ));
    }

    #[test]
    fn test_load_reports_missing_companions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toaster.yin");
        fs::write(&path, MODULE).unwrap();
        fs::write(dir.path().join("toaster-grammar.json"), "{}").unwrap();

        let model = DataModel::load(&path).unwrap();
        assert!(model.validators.grammar.is_some());
        assert_eq!(model.missing.len(), 2);
        assert!(
            model
                .missing_artifacts()
                .iter()
                .all(|e| matches!(e, NetconfError::MissingArtifact { .. }))
        );
    }
}
