//! Engine configuration
//!
//! A TOML description of the models, feature settings and datastores a
//! server starts with:
//!
//! ```toml
//! search_paths = ["/usr/share/yang"]
//! models = ["/usr/share/yang/ietf-interfaces.yin"]
//!
//! [[features]]
//! module = "ietf-interfaces"
//! enable = ["arbitrary-names"]
//!
//! [[datastore]]
//! kind = "file"
//! model = "/etc/device/device.yin"
//! file = "/var/lib/device/config.json"
//! lock_required = ["startup"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::datastore::{Datastore, DatastoreId};
use crate::error::{NetconfError, Result};
use crate::registry::Registry;
use crate::store::{Part, StoreKind};
use crate::validation::ValidatorPaths;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directories searched for imported models
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    /// Models registered up front, usable by imports and augments
    #[serde(default)]
    pub models: Vec<PathBuf>,
    #[serde(default)]
    pub features: Vec<FeatureConfig>,
    #[serde(default, rename = "datastore")]
    pub datastores: Vec<DatastoreConfig>,
}

/// Feature settings of one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub module: String,
    /// Enable or disable every feature first
    #[serde(default)]
    pub all: Option<bool>,
    #[serde(default)]
    pub enable: Vec<String>,
    #[serde(default)]
    pub disable: Vec<String>,
}

fn enabled() -> bool {
    true
}

/// One datastore definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// `empty` or `file`
    pub kind: String,
    pub model: PathBuf,
    #[serde(default)]
    pub augments: Vec<PathBuf>,
    /// Backing file of a file datastore
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "enabled")]
    pub validation: bool,
    #[serde(default)]
    pub lock_required: Vec<Part>,
    /// Companion artifact overrides
    #[serde(default)]
    pub validators: ValidatorPaths,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            NetconfError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl DatastoreConfig {
    fn definition(&self) -> Result<Datastore> {
        let kind: StoreKind = self.kind.parse()?;
        if kind == StoreKind::Custom {
            return Err(NetconfError::UnsupportedType(
                "custom datastores need a backend and cannot be configured from a file".into(),
            ));
        }

        let mut ds = Datastore::new(kind, &self.model).with_validators(self.validators.clone());
        if let Some(file) = &self.file {
            ds = ds.with_file(file);
        }
        for augment in &self.augments {
            ds = ds.add_augment(augment);
        }
        for part in &self.lock_required {
            ds = ds.require_lock(*part);
        }
        if !self.validation {
            ds = ds.disable_validation();
        }
        Ok(ds)
    }
}

impl Registry {
    /// Build a ready registry from a configuration.
    ///
    /// Returns the registry and the ids of the configured datastores in
    /// order. Any failure is fatal.
    pub fn bootstrap(config: &EngineConfig) -> Result<(Self, Vec<DatastoreId>)> {
        let registry = Registry::new()?;
        for dir in &config.search_paths {
            registry.register_search_path(dir)?;
        }
        for model in &config.models {
            registry.add_model(model)?;
        }

        let mut ids = Vec::with_capacity(config.datastores.len());
        for datastore in &config.datastores {
            ids.push(registry.init(datastore.definition()?)?);
        }

        // models of the datastores are registered now, so features resolve
        for settings in &config.features {
            match settings.all {
                Some(true) => registry.enable_all(&settings.module)?,
                Some(false) => registry.disable_all(&settings.module)?,
                None => {}
            }
            for feature in &settings.enable {
                registry.enable_feature(&settings.module, feature)?;
            }
            for feature in &settings.disable {
                registry.disable_feature(&settings.module, feature)?;
            }
        }

        registry.consolidate()?;
        info!("Bootstrapped {} datastores", ids.len());
        Ok((registry, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
search_paths = ["/usr/share/yang"]

[[features]]
module = "toaster"
all = true
disable = ["wheat-bread"]

[[datastore]]
kind = "file"
model = "/etc/toaster/toaster.yin"
file = "/var/lib/toaster.json"
lock_required = ["startup", "candidate"]

[datastore.validators]
grammar = "/etc/toaster/grammar.json"

[[datastore]]
kind = "empty"
model = "/etc/toaster/sensors.yin"
validation = false
"#;

    #[test]
    fn test_parse_config() {
        let config = EngineConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.search_paths, vec![PathBuf::from("/usr/share/yang")]);
        assert_eq!(config.features[0].all, Some(true));
        assert_eq!(config.features[0].disable, vec!["wheat-bread".to_string()]);

        let file = &config.datastores[0];
        assert_eq!(file.kind, "file");
        assert!(file.validation);
        assert_eq!(file.lock_required, vec![Part::Startup, Part::Candidate]);
        assert_eq!(
            file.validators.grammar,
            Some(PathBuf::from("/etc/toaster/grammar.json"))
        );

        let empty = &config.datastores[1];
        assert_eq!(empty.kind, "empty");
        assert!(!empty.validation);
        assert!(empty.file.is_none());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let config =
            EngineConfig::from_toml_str("[[datastore]]\nkind = \"sql\"\nmodel = \"m.yin\"\n")
                .unwrap();
        assert!(matches!(
            Registry::bootstrap(&config),
            Err(NetconfError::UnsupportedType(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("search_paths = 3"),
            Err(NetconfError::Toml(_))
        ));
    }

    #[test]
    fn test_custom_kind_needs_code() {
        let config =
            EngineConfig::from_toml_str("[[datastore]]\nkind = \"custom\"\nmodel = \"m.yin\"\n")
                .unwrap();
        assert!(matches!(
            Registry::bootstrap(&config),
            Err(NetconfError::UnsupportedType(_))
        ));
    }
}
