//! Model Registry
//!
//! Owns every loaded [`DataModel`], the search paths used to satisfy
//! imports lazily, and the feature flags. Every change bumps a generation
//! counter so datastores can tell when their effective schema went stale.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{NetconfError, Result};
use crate::model::{DataModel, ModelKey};

const YIN_EXTENSION: &str = "yin";

/// Registry of loaded data models
#[derive(Debug, Default)]
pub struct ModelRegistry {
    search_paths: Vec<PathBuf>,
    models: IndexMap<ModelKey, DataModel>,
    generation: u64,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a schema artifact without registering it
    pub fn load(path: impl AsRef<Path>) -> Result<DataModel> {
        DataModel::load(path)
    }

    /// Incremented on every model or feature change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    /// Add a directory scanned when a reference cannot be resolved
    pub fn register_search_path(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(NetconfError::InvalidConfig(format!(
                "search path {} is not a directory",
                dir.display()
            )));
        }
        if !self.search_paths.iter().any(|p| p == dir) {
            debug!("Added model search path {}", dir.display());
            self.search_paths.push(dir.to_path_buf());
        }
        Ok(())
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Load and register a model file; idempotent per (name, revision)
    pub fn add_model(&mut self, path: impl AsRef<Path>) -> Result<ModelKey> {
        let model = DataModel::load(path)?;
        Ok(self.insert(model))
    }

    /// Register a model parsed from YIN text
    pub fn add_model_yin(&mut self, content: &str) -> Result<ModelKey> {
        let model = DataModel::from_yin_str(content)?;
        Ok(self.insert(model))
    }

    /// Register an already parsed model; an existing (name, revision) wins
    pub fn insert(&mut self, model: DataModel) -> ModelKey {
        let key = model.key();
        if !self.models.contains_key(&key) {
            info!("Registered model {} revision {:?}", key.0, key.1);
            self.models.insert(key.clone(), model);
            self.touch();
        }
        key
    }

    /// Remove a model; datastores built on it fail consolidation afterwards
    pub fn remove_model(&mut self, name: &str, revision: Option<&str>) -> Result<DataModel> {
        let key = self
            .find_key(name, revision)
            .ok_or_else(|| NetconfError::UnknownModule(name.to_string()))?;
        let model = self
            .models
            .shift_remove(&key)
            .ok_or_else(|| NetconfError::UnknownModule(name.to_string()))?;
        self.touch();
        Ok(model)
    }

    fn find_key(&self, name: &str, revision: Option<&str>) -> Option<ModelKey> {
        self.models
            .keys()
            .filter(|(n, r)| n == name && (revision.is_none() || r.as_deref() == revision))
            .max_by(|a, b| a.1.cmp(&b.1))
            .cloned()
    }

    /// Registered model by name; without a revision the newest one
    pub fn get(&self, name: &str, revision: Option<&str>) -> Option<&DataModel> {
        let key = self.find_key(name, revision)?;
        self.models.get(&key)
    }

    pub fn models(&self) -> impl Iterator<Item = &DataModel> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Registered model, loading it from the search paths when needed
    pub fn resolve(&mut self, name: &str, revision: Option<&str>) -> Result<&DataModel> {
        if self.find_key(name, revision).is_none() {
            let path = self.search(name, revision).ok_or_else(|| {
                NetconfError::UnresolvedReference(match revision {
                    Some(rev) => format!("module {name}@{rev} not found"),
                    None => format!("module {name} not found"),
                })
            })?;
            let model = DataModel::load(&path)?;
            if model.name != name {
                return Err(NetconfError::UnresolvedReference(format!(
                    "{} defines {} instead of {name}",
                    path.display(),
                    model.name
                )));
            }
            self.insert(model);
        }

        let key = self
            .find_key(name, revision)
            .ok_or_else(|| NetconfError::UnresolvedReference(format!("module {name} not found")))?;
        self.models
            .get(&key)
            .ok_or_else(|| NetconfError::UnresolvedReference(format!("module {name} not found")))
    }

    /// Find `<name>.yin` or `<name>@<revision>.yin` in the search paths
    fn search(&self, name: &str, revision: Option<&str>) -> Option<PathBuf> {
        let mut best: Option<(String, PathBuf)> = None;

        for dir in &self.search_paths {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(YIN_EXTENSION) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let file_revision = match stem.split_once('@') {
                    Some((n, rev)) if n == name => rev.to_string(),
                    None if stem == name => String::new(),
                    _ => continue,
                };
                match revision {
                    Some(wanted) if file_revision == wanted => return Some(path),
                    Some(_) if !file_revision.is_empty() => continue,
                    _ => {}
                }
                if best.as_ref().is_none_or(|(rev, _)| file_revision > *rev) {
                    best = Some((file_revision, path));
                }
            }
        }
        best.map(|(_, path)| path)
    }

    /// Every model whose features belong to `module`: its revisions and
    /// the submodules they include
    fn feature_owners_mut(&mut self, module: &str) -> Result<Vec<&mut DataModel>> {
        let mut names: Vec<String> = Vec::new();
        for model in self.models.values().filter(|m| m.name == module) {
            names.push(model.name.clone());
            names.extend(model.includes.iter().cloned());
        }
        if names.is_empty() {
            return Err(NetconfError::UnknownModule(module.to_string()));
        }
        Ok(self
            .models
            .values_mut()
            .filter(|m| names.contains(&m.name))
            .collect())
    }

    fn set_feature(&mut self, module: &str, feature: &str, enabled: bool) -> Result<()> {
        let mut found = false;
        for model in self.feature_owners_mut(module)? {
            if let Some(f) = model.features.iter_mut().find(|f| f.name == feature) {
                f.enabled = enabled;
                found = true;
            }
        }
        if !found {
            return Err(NetconfError::UnknownFeature {
                module: module.to_string(),
                feature: feature.to_string(),
            });
        }
        self.touch();
        Ok(())
    }

    fn set_all_features(&mut self, module: &str, enabled: bool) -> Result<()> {
        for model in self.feature_owners_mut(module)? {
            for f in &mut model.features {
                f.enabled = enabled;
            }
        }
        self.touch();
        Ok(())
    }

    pub fn enable_feature(&mut self, module: &str, feature: &str) -> Result<()> {
        self.set_feature(module, feature, true)
    }

    pub fn disable_feature(&mut self, module: &str, feature: &str) -> Result<()> {
        self.set_feature(module, feature, false)
    }

    pub fn enable_all(&mut self, module: &str) -> Result<()> {
        self.set_all_features(module, true)
    }

    pub fn disable_all(&mut self, module: &str) -> Result<()> {
        self.set_all_features(module, false)
    }

    /// Flag of a feature in the newest registered revision of `module`
    pub fn is_enabled(&self, module: &str, feature: &str) -> Result<bool> {
        let model = self
            .get(module, None)
            .ok_or_else(|| NetconfError::UnknownModule(module.to_string()))?;
        let included = || {
            model
                .includes
                .iter()
                .filter_map(|inc| self.get(inc, None))
                .find_map(|sub| sub.feature(feature))
        };
        model
            .feature(feature)
            .or_else(included)
            .map(|f| f.enabled)
            .ok_or_else(|| NetconfError::UnknownFeature {
                module: module.to_string(),
                feature: feature.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"<module name="base" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <namespace uri="urn:base"/>
  <prefix value="b"/>
  <revision date="2020-01-01"/>
  <feature name="fast"/>
  <feature name="slow"/>
</module>"#;

    #[test]
    fn test_add_model_is_idempotent() {
        let mut registry = ModelRegistry::new();
        let key = registry.add_model_yin(BASE).unwrap();
        let generation = registry.generation();
        assert_eq!(registry.add_model_yin(BASE).unwrap(), key);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.generation(), generation);
    }

    #[test]
    fn test_features_default_disabled() {
        let mut registry = ModelRegistry::new();
        registry.add_model_yin(BASE).unwrap();
        assert!(!registry.is_enabled("base", "fast").unwrap());

        registry.enable_feature("base", "fast").unwrap();
        assert!(registry.is_enabled("base", "fast").unwrap());
        assert!(!registry.is_enabled("base", "slow").unwrap());

        registry.enable_all("base").unwrap();
        assert!(registry.is_enabled("base", "slow").unwrap());
        registry.disable_all("base").unwrap();
        assert!(!registry.is_enabled("base", "fast").unwrap());
    }

    const MAIN: &str = r#"<module name="main" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <namespace uri="urn:main"/>
  <prefix value="m"/>
  <include module="main-sub"/>
</module>"#;

    const MAIN_SUB: &str = r#"<submodule name="main-sub" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <belongs-to module="main"><prefix value="m"/></belongs-to>
  <feature name="turbo"/>
</submodule>"#;

    #[test]
    fn test_submodule_features_belong_to_module() {
        let mut registry = ModelRegistry::new();
        registry.add_model_yin(MAIN).unwrap();
        registry.add_model_yin(MAIN_SUB).unwrap();
        assert!(!registry.is_enabled("main", "turbo").unwrap());

        registry.enable_feature("main", "turbo").unwrap();
        assert!(registry.is_enabled("main", "turbo").unwrap());
        assert!(registry.is_enabled("main-sub", "turbo").unwrap());

        registry.disable_all("main").unwrap();
        assert!(!registry.is_enabled("main", "turbo").unwrap());
    }

    #[test]
    fn test_feature_errors() {
        let mut registry = ModelRegistry::new();
        registry.add_model_yin(BASE).unwrap();
        assert!(matches!(
            registry.enable_feature("nope", "fast"),
            Err(NetconfError::UnknownModule(_))
        ));
        assert!(matches!(
            registry.enable_feature("base", "warp"),
            Err(NetconfError::UnknownFeature { .. })
        ));
        assert!(matches!(
            registry.is_enabled("base", "warp"),
            Err(NetconfError::UnknownFeature { .. })
        ));
    }

    #[test]
    fn test_feature_change_bumps_generation() {
        let mut registry = ModelRegistry::new();
        registry.add_model_yin(BASE).unwrap();
        let before = registry.generation();
        registry.enable_feature("base", "fast").unwrap();
        assert!(registry.generation() > before);
    }

    #[test]
    fn test_resolve_from_search_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base@2020-01-01.yin"), BASE).unwrap();

        let mut registry = ModelRegistry::new();
        assert!(matches!(
            registry.resolve("base", None),
            Err(NetconfError::UnresolvedReference(_))
        ));

        registry.register_search_path(dir.path()).unwrap();
        let model = registry.resolve("base", Some("2020-01-01")).unwrap();
        assert_eq!(model.namespace, "urn:base");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_search_path_must_be_directory() {
        let mut registry = ModelRegistry::new();
        assert!(matches!(
            registry.register_search_path("/definitely/not/here"),
            Err(NetconfError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_remove_model() {
        let mut registry = ModelRegistry::new();
        registry.add_model_yin(BASE).unwrap();
        registry.remove_model("base", None).unwrap();
        assert!(registry.get("base", None).is_none());
        assert!(matches!(
            registry.remove_model("base", None),
            Err(NetconfError::UnknownModule(_))
        ));
    }
}
