//! Validation Engine
//!
//! Two optional stages run against proposed content:
//!
//! - the grammar stage checks members, datatypes, list keys and mandatory
//!   items against a grammar table (`<stem>-grammar.json`)
//! - the semantic stage checks cross-field rules (`<stem>-rules.json`)
//!
//! A stage whose artifact is absent passes.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{NetconfError, Result};
use crate::tree;
use crate::types::YangType;

const GRAMMAR_SUFFIX: &str = "-grammar.json";
const DEFAULTS_SUFFIX: &str = "-defaults.json";
const RULES_SUFFIX: &str = "-rules.json";

/// Locations of the companion validator artifacts of a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorPaths {
    #[serde(default)]
    pub grammar: Option<PathBuf>,
    #[serde(default)]
    pub defaults: Option<PathBuf>,
    #[serde(default)]
    pub rules: Option<PathBuf>,
}

impl ValidatorPaths {
    /// Look for companions next to `<dir>/<stem>.yin`.
    ///
    /// Returns the artifacts found and the paths that were missing.
    pub fn by_convention(model_path: &Path) -> (Self, Vec<PathBuf>) {
        let stem = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = model_path.parent().unwrap_or_else(|| Path::new("."));

        let mut missing = Vec::new();
        let mut locate = |suffix: &str| {
            let path = dir.join(format!("{stem}{suffix}"));
            if path.is_file() {
                Some(path)
            } else {
                missing.push(path);
                None
            }
        };

        let found = Self {
            grammar: locate(GRAMMAR_SUFFIX),
            defaults: locate(DEFAULTS_SUFFIX),
            rules: locate(RULES_SUFFIX),
        };
        (found, missing)
    }

    /// Explicit overrides win over conventional locations
    pub fn overridden_by(&self, overrides: &ValidatorPaths) -> ValidatorPaths {
        ValidatorPaths {
            grammar: overrides.grammar.clone().or_else(|| self.grammar.clone()),
            defaults: overrides.defaults.clone().or_else(|| self.defaults.clone()),
            rules: overrides.rules.clone().or_else(|| self.rules.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grammar.is_none() && self.defaults.is_none() && self.rules.is_none()
    }
}

/// Datatype grammar of one module
#[derive(Debug, Clone)]
pub struct GrammarTable {
    pub module_name: String,
    pub module_revision: String,
    /// Every known identifier path
    pub identifiers: HashSet<String>,
    /// Mapping from identifier path to YANG type
    pub types: HashMap<String, YangType>,
    /// Identifier paths that must be present when their parent is
    pub mandatory: Vec<String>,
    /// Key leaf names per list identifier
    pub key_mapping: HashMap<String, Vec<String>>,
}

/// Raw grammar file structure for deserialization
#[derive(Debug, Deserialize)]
struct RawGrammar {
    #[serde(rename = "module-name")]
    module_name: String,
    #[serde(rename = "module-revision", default)]
    module_revision: String,
    #[serde(alias = "items", default)]
    item: Vec<RawGrammarItem>,
    #[serde(rename = "key-mapping", default)]
    key_mapping: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawGrammarItem {
    identifier: String,
    #[serde(rename = "type")]
    item_type: Option<Value>,
    #[serde(default)]
    mandatory: bool,
}

impl GrammarTable {
    /// Parse a grammar table from the given path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Parse a grammar table from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawGrammar = serde_json::from_str(content)?;

        let mut identifiers = HashSet::with_capacity(raw.item.len());
        let mut types = HashMap::new();
        let mut mandatory = Vec::new();

        for item in raw.item {
            if let Some(ref type_val) = item.item_type {
                types.insert(item.identifier.clone(), YangType::from_grammar(type_val));
            }
            if item.mandatory {
                mandatory.push(item.identifier.clone());
            }
            identifiers.insert(item.identifier);
        }

        Ok(GrammarTable {
            module_name: raw.module_name,
            module_revision: raw.module_revision,
            identifiers,
            types,
            mandatory,
            key_mapping: raw.key_mapping,
        })
    }

    /// Get YANG type for an identifier path
    pub fn get_type(&self, identifier: &str) -> Option<&YangType> {
        self.types.get(identifier)
    }

    /// Get key leaf names for a list identifier
    pub fn get_keys(&self, list: &str) -> Option<&Vec<String>> {
        self.key_mapping.get(list)
    }

    fn knows(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    /// Check a document: members, types, keys, mandatory items
    pub fn check(&self, doc: &Value) -> Result<()> {
        let mut failure = None;
        tree::walk(doc, &mut |schema, instance, value| {
            if failure.is_some() {
                return;
            }
            failure = self.check_node(schema, instance, value).err();
        });
        if let Some(err) = failure {
            return Err(err);
        }

        for identifier in &self.mandatory {
            let Some((parent, _)) = identifier.rsplit_once('/') else {
                continue;
            };
            let parents = if parent.is_empty() {
                vec![doc]
            } else {
                tree::collect_values(doc, parent)
            };
            for node in parents {
                if tree::collect_values(node, &identifier[parent.len()..]).is_empty() {
                    return Err(NetconfError::validation(
                        "missing mandatory element",
                        identifier.as_str(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_node(&self, schema: &str, instance: &str, value: &Value) -> Result<()> {
        if !self.knows(schema) {
            return Err(NetconfError::validation("unknown element", instance));
        }

        if let Some(keys) = self.get_keys(schema) {
            let entry = value
                .as_object()
                .ok_or_else(|| NetconfError::validation("list entry must be an object", instance))?;
            for key in keys {
                if tree::find_member(entry, key).is_none() {
                    return Err(NetconfError::validation(
                        format!("list entry without key leaf {key}"),
                        instance,
                    ));
                }
            }
        }

        if let Some(yang_type) = self.get_type(schema) {
            let check = |v: &Value| {
                yang_type
                    .check(v)
                    .map_err(|msg| NetconfError::validation(msg, instance))
            };
            match value {
                // leaf-list
                Value::Array(items) if !matches!(yang_type, YangType::Empty) => {
                    items.iter().try_for_each(check)?
                }
                other => check(other)?,
            }
        }
        Ok(())
    }
}

/// Default values per identifier path
#[derive(Debug, Clone, Default)]
pub struct DefaultsTable {
    pub values: HashMap<String, Value>,
}

impl DefaultsTable {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let values: HashMap<String, Value> = serde_json::from_str(&content)?;
        Ok(Self { values })
    }

    pub fn get(&self, identifier: &str) -> Option<&Value> {
        self.values.get(identifier)
    }

    /// Every default must satisfy the type the grammar gives its leaf
    pub fn check(&self, grammar: &GrammarTable) -> Result<()> {
        for (identifier, value) in &self.values {
            if let Some(yang_type) = grammar.get_type(identifier) {
                yang_type
                    .check(value)
                    .map_err(|msg| NetconfError::validation(format!("default: {msg}"), identifier.as_str()))?;
            }
        }
        Ok(())
    }
}

/// One cross-field rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "assert", rename_all = "kebab-case")]
pub enum Rule {
    /// Leaf combination must be unique across list entries
    Unique { list: String, leaves: Vec<String> },
    /// When `when` is present, `then` must be present too
    Requires { when: String, then: String },
    /// Every value at `path` must occur among the values at `target`
    Leafref { path: String, target: String },
    /// Upper bound on list entries
    MaxElements { list: String, max: usize },
}

/// Semantic rule set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticRules {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl SemanticRules {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn check(&self, doc: &Value) -> Result<()> {
        self.rules.iter().try_for_each(|rule| rule.check(doc))
    }
}

impl Rule {
    fn check(&self, doc: &Value) -> Result<()> {
        match self {
            Rule::Unique { list, leaves } => {
                let mut seen = HashSet::new();
                for entry in tree::collect_values(doc, list) {
                    // entries lacking any of the leaves are not constrained
                    let Some(combo) = leaves
                        .iter()
                        .map(|leaf| tree::get_path(entry, leaf).map(Value::to_string))
                        .collect::<Option<Vec<String>>>()
                    else {
                        continue;
                    };
                    if !seen.insert(combo) {
                        return Err(NetconfError::validation(
                            format!("non-unique {} in list entries", leaves.join(", ")),
                            list.as_str(),
                        ));
                    }
                }
                Ok(())
            }
            Rule::Requires { when, then } => {
                if !tree::collect_values(doc, when).is_empty()
                    && tree::collect_values(doc, then).is_empty()
                {
                    return Err(NetconfError::validation(
                        format!("{when} requires {then}"),
                        then.as_str(),
                    ));
                }
                Ok(())
            }
            Rule::Leafref { path, target } => {
                let targets = tree::collect_values(doc, target);
                for value in tree::collect_values(doc, path) {
                    if !targets.contains(&value) {
                        return Err(NetconfError::validation(
                            format!("{value} does not refer to an existing {target}"),
                            path.as_str(),
                        ));
                    }
                }
                Ok(())
            }
            Rule::MaxElements { list, max } => {
                let count = tree::collect_values(doc, list).len();
                if count > *max {
                    return Err(NetconfError::validation(
                        format!("too many elements: {count} > {max}"),
                        list.as_str(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Loaded validators of one datastore
#[derive(Debug, Clone, Default)]
pub struct Validators {
    pub grammar: Option<GrammarTable>,
    pub defaults: Option<DefaultsTable>,
    pub rules: Option<SemanticRules>,
}

impl Validators {
    /// Load every artifact named in `paths`
    pub fn load(paths: &ValidatorPaths) -> Result<Self> {
        let parse_error = |path: &PathBuf, err: NetconfError| {
            NetconfError::Parse(format!("{}: {err}", path.display()))
        };

        let grammar = match &paths.grammar {
            Some(path) => Some(GrammarTable::from_file(path).map_err(|e| parse_error(path, e))?),
            None => None,
        };
        let defaults = match &paths.defaults {
            Some(path) => Some(DefaultsTable::from_file(path).map_err(|e| parse_error(path, e))?),
            None => None,
        };
        let rules = match &paths.rules {
            Some(path) => Some(SemanticRules::from_file(path).map_err(|e| parse_error(path, e))?),
            None => None,
        };

        Ok(Self {
            grammar,
            defaults,
            rules,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.grammar.is_none() && self.defaults.is_none() && self.rules.is_none()
    }

    /// Run the grammar stage then the semantic stage
    pub fn validate(&self, doc: &Value) -> Result<()> {
        if let Some(grammar) = &self.grammar {
            grammar.check(doc)?;
            if let Some(defaults) = &self.defaults {
                defaults.check(grammar)?;
            }
        }
        if let Some(rules) = &self.rules {
            rules.check(doc)?;
        }
        debug!("Validation passed");
        Ok(())
    }
}
