//! Schema trees
//!
//! A [`SchemaNode`] is one YIN statement (keyword plus argument) with its
//! substatements. Consolidation produces an [`EffectiveSchema`]: an owned,
//! immutable tree rebuilt on every pass.

use std::collections::BTreeMap;

use serde::Serialize;

/// Statements that describe data nodes
pub const DATA_KEYWORDS: [&str; 6] = ["container", "leaf", "leaf-list", "list", "anydata", "anyxml"];

/// One schema statement with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaNode {
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    /// Module the node belongs to (set during consolidation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Namespace of that module
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    pub fn new(keyword: impl Into<String>, argument: Option<String>) -> Self {
        Self {
            keyword: keyword.into(),
            argument,
            module: None,
            namespace: None,
            children: Vec::new(),
        }
    }

    /// The statement argument, or an empty string
    pub fn name(&self) -> &str {
        self.argument.as_deref().unwrap_or("")
    }

    pub fn is(&self, keyword: &str) -> bool {
        self.keyword == keyword
    }

    pub fn is_data_node(&self) -> bool {
        DATA_KEYWORDS.contains(&self.keyword.as_str())
    }

    /// Choice and case are not visible in instance data
    pub fn is_transparent(&self) -> bool {
        self.is("choice") || self.is("case")
    }

    pub fn statements<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a SchemaNode> + 'a {
        self.children.iter().filter(move |c| c.keyword == keyword)
    }

    pub fn first(&self, keyword: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|c| c.keyword == keyword)
    }

    /// Argument of the first substatement with this keyword
    pub fn arg_of(&self, keyword: &str) -> Option<&str> {
        self.first(keyword).and_then(|c| c.argument.as_deref())
    }

    /// Key leaf names of a list
    pub fn keys(&self) -> Vec<&str> {
        self.arg_of("key")
            .map(|k| k.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.arg_of("default")
    }

    pub fn type_name(&self) -> Option<&str> {
        self.arg_of("type")
    }

    /// Find a data child by instance name (`name` or `module:name`),
    /// looking through choice and case statements
    pub fn data_child(&self, key: &str) -> Option<&SchemaNode> {
        find_data_child(&self.children, key)
    }

    /// Data children, with choice and case flattened away
    pub fn data_children(&self) -> Vec<&SchemaNode> {
        let mut out = Vec::new();
        collect_data_children(&self.children, &mut out);
        out
    }

    /// Set provenance on this subtree wherever it is not set yet
    pub fn claim(&mut self, module: &str, namespace: &str) {
        if self.module.is_none() {
            self.module = Some(module.to_string());
            self.namespace = Some(namespace.to_string());
        }
        for child in &mut self.children {
            child.claim(module, namespace);
        }
    }

    /// Number of statements in this subtree, including self
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(SchemaNode::size).sum::<usize>()
    }

    fn matches(&self, key: &str) -> bool {
        let (module, name) = split_key(key);
        self.name() == name && module.is_none_or(|m| self.module.as_deref() == Some(m))
    }
}

/// Split `module:name` into its parts
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once(':') {
        Some((module, name)) => (Some(module), name),
        None => (None, key),
    }
}

/// Find a data node among siblings, looking through choice and case
pub fn find_data_child<'a>(nodes: &'a [SchemaNode], key: &str) -> Option<&'a SchemaNode> {
    for node in nodes {
        if node.is_data_node() && node.matches(key) {
            return Some(node);
        }
        if node.is_transparent() {
            if let Some(found) = find_data_child(&node.children, key) {
                return Some(found);
            }
        }
    }
    None
}

fn collect_data_children<'a>(nodes: &'a [SchemaNode], out: &mut Vec<&'a SchemaNode>) {
    for node in nodes {
        if node.is_data_node() {
            out.push(node);
        } else if node.is_transparent() {
            collect_data_children(&node.children, out);
        }
    }
}

/// Schema of a datastore after consolidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveSchema {
    /// Base module name
    pub module: String,
    pub revision: Option<String>,
    pub namespace: String,
    pub prefix: String,
    /// Every module contributing nodes, by name, with its namespace
    pub modules: BTreeMap<String, String>,
    /// Top-level data nodes
    pub nodes: Vec<SchemaNode>,
    /// Top-level rpc and notification statements
    pub operations: Vec<SchemaNode>,
    pub rpcs: Vec<String>,
    pub notifications: Vec<String>,
    /// Model registry generation this schema was built from
    pub generation: u64,
}

impl EffectiveSchema {
    /// Top-level data node for an instance member name `module:node`
    pub fn root(&self, key: &str) -> Option<&SchemaNode> {
        let (module, _) = split_key(key);
        module?;
        find_data_child(&self.nodes, key)
    }

    /// Whether a top-level instance member belongs to this schema
    pub fn is_model_root(&self, key: &str) -> bool {
        self.root(key).is_some()
    }

    pub fn contains_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Resolve an identifier path such as `/toaster:toaster/darkness`
    pub fn node_at(&self, path: &str) -> Option<&SchemaNode> {
        let mut steps = path.split('/').filter(|s| !s.is_empty());
        let mut node = self.root(steps.next()?)?;
        for step in steps {
            node = node.data_child(step)?;
        }
        Some(node)
    }

    /// Total number of statements in the data tree
    pub fn size(&self) -> usize {
        self.nodes.iter().map(SchemaNode::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> SchemaNode {
        SchemaNode::new("leaf", Some(name.into()))
    }

    fn sample() -> EffectiveSchema {
        let mut choice = SchemaNode::new("choice", Some("how".into()));
        let mut case = SchemaNode::new("case", Some("fast".into()));
        case.children.push(leaf("speed"));
        choice.children.push(case);

        let mut top = SchemaNode::new("container", Some("toaster".into()));
        top.children.push(leaf("darkness"));
        top.children.push(choice);
        top.claim("toaster", "urn:toaster");

        let mut extra = leaf("color");
        extra.claim("paint", "urn:paint");
        top.children.push(extra);

        EffectiveSchema {
            module: "toaster".into(),
            revision: None,
            namespace: "urn:toaster".into(),
            prefix: "t".into(),
            modules: BTreeMap::from([("toaster".into(), "urn:toaster".into())]),
            nodes: vec![top],
            operations: Vec::new(),
            rpcs: Vec::new(),
            notifications: Vec::new(),
            generation: 0,
        }
    }

    #[test]
    fn test_root_requires_module() {
        let schema = sample();
        assert!(schema.is_model_root("toaster:toaster"));
        assert!(!schema.is_model_root("toaster"));
        assert!(!schema.is_model_root("paint:toaster"));
    }

    #[test]
    fn test_node_at_sees_through_choice() {
        let schema = sample();
        assert_eq!(schema.node_at("/toaster:toaster/speed").unwrap().keyword, "leaf");
        assert!(schema.node_at("/toaster:toaster/paint:color").is_some());
        assert!(schema.node_at("/toaster:toaster/missing").is_none());
    }

    #[test]
    fn test_claim_keeps_existing_provenance() {
        let schema = sample();
        let color = schema.node_at("/toaster:toaster/color").unwrap();
        assert_eq!(color.module.as_deref(), Some("paint"));
        assert_eq!(schema.nodes[0].data_children().len(), 3);
    }
}
