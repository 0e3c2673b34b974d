//! Schema consolidation
//!
//! Builds the [`EffectiveSchema`] of a datastore from its base model and
//! augment models: imports and includes are resolved, groupings expanded,
//! `if-feature` gating applied and augments grafted onto their targets.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::error::{NetconfError, Result};
use crate::model::{DataModel, Feature, ModelKey};
use crate::models::ModelRegistry;
use crate::schema::{EffectiveSchema, SchemaNode, split_key};

/// Statements that never reach the effective tree
const STRIPPED: [&str; 17] = [
    "grouping",
    "typedef",
    "import",
    "include",
    "revision",
    "prefix",
    "namespace",
    "yang-version",
    "belongs-to",
    "feature",
    "identity",
    "extension",
    "deviation",
    "if-feature",
    "augment",
    "refine",
    "when",
];

/// Top-level statements kept in the effective schema
const TOP_LEVEL: [&str; 9] = [
    "container",
    "leaf",
    "leaf-list",
    "list",
    "anydata",
    "anyxml",
    "choice",
    "rpc",
    "notification",
];

/// Statements a schema node path step can name
const SCHEMA_NODES: [&str; 13] = [
    "container",
    "leaf",
    "leaf-list",
    "list",
    "anydata",
    "anyxml",
    "choice",
    "case",
    "rpc",
    "action",
    "notification",
    "input",
    "output",
];

/// One step of a schema node path
#[derive(Debug)]
struct Step {
    module: Option<String>,
    name: String,
}

impl Step {
    fn matches(&self, node: &SchemaNode) -> bool {
        if !SCHEMA_NODES.contains(&node.keyword.as_str()) {
            return false;
        }
        let named = match &node.argument {
            Some(arg) => *arg == self.name,
            None => node.keyword == self.name,
        };
        named
            && self.module.as_ref().is_none_or(|m| {
                node.module.as_deref().is_none_or(|owner| owner == m)
            })
    }
}

fn relative_steps(path: &str) -> Vec<Step> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| Step {
            module: None,
            name: split_key(s).1.to_string(),
        })
        .collect()
}

fn locate_mut<'n>(nodes: &'n mut [SchemaNode], steps: &[Step]) -> Option<&'n mut SchemaNode> {
    let (first, rest) = steps.split_first()?;
    let node = nodes.iter_mut().find(|n| first.matches(n))?;
    if rest.is_empty() {
        Some(node)
    } else {
        locate_mut(&mut node.children, rest)
    }
}

fn apply_refine(nodes: &mut [SchemaNode], refine: &SchemaNode) -> Result<()> {
    let steps = relative_steps(refine.name());
    let target = locate_mut(nodes, &steps).ok_or_else(|| {
        NetconfError::UnresolvedReference(format!("refine target {}", refine.name()))
    })?;

    for stmt in &refine.children {
        match stmt.keyword.as_str() {
            "if-feature" => continue,
            "must" => target.children.push(stmt.clone()),
            keyword => {
                target.children.retain(|c| c.keyword != keyword);
                target.children.push(stmt.clone());
            }
        }
    }
    Ok(())
}

impl ModelRegistry {
    /// Consolidate a base model and its augment models.
    ///
    /// Missing imports and includes are loaded from the search paths first.
    pub fn effective_schema(
        &mut self,
        base: &ModelKey,
        augments: &[ModelKey],
    ) -> Result<EffectiveSchema> {
        let mut done = HashSet::new();
        for (name, revision) in std::iter::once(base).chain(augments) {
            self.resolve_dependencies(name, revision.as_deref(), &mut Vec::new(), &mut done)?;
        }
        Builder::new(self).build(base, augments)
    }

    fn resolve_dependencies(
        &mut self,
        name: &str,
        revision: Option<&str>,
        stack: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Result<()> {
        if let Some(pos) = stack.iter().position(|n| n == name) {
            return Err(NetconfError::CyclicReference(format!(
                "{} -> {name}",
                stack[pos..].join(" -> ")
            )));
        }
        if done.contains(name) {
            return Ok(());
        }

        let deps: Vec<(String, Option<String>)> = {
            let model = self.resolve(name, revision)?;
            model
                .imports
                .iter()
                .map(|i| (i.module.clone(), i.revision.clone()))
                .chain(model.includes.iter().map(|i| (i.clone(), None)))
                .collect()
        };

        stack.push(name.to_string());
        for (dep, rev) in &deps {
            self.resolve_dependencies(dep, rev.as_deref(), stack, done)?;
        }
        stack.pop();
        done.insert(name.to_string());
        Ok(())
    }
}

type Statement<'a> = (&'a DataModel, &'a SchemaNode);

struct Builder<'a> {
    registry: &'a ModelRegistry,
    /// Groupings being expanded, as `module:name`
    active: Vec<String>,
}

impl<'a> Builder<'a> {
    fn new(registry: &'a ModelRegistry) -> Self {
        Self {
            registry,
            active: Vec::new(),
        }
    }

    fn model(&self, name: &str, revision: Option<&str>) -> Result<&'a DataModel> {
        self.registry
            .get(name, revision)
            .ok_or_else(|| NetconfError::UnresolvedReference(format!("module {name} not loaded")))
    }

    /// Module owning the namespace of `ctx`
    fn owner(&self, ctx: &'a DataModel) -> &'a DataModel {
        match &ctx.belongs_to {
            Some(parent) => self.registry.get(parent, None).unwrap_or(ctx),
            None => ctx,
        }
    }

    /// Top-level statements of a model including its submodules
    fn body(&self, model: &'a DataModel) -> Result<Vec<Statement<'a>>> {
        let mut out: Vec<Statement<'a>> = model.tree.children.iter().map(|s| (model, s)).collect();
        for include in &model.includes {
            let sub = self.model(include, None)?;
            out.extend(self.body(sub)?);
        }
        Ok(out)
    }

    fn build(mut self, base: &ModelKey, augments: &[ModelKey]) -> Result<EffectiveSchema> {
        let base_model = self.model(&base.0, base.1.as_deref())?;
        if base_model.is_submodule() {
            return Err(NetconfError::InvalidConfig(format!(
                "{} is a submodule and cannot be a base model",
                base_model.name
            )));
        }

        let mut all = Vec::new();
        let mut pending = Vec::new();
        for (ctx, stmt) in self.body(base_model)? {
            if stmt.is("augment") {
                pending.push((ctx, stmt));
            } else if TOP_LEVEL.contains(&stmt.keyword.as_str()) {
                all.extend(self.expand(ctx, stmt, &mut Vec::new())?);
            }
        }
        for node in &mut all {
            node.claim(&base_model.name, &base_model.namespace);
        }

        for (name, revision) in augments {
            let model = self.model(name, revision.as_deref())?;
            pending.extend(self.body(model)?.into_iter().filter(|(_, s)| s.is("augment")));
        }
        self.apply_augments(&mut all, pending)?;

        let (operations, nodes): (Vec<SchemaNode>, Vec<SchemaNode>) = all
            .into_iter()
            .partition(|n| n.is("rpc") || n.is("notification"));

        let mut modules = BTreeMap::new();
        modules.insert(base_model.name.clone(), base_model.namespace.clone());
        for node in &nodes {
            collect_modules(node, &mut modules);
        }

        let names = |keyword: &str| -> Vec<String> {
            operations
                .iter()
                .filter(|n| n.is(keyword))
                .map(|n| n.name().to_string())
                .collect()
        };

        let schema = EffectiveSchema {
            module: base_model.name.clone(),
            revision: base_model.revision.clone(),
            namespace: base_model.namespace.clone(),
            prefix: base_model.prefix.clone(),
            modules,
            rpcs: names("rpc"),
            notifications: names("notification"),
            nodes,
            operations,
            generation: self.registry.generation(),
        };
        debug!(
            "Consolidated {} with {} augment models: {} statements",
            schema.module,
            augments.len(),
            schema.size()
        );
        Ok(schema)
    }

    fn expand(
        &mut self,
        ctx: &'a DataModel,
        node: &'a SchemaNode,
        scope: &mut Vec<&'a SchemaNode>,
    ) -> Result<Vec<SchemaNode>> {
        if STRIPPED.contains(&node.keyword.as_str()) {
            return Ok(Vec::new());
        }
        if !self.features_enabled(ctx, node)? {
            debug!("{} {} disabled by if-feature", node.keyword, node.name());
            return Ok(Vec::new());
        }
        if node.is("uses") {
            return self.expand_uses(ctx, node, scope);
        }

        let mut out = SchemaNode::new(node.keyword.clone(), node.argument.clone());
        scope.push(node);
        let children = self.expand_all(ctx, &node.children, scope);
        scope.pop();
        out.children = children?;
        Ok(vec![out])
    }

    fn expand_all(
        &mut self,
        ctx: &'a DataModel,
        nodes: &'a [SchemaNode],
        scope: &mut Vec<&'a SchemaNode>,
    ) -> Result<Vec<SchemaNode>> {
        let mut out = Vec::new();
        for child in nodes {
            out.extend(self.expand(ctx, child, scope)?);
        }
        Ok(out)
    }

    fn expand_uses(
        &mut self,
        ctx: &'a DataModel,
        uses: &'a SchemaNode,
        scope: &mut Vec<&'a SchemaNode>,
    ) -> Result<Vec<SchemaNode>> {
        let (prefix, name) = split_key(uses.name());
        let (gctx, grouping) = self.find_grouping(ctx, prefix, name, scope)?;

        let id = format!("{}:{name}", self.owner(gctx).name);
        if self.active.contains(&id) {
            return Err(NetconfError::CyclicReference(format!(
                "grouping {} -> {id}",
                self.active.join(" -> ")
            )));
        }

        let mut gscope = if self.owner(gctx).name == self.owner(ctx).name {
            scope.clone()
        } else {
            Vec::new()
        };
        gscope.push(grouping);

        self.active.push(id);
        let expanded = self.expand_all(gctx, &grouping.children, &mut gscope);
        self.active.pop();
        let mut nodes = expanded?;

        for refine in uses.statements("refine") {
            apply_refine(&mut nodes, refine)?;
        }

        for augment in uses.statements("augment") {
            if !self.features_enabled(ctx, augment)? {
                continue;
            }
            scope.push(augment);
            let content = self.expand_all(ctx, &augment.children, scope);
            scope.pop();
            let content = content?;

            let steps = relative_steps(augment.name());
            let target = locate_mut(&mut nodes, &steps).ok_or_else(|| {
                NetconfError::UnresolvedReference(format!("augment target {}", augment.name()))
            })?;
            target.children.extend(content);
        }

        Ok(nodes)
    }

    fn find_grouping(
        &self,
        ctx: &'a DataModel,
        prefix: Option<&str>,
        name: &str,
        scope: &[&'a SchemaNode],
    ) -> Result<Statement<'a>> {
        if let Some(prefix) = prefix {
            let module = ctx.module_for_prefix(prefix).ok_or_else(|| {
                NetconfError::UnresolvedReference(format!("prefix {prefix} in uses {prefix}:{name}"))
            })?;
            if module != self.owner(ctx).name {
                let target = self.model(module, ctx.import_revision(module))?;
                return self.module_grouping(target, name)?.ok_or_else(|| {
                    NetconfError::UnresolvedReference(format!("grouping {module}:{name}"))
                });
            }
        }

        for ancestor in scope.iter().rev() {
            if let Some(grouping) = ancestor.statements("grouping").find(|g| g.name() == name) {
                return Ok((ctx, grouping));
            }
        }

        self.module_grouping(ctx, name)?
            .ok_or_else(|| NetconfError::UnresolvedReference(format!("grouping {name}")))
    }

    /// Top-level grouping of a module or any of its submodules
    fn module_grouping(&self, ctx: &'a DataModel, name: &str) -> Result<Option<Statement<'a>>> {
        let owner = self.owner(ctx);
        let mut candidates = self.body(owner)?;
        if owner.name != ctx.name {
            candidates.extend(self.body(ctx)?);
        }
        Ok(candidates
            .into_iter()
            .find(|(_, s)| s.is("grouping") && s.name() == name))
    }

    fn features_enabled(&self, ctx: &'a DataModel, node: &SchemaNode) -> Result<bool> {
        for reference in node.statements("if-feature") {
            if !self.feature_enabled(ctx, reference.name(), &mut Vec::new())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn feature_enabled(
        &self,
        ctx: &'a DataModel,
        reference: &str,
        visiting: &mut Vec<String>,
    ) -> Result<bool> {
        let (prefix, name) = split_key(reference);
        let module = match prefix {
            Some(p) => ctx.module_for_prefix(p).ok_or_else(|| {
                NetconfError::UnresolvedReference(format!(
                    "prefix {p} in if-feature {reference} of {}",
                    ctx.name
                ))
            })?,
            None => ctx.owner(),
        };
        let model = self.model(module, ctx.import_revision(module))?;

        let Some((fctx, feature)) = self.find_feature(model, name) else {
            warn!("if-feature refers to unknown feature {module}:{name}, keeping the node");
            return Ok(true);
        };
        if !feature.enabled {
            return Ok(false);
        }

        let id = format!("{module}:{name}");
        if visiting.contains(&id) {
            return Err(NetconfError::CyclicReference(format!(
                "feature {} -> {id}",
                visiting.join(" -> ")
            )));
        }
        visiting.push(id);
        let mut enabled = true;
        for dependency in &feature.if_features {
            if !self.feature_enabled(fctx, dependency, visiting)? {
                enabled = false;
                break;
            }
        }
        visiting.pop();
        Ok(enabled)
    }

    fn find_feature(&self, model: &'a DataModel, name: &str) -> Option<(&'a DataModel, &'a Feature)> {
        if let Some(feature) = model.feature(name) {
            return Some((model, feature));
        }
        model
            .includes
            .iter()
            .filter_map(|inc| self.registry.get(inc, None))
            .find_map(|sub| sub.feature(name).map(|f| (sub, f)))
    }

    /// Resolve an absolute augment path in the augmenting module's context
    fn absolute_steps(&self, ctx: &'a DataModel, path: &str) -> Result<Vec<Step>> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                let (prefix, name) = split_key(s);
                let module = match prefix {
                    Some(p) => ctx.module_for_prefix(p).ok_or_else(|| {
                        NetconfError::UnresolvedReference(format!("prefix {p} in augment {path}"))
                    })?,
                    None => self.owner(ctx).name.as_str(),
                };
                Ok(Step {
                    module: Some(module.to_string()),
                    name: name.to_string(),
                })
            })
            .collect()
    }

    fn apply_augments(
        &mut self,
        all: &mut [SchemaNode],
        mut pending: Vec<Statement<'a>>,
    ) -> Result<()> {
        while !pending.is_empty() {
            let mut progress = false;
            let mut remaining = Vec::new();

            for (ctx, augment) in pending {
                if !self.features_enabled(ctx, augment)? {
                    debug!("Augment {} of {} disabled by if-feature", augment.name(), ctx.name);
                    progress = true;
                    continue;
                }
                let steps = self.absolute_steps(ctx, augment.name())?;
                if locate_mut(all, &steps).is_none() {
                    remaining.push((ctx, augment));
                    continue;
                }

                let mut scope = vec![augment];
                let mut content = self.expand_all(ctx, &augment.children, &mut scope)?;
                let owner = self.owner(ctx);
                for node in &mut content {
                    node.claim(&owner.name, &owner.namespace);
                }
                if let Some(target) = locate_mut(all, &steps) {
                    target.children.extend(content);
                }
                progress = true;
            }

            if !progress {
                if let Some((_, augment)) = remaining.first() {
                    return Err(NetconfError::UnresolvedReference(format!(
                        "augment target {}",
                        augment.name()
                    )));
                }
            }
            pending = remaining;
        }
        Ok(())
    }
}

fn collect_modules(node: &SchemaNode, modules: &mut BTreeMap<String, String>) {
    if let (Some(module), Some(namespace)) = (&node.module, &node.namespace) {
        if !modules.contains_key(module) {
            modules.insert(module.clone(), namespace.clone());
        }
    }
    for child in &node.children {
        collect_modules(child, modules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = r#"xmlns="urn:ietf:params:xml:ns:yang:yin:1""#;

    fn module(name: &str, body: &str) -> String {
        format!(
            r#"<module name="{name}" {HEAD}><namespace uri="urn:{name}"/><prefix value="{name}"/>{body}</module>"#
        )
    }

    fn schema(registry: &mut ModelRegistry, base: &str, augments: &[&str]) -> Result<EffectiveSchema> {
        let base = (base.to_string(), None);
        let augments: Vec<ModelKey> = augments.iter().map(|a| (a.to_string(), None)).collect();
        registry.effective_schema(&base, &augments)
    }

    #[test]
    fn test_uses_with_refine() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module(
                "sys",
                r#"<grouping name="endpoint">
                     <leaf name="address"><type name="string"/></leaf>
                     <leaf name="port"><type name="uint16"/><default value="830"/></leaf>
                   </grouping>
                   <container name="server">
                     <uses name="endpoint">
                       <refine target-node="port"><default value="6513"/></refine>
                     </uses>
                   </container>"#,
            ))
            .unwrap();

        let schema = schema(&mut registry, "sys", &[]).unwrap();
        let port = schema.node_at("/sys:server/port").unwrap();
        assert_eq!(port.default_value(), Some("6513"));
        assert_eq!(port.module.as_deref(), Some("sys"));
        assert!(schema.node_at("/sys:server/address").is_some());
        assert!(schema.nodes[0].first("uses").is_none());
    }

    #[test]
    fn test_grouping_cycle() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module(
                "loop",
                r#"<grouping name="a"><container name="x"><uses name="b"/></container></grouping>
                   <grouping name="b"><uses name="a"/></grouping>
                   <container name="top"><uses name="a"/></container>"#,
            ))
            .unwrap();
        assert!(matches!(
            schema(&mut registry, "loop", &[]),
            Err(NetconfError::CyclicReference(_))
        ));
    }

    #[test]
    fn test_import_cycle() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module("a", r#"<import module="b"><prefix value="b"/></import>"#))
            .unwrap();
        registry
            .add_model_yin(&module("b", r#"<import module="a"><prefix value="a"/></import>"#))
            .unwrap();
        assert!(matches!(
            schema(&mut registry, "a", &[]),
            Err(NetconfError::CyclicReference(_))
        ));
    }

    #[test]
    fn test_missing_import() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module("a", r#"<import module="ghost"><prefix value="g"/></import>"#))
            .unwrap();
        assert!(matches!(
            schema(&mut registry, "a", &[]),
            Err(NetconfError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_feature_gating() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module(
                "dev",
                r#"<feature name="turbo"/>
                   <feature name="boost"><if-feature name="turbo"/></feature>
                   <container name="cfg">
                     <leaf name="speed"><if-feature name="turbo"/><type name="uint8"/></leaf>
                     <leaf name="extra"><if-feature name="dev:boost"/><type name="uint8"/></leaf>
                     <leaf name="odd"><if-feature name="warp"/><type name="uint8"/></leaf>
                   </container>"#,
            ))
            .unwrap();

        let disabled = schema(&mut registry, "dev", &[]).unwrap();
        assert!(disabled.node_at("/dev:cfg/speed").is_none());
        assert!(disabled.node_at("/dev:cfg/odd").is_some());

        registry.enable_feature("dev", "boost").unwrap();
        let dependent = schema(&mut registry, "dev", &[]).unwrap();
        assert!(dependent.node_at("/dev:cfg/extra").is_none());

        registry.enable_feature("dev", "turbo").unwrap();
        let enabled = schema(&mut registry, "dev", &[]).unwrap();
        assert!(enabled.node_at("/dev:cfg/speed").is_some());
        assert!(enabled.node_at("/dev:cfg/extra").is_some());

        registry.disable_all("dev").unwrap();
        let again = schema(&mut registry, "dev", &[]).unwrap();
        assert_eq!(again.nodes, disabled.nodes);
    }

    #[test]
    fn test_unknown_if_feature_prefix() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module(
                "dev",
                r#"<leaf name="x"><if-feature name="nope:f"/><type name="string"/></leaf>"#,
            ))
            .unwrap();
        assert!(matches!(
            schema(&mut registry, "dev", &[]),
            Err(NetconfError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_augment_from_other_module() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module("base", r#"<container name="sys"/>"#))
            .unwrap();
        registry
            .add_model_yin(&module(
                "ext",
                r#"<import module="base"><prefix value="b"/></import>
                   <augment target-node="/b:sys"><container name="clock"/></augment>
                   <augment target-node="/b:sys/clock"><leaf name="tz"><type name="string"/></leaf></augment>"#,
            ))
            .unwrap();

        let schema = schema(&mut registry, "base", &["ext"]).unwrap();
        let clock = schema.node_at("/base:sys/ext:clock").unwrap();
        assert_eq!(clock.module.as_deref(), Some("ext"));
        assert_eq!(clock.namespace.as_deref(), Some("urn:ext"));
        assert!(schema.node_at("/base:sys/clock/tz").is_some());
        assert_eq!(schema.modules.get("ext").map(String::as_str), Some("urn:ext"));
    }

    #[test]
    fn test_unresolved_augment_target() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module("base", r#"<container name="sys"/>"#))
            .unwrap();
        registry
            .add_model_yin(&module(
                "ext",
                r#"<import module="base"><prefix value="b"/></import>
                   <augment target-node="/b:nowhere"><leaf name="x"/></augment>"#,
            ))
            .unwrap();
        assert!(matches!(
            schema(&mut registry, "base", &["ext"]),
            Err(NetconfError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_submodule_and_imported_grouping() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module(
                "types",
                r#"<grouping name="named"><leaf name="name"><type name="string"/></leaf></grouping>"#,
            ))
            .unwrap();
        registry
            .add_model_yin(&format!(
                r#"<submodule name="main-sub" {HEAD}>
                     <belongs-to module="main"><prefix value="main"/></belongs-to>
                     <import module="types"><prefix value="t"/></import>
                     <container name="extra"><uses name="t:named"/></container>
                   </submodule>"#
            ))
            .unwrap();
        registry
            .add_model_yin(&module(
                "main",
                r#"<include module="main-sub"/><container name="core"/><rpc name="reboot"/>"#,
            ))
            .unwrap();

        let schema = schema(&mut registry, "main", &[]).unwrap();
        assert!(schema.is_model_root("main:core"));
        assert!(schema.is_model_root("main:extra"));
        assert!(schema.node_at("/main:extra/name").is_some());
        assert_eq!(schema.rpcs, vec!["reboot"]);
        assert!(schema.nodes.iter().all(|n| !n.is("rpc")));
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let mut registry = ModelRegistry::new();
        registry
            .add_model_yin(&module("base", r#"<container name="sys"><leaf name="x"/></container>"#))
            .unwrap();
        let first = schema(&mut registry, "base", &[]).unwrap();
        let second = schema(&mut registry, "base", &[]).unwrap();
        assert_eq!(first, second);
    }
}
