//! Reference Resolution
//!
//! Produces a [`DereferencedSchema`] by replacing every `$ref` with a deep
//! copy of its target. Identities currently being resolved live on an explicit
//! stack so a cycle is reported with its full trace instead of overflowing.
//!
//! Supported reference forms:
//! - absolute URIs matching a document `$id`
//! - relative paths, joined against the current `$id` and then the repository path
//! - `#/json/pointer` and `#anchor` fragments, local or on another document

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::config::ResolutionConfig;
use crate::error::ResolutionError;
use crate::schema::{
    strip_fragment, AdditionalProperties, ConstraintNode, PathSegment, PropertyPath, SchemaDocument,
};
use crate::store::{Corpus, Lookup};
use crate::version::VersionTriple;

/// How a single `$ref` was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EdgeResolution {
    Resolved {
        /// Identity of the target node (`uri` or `uri#fragment`)
        identity: String,
        /// Identity of the document holding the target
        document: String,
    },
    Unresolved,
    Ambiguous {
        candidates: Vec<String>,
    },
    Cyclic,
}

/// A `$ref` edge between two identities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    /// Identity the reference was written in
    pub source: String,
    /// The reference as written
    pub target: String,
    /// Property path of the reference inside the source
    pub location: String,
    pub resolution: EdgeResolution,
}

/// A document whose references have all been replaced by their targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DereferencedSchema {
    pub identity: String,
    pub path: String,
    pub version: VersionTriple,
    pub root: ConstraintNode,
    /// Every edge followed while resolving, in traversal order
    pub edges: Vec<ReferenceEdge>,
}

impl DereferencedSchema {
    /// Wrap an already reference-free tree, mostly useful for comparing
    /// ad-hoc schemas
    pub fn from_tree(identity: impl Into<String>, version: VersionTriple, root: ConstraintNode) -> Self {
        let identity = identity.into();
        Self {
            path: identity.clone(),
            identity,
            version,
            root,
            edges: Vec::new(),
        }
    }
}

/// Target of a reference, located but not yet dereferenced
struct Target<'d> {
    identity: String,
    document: &'d SchemaDocument,
    node: ConstraintNode,
}

/// Mutable state of one `resolve` call
#[derive(Default)]
struct Visitation {
    /// Identities currently being resolved, outermost first
    stack: Vec<String>,
    /// Fully dereferenced targets, reused for diamond-shaped graphs
    resolved: HashMap<String, ConstraintNode>,
    edges: Vec<ReferenceEdge>,
}

/// Resolves documents against a read-only corpus
pub struct ReferenceResolver<'c> {
    corpus: &'c Corpus,
    max_depth: usize,
}

impl<'c> ReferenceResolver<'c> {
    pub fn new(corpus: &'c Corpus, config: &ResolutionConfig) -> Self {
        Self {
            corpus,
            max_depth: config.max_depth.max(1),
        }
    }

    /// Dereference `doc`. The document itself is never modified.
    pub fn resolve(&self, doc: &SchemaDocument) -> Result<DereferencedSchema, ResolutionError> {
        let mut state = Visitation::default();
        state.stack.push(doc.identity());

        let root = self.dereference(&doc.root, doc, &PropertyPath::root(), &mut state)?;
        debug!(
            document = %doc.identity(),
            edges = state.edges.len(),
            "resolved schema document"
        );

        Ok(DereferencedSchema {
            identity: doc.identity(),
            path: doc.path_str(),
            version: doc.folder_version,
            root,
            edges: state.edges,
        })
    }

    /// Classify each reference of `doc` without dereferencing it.
    ///
    /// Targets inside `doc` itself (`#/$defs/...`, anchors) are searched for
    /// further references, so a dependency declared only under `$defs` still
    /// yields an edge to the other document. Such edges carry the location of
    /// the reference that led to them. Definitions nothing points at are
    /// searched last and reported at the document root.
    pub fn outgoing_edges(&self, doc: &SchemaDocument) -> Vec<ReferenceEdge> {
        let source = doc.identity();
        let mut edges = Vec::new();
        let mut expanded: HashSet<(String, String)> = HashSet::new();
        let mut reached: HashSet<String> = HashSet::new();
        let mut pending: VecDeque<(PropertyPath, String)> =
            doc.references.iter().map(|r| (r.path.clone(), r.target.clone())).collect();
        let mut definitions_seeded = false;

        loop {
            while let Some((path, reference)) = pending.pop_front() {
                let resolution = match self.locate(&reference, doc, &path) {
                    Ok(target) if target.identity == source => EdgeResolution::Cyclic,
                    Ok(target) => {
                        let document = target.document.identity();
                        if document == source {
                            reached.insert(target.identity.clone());
                            if expanded.insert((path.to_string(), target.identity.clone())) {
                                pending.extend(target.node.references().into_iter().map(|(_, nested)| (path.clone(), nested)));
                            }
                        }
                        EdgeResolution::Resolved {
                            identity: target.identity,
                            document,
                        }
                    }
                    Err(ResolutionError::Ambiguous { candidates, .. }) => EdgeResolution::Ambiguous { candidates },
                    Err(_) => EdgeResolution::Unresolved,
                };
                edges.push(ReferenceEdge {
                    source: source.clone(),
                    target: reference,
                    location: path.to_string(),
                    resolution,
                });
            }

            if definitions_seeded {
                break;
            }
            definitions_seeded = true;
            let root = PropertyPath::root();
            for pointer in definition_pointers(&doc.raw) {
                if let Ok(target) = self.locate(&pointer, doc, &root) {
                    if reached.insert(target.identity.clone()) {
                        pending.extend(target.node.references().into_iter().map(|(_, nested)| (root.clone(), nested)));
                    }
                }
            }
        }
        edges
    }

    fn dereference<'d>(
        &self,
        node: &ConstraintNode,
        context: &'d SchemaDocument,
        path: &PropertyPath,
        state: &mut Visitation,
    ) -> Result<ConstraintNode, ResolutionError>
    where
        'c: 'd,
    {
        let reference = match node {
            ConstraintNode::Reference(r) => r,
            _ => return self.dereference_children(node, context, path, state),
        };

        let target = self.locate(&reference.target, context, path)?;

        if let Some(pos) = state.stack.iter().position(|id| *id == target.identity) {
            let mut cycle = state.stack[pos..].to_vec();
            cycle.push(target.identity);
            return Err(ResolutionError::Cyclic { cycle });
        }
        if state.stack.len() >= self.max_depth {
            return Err(ResolutionError::DepthExceeded {
                max_depth: self.max_depth,
                location: format!("{} at {}", context.identity(), path),
            });
        }

        state.edges.push(ReferenceEdge {
            source: state.stack.last().cloned().unwrap_or_default(),
            target: reference.target.clone(),
            location: path.to_string(),
            resolution: EdgeResolution::Resolved {
                identity: target.identity.clone(),
                document: target.document.identity(),
            },
        });

        let mut resolved = match state.resolved.get(&target.identity) {
            Some(done) => done.clone(),
            None => {
                state.stack.push(target.identity.clone());
                let done = self.dereference(&target.node, target.document, path, state)?;
                state.stack.pop();
                state.resolved.insert(target.identity.clone(), done.clone());
                done
            }
        };

        let annotations = resolved.annotations_mut();
        annotations.supplementary_default = reference.annotations.default.clone();
        annotations.resolved_from = Some(target.identity);
        Ok(resolved)
    }

    fn dereference_children<'d>(
        &self,
        node: &ConstraintNode,
        context: &'d SchemaDocument,
        path: &PropertyPath,
        state: &mut Visitation,
    ) -> Result<ConstraintNode, ResolutionError>
    where
        'c: 'd,
    {
        let mut out = node.clone();
        match &mut out {
            ConstraintNode::Object(obj) => {
                for (name, child) in obj.properties.iter_mut() {
                    let resolved = self.dereference(child, context, &path.property(name), state)?;
                    *child = resolved;
                }
                if let AdditionalProperties::Schema(schema) = &mut obj.additional_properties {
                    let child_path = path.child(PathSegment::AdditionalProperties);
                    let resolved = self.dereference(schema, context, &child_path, state)?;
                    **schema = resolved;
                }
            }
            ConstraintNode::Array(arr) => {
                for (i, child) in arr.prefix_items.iter_mut().enumerate() {
                    let resolved = self.dereference(child, context, &path.child(PathSegment::Tuple(i)), state)?;
                    *child = resolved;
                }
                if let Some(items) = &mut arr.items {
                    let resolved = self.dereference(items, context, &path.child(PathSegment::Items), state)?;
                    **items = resolved;
                }
            }
            ConstraintNode::Composite(composite) => {
                if let Some(base) = &mut composite.base {
                    let resolved = self.dereference(base, context, &path.child(PathSegment::Base), state)?;
                    **base = resolved;
                }
                let kind = composite.kind;
                for (i, branch) in composite.branches.iter_mut().enumerate() {
                    let child_path = path.child(PathSegment::Branch(kind, i));
                    let resolved = self.dereference(branch, context, &child_path, state)?;
                    *branch = resolved;
                }
            }
            ConstraintNode::Scalar(_) | ConstraintNode::Reference(_) => {}
        }
        Ok(out)
    }

    /// Find the document and node a reference points at
    fn locate<'d>(
        &self,
        reference: &str,
        context: &'d SchemaDocument,
        path: &PropertyPath,
    ) -> Result<Target<'d>, ResolutionError>
    where
        'c: 'd,
    {
        let (document_part, fragment) = match reference.find('#') {
            Some(idx) => (&reference[..idx], Some(&reference[idx + 1..])),
            None => (reference, None),
        };

        let base = context.id.as_deref().map(strip_fragment);
        let absolute = if document_part.is_empty() {
            context.identity()
        } else {
            join_uri(base, document_part)
        };
        let full_uri = match fragment {
            Some(f) if !f.is_empty() => format!("{}#{}", absolute, f),
            _ => absolute.clone(),
        };
        let unresolved = || ResolutionError::Unresolved {
            uri: full_uri.clone(),
            location: format!("{} at {}", context.identity(), path),
        };

        let document: &'d SchemaDocument = if document_part.is_empty() {
            context
        } else {
            match self.corpus.get(&absolute) {
                Lookup::Found(doc) => doc,
                Lookup::Ambiguous(docs) => {
                    return Err(ResolutionError::Ambiguous {
                        uri: absolute,
                        candidates: docs.iter().map(|d| d.path_str()).collect(),
                    })
                }
                Lookup::Missing if !is_absolute_uri(document_part) => {
                    let by_path = join_path(&context.path_str(), document_part);
                    self.corpus.get_by_path(&by_path).ok_or_else(unresolved)?
                }
                Lookup::Missing => return Err(unresolved()),
            }
        };

        match fragment {
            None | Some("") => Ok(Target {
                identity: document.identity(),
                document,
                node: document.root.clone(),
            }),
            Some(f) => {
                let value = if f.starts_with('/') {
                    document.raw.pointer(f)
                } else {
                    find_anchor(&document.raw, f)
                };
                let value = value.ok_or_else(unresolved)?;
                Ok(Target {
                    identity: format!("{}#{}", document.identity(), f),
                    document,
                    node: ConstraintNode::from_json(value),
                })
            }
        }
    }
}

/// Convenience wrapper using the default resolution settings
pub fn resolve(doc: &SchemaDocument, corpus: &Corpus) -> Result<DereferencedSchema, ResolutionError> {
    ReferenceResolver::new(corpus, &ResolutionConfig::default()).resolve(doc)
}

fn is_absolute_uri(reference: &str) -> bool {
    reference.contains("://") || reference.starts_with("urn:")
}

/// Resolve `reference` against `base` the way a browser resolves links
fn join_uri(base: Option<&str>, reference: &str) -> String {
    if is_absolute_uri(reference) {
        return reference.to_string();
    }
    let base = match base {
        Some(b) if b.contains("://") => b,
        _ => return reference.to_string(),
    };

    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    let authority_end = base[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i)
        .unwrap_or(base.len());
    let origin = &base[..authority_end];
    let base_path = &base[authority_end..];

    let joined = if reference.starts_with('/') {
        reference.to_string()
    } else {
        let dir = match base_path.rfind('/') {
            Some(idx) => &base_path[..=idx],
            None => "/",
        };
        format!("{}{}", dir, reference)
    };

    format!("{}/{}", origin, normalize_segments(&joined))
}

/// Join a relative reference against a repository path
fn join_path(base_path: &str, reference: &str) -> String {
    let dir = match base_path.rfind('/') {
        Some(idx) => &base_path[..=idx],
        None => "",
    };
    normalize_segments(&format!("{}{}", dir, reference))
}

fn normalize_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Local references to every entry of the top-level `$defs` and `definitions`.
fn definition_pointers(raw: &Value) -> Vec<String> {
    ["$defs", "definitions"]
        .iter()
        .filter_map(|keyword| raw.get(*keyword).and_then(|v| v.as_object()).map(|defs| (keyword, defs)))
        .flat_map(|(keyword, defs)| {
            defs.keys()
                .map(move |name| format!("#/{}/{}", keyword, name.replace('~', "~0").replace('/', "~1")))
        })
        .collect()
}

/// Keywords whose value is a map of subschemas
const SCHEMA_MAPS: [&str; 5] = ["properties", "patternProperties", "$defs", "definitions", "dependentSchemas"];

/// Keywords whose value is a list of subschemas
const SCHEMA_LISTS: [&str; 4] = ["allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords whose value is a single subschema (`items` may also be a list)
const SCHEMA_VALUES: [&str; 11] = [
    "items",
    "additionalItems",
    "additionalProperties",
    "unevaluatedProperties",
    "unevaluatedItems",
    "contains",
    "propertyNames",
    "not",
    "if",
    "then",
    "else",
];

/// Find the subschema declaring `"$anchor": name`. Only schema positions are
/// searched; instance data under `enum`, `const`, `default` or `examples` is not.
fn find_anchor<'v>(root: &'v Value, name: &str) -> Option<&'v Value> {
    let mut pending = vec![root];
    while let Some(value) = pending.pop() {
        let Value::Object(obj) = value else {
            continue;
        };
        if obj.get("$anchor").and_then(|v| v.as_str()) == Some(name) {
            return Some(value);
        }
        for (keyword, child) in obj {
            let keyword = keyword.as_str();
            if SCHEMA_MAPS.contains(&keyword) {
                if let Some(map) = child.as_object() {
                    pending.extend(map.values());
                }
            } else if SCHEMA_LISTS.contains(&keyword) || SCHEMA_VALUES.contains(&keyword) {
                match child {
                    Value::Array(items) => pending.extend(items.iter()),
                    other => pending.push(other),
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionTriple;
    use serde_json::json;
    use std::path::PathBuf;

    const BASE: &str = "https://schemas.example.org";

    fn doc(family: &str, version: &str, raw: Value) -> SchemaDocument {
        let path = format!("{}/v{}/{}.schema.json", family, version, family);
        let mut raw = raw;
        raw["$id"] = json!(format!("{}/{}", BASE, path));
        SchemaDocument::new(
            PathBuf::from(path),
            family.to_string(),
            VersionTriple::parse(version).unwrap(),
            raw,
        )
    }

    #[test]
    fn test_resolves_cross_document_and_local_refs() {
        let address = doc("address", "1.0.0", json!({
            "type": "object",
            "properties": { "street": { "type": "string" } }
        }));
        let member = doc("member", "1.0.0", json!({
            "type": "object",
            "properties": {
                "home": { "$ref": "../../address/v1.0.0/address.schema.json" },
                "work": { "$ref": "https://schemas.example.org/address/v1.0.0/address.schema.json" },
                "tags": { "type": "array", "items": { "$ref": "#/$defs/Tag" } }
            },
            "$defs": { "Tag": { "type": "string", "maxLength": 16 } }
        }));
        let corpus = Corpus::new(vec![address, member.clone()]);

        let resolved = resolve(&member, &corpus).unwrap();
        assert_eq!(resolved.root.references().len(), 0);
        assert_eq!(resolved.edges.len(), 3);

        match &resolved.root {
            ConstraintNode::Object(obj) => {
                assert_eq!(obj.properties["home"], obj.properties["work"]);
                assert_eq!(obj.properties["home"].shape_name(), "object");
                match &obj.properties["tags"] {
                    ConstraintNode::Array(arr) => assert!(matches!(arr.items.as_deref(), Some(ConstraintNode::Scalar(_)))),
                    other => panic!("Expected Array, got {:?}", other),
                }
            }
            other => panic!("Expected Object, got {:?}", other),
        }

        // The stored document still carries its references
        assert_eq!(member.root.references().len(), 3);
    }

    #[test]
    fn test_unresolved_reference_names_the_uri() {
        let member = doc("member", "1.0.0", json!({
            "properties": { "plan": { "$ref": "https://schemas.example.org/plan/v1.0.0/plan.schema.json" } }
        }));
        let corpus = Corpus::new(vec![member.clone()]);

        match resolve(&member, &corpus) {
            Err(ResolutionError::Unresolved { uri, .. }) => {
                assert_eq!(uri, "https://schemas.example.org/plan/v1.0.0/plan.schema.json");
            }
            other => panic!("Expected Unresolved, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_across_documents_reports_every_identity() {
        let a = doc("a", "1.0.0", json!({ "properties": { "b": { "$ref": "https://schemas.example.org/b/v1.0.0/b.schema.json" } } }));
        let b = doc("b", "1.0.0", json!({ "properties": { "c": { "$ref": "https://schemas.example.org/c/v1.0.0/c.schema.json" } } }));
        let c = doc("c", "1.0.0", json!({ "properties": { "a": { "$ref": "https://schemas.example.org/a/v1.0.0/a.schema.json" } } }));
        let corpus = Corpus::new(vec![a.clone(), b, c]);

        match resolve(&a, &corpus) {
            Err(ResolutionError::Cyclic { cycle }) => {
                assert_eq!(cycle.len(), 4);
                assert_eq!(cycle.first(), cycle.last());
                for family in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|id| id.contains(&format!("/{}/v1.0.0/", family))));
                }
            }
            other => panic!("Expected Cyclic, got {:?}", other),
        }
    }

    #[test]
    fn test_self_recursive_local_definition_is_a_cycle() {
        let tree = doc("tree", "1.0.0", json!({
            "$ref": "#/$defs/Node",
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": { "children": { "type": "array", "items": { "$ref": "#/$defs/Node" } } }
                }
            }
        }));
        let corpus = Corpus::new(vec![tree.clone()]);

        match resolve(&tree, &corpus) {
            Err(ResolutionError::Cyclic { cycle }) => {
                assert_eq!(cycle.last().unwrap(), &format!("{}#/$defs/Node", tree.identity()));
            }
            other => panic!("Expected Cyclic, got {:?}", other),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let leaf = doc("leaf", "1.0.0", json!({ "type": "string" }));
        let root = doc("root", "1.0.0", json!({
            "properties": {
                "left": { "$ref": "https://schemas.example.org/leaf/v1.0.0/leaf.schema.json" },
                "right": { "$ref": "https://schemas.example.org/leaf/v1.0.0/leaf.schema.json" }
            }
        }));
        let corpus = Corpus::new(vec![leaf, root.clone()]);
        assert!(resolve(&root, &corpus).is_ok());
    }

    #[test]
    fn test_default_next_to_ref_stays_supplementary() {
        let meta = doc("metadata", "1.0.0", json!({
            "type": "object",
            "properties": { "status": { "type": "string", "default": "draft" } }
        }));
        let member = doc("member", "1.0.0", json!({
            "properties": {
                "modelMetadata": {
                    "$ref": "https://schemas.example.org/metadata/v1.0.0/metadata.schema.json",
                    "default": { "status": "active" }
                }
            }
        }));
        let corpus = Corpus::new(vec![meta, member.clone()]);
        let resolved = resolve(&member, &corpus).unwrap();

        match &resolved.root {
            ConstraintNode::Object(obj) => {
                let meta_node = &obj.properties["modelMetadata"];
                assert_eq!(meta_node.annotations().supplementary_default, Some(json!({ "status": "active" })));
                assert_eq!(meta_node.annotations().default, None);
                match meta_node {
                    ConstraintNode::Object(inner) => {
                        assert_eq!(inner.properties["status"].annotations().default, Some(json!("draft")));
                    }
                    other => panic!("Expected Object, got {:?}", other),
                }
            }
            other => panic!("Expected Object, got {:?}", other),
        }
    }

    #[test]
    fn test_anchor_and_ambiguity() {
        let shared = doc("shared", "1.0.0", json!({
            "$defs": { "code": { "$anchor": "Code", "type": "string", "pattern": "^[A-Z]{3}$" } }
        }));
        let user = doc("user", "1.0.0", json!({
            "properties": { "code": { "$ref": "https://schemas.example.org/shared/v1.0.0/shared.schema.json#Code" } }
        }));
        let corpus = Corpus::new(vec![shared.clone(), user.clone()]);
        assert!(resolve(&user, &corpus).is_ok());

        let mut twin_raw = shared.raw.clone();
        twin_raw["title"] = json!("twin");
        let twin = SchemaDocument::new(PathBuf::from("twin/v1.0.0/twin.schema.json"), "twin".into(), VersionTriple::new(1, 0, 0), twin_raw);
        let corpus = Corpus::new(vec![shared, twin, user.clone()]);
        assert!(matches!(resolve(&user, &corpus), Err(ResolutionError::Ambiguous { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let docs: Vec<SchemaDocument> = (0..5)
            .map(|i| {
                doc(&format!("d{}", i), "1.0.0", json!({
                    "properties": { "next": { "$ref": format!("https://schemas.example.org/d{}/v1.0.0/d{}.schema.json", i + 1, i + 1) } }
                }))
            })
            .chain(std::iter::once(doc("d5", "1.0.0", json!({ "type": "string" }))))
            .collect();
        let first = docs[0].clone();
        let corpus = Corpus::new(docs);

        let shallow = ReferenceResolver::new(&corpus, &ResolutionConfig { max_depth: 3 });
        assert!(matches!(shallow.resolve(&first), Err(ResolutionError::DepthExceeded { max_depth: 3, .. })));
        assert!(resolve(&first, &corpus).is_ok());
    }

    #[test]
    fn test_join_uri() {
        assert_eq!(
            join_uri(Some("https://x.org/member/v1.0.0/member.schema.json"), "../../address/v2.0.0/address.schema.json"),
            "https://x.org/address/v2.0.0/address.schema.json"
        );
        assert_eq!(join_uri(Some("https://x.org/a/b.json"), "/c/d.json"), "https://x.org/c/d.json");
        assert_eq!(join_uri(None, "./d.json"), "./d.json");
        assert_eq!(join_path("a/v1.0.0/a.schema.json", "../../b/v1.0.0/b.schema.json"), "b/v1.0.0/b.schema.json");
    }

    #[test]
    fn test_anchor_search_skips_instance_data() {
        let raw = json!({
            "properties": {
                "kind": { "enum": [{ "$anchor": "Code" }], "default": { "$anchor": "Code" } }
            },
            "examples": [{ "$anchor": "Code" }]
        });
        assert!(find_anchor(&raw, "Code").is_none());

        let raw = json!({
            "properties": { "kind": { "allOf": [{ "items": { "$anchor": "Code", "type": "string" } }] } }
        });
        assert_eq!(find_anchor(&raw, "Code").and_then(|v| v.get("type")), Some(&json!("string")));
    }

    #[test]
    fn test_outgoing_edges_follow_local_definitions() {
        let address = doc("address", "1.0.0", json!({ "type": "object" }));
        let member = doc("member", "1.0.0", json!({
            "type": "object",
            "properties": { "home": { "$ref": "#/$defs/Addr" } },
            "$defs": {
                "Addr": { "$ref": "https://schemas.example.org/address/v1.0.0/address.schema.json" },
                "Unused": { "$ref": "https://schemas.example.org/unused/v1.0.0/unused.schema.json" }
            }
        }));
        let corpus = Corpus::new(vec![address, member.clone()]);
        let resolver = ReferenceResolver::new(&corpus, &ResolutionConfig::default());

        let edges = resolver.outgoing_edges(&member);
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[1].target, "https://schemas.example.org/address/v1.0.0/address.schema.json");
        assert_eq!(edges[1].location, "home");
        assert!(matches!(
            &edges[1].resolution,
            EdgeResolution::Resolved { document, .. } if document == "https://schemas.example.org/address/v1.0.0/address.schema.json"
        ));
        assert_eq!(edges[2].target, "https://schemas.example.org/unused/v1.0.0/unused.schema.json");
        assert_eq!(edges[2].location, "<root>");
        assert!(matches!(edges[2].resolution, EdgeResolution::Unresolved));
    }
}
