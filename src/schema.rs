//! Schema documents and the constraint tree
//!
//! A raw JSON Schema is lowered into a [`ConstraintNode`] tree once, at load
//! time. Resolution and classification only ever look at that tree; the raw
//! value is kept for pointer navigation and metadata extraction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use crate::checksum::Checksum;
use crate::version::VersionTriple;

// =============================================================================
// Property Paths
// =============================================================================

/// A segment in a property path inside a constraint tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathSegment {
    /// A named property of an object
    Property(String),
    /// Array item schema
    Items,
    /// Tuple position (prefixItems)
    Tuple(usize),
    /// Schema for additionalProperties
    AdditionalProperties,
    /// Branch of an allOf/anyOf/oneOf
    Branch(CompositeKind, usize),
    /// Base constraints sitting next to a composite keyword
    Base,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => write!(f, ".{}", name),
            Self::Items => write!(f, "[]"),
            Self::Tuple(i) => write!(f, "[{}]", i),
            Self::AdditionalProperties => write!(f, "[*]"),
            Self::Branch(kind, i) => write!(f, "<{}:{}>", kind, i),
            Self::Base => write!(f, "<base>"),
        }
    }
}

/// Full path from the schema root to a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyPath(Vec<PathSegment>);

impl PropertyPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn property(&self, name: &str) -> Self {
        self.child(PathSegment::Property(name.to_string()))
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let rendered: String = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", rendered.strip_prefix('.').unwrap_or(&rendered))
    }
}

// =============================================================================
// Constraint Tree
// =============================================================================

/// JSON scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl ScalarType {
    pub fn from_json_type(type_str: &str) -> Option<Self> {
        match type_str {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// Whether every value of `self` is also a value of `other`
    pub fn is_subtype_of(&self, other: &ScalarType) -> bool {
        self == other || (*self == Self::Integer && *other == Self::Number)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        };
        write!(f, "{}", name)
    }
}

/// Composition keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompositeKind {
    #[serde(rename = "allOf")]
    AllOf,
    #[serde(rename = "anyOf")]
    AnyOf,
    #[serde(rename = "oneOf")]
    OneOf,
}

impl CompositeKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::AllOf => "allOf",
            Self::AnyOf => "anyOf",
            Self::OneOf => "oneOf",
        }
    }
}

impl fmt::Display for CompositeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// Non-constraining keywords carried by every node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub deprecated: bool,
    /// `default` found next to a `$ref`; kept apart from the target's own default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplementary_default: Option<Value>,
    /// Target URI this node was copied from during resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_from: Option<String>,
}

impl Annotations {
    fn from_json(obj: &serde_json::Map<String, Value>) -> Self {
        Self {
            title: obj.get("title").and_then(|v| v.as_str()).map(String::from),
            description: obj.get("description").and_then(|v| v.as_str()).map(String::from),
            examples: obj
                .get("examples")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            default: obj.get("default").cloned(),
            deprecated: obj.get("deprecated").and_then(|v| v.as_bool()).unwrap_or(false),
            supplementary_default: None,
            resolved_from: None,
        }
    }
}

/// additionalProperties policy of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "schema", rename_all = "snake_case")]
pub enum AdditionalProperties {
    /// Keyword absent (open by default)
    Unspecified,
    /// `true`
    Allowed,
    /// `false`
    Forbidden,
    /// A schema every extra property must satisfy
    Schema(Box<ConstraintNode>),
}

impl AdditionalProperties {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Forbidden)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConstraint {
    pub properties: BTreeMap<String, ConstraintNode>,
    pub required: BTreeSet<String>,
    pub additional_properties: AdditionalProperties,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
    /// `type` also admits `null`
    pub nullable: bool,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayConstraint {
    pub items: Option<Box<ConstraintNode>>,
    pub prefix_items: Vec<ConstraintNode>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    pub nullable: bool,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarConstraint {
    /// Allowed types; empty means any
    pub types: BTreeSet<ScalarType>,
    pub enum_values: Option<Vec<Value>>,
    pub const_value: Option<Value>,
    pub pattern: Option<String>,
    pub format: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeConstraint {
    pub kind: CompositeKind,
    pub branches: Vec<ConstraintNode>,
    /// Constraints written next to the composite keyword
    pub base: Option<Box<ConstraintNode>>,
    pub annotations: Annotations,
}

/// Placeholder for a `$ref`; only present before resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceNode {
    pub target: String,
    pub annotations: Annotations,
}

/// A node of the constraint tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ConstraintNode {
    Object(ObjectConstraint),
    Array(ArrayConstraint),
    Scalar(ScalarConstraint),
    Composite(CompositeConstraint),
    Reference(ReferenceNode),
}

const COMPOSITE_KEYWORDS: [(&str, CompositeKind); 3] = [
    ("allOf", CompositeKind::AllOf),
    ("anyOf", CompositeKind::AnyOf),
    ("oneOf", CompositeKind::OneOf),
];

const OBJECT_KEYWORDS: [&str; 5] = [
    "properties",
    "required",
    "additionalProperties",
    "minProperties",
    "maxProperties",
];

const ARRAY_KEYWORDS: [&str; 5] = ["items", "prefixItems", "minItems", "maxItems", "uniqueItems"];

impl ConstraintNode {
    /// Lower a raw JSON Schema value into a constraint tree
    pub fn from_json(value: &Value) -> Self {
        let obj = match value {
            Value::Object(obj) => obj,
            // `false` admits nothing, `true` and anything else admit everything
            Value::Bool(false) => {
                return Self::Scalar(ScalarConstraint {
                    enum_values: Some(Vec::new()),
                    ..Default::default()
                })
            }
            _ => return Self::Scalar(ScalarConstraint::default()),
        };

        if let Some(target) = obj.get("$ref").and_then(|v| v.as_str()) {
            let reference = Self::Reference(ReferenceNode {
                target: target.to_string(),
                annotations: Annotations::from_json(obj),
            });

            // Keywords next to `$ref` apply in addition to the target
            let rest = without_annotations(obj, "$ref");
            if !has_constraints(&rest) {
                return reference;
            }
            return Self::Composite(CompositeConstraint {
                kind: CompositeKind::AllOf,
                branches: vec![reference],
                base: Some(Box::new(Self::from_json(&Value::Object(rest)))),
                annotations: Annotations::default(),
            });
        }

        if let Some((keyword, kind)) = COMPOSITE_KEYWORDS
            .iter()
            .find(|(keyword, _)| obj.get(*keyword).map(|v| v.is_array()).unwrap_or(false))
        {
            let branches = obj[*keyword]
                .as_array()
                .map(|arr| arr.iter().map(Self::from_json).collect())
                .unwrap_or_default();
            let rest = without_annotations(obj, keyword);
            let base = if has_constraints(&rest) {
                Some(Box::new(Self::from_json(&Value::Object(rest))))
            } else {
                None
            };
            return Self::Composite(CompositeConstraint {
                kind: *kind,
                branches,
                base,
                annotations: Annotations::from_json(obj),
            });
        }

        let declared = declared_types(obj);
        let nullable = declared.iter().any(|t| t == "null");
        let has_any = |keys: &[&str]| keys.iter().any(|k| obj.contains_key(*k));

        if declared.iter().any(|t| t == "object") || (declared.is_empty() && has_any(&OBJECT_KEYWORDS)) {
            return Self::Object(parse_object(obj, nullable));
        }
        if declared.iter().any(|t| t == "array") || (declared.is_empty() && has_any(&ARRAY_KEYWORDS)) {
            return Self::Array(parse_array(obj, nullable));
        }
        Self::Scalar(parse_scalar(obj, &declared))
    }

    pub fn annotations(&self) -> &Annotations {
        match self {
            Self::Object(o) => &o.annotations,
            Self::Array(a) => &a.annotations,
            Self::Scalar(s) => &s.annotations,
            Self::Composite(c) => &c.annotations,
            Self::Reference(r) => &r.annotations,
        }
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        match self {
            Self::Object(o) => &mut o.annotations,
            Self::Array(a) => &mut a.annotations,
            Self::Scalar(s) => &mut s.annotations,
            Self::Composite(c) => &mut c.annotations,
            Self::Reference(r) => &mut r.annotations,
        }
    }

    /// Short name of the variant, used in diff messages
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Scalar(_) => "scalar",
            Self::Composite(_) => "composite",
            Self::Reference(_) => "reference",
        }
    }

    /// Direct children with the path segment leading to each
    pub fn children(&self) -> Vec<(PathSegment, &ConstraintNode)> {
        let mut out = Vec::new();
        match self {
            Self::Object(o) => {
                for (name, node) in &o.properties {
                    out.push((PathSegment::Property(name.clone()), node));
                }
                if let AdditionalProperties::Schema(node) = &o.additional_properties {
                    out.push((PathSegment::AdditionalProperties, node.as_ref()));
                }
            }
            Self::Array(a) => {
                for (i, node) in a.prefix_items.iter().enumerate() {
                    out.push((PathSegment::Tuple(i), node));
                }
                if let Some(items) = &a.items {
                    out.push((PathSegment::Items, items.as_ref()));
                }
            }
            Self::Composite(c) => {
                if let Some(base) = &c.base {
                    out.push((PathSegment::Base, base.as_ref()));
                }
                for (i, node) in c.branches.iter().enumerate() {
                    out.push((PathSegment::Branch(c.kind, i), node));
                }
            }
            Self::Scalar(_) | Self::Reference(_) => {}
        }
        out
    }

    /// Every `$ref` in the tree with the path where it occurs
    pub fn references(&self) -> Vec<(PropertyPath, String)> {
        let mut out = Vec::new();
        let mut pending = vec![(PropertyPath::root(), self)];
        while let Some((path, node)) = pending.pop() {
            if let Self::Reference(r) = node {
                out.push((path, r.target.clone()));
                continue;
            }
            for (segment, child) in node.children() {
                pending.push((path.child(segment), child));
            }
        }
        out.sort();
        out
    }

    /// Shape key used to align tuple items and composite branches regardless
    /// of position
    pub fn shape_key(&self) -> String {
        let annotations = self.annotations();
        let label = annotations.title.clone().unwrap_or_default();
        match self {
            Self::Object(o) => {
                let names: Vec<&str> = o.properties.keys().map(String::as_str).collect();
                format!("object:{}:{}", label, names.join(","))
            }
            Self::Array(_) => format!("array:{}", label),
            Self::Scalar(s) => {
                let types: Vec<String> = s.types.iter().map(|t| t.to_string()).collect();
                match &s.const_value {
                    Some(c) => format!("scalar:{}:const={}", types.join("|"), c),
                    None => format!("scalar:{}:{}", types.join("|"), label),
                }
            }
            Self::Composite(c) => format!("composite:{}:{}", c.kind, label),
            Self::Reference(r) => format!("ref:{}", r.target),
        }
    }
}

fn declared_types(obj: &serde_json::Map<String, Value>) -> Vec<String> {
    match obj.get("type") {
        Some(Value::String(t)) => vec![t.clone()],
        Some(Value::Array(arr)) => arr.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        _ => Vec::new(),
    }
}

/// Copy of `obj` without `keyword` and the annotation keywords
fn without_annotations(obj: &serde_json::Map<String, Value>, keyword: &str) -> serde_json::Map<String, Value> {
    let mut rest = obj.clone();
    rest.remove(keyword);
    for key in ["title", "description", "examples", "default", "deprecated"] {
        rest.remove(key);
    }
    rest
}

fn has_constraints(obj: &serde_json::Map<String, Value>) -> bool {
    obj.keys()
        .any(|k| !k.starts_with('$') && !k.starts_with("x-") && k != "definitions")
}

fn parse_object(obj: &serde_json::Map<String, Value>, nullable: bool) -> ObjectConstraint {
    let properties = obj
        .get("properties")
        .and_then(|v| v.as_object())
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), ConstraintNode::from_json(prop)))
                .collect()
        })
        .unwrap_or_default();

    let required = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let additional_properties = match obj.get("additionalProperties") {
        None => AdditionalProperties::Unspecified,
        Some(Value::Bool(true)) => AdditionalProperties::Allowed,
        Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
        Some(schema) => AdditionalProperties::Schema(Box::new(ConstraintNode::from_json(schema))),
    };

    ObjectConstraint {
        properties,
        required,
        additional_properties,
        min_properties: obj.get("minProperties").and_then(|v| v.as_u64()),
        max_properties: obj.get("maxProperties").and_then(|v| v.as_u64()),
        nullable,
        annotations: Annotations::from_json(obj),
    }
}

fn parse_array(obj: &serde_json::Map<String, Value>, nullable: bool) -> ArrayConstraint {
    let (items, mut prefix_items) = match obj.get("items") {
        Some(Value::Array(tuple)) => (None, tuple.iter().map(ConstraintNode::from_json).collect()),
        Some(schema) => (Some(Box::new(ConstraintNode::from_json(schema))), Vec::new()),
        None => (None, Vec::new()),
    };
    if let Some(prefix) = obj.get("prefixItems").and_then(|v| v.as_array()) {
        prefix_items = prefix.iter().map(ConstraintNode::from_json).collect();
    }

    ArrayConstraint {
        items,
        prefix_items,
        min_items: obj.get("minItems").and_then(|v| v.as_u64()),
        max_items: obj.get("maxItems").and_then(|v| v.as_u64()),
        unique_items: obj.get("uniqueItems").and_then(|v| v.as_bool()).unwrap_or(false),
        nullable,
        annotations: Annotations::from_json(obj),
    }
}

fn parse_scalar(obj: &serde_json::Map<String, Value>, declared: &[String]) -> ScalarConstraint {
    let number = |key: &str| obj.get(key).and_then(|v| v.as_f64());

    let mut minimum = number("minimum");
    let mut maximum = number("maximum");
    let mut exclusive_minimum = number("exclusiveMinimum");
    let mut exclusive_maximum = number("exclusiveMaximum");
    // draft-04 boolean exclusivity
    if obj.get("exclusiveMinimum").and_then(|v| v.as_bool()) == Some(true) {
        exclusive_minimum = minimum.take();
    }
    if obj.get("exclusiveMaximum").and_then(|v| v.as_bool()) == Some(true) {
        exclusive_maximum = maximum.take();
    }

    ScalarConstraint {
        types: declared.iter().filter_map(|t| ScalarType::from_json_type(t)).collect(),
        enum_values: obj.get("enum").and_then(|v| v.as_array()).cloned(),
        const_value: obj.get("const").cloned(),
        pattern: obj.get("pattern").and_then(|v| v.as_str()).map(String::from),
        format: obj.get("format").and_then(|v| v.as_str()).map(String::from),
        min_length: obj.get("minLength").and_then(|v| v.as_u64()),
        max_length: obj.get("maxLength").and_then(|v| v.as_u64()),
        minimum,
        maximum,
        exclusive_minimum,
        exclusive_maximum,
        multiple_of: number("multipleOf"),
        annotations: Annotations::from_json(obj),
    }
}

// =============================================================================
// Schema Document
// =============================================================================

/// A `$ref` as written in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRef {
    pub path: PropertyPath,
    pub target: String,
}

/// A loaded schema document. Immutable once the store hands it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// `$id` as declared
    pub id: Option<String>,
    /// Top-level `$anchor`
    pub anchor: Option<String>,
    /// Path relative to the repository root
    pub path: PathBuf,
    /// Relative directory that holds the version folders of this schema
    pub family: String,
    /// Version parsed from the enclosing `vMAJOR.MINOR.PATCH` folder
    pub folder_version: VersionTriple,
    pub raw: Value,
    pub root: ConstraintNode,
    pub references: Vec<OutgoingRef>,
    pub checksum: Checksum,
}

impl SchemaDocument {
    pub fn new(path: PathBuf, family: String, folder_version: VersionTriple, raw: Value) -> Self {
        let id = raw.get("$id").and_then(|v| v.as_str()).map(String::from);
        let anchor = raw.get("$anchor").and_then(|v| v.as_str()).map(String::from);
        let root = ConstraintNode::from_json(&raw);
        let references = root
            .references()
            .into_iter()
            .map(|(path, target)| OutgoingRef { path, target })
            .collect();
        let checksum = Checksum::from_json(&raw);
        Self {
            id,
            anchor,
            path,
            family,
            folder_version,
            raw,
            root,
            references,
            checksum,
        }
    }

    /// Stable identity: the `$id` without fragment, or the repository path
    pub fn identity(&self) -> String {
        match &self.id {
            Some(id) => strip_fragment(id).to_string(),
            None => self.path_str(),
        }
    }

    /// Repository path with `/` separators
    pub fn path_str(&self) -> String {
        crate::store::to_slash(&self.path)
    }
}

/// Strip a `#fragment` (including an empty one) from a URI
pub fn strip_fragment(uri: &str) -> &str {
    match uri.find('#') {
        Some(idx) => &uri[..idx],
        None => uri,
    }
}
