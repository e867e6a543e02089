//! Schema compatibility classification
//!
//! Compares two dereferenced versions of the same schema and reports the
//! smallest semantic-version bump that covers every structural change.
//! Properties are aligned by name; tuple items and composite branches are
//! aligned by shape, independent of position.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::resolver::DereferencedSchema;
use crate::schema::{
    AdditionalProperties, Annotations, ArrayConstraint, CompositeConstraint, CompositeKind, ConstraintNode,
    ObjectConstraint, PathSegment, PropertyPath, ScalarConstraint, ScalarType,
};
use crate::version::{CompatibilityClass, VersionTriple};

/// Rule that produced a structural diff, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffRule {
    /// Node changed between object, array, scalar and composite
    ShapeChanged,
    CompositeKindChanged,
    RequiredPropertyRemoved,
    OptionalPropertyRemoved,
    RequiredPropertyAdded,
    PropertyBecameRequired,
    PropertyAddedToOpenedSchema,
    AdditionalPropertiesTightened,
    AdditionalPropertiesOpened,
    TypeChanged,
    TypeNarrowed,
    EnumValueRemoved,
    EnumIntroduced,
    ConstChanged,
    PatternChanged,
    FormatChanged,
    BoundTightened,
    UniqueItemsIntroduced,
    TupleItemsChanged,
    BranchRemoved,
    AllOfBranchAdded,
    OptionalPropertyAdded,
    PropertyBecameOptional,
    TypeWidened,
    EnumValueAdded,
    EnumDropped,
    ConstDropped,
    PatternRemoved,
    FormatRemoved,
    BoundRelaxed,
    UniqueItemsDropped,
    BranchAdded,
    AllOfBranchRemoved,
    AnnotationChanged,
    SupplementaryDefaultChanged,
}

impl DiffRule {
    /// Compatibility class this rule implies
    pub fn class(&self) -> CompatibilityClass {
        use DiffRule::*;
        match self {
            ShapeChanged
            | CompositeKindChanged
            | RequiredPropertyRemoved
            | OptionalPropertyRemoved
            | RequiredPropertyAdded
            | PropertyBecameRequired
            | PropertyAddedToOpenedSchema
            | AdditionalPropertiesTightened
            | AdditionalPropertiesOpened
            | TypeChanged
            | TypeNarrowed
            | EnumValueRemoved
            | EnumIntroduced
            | ConstChanged
            | PatternChanged
            | FormatChanged
            | BoundTightened
            | UniqueItemsIntroduced
            | TupleItemsChanged
            | BranchRemoved
            | AllOfBranchAdded => CompatibilityClass::Major,

            OptionalPropertyAdded
            | PropertyBecameOptional
            | TypeWidened
            | EnumValueAdded
            | EnumDropped
            | ConstDropped
            | PatternRemoved
            | FormatRemoved
            | BoundRelaxed
            | UniqueItemsDropped
            | BranchAdded
            | AllOfBranchRemoved => CompatibilityClass::Minor,

            AnnotationChanged | SupplementaryDefaultChanged => CompatibilityClass::Patch,
        }
    }

    /// Short human-readable rule name
    pub fn label(&self) -> &'static str {
        use DiffRule::*;
        match self {
            ShapeChanged => "shape changed",
            CompositeKindChanged => "composition keyword changed",
            RequiredPropertyRemoved => "required property removed",
            OptionalPropertyRemoved => "optional property removed",
            RequiredPropertyAdded => "required field added",
            PropertyBecameRequired => "property became required",
            PropertyAddedToOpenedSchema => "property added while opening a closed schema",
            AdditionalPropertiesTightened => "additionalProperties tightened",
            AdditionalPropertiesOpened => "additionalProperties opened",
            TypeChanged => "type changed",
            TypeNarrowed => "type narrowed",
            EnumValueRemoved => "enum value removed",
            EnumIntroduced => "enum introduced",
            ConstChanged => "const changed",
            PatternChanged => "pattern made stricter",
            FormatChanged => "format made stricter",
            BoundTightened => "bound tightened",
            UniqueItemsIntroduced => "uniqueItems introduced",
            TupleItemsChanged => "tuple items changed",
            BranchRemoved => "composite branch removed",
            AllOfBranchAdded => "allOf branch added",
            OptionalPropertyAdded => "optional property added",
            PropertyBecameOptional => "property became optional",
            TypeWidened => "type widened",
            EnumValueAdded => "enum value added",
            EnumDropped => "enum dropped",
            ConstDropped => "const dropped",
            PatternRemoved => "pattern removed",
            FormatRemoved => "format removed",
            BoundRelaxed => "bound relaxed",
            UniqueItemsDropped => "uniqueItems dropped",
            BranchAdded => "composite branch added",
            AllOfBranchRemoved => "allOf branch removed",
            AnnotationChanged => "annotation changed",
            SupplementaryDefaultChanged => "supplementary default changed",
        }
    }
}

/// A single structural difference between two schema versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralDiff {
    pub rule: DiffRule,
    pub class: CompatibilityClass,
    /// Path to the changed node (e.g., "address.street")
    pub path: String,
    /// Keyword the diff is about, when narrower than the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl StructuralDiff {
    fn new(rule: DiffRule, path: &PropertyPath) -> Self {
        Self {
            rule,
            class: rule.class(),
            path: path.to_string(),
            keyword: None,
            old_value: None,
            new_value: None,
        }
    }

    fn keyword(mut self, keyword: &str) -> Self {
        self.keyword = Some(keyword.to_string());
        self
    }

    fn values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Human-readable description
    pub fn message(&self) -> String {
        let mut msg = format!("{} at {}", self.rule.label(), self.path);
        if let Some(keyword) = &self.keyword {
            msg.push_str(&format!(" ({})", keyword));
        }
        match (&self.old_value, &self.new_value) {
            (Some(old), Some(new)) => msg.push_str(&format!(": {} -> {}", old, new)),
            (Some(old), None) => msg.push_str(&format!(": was {}", old)),
            (None, Some(new)) => msg.push_str(&format!(": now {}", new)),
            (None, None) => {}
        }
        msg
    }
}

/// Minimum bump required between two versions, with the diffs behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityVerdict {
    pub class: CompatibilityClass,
    pub from: VersionTriple,
    pub to: VersionTriple,
    pub diffs: Vec<StructuralDiff>,
}

impl CompatibilityVerdict {
    /// Smallest version that would be acceptable after `from`
    pub fn minimum_version(&self) -> VersionTriple {
        self.from.bump(self.class)
    }

    /// Diffs that drove the verdict to its class
    pub fn deciding_diffs(&self) -> impl Iterator<Item = &StructuralDiff> {
        self.diffs.iter().filter(move |d| d.class == self.class)
    }

    pub fn summary(&self) -> String {
        if self.diffs.is_empty() {
            format!("{} ({} -> {}): no structural change", self.class, self.from, self.to)
        } else {
            format!(
                "{} ({} -> {}): {} change(s), {} deciding",
                self.class,
                self.from,
                self.to,
                self.diffs.len(),
                self.deciding_diffs().count()
            )
        }
    }
}

/// Classifies the change between two versions of a schema
#[derive(Debug, Default)]
pub struct CompatibilityClassifier;

impl CompatibilityClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, old: &DereferencedSchema, new: &DereferencedSchema) -> CompatibilityVerdict {
        let mut diffs = Vec::new();
        diff_nodes(&old.root, &new.root, &PropertyPath::root(), &mut diffs);

        diffs.sort_by(|a, b| a.path.cmp(&b.path).then(a.rule.cmp(&b.rule)));
        let class = diffs
            .iter()
            .map(|d| d.class)
            .max()
            .unwrap_or(CompatibilityClass::Patch);

        CompatibilityVerdict {
            class,
            from: old.version,
            to: new.version,
            diffs,
        }
    }
}

/// Classify with a default classifier
pub fn classify(old: &DereferencedSchema, new: &DereferencedSchema) -> CompatibilityVerdict {
    CompatibilityClassifier::new().classify(old, new)
}

// =============================================================================
// Node Comparison
// =============================================================================

fn diff_nodes(old: &ConstraintNode, new: &ConstraintNode, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    // A plain node compares against an allOf as a single-branch allOf
    match (old, new) {
        (ConstraintNode::Composite(_), ConstraintNode::Composite(_)) => {}
        (ConstraintNode::Composite(c), n) if c.kind == CompositeKind::AllOf => {
            return diff_nodes(old, &single_branch_all_of(n), path, diffs);
        }
        (o, ConstraintNode::Composite(c)) if c.kind == CompositeKind::AllOf => {
            return diff_nodes(&single_branch_all_of(o), new, path, diffs);
        }
        _ => {}
    }

    diff_annotations(old.annotations(), new.annotations(), path, diffs);

    match (old, new) {
        (ConstraintNode::Object(o), ConstraintNode::Object(n)) => diff_objects(o, n, path, diffs),
        (ConstraintNode::Array(o), ConstraintNode::Array(n)) => diff_arrays(o, n, path, diffs),
        (ConstraintNode::Scalar(o), ConstraintNode::Scalar(n)) => diff_scalars(o, n, path, diffs),
        (ConstraintNode::Composite(o), ConstraintNode::Composite(n)) => diff_composites(o, n, path, diffs),
        // Leftover references only appear when comparing unresolved trees
        (ConstraintNode::Reference(o), ConstraintNode::Reference(n)) => {
            if o.target != n.target {
                diffs.push(
                    StructuralDiff::new(DiffRule::ShapeChanged, path)
                        .keyword("$ref")
                        .values(Some(o.target.clone()), Some(n.target.clone())),
                );
            }
        }
        (_, n) if is_unconstrained(n) => {
            diffs.push(
                StructuralDiff::new(DiffRule::TypeWidened, path)
                    .values(Some(old.shape_name().to_string()), Some("any".to_string())),
            );
        }
        (o, _) if is_unconstrained(o) => {
            diffs.push(
                StructuralDiff::new(DiffRule::TypeNarrowed, path)
                    .values(Some("any".to_string()), Some(new.shape_name().to_string())),
            );
        }
        // Shapes the rules cannot align fall back to the most conservative class
        _ => {
            diffs.push(
                StructuralDiff::new(DiffRule::ShapeChanged, path)
                    .values(Some(old.shape_name().to_string()), Some(new.shape_name().to_string())),
            );
        }
    }
}

/// A scalar without any constraint admits every value
fn is_unconstrained(node: &ConstraintNode) -> bool {
    match node {
        ConstraintNode::Scalar(s) => {
            s.types.is_empty()
                && s.enum_values.is_none()
                && s.const_value.is_none()
                && s.pattern.is_none()
                && s.format.is_none()
                && s.min_length.is_none()
                && s.max_length.is_none()
                && s.minimum.is_none()
                && s.maximum.is_none()
                && s.exclusive_minimum.is_none()
                && s.exclusive_maximum.is_none()
                && s.multiple_of.is_none()
        }
        _ => false,
    }
}

fn unconstrained() -> ConstraintNode {
    ConstraintNode::Scalar(ScalarConstraint::default())
}

fn single_branch_all_of(node: &ConstraintNode) -> ConstraintNode {
    ConstraintNode::Composite(CompositeConstraint {
        kind: CompositeKind::AllOf,
        branches: vec![node.clone()],
        base: None,
        annotations: Annotations::default(),
    })
}

fn diff_annotations(old: &Annotations, new: &Annotations, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    let render = |v: &Option<String>| v.clone();
    let render_value = |v: &Option<Value>| v.as_ref().map(|v| v.to_string());

    if old.title != new.title {
        diffs.push(
            StructuralDiff::new(DiffRule::AnnotationChanged, path)
                .keyword("title")
                .values(render(&old.title), render(&new.title)),
        );
    }
    if old.description != new.description {
        diffs.push(StructuralDiff::new(DiffRule::AnnotationChanged, path).keyword("description"));
    }
    if old.examples != new.examples {
        diffs.push(StructuralDiff::new(DiffRule::AnnotationChanged, path).keyword("examples"));
    }
    if old.default != new.default {
        diffs.push(
            StructuralDiff::new(DiffRule::AnnotationChanged, path)
                .keyword("default")
                .values(render_value(&old.default), render_value(&new.default)),
        );
    }
    if old.deprecated != new.deprecated {
        diffs.push(
            StructuralDiff::new(DiffRule::AnnotationChanged, path)
                .keyword("deprecated")
                .values(Some(old.deprecated.to_string()), Some(new.deprecated.to_string())),
        );
    }
    if old.supplementary_default != new.supplementary_default {
        diffs.push(StructuralDiff::new(DiffRule::SupplementaryDefaultChanged, path).keyword("default"));
    }
}

// =============================================================================
// Objects
// =============================================================================

fn diff_objects(old: &ObjectConstraint, new: &ObjectConstraint, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    diff_nullable(old.nullable, new.nullable, path, diffs);

    let opened = !old.additional_properties.is_open() && new.additional_properties.is_open();

    let names: BTreeSet<&String> = old
        .properties
        .keys()
        .chain(new.properties.keys())
        .chain(old.required.iter())
        .chain(new.required.iter())
        .collect();

    for name in names {
        let child_path = path.property(name);
        let was_defined = old.properties.contains_key(name) || old.required.contains(name);
        let is_defined = new.properties.contains_key(name) || new.required.contains(name);
        let was_required = old.required.contains(name);
        let is_required = new.required.contains(name);

        match (was_defined, is_defined) {
            (true, false) => {
                let rule = if was_required {
                    DiffRule::RequiredPropertyRemoved
                } else {
                    DiffRule::OptionalPropertyRemoved
                };
                diffs.push(StructuralDiff::new(rule, &child_path));
            }
            (false, true) => {
                let rule = if is_required {
                    DiffRule::RequiredPropertyAdded
                } else if opened {
                    DiffRule::PropertyAddedToOpenedSchema
                } else {
                    DiffRule::OptionalPropertyAdded
                };
                diffs.push(StructuralDiff::new(rule, &child_path));
            }
            (true, true) => {
                if !was_required && is_required {
                    diffs.push(StructuralDiff::new(DiffRule::PropertyBecameRequired, &child_path));
                } else if was_required && !is_required {
                    diffs.push(StructuralDiff::new(DiffRule::PropertyBecameOptional, &child_path));
                }
                let any = unconstrained();
                let old_child = old.properties.get(name).unwrap_or(&any);
                let new_child = new.properties.get(name).unwrap_or(&any);
                diff_nodes(old_child, new_child, &child_path, diffs);
            }
            (false, false) => {}
        }
    }

    diff_additional_properties(&old.additional_properties, &new.additional_properties, path, diffs);
    diff_lower_bound("minProperties", old.min_properties.map(|v| v as f64), new.min_properties.map(|v| v as f64), path, diffs);
    diff_upper_bound("maxProperties", old.max_properties.map(|v| v as f64), new.max_properties.map(|v| v as f64), path, diffs);
}

fn diff_additional_properties(
    old: &AdditionalProperties,
    new: &AdditionalProperties,
    path: &PropertyPath,
    diffs: &mut Vec<StructuralDiff>,
) {
    use AdditionalProperties::*;

    let describe = |a: &AdditionalProperties| match a {
        Unspecified => "absent".to_string(),
        Allowed => "true".to_string(),
        Forbidden => "false".to_string(),
        Schema(_) => "schema".to_string(),
    };
    let change = |rule: DiffRule| {
        StructuralDiff::new(rule, path)
            .keyword("additionalProperties")
            .values(Some(describe(old)), Some(describe(new)))
    };

    match (old, new) {
        (Unspecified | Allowed, Unspecified | Allowed) | (Forbidden, Forbidden) => {}
        (Unspecified | Allowed | Schema(_), Forbidden) | (Unspecified | Allowed, Schema(_)) => {
            diffs.push(change(DiffRule::AdditionalPropertiesTightened));
        }
        (Forbidden, _) | (Schema(_), Unspecified | Allowed) => {
            diffs.push(change(DiffRule::AdditionalPropertiesOpened));
        }
        (Schema(o), Schema(n)) => {
            diff_nodes(o, n, &path.child(PathSegment::AdditionalProperties), diffs);
        }
    }
}

fn diff_nullable(old: bool, new: bool, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    if old && !new {
        diffs.push(
            StructuralDiff::new(DiffRule::TypeNarrowed, path)
                .keyword("type")
                .values(Some("null".to_string()), None),
        );
    } else if !old && new {
        diffs.push(
            StructuralDiff::new(DiffRule::TypeWidened, path)
                .keyword("type")
                .values(None, Some("null".to_string())),
        );
    }
}

// =============================================================================
// Arrays
// =============================================================================

fn diff_arrays(old: &ArrayConstraint, new: &ArrayConstraint, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    diff_nullable(old.nullable, new.nullable, path, diffs);

    let any = unconstrained();
    let old_items = old.items.as_deref().unwrap_or(&any);
    let new_items = new.items.as_deref().unwrap_or(&any);
    diff_nodes(old_items, new_items, &path.child(PathSegment::Items), diffs);

    let (pairs, removed, added) = align_by_shape(&old.prefix_items, &new.prefix_items);
    for (o, n) in pairs {
        diff_nodes(&old.prefix_items[o], &new.prefix_items[n], &path.child(PathSegment::Tuple(n)), diffs);
    }
    for o in removed {
        diffs.push(
            StructuralDiff::new(DiffRule::TupleItemsChanged, &path.child(PathSegment::Tuple(o)))
                .values(Some(old.prefix_items[o].shape_key()), None),
        );
    }
    for n in added {
        diffs.push(
            StructuralDiff::new(DiffRule::TupleItemsChanged, &path.child(PathSegment::Tuple(n)))
                .values(None, Some(new.prefix_items[n].shape_key())),
        );
    }

    diff_lower_bound("minItems", old.min_items.map(|v| v as f64), new.min_items.map(|v| v as f64), path, diffs);
    diff_upper_bound("maxItems", old.max_items.map(|v| v as f64), new.max_items.map(|v| v as f64), path, diffs);

    if !old.unique_items && new.unique_items {
        diffs.push(StructuralDiff::new(DiffRule::UniqueItemsIntroduced, path).keyword("uniqueItems"));
    } else if old.unique_items && !new.unique_items {
        diffs.push(StructuralDiff::new(DiffRule::UniqueItemsDropped, path).keyword("uniqueItems"));
    }
}

// =============================================================================
// Scalars
// =============================================================================

fn diff_scalars(old: &ScalarConstraint, new: &ScalarConstraint, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    diff_types(&old.types, &new.types, path, diffs);
    diff_enum(old.enum_values.as_deref(), new.enum_values.as_deref(), path, diffs);

    match (&old.const_value, &new.const_value) {
        (None, Some(n)) => diffs.push(
            StructuralDiff::new(DiffRule::ConstChanged, path)
                .keyword("const")
                .values(None, Some(n.to_string())),
        ),
        (Some(o), Some(n)) if o != n => diffs.push(
            StructuralDiff::new(DiffRule::ConstChanged, path)
                .keyword("const")
                .values(Some(o.to_string()), Some(n.to_string())),
        ),
        (Some(o), None) => diffs.push(
            StructuralDiff::new(DiffRule::ConstDropped, path)
                .keyword("const")
                .values(Some(o.to_string()), None),
        ),
        _ => {}
    }

    diff_string_constraint("pattern", &old.pattern, &new.pattern, DiffRule::PatternChanged, DiffRule::PatternRemoved, path, diffs);
    diff_string_constraint("format", &old.format, &new.format, DiffRule::FormatChanged, DiffRule::FormatRemoved, path, diffs);

    diff_lower_bound("minLength", old.min_length.map(|v| v as f64), new.min_length.map(|v| v as f64), path, diffs);
    diff_upper_bound("maxLength", old.max_length.map(|v| v as f64), new.max_length.map(|v| v as f64), path, diffs);
    diff_lower_bound("minimum", old.minimum, new.minimum, path, diffs);
    diff_upper_bound("maximum", old.maximum, new.maximum, path, diffs);
    diff_lower_bound("exclusiveMinimum", old.exclusive_minimum, new.exclusive_minimum, path, diffs);
    diff_upper_bound("exclusiveMaximum", old.exclusive_maximum, new.exclusive_maximum, path, diffs);
    diff_multiple_of(old.multiple_of, new.multiple_of, path, diffs);
}

fn render_types(types: &BTreeSet<ScalarType>) -> String {
    if types.is_empty() {
        return "any".to_string();
    }
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("|")
}

fn diff_types(old: &BTreeSet<ScalarType>, new: &BTreeSet<ScalarType>, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    if old == new {
        return;
    }

    let rule = if old.is_empty() {
        DiffRule::TypeNarrowed
    } else if new.is_empty() {
        DiffRule::TypeWidened
    } else {
        let lost = old.iter().any(|o| !new.iter().any(|n| o.is_subtype_of(n)));
        let gained = new.iter().any(|n| !old.iter().any(|o| n.is_subtype_of(o)));
        match (lost, gained) {
            (true, true) => DiffRule::TypeChanged,
            (true, false) => DiffRule::TypeNarrowed,
            (false, true) => DiffRule::TypeWidened,
            (false, false) => return,
        }
    };

    diffs.push(
        StructuralDiff::new(rule, path)
            .keyword("type")
            .values(Some(render_types(old)), Some(render_types(new))),
    );
}

fn diff_enum(old: Option<&[Value]>, new: Option<&[Value]>, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    match (old, new) {
        (None, None) => {}
        (None, Some(values)) => diffs.push(
            StructuralDiff::new(DiffRule::EnumIntroduced, path)
                .keyword("enum")
                .values(None, Some(Value::Array(values.to_vec()).to_string())),
        ),
        (Some(values), None) => diffs.push(
            StructuralDiff::new(DiffRule::EnumDropped, path)
                .keyword("enum")
                .values(Some(Value::Array(values.to_vec()).to_string()), None),
        ),
        (Some(old_values), Some(new_values)) => {
            for removed in old_values.iter().filter(|v| !new_values.contains(v)) {
                diffs.push(
                    StructuralDiff::new(DiffRule::EnumValueRemoved, path)
                        .keyword("enum")
                        .values(Some(removed.to_string()), None),
                );
            }
            for added in new_values.iter().filter(|v| !old_values.contains(v)) {
                diffs.push(
                    StructuralDiff::new(DiffRule::EnumValueAdded, path)
                        .keyword("enum")
                        .values(None, Some(added.to_string())),
                );
            }
        }
    }
}

fn diff_string_constraint(
    keyword: &str,
    old: &Option<String>,
    new: &Option<String>,
    stricter: DiffRule,
    removed: DiffRule,
    path: &PropertyPath,
    diffs: &mut Vec<StructuralDiff>,
) {
    let rule = match (old, new) {
        (None, None) => return,
        (Some(o), Some(n)) if o == n => return,
        // Regex and format containment is undecidable in general; any change
        // other than removal counts as stricter
        (_, Some(_)) => stricter,
        (Some(_), None) => removed,
    };
    diffs.push(
        StructuralDiff::new(rule, path)
            .keyword(keyword)
            .values(old.clone(), new.clone()),
    );
}

fn render_bound(v: Option<f64>) -> Option<String> {
    v.map(|v| if v.fract() == 0.0 { format!("{}", v as i64) } else { v.to_string() })
}

fn diff_lower_bound(keyword: &str, old: Option<f64>, new: Option<f64>, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    let rule = match (old, new) {
        (None, None) => return,
        (None, Some(_)) => DiffRule::BoundTightened,
        (Some(_), None) => DiffRule::BoundRelaxed,
        (Some(o), Some(n)) if n > o => DiffRule::BoundTightened,
        (Some(o), Some(n)) if n < o => DiffRule::BoundRelaxed,
        _ => return,
    };
    diffs.push(
        StructuralDiff::new(rule, path)
            .keyword(keyword)
            .values(render_bound(old), render_bound(new)),
    );
}

fn diff_upper_bound(keyword: &str, old: Option<f64>, new: Option<f64>, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    let rule = match (old, new) {
        (None, None) => return,
        (None, Some(_)) => DiffRule::BoundTightened,
        (Some(_), None) => DiffRule::BoundRelaxed,
        (Some(o), Some(n)) if n < o => DiffRule::BoundTightened,
        (Some(o), Some(n)) if n > o => DiffRule::BoundRelaxed,
        _ => return,
    };
    diffs.push(
        StructuralDiff::new(rule, path)
            .keyword(keyword)
            .values(render_bound(old), render_bound(new)),
    );
}

fn diff_multiple_of(old: Option<f64>, new: Option<f64>, path: &PropertyPath, diffs: &mut Vec<StructuralDiff>) {
    let rule = match (old, new) {
        (None, None) => return,
        (None, Some(_)) => DiffRule::BoundTightened,
        (Some(_), None) => DiffRule::BoundRelaxed,
        (Some(o), Some(n)) if o == n => return,
        // A divisor of the old step admits every old value
        (Some(o), Some(n)) if n != 0.0 && (o / n).fract() == 0.0 => DiffRule::BoundRelaxed,
        _ => DiffRule::BoundTightened,
    };
    diffs.push(
        StructuralDiff::new(rule, path)
            .keyword("multipleOf")
            .values(render_bound(old), render_bound(new)),
    );
}

// =============================================================================
// Composites
// =============================================================================

fn diff_composites(
    old: &CompositeConstraint,
    new: &CompositeConstraint,
    path: &PropertyPath,
    diffs: &mut Vec<StructuralDiff>,
) {
    if old.kind != new.kind {
        diffs.push(
            StructuralDiff::new(DiffRule::CompositeKindChanged, path)
                .values(Some(old.kind.to_string()), Some(new.kind.to_string())),
        );
        return;
    }

    let any = unconstrained();
    let old_base = old.base.as_deref().unwrap_or(&any);
    let new_base = new.base.as_deref().unwrap_or(&any);
    diff_nodes(old_base, new_base, &path.child(PathSegment::Base), diffs);

    let (removed_rule, added_rule) = match old.kind {
        // allOf branches are conjunctive: removing one relaxes the schema
        CompositeKind::AllOf => (DiffRule::AllOfBranchRemoved, DiffRule::AllOfBranchAdded),
        CompositeKind::AnyOf | CompositeKind::OneOf => (DiffRule::BranchRemoved, DiffRule::BranchAdded),
    };

    let (pairs, removed, added) = align_by_shape(&old.branches, &new.branches);
    for (o, n) in pairs {
        diff_nodes(
            &old.branches[o],
            &new.branches[n],
            &path.child(PathSegment::Branch(new.kind, n)),
            diffs,
        );
    }
    for o in removed {
        diffs.push(
            StructuralDiff::new(removed_rule, &path.child(PathSegment::Branch(old.kind, o)))
                .values(Some(old.branches[o].shape_key()), None),
        );
    }
    for n in added {
        diffs.push(
            StructuralDiff::new(added_rule, &path.child(PathSegment::Branch(new.kind, n)))
                .values(None, Some(new.branches[n].shape_key())),
        );
    }
}

/// Pair up nodes of two lists regardless of position.
///
/// Nodes with identical shape keys pair first; the remaining ones pair in
/// order when they share a variant. Returns `(pairs, unmatched old, unmatched new)`.
fn align_by_shape(old: &[ConstraintNode], new: &[ConstraintNode]) -> (Vec<(usize, usize)>, Vec<usize>, Vec<usize>) {
    let mut pairs = Vec::new();
    let mut old_left: Vec<usize> = (0..old.len()).collect();
    let mut new_left: Vec<usize> = (0..new.len()).collect();

    old_left.retain(|&o| {
        let key = old[o].shape_key();
        match new_left.iter().position(|&n| new[n].shape_key() == key) {
            Some(pos) => {
                pairs.push((o, new_left.remove(pos)));
                false
            }
            None => true,
        }
    });

    old_left.retain(|&o| {
        match new_left.iter().position(|&n| new[n].shape_name() == old[o].shape_name()) {
            Some(pos) => {
                pairs.push((o, new_left.remove(pos)));
                false
            }
            None => true,
        }
    });

    pairs.sort();
    (pairs, old_left, new_left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(version: &str, value: Value) -> DereferencedSchema {
        DereferencedSchema::from_tree(
            "https://schemas.example.org/member.schema.json",
            VersionTriple::parse(version).unwrap(),
            ConstraintNode::from_json(&value),
        )
    }

    fn rules(verdict: &CompatibilityVerdict) -> Vec<DiffRule> {
        verdict.diffs.iter().map(|d| d.rule).collect()
    }

    fn member(required: Value, extra: Value) -> Value {
        let mut properties = json!({
            "memberId": { "type": "string" },
            "firstName": { "type": "string" },
            "lastName": { "type": "string" }
        });
        if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                props.insert(k.clone(), v.clone());
            }
        }
        json!({ "type": "object", "required": required, "properties": properties })
    }

    #[test]
    fn test_identical_schemas_are_patch_with_no_diffs() {
        let value = member(json!(["memberId"]), json!({}));
        let verdict = classify(&schema("1.0.0", value.clone()), &schema("1.0.0", value));
        assert_eq!(verdict.class, CompatibilityClass::Patch);
        assert!(verdict.diffs.is_empty());
    }

    #[test]
    fn test_description_only_change_is_patch() {
        let mut old = member(json!(["memberId"]), json!({}));
        let mut new = old.clone();
        old["properties"]["firstName"]["description"] = json!("Given name");
        new["properties"]["firstName"]["description"] = json!("Given name of the member");
        new["title"] = json!("Member");

        let verdict = classify(&schema("1.0.0", old), &schema("1.0.1", new));
        assert_eq!(verdict.class, CompatibilityClass::Patch);
        assert_eq!(verdict.diffs.len(), 2);
        assert!(rules(&verdict).iter().all(|r| *r == DiffRule::AnnotationChanged));
    }

    #[test]
    fn test_new_required_field_is_major() {
        let old = member(json!(["memberId", "firstName"]), json!({}));
        let new = member(json!(["memberId", "firstName", "lastName"]), json!({}));

        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        assert_eq!(verdict.class, CompatibilityClass::Major);
        assert_eq!(rules(&verdict), vec![DiffRule::PropertyBecameRequired]);
        assert_eq!(verdict.diffs[0].path, "lastName");
    }

    #[test]
    fn test_required_property_added_from_nothing_is_major() {
        let old = json!({ "type": "object", "required": ["memberId"], "properties": { "memberId": { "type": "string" } } });
        let new = json!({
            "type": "object",
            "required": ["memberId", "lastName"],
            "properties": { "memberId": { "type": "string" }, "lastName": { "type": "string" } }
        });
        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        assert_eq!(rules(&verdict), vec![DiffRule::RequiredPropertyAdded]);
        assert_eq!(verdict.diffs[0].rule.label(), "required field added");
    }

    #[test]
    fn test_optional_enum_property_added_is_minor() {
        let old = member(json!(["memberId"]), json!({}));
        let new = member(
            json!(["memberId"]),
            json!({ "employmentStatus": { "type": "string", "enum": ["active", "terminated"] } }),
        );

        let verdict = classify(&schema("1.0.0", old), &schema("1.1.0", new));
        assert_eq!(verdict.class, CompatibilityClass::Minor);
        assert_eq!(rules(&verdict), vec![DiffRule::OptionalPropertyAdded]);
        assert_eq!(verdict.minimum_version(), VersionTriple::new(1, 1, 0));
    }

    #[test]
    fn test_removed_required_property_is_major() {
        let old = member(json!(["memberId", "firstName"]), json!({}));
        let mut new = member(json!(["memberId"]), json!({}));
        new["properties"].as_object_mut().unwrap().remove("firstName");

        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        assert_eq!(verdict.class, CompatibilityClass::Major);
        assert_eq!(rules(&verdict), vec![DiffRule::RequiredPropertyRemoved]);
    }

    #[test]
    fn test_enum_changes() {
        let old = json!({ "type": "string", "enum": ["active", "terminated"] });
        let added = json!({ "type": "string", "enum": ["active", "terminated", "leave"] });
        let removed = json!({ "type": "string", "enum": ["active"] });

        let verdict = classify(&schema("1.0.0", old.clone()), &schema("1.1.0", added));
        assert_eq!(verdict.class, CompatibilityClass::Minor);
        assert_eq!(verdict.diffs[0].new_value.as_deref(), Some("\"leave\""));

        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", removed));
        assert_eq!(verdict.class, CompatibilityClass::Major);
        assert_eq!(rules(&verdict), vec![DiffRule::EnumValueRemoved]);
    }

    #[test]
    fn test_type_narrowing_and_widening() {
        let verdict = classify(&schema("1.0.0", json!({ "type": "number" })), &schema("2.0.0", json!({ "type": "integer" })));
        assert_eq!(rules(&verdict), vec![DiffRule::TypeNarrowed]);

        let verdict = classify(&schema("1.0.0", json!({ "type": "integer" })), &schema("1.1.0", json!({ "type": "number" })));
        assert_eq!(rules(&verdict), vec![DiffRule::TypeWidened]);

        let verdict = classify(&schema("1.0.0", json!({ "type": "string" })), &schema("2.0.0", json!({ "type": "boolean" })));
        assert_eq!(rules(&verdict), vec![DiffRule::TypeChanged]);

        let verdict = classify(
            &schema("1.0.0", json!({ "type": "string" })),
            &schema("1.1.0", json!({ "type": ["string", "null"] })),
        );
        assert_eq!(verdict.class, CompatibilityClass::Minor);
    }

    #[test]
    fn test_object_to_array_falls_back_to_major() {
        let old = json!({ "properties": { "address": { "type": "object", "properties": { "street": { "type": "string" } } } } });
        let new = json!({ "properties": { "address": { "type": "array", "items": { "type": "string" } } } });

        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        assert_eq!(verdict.class, CompatibilityClass::Major);
        assert_eq!(rules(&verdict), vec![DiffRule::ShapeChanged]);
        assert_eq!(verdict.diffs[0].old_value.as_deref(), Some("object"));
        assert_eq!(verdict.diffs[0].new_value.as_deref(), Some("array"));
    }

    #[test]
    fn test_additional_properties_tightened() {
        let old = json!({ "type": "object", "properties": { "a": { "type": "string" } } });
        let new = json!({ "type": "object", "additionalProperties": false, "properties": { "a": { "type": "string" } } });

        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        assert_eq!(rules(&verdict), vec![DiffRule::AdditionalPropertiesTightened]);
    }

    #[test]
    fn test_opening_a_closed_schema_with_new_property_is_major() {
        let old = json!({ "type": "object", "additionalProperties": false, "properties": { "a": { "type": "string" } } });
        let new = json!({
            "type": "object",
            "additionalProperties": true,
            "properties": { "a": { "type": "string" }, "b": { "type": "string" } }
        });

        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        assert_eq!(verdict.class, CompatibilityClass::Major);
        assert!(rules(&verdict).contains(&DiffRule::PropertyAddedToOpenedSchema));
        assert!(rules(&verdict).contains(&DiffRule::AdditionalPropertiesOpened));
        assert!(!rules(&verdict).contains(&DiffRule::OptionalPropertyAdded));
    }

    #[test]
    fn test_optional_property_added_to_closed_schema_stays_minor() {
        let old = json!({ "type": "object", "additionalProperties": false, "properties": { "a": { "type": "string" } } });
        let new = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": { "a": { "type": "string" }, "b": { "type": "string" } }
        });
        let verdict = classify(&schema("1.0.0", old), &schema("1.1.0", new));
        assert_eq!(rules(&verdict), vec![DiffRule::OptionalPropertyAdded]);
    }

    #[test]
    fn test_pattern_format_and_bounds() {
        let old = json!({ "type": "string", "maxLength": 20, "minLength": 1 });
        let relaxed = json!({ "type": "string", "maxLength": 40, "minLength": 1 });
        let patterned = json!({ "type": "string", "maxLength": 20, "minLength": 1, "pattern": "^[A-Z]+$" });
        let formatted = json!({ "type": "string", "maxLength": 20, "minLength": 1, "format": "email" });

        let verdict = classify(&schema("1.0.0", old.clone()), &schema("1.1.0", relaxed));
        assert_eq!(rules(&verdict), vec![DiffRule::BoundRelaxed]);
        assert_eq!(verdict.diffs[0].keyword.as_deref(), Some("maxLength"));
        assert_eq!(verdict.diffs[0].old_value.as_deref(), Some("20"));

        let verdict = classify(&schema("1.0.0", old.clone()), &schema("2.0.0", patterned.clone()));
        assert_eq!(rules(&verdict), vec![DiffRule::PatternChanged]);

        let verdict = classify(&schema("1.0.0", patterned), &schema("1.1.0", old.clone()));
        assert_eq!(rules(&verdict), vec![DiffRule::PatternRemoved]);

        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", formatted));
        assert_eq!(rules(&verdict), vec![DiffRule::FormatChanged]);
    }

    #[test]
    fn test_array_min_items_and_items() {
        let old = json!({ "type": "array", "items": { "type": "string" }, "minItems": 2 });
        let new = json!({ "type": "array", "items": { "type": "string" }, "minItems": 1 });
        let verdict = classify(&schema("1.0.0", old), &schema("1.1.0", new));
        assert_eq!(rules(&verdict), vec![DiffRule::BoundRelaxed]);

        let old = json!({ "type": "array", "items": { "type": "string" } });
        let new = json!({ "type": "array", "items": { "type": "integer" } });
        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        assert_eq!(verdict.diffs[0].path, "[]");
        assert_eq!(verdict.class, CompatibilityClass::Major);
    }

    #[test]
    fn test_composite_branches_align_regardless_of_order() {
        let old = json!({ "oneOf": [ { "type": "string" }, { "type": "integer" } ] });
        let reordered = json!({ "oneOf": [ { "type": "integer" }, { "type": "string" } ] });
        let extended = json!({ "oneOf": [ { "type": "integer" }, { "type": "string" }, { "type": "boolean" } ] });
        let shrunk = json!({ "oneOf": [ { "type": "integer" } ] });

        assert!(classify(&schema("1.0.0", old.clone()), &schema("1.0.1", reordered)).diffs.is_empty());
        assert_eq!(
            rules(&classify(&schema("1.0.0", old.clone()), &schema("1.1.0", extended))),
            vec![DiffRule::BranchAdded]
        );
        assert_eq!(
            classify(&schema("1.0.0", old), &schema("2.0.0", shrunk)).class,
            CompatibilityClass::Major
        );
    }

    #[test]
    fn test_nested_diffs_are_ordered_by_path() {
        let old = json!({
            "type": "object",
            "properties": {
                "b": { "type": "object", "properties": { "x": { "type": "string" } } },
                "a": { "type": "string" }
            }
        });
        let new = json!({
            "type": "object",
            "properties": {
                "b": { "type": "object", "properties": { "x": { "type": "string", "maxLength": 5 }, "y": { "type": "string" } } },
                "c": { "type": "string" }
            }
        });
        let verdict = classify(&schema("1.0.0", old), &schema("2.0.0", new));
        let paths: Vec<&str> = verdict.diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b.x", "b.y", "c"]);
        assert_eq!(verdict.class, CompatibilityClass::Major);
        assert_eq!(verdict.deciding_diffs().count(), 2);
    }

    fn resolved(version: &str, value: Value) -> DereferencedSchema {
        let doc = crate::schema::SchemaDocument::new(
            std::path::PathBuf::from(format!("member/v{}/member.schema.json", version)),
            "member".to_string(),
            VersionTriple::parse(version).unwrap(),
            value,
        );
        let corpus = crate::store::Corpus::new(vec![doc.clone()]);
        crate::resolver::resolve(&doc, &corpus).unwrap()
    }

    fn coded(code: Value) -> Value {
        json!({
            "type": "object",
            "properties": { "code": code },
            "$defs": { "Code": { "type": "string", "minLength": 1 } }
        })
    }

    #[test]
    fn test_constraints_next_to_ref_are_compared() {
        let old = coded(json!({ "$ref": "#/$defs/Code", "maxLength": 10 }));
        let new = coded(json!({ "$ref": "#/$defs/Code", "maxLength": 3, "pattern": "^[A-Z]+$" }));

        let verdict = classify(&resolved("1.0.0", old), &resolved("1.0.1", new));
        assert_eq!(verdict.class, CompatibilityClass::Major);
        assert_eq!(rules(&verdict), vec![DiffRule::PatternChanged, DiffRule::BoundTightened]);
        assert!(verdict.diffs.iter().all(|d| d.path == "code<base>"));
    }

    #[test]
    fn test_adding_and_dropping_constraints_next_to_ref() {
        let bare = coded(json!({ "$ref": "#/$defs/Code", "default": "A" }));
        let bounded = coded(json!({ "$ref": "#/$defs/Code", "default": "A", "maxLength": 3 }));

        let tightened = classify(&resolved("1.0.0", bare.clone()), &resolved("2.0.0", bounded.clone()));
        assert_eq!(rules(&tightened), vec![DiffRule::BoundTightened]);
        assert_eq!(tightened.class, CompatibilityClass::Major);

        let relaxed = classify(&resolved("1.0.0", bounded), &resolved("1.1.0", bare));
        assert_eq!(rules(&relaxed), vec![DiffRule::BoundRelaxed]);
        assert_eq!(relaxed.class, CompatibilityClass::Minor);
    }
}
