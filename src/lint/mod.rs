//! Naming and layout linting
//!
//! Enforces the repository conventions that make a schema addressable:
//!
//! ## Lints
//! 1. **Identity**: every document declares a `$id`
//! 2. **Placement**: the `$id` path, minus the configured base URI, equals the
//!    repository path of the document
//! 3. **One per folder**: a version folder holds exactly one schema document
//! 4. **Well-formedness**: the document compiles as a JSON Schema and its own
//!    `examples` satisfy it
//! 5. **Stale references**: references to deprecated or retired schemas
//! 6. **Instances**: data files under an instance prefix satisfy their schema
//!    (see [`instances`])

mod instances;

pub use instances::InstanceValidator;

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::NamingConfig;
use crate::lifecycle::{metadata_object, LifecycleStatus};
use crate::report::{GovernanceIssue, IssueCode, Location};
use crate::resolver::{EdgeResolution, ReferenceEdge};
use crate::schema::{strip_fragment, SchemaDocument};
use crate::store::{to_slash, Corpus};

/// The naming linter
pub struct NamingLinter {
    config: NamingConfig,
    /// Matches `scheme://authority` at the start of a URI
    authority: Regex,
}

impl Default for NamingLinter {
    fn default() -> Self {
        Self::new(NamingConfig::default())
    }
}

impl NamingLinter {
    pub fn new(config: NamingConfig) -> Self {
        Self {
            config,
            authority: Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^/]*").expect("static regex"),
        }
    }

    /// Lint a single document
    pub fn lint(&self, doc: &SchemaDocument) -> Vec<GovernanceIssue> {
        let mut issues = Vec::new();
        self.lint_id(doc, &mut issues);
        if self.config.check_meta_schema {
            self.lint_structure(doc, &mut issues);
        }
        issues
    }

    /// Repository path an `$id` maps to, or `None` if it lies outside `id_base`
    pub fn expected_path(&self, id: &str) -> Option<String> {
        let id = strip_fragment(id);
        let remainder = match &self.config.id_base {
            Some(base) => id.strip_prefix(base.as_str())?,
            None => match self.authority.find(id) {
                Some(m) => &id[m.end()..],
                None => id,
            },
        };
        Some(remainder.trim_start_matches('/').to_string())
    }

    fn lint_id(&self, doc: &SchemaDocument, issues: &mut Vec<GovernanceIssue>) {
        let Some(id) = &doc.id else {
            if self.config.require_id {
                issues.push(GovernanceIssue::new(
                    IssueCode::MissingId,
                    Location::document(doc),
                    "document declares no $id",
                ));
            }
            return;
        };

        let actual = doc.path_str();
        match self.expected_path(id) {
            Some(expected) if expected == actual => {}
            Some(expected) => issues.push(
                GovernanceIssue::new(
                    IssueCode::IdPathMismatch,
                    Location::document(doc).at("$id"),
                    format!("$id '{}' implies path '{}' but document lives at '{}'", id, expected, actual),
                )
                .with_context(format!("expected $id ending in /{}", actual)),
            ),
            None => issues.push(GovernanceIssue::new(
                IssueCode::IdPathMismatch,
                Location::document(doc).at("$id"),
                format!(
                    "$id '{}' is outside the configured base '{}'",
                    id,
                    self.config.id_base.as_deref().unwrap_or_default()
                ),
            )),
        }
    }

    fn lint_structure(&self, doc: &SchemaDocument, issues: &mut Vec<GovernanceIssue>) {
        let compiled = match jsonschema::JSONSchema::compile(&doc.raw) {
            Ok(compiled) => compiled,
            Err(e) => {
                issues.push(GovernanceIssue::new(
                    IssueCode::InvalidSchema,
                    Location::document(doc).at(pointer_to_path(&e.instance_path.to_string())),
                    format!("not a well-formed JSON Schema: {}", e),
                ));
                return;
            }
        };

        // Examples are only checked when the document needs nothing from
        // outside itself to validate
        let self_contained = doc.references.iter().all(|r| r.target.starts_with('#'));
        if !self_contained {
            return;
        }
        let Some(examples) = doc.raw.get("examples").and_then(Value::as_array) else {
            return;
        };
        for (i, example) in examples.iter().enumerate() {
            if let Err(errors) = compiled.validate(example) {
                let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
                let mut issue = GovernanceIssue::new(
                    IssueCode::InvalidExample,
                    Location::document(doc).at(format!("examples[{}]", i)),
                    format!("example {} does not satisfy the schema", i),
                );
                issue.context = messages;
                issues.push(issue);
            }
        }
    }

    /// Corpus-wide layout checks: folders with several documents and `$id`s
    /// declared more than once
    pub fn lint_corpus(&self, corpus: &Corpus) -> Vec<GovernanceIssue> {
        let mut issues = Vec::new();

        let mut folders: BTreeMap<String, Vec<&SchemaDocument>> = BTreeMap::new();
        for doc in corpus.documents() {
            let folder = doc.path.parent().map(to_slash).unwrap_or_default();
            folders.entry(folder).or_default().push(doc);
        }
        for (folder, docs) in folders.iter().filter(|(_, docs)| docs.len() > 1) {
            for doc in docs {
                let mut issue = GovernanceIssue::new(
                    IssueCode::MultipleDocumentsInFolder,
                    Location::document(doc),
                    format!("version folder '{}' holds {} schema documents", folder, docs.len()),
                );
                issue.context = docs.iter().filter(|d| d.path != doc.path).map(|d| d.path_str()).collect();
                issues.push(issue);
            }
        }

        for (id, docs) in corpus.duplicate_ids() {
            for doc in &docs {
                let mut issue = GovernanceIssue::new(
                    IssueCode::DuplicateId,
                    Location::document(doc).at("$id"),
                    format!("$id '{}' is declared by {} documents", id, docs.len()),
                );
                issue.context = docs.iter().filter(|d| d.path != doc.path).map(|d| d.path_str()).collect();
                issues.push(issue);
            }
        }

        issues
    }

    /// Warn about references from `doc` to schemas that are being phased out
    pub fn lint_references(
        &self,
        doc: &SchemaDocument,
        edges: &[ReferenceEdge],
        corpus: &Corpus,
        metadata_property: &str,
    ) -> Vec<GovernanceIssue> {
        let own_identity = doc.identity();
        let mut issues = Vec::new();

        for edge in edges {
            let EdgeResolution::Resolved { document, .. } = &edge.resolution else {
                continue;
            };
            if *document == own_identity {
                continue;
            }
            let Some(target) = corpus.get_by_identity(document) else {
                continue;
            };

            let status = metadata_object(&target.raw, metadata_property)
                .and_then(|m| m.get("status"))
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<LifecycleStatus>().ok());
            let flagged = target.root.annotations().deprecated;

            let reason = match status {
                Some(LifecycleStatus::Deprecated) | Some(LifecycleStatus::Retired) => {
                    format!("is {}", status.map(|s| s.as_str()).unwrap_or_default())
                }
                _ if flagged => "is marked deprecated".to_string(),
                _ => continue,
            };

            issues.push(GovernanceIssue::new(
                IssueCode::DeprecatedReference,
                Location::document(doc).at(edge.location.clone()),
                format!("reference '{}' targets {} which {}", edge.target, target.path_str(), reason),
            ));
        }

        issues
    }
}

/// Render a JSON pointer such as `/properties/age/type` as `properties.age.type`
fn pointer_to_path(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "<root>".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}
