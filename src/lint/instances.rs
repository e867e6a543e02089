//! Instance validation
//!
//! JSON files under an instance prefix are checked against the schema they
//! belong to. The schema is named by the instance's `$schema` (a `$id` or a
//! repository path), or found by convention: the instance prefix is dropped
//! and `.json` becomes `.schema.json`, so `instances/member/v1.0.0/member.json`
//! maps to `member/v1.0.0/member.schema.json`.

use jsonschema::{JSONSchema, SchemaResolver, SchemaResolverError};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use url::Url;

use super::pointer_to_path;
use crate::report::{GovernanceIssue, IssueCode, Location};
use crate::schema::{strip_fragment, SchemaDocument};
use crate::store::{to_slash, Corpus, InstanceFile, Lookup};

/// Serves `$ref`s from the loaded corpus instead of the network
struct CorpusSchemas {
    by_id: Arc<HashMap<String, Arc<Value>>>,
}

impl SchemaResolver for CorpusSchemas {
    fn resolve(&self, _root_schema: &Value, url: &Url, _original_reference: &str) -> Result<Arc<Value>, SchemaResolverError> {
        self.by_id
            .get(strip_fragment(url.as_str()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} is not a schema in this repository", url))
    }
}

/// Validates instance files against corpus schemas
pub struct InstanceValidator<'c> {
    corpus: &'c Corpus,
    instance_prefixes: Vec<String>,
    by_id: Arc<HashMap<String, Arc<Value>>>,
}

impl<'c> InstanceValidator<'c> {
    pub fn new(corpus: &'c Corpus, instance_prefixes: &[String]) -> Self {
        let by_id = corpus
            .documents()
            .iter()
            .filter_map(|doc| {
                let id = strip_fragment(doc.id.as_deref()?);
                match corpus.get(id) {
                    Lookup::Found(_) => Some((id.to_string(), Arc::new(doc.raw.clone()))),
                    _ => None,
                }
            })
            .collect();

        Self {
            corpus,
            instance_prefixes: instance_prefixes.to_vec(),
            by_id: Arc::new(by_id),
        }
    }

    /// Schema `instance` should satisfy
    pub fn schema_for(&self, instance: &InstanceFile) -> Option<&'c SchemaDocument> {
        match declared_schema(instance) {
            Some(declared) => self.declared_candidates(instance, declared).into_iter().find_map(|c| {
                self.corpus.get_by_identity(&c)
            }),
            None => self.corpus.get_by_path(&self.conventional_path(instance)?),
        }
    }

    /// Validate one instance. A missing schema is an issue of its own.
    pub fn validate(&self, instance: &InstanceFile) -> Vec<GovernanceIssue> {
        let location = Location::new(instance.path_str());
        let Some(schema) = self.schema_for(instance) else {
            let message = match declared_schema(instance) {
                Some(declared) => format!("$schema '{}' does not name a schema in this repository", declared),
                None => format!(
                    "no $schema and no schema at '{}'",
                    self.conventional_path(instance).unwrap_or_default()
                ),
            };
            return vec![GovernanceIssue::new(IssueCode::InstanceSchemaNotFound, location, message)];
        };

        let resolver = CorpusSchemas {
            by_id: Arc::clone(&self.by_id),
        };
        let compiled = match JSONSchema::options().with_resolver(resolver).compile(&schema.raw) {
            Ok(compiled) => compiled,
            Err(e) => {
                return vec![GovernanceIssue::new(
                    IssueCode::InvalidInstance,
                    location,
                    format!("cannot validate against {}: {}", schema.path_str(), e),
                )]
            }
        };

        let mut value = instance.value.clone();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("$schema");
        }

        let result = compiled.validate(&value);
        let Err(errors) = result else {
            return Vec::new();
        };
        let mut issue = GovernanceIssue::new(
            IssueCode::InvalidInstance,
            location,
            format!("instance does not satisfy {}", schema.path_str()),
        );
        issue.context = errors
            .map(|e| format!("{}: {}", pointer_to_path(&e.instance_path.to_string()), e))
            .collect();
        vec![issue]
    }

    /// Repository path of the schema by naming convention
    fn conventional_path(&self, instance: &InstanceFile) -> Option<String> {
        let relative = instance.path_str();
        let prefix = self.instance_prefixes.iter().find(|p| relative.starts_with(p.as_str()))?;
        let stem = relative[prefix.len()..].strip_suffix(".json")?;
        Some(format!("{}.schema.json", stem))
    }

    /// `$schema` read as a `$id`, a repository path, or a path relative to the instance
    fn declared_candidates(&self, instance: &InstanceFile, declared: &str) -> Vec<String> {
        let declared = strip_fragment(declared);
        let mut candidates = vec![declared.to_string()];
        if !declared.contains("://") {
            let base = instance.path.parent().unwrap_or_else(|| Path::new(""));
            if let Some(joined) = normalize(&base.join(declared)) {
                candidates.push(joined);
            }
        }
        candidates
    }
}

fn declared_schema(instance: &InstanceFile) -> Option<&str> {
    instance.value.get("$schema").and_then(Value::as_str)
}

/// Collapse `.` and `..` segments; `None` when the path escapes the root
fn normalize(path: &Path) -> Option<String> {
    let mut parts = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                if !parts.pop() {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(to_slash(&parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionTriple;
    use serde_json::json;

    const ADDRESS_ID: &str = "https://schemas.example.org/address/v1.0.0/address.schema.json";

    fn corpus() -> Corpus {
        let address = SchemaDocument::new(
            PathBuf::from("address/v1.0.0/address.schema.json"),
            "address".to_string(),
            VersionTriple::new(1, 0, 0),
            json!({
                "$id": ADDRESS_ID,
                "type": "object",
                "required": ["postalCode"],
                "properties": { "postalCode": { "type": "string", "pattern": "^[0-9]{5}$" } }
            }),
        );
        let member = SchemaDocument::new(
            PathBuf::from("member/v1.0.0/member.schema.json"),
            "member".to_string(),
            VersionTriple::new(1, 0, 0),
            json!({
                "$id": "https://schemas.example.org/member/v1.0.0/member.schema.json",
                "type": "object",
                "required": ["memberId"],
                "properties": {
                    "memberId": { "type": "string" },
                    "address": { "$ref": ADDRESS_ID }
                },
                "additionalProperties": false
            }),
        );
        Corpus::new(vec![address, member])
    }

    fn instance(path: &str, value: Value) -> InstanceFile {
        InstanceFile {
            path: PathBuf::from(path),
            value,
        }
    }

    fn validator(corpus: &Corpus) -> InstanceValidator<'_> {
        InstanceValidator::new(corpus, &["instances/".to_string()])
    }

    #[test]
    fn test_schema_found_by_convention() {
        let corpus = corpus();
        let validator = validator(&corpus);
        let i = instance("instances/member/v1.0.0/member.json", json!({ "memberId": "M1" }));
        assert_eq!(
            validator.schema_for(&i).map(|d| d.path_str()).as_deref(),
            Some("member/v1.0.0/member.schema.json")
        );
        assert!(validator.validate(&i).is_empty());
    }

    #[test]
    fn test_schema_named_by_dollar_schema() {
        let corpus = corpus();
        let validator = validator(&corpus);

        let by_id = instance("instances/samples/home.json", json!({ "$schema": ADDRESS_ID, "postalCode": "12345" }));
        assert_eq!(validator.schema_for(&by_id).map(|d| d.family.as_str()), Some("address"));
        assert!(validator.validate(&by_id).is_empty());

        let relative = instance(
            "instances/samples/home.json",
            json!({ "$schema": "../../address/v1.0.0/address.schema.json", "postalCode": "12345" }),
        );
        assert_eq!(validator.schema_for(&relative).map(|d| d.family.as_str()), Some("address"));
    }

    #[test]
    fn test_referenced_schemas_come_from_the_corpus() {
        let corpus = corpus();
        let validator = validator(&corpus);
        let i = instance(
            "instances/member/v1.0.0/member.json",
            json!({ "memberId": "M1", "address": { "postalCode": "ABCDE" } }),
        );

        let issues = validator.validate(&i);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::InvalidInstance);
        assert!(issues[0].message.contains("member/v1.0.0/member.schema.json"));
        assert!(issues[0].context.iter().any(|c| c.starts_with("address.postalCode")));
    }

    #[test]
    fn test_missing_schema() {
        let corpus = corpus();
        let validator = validator(&corpus);

        let issues = validator.validate(&instance("instances/claim/v1.0.0/claim.json", json!({})));
        assert_eq!(issues[0].code, IssueCode::InstanceSchemaNotFound);
        assert!(issues[0].message.contains("claim/v1.0.0/claim.schema.json"));

        let issues = validator.validate(&instance(
            "instances/member/v1.0.0/member.json",
            json!({ "$schema": "https://schemas.example.org/nope.schema.json" }),
        ));
        assert_eq!(issues[0].code, IssueCode::InstanceSchemaNotFound);
        assert!(issues[0].message.contains("nope.schema.json"));
    }
}
