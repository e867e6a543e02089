//! Lifecycle metadata validation
//!
//! Every schema document embeds a governance metadata block, by default as the
//! `default` of its `modelMetadata` property:
//!
//! ```json
//! "modelMetadata": {
//!   "$ref": "https://schemas.example.org/common/v1.0.0/model-metadata.schema.json",
//!   "default": {
//!     "canonical": "https://schemas.example.org/member",
//!     "version": "1.1.0",
//!     "metaVersion": 3,
//!     "status": "active",
//!     "createdDate": "2024-01-15"
//!   }
//! }
//! ```
//!
//! The status follows a one-way state machine:
//! `draft -> active -> deprecated -> retired`. Retired is terminal.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::LifecycleConfig;
use crate::report::{GovernanceIssue, IssueCode, Location};
use crate::schema::SchemaDocument;
use crate::version::VersionTriple;

/// Governance status of a schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Draft,
    Active,
    Deprecated,
    Retired,
}

impl LifecycleStatus {
    /// Status every family starts from
    pub const INITIAL: LifecycleStatus = LifecycleStatus::Draft;

    /// Whether `self -> next` is legal. Staying put always is.
    pub fn can_transition_to(&self, next: LifecycleStatus) -> bool {
        use LifecycleStatus::*;
        *self == next || matches!((self, next), (Draft, Active) | (Active, Deprecated) | (Deprecated, Retired))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Retired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Retired => "retired",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            "retired" => Ok(Self::Retired),
            other => Err(format!(
                "unknown status '{}' (expected draft, active, deprecated or retired)",
                other
            )),
        }
    }
}

/// Parsed governance metadata of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataBlock {
    pub canonical: String,
    pub version: VersionTriple,
    pub meta_version: u64,
    pub status: LifecycleStatus,
    pub created_date: NaiveDate,
    pub last_modified_date: Option<NaiveDate>,
    pub last_reviewed_date: Option<NaiveDate>,
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Locate the raw metadata object of a document
pub fn metadata_object<'a>(raw: &'a Value, property: &str) -> Option<&'a Map<String, Value>> {
    raw.get("properties")
        .and_then(|p| p.get(property))
        .and_then(|p| p.get("default"))
        .and_then(Value::as_object)
        .or_else(|| raw.get(property).and_then(Value::as_object))
}

/// Checks metadata blocks and their evolution across a family
#[derive(Debug, Clone, Default)]
pub struct LifecycleValidator {
    config: LifecycleConfig,
}

impl LifecycleValidator {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Parse the metadata block of `doc`.
    ///
    /// Returns the block when every required field is present and well-typed,
    /// along with one issue per problem found.
    pub fn extract(&self, doc: &SchemaDocument) -> (Option<MetadataBlock>, Vec<GovernanceIssue>) {
        let property = self.config.metadata_property.as_str();
        let mut issues = Vec::new();

        let Some(meta) = metadata_object(&doc.raw, property) else {
            if self.config.require_metadata {
                issues.push(GovernanceIssue::new(
                    IssueCode::MissingMetadata,
                    Location::document(doc).at(property),
                    format!("no '{}' metadata block", property),
                ));
            }
            return (None, issues);
        };

        let mut fields = FieldReader {
            doc,
            property,
            meta,
            issues: &mut issues,
        };

        let canonical = fields.required("canonical", |v| v.as_str().map(String::from), "a URI string");
        let version = fields.required(
            "version",
            |v| v.as_str().and_then(|s| VersionTriple::parse(s).ok()),
            "a MAJOR.MINOR.PATCH string",
        );
        let meta_version = fields.required("metaVersion", Value::as_u64, "a non-negative integer");
        let status = fields.required(
            "status",
            |v| v.as_str().and_then(|s| s.parse::<LifecycleStatus>().ok()),
            "one of draft, active, deprecated, retired",
        );
        let created_date = fields.required("createdDate", |v| v.as_str().and_then(parse_date), "a date");
        let last_modified_date = fields.optional("lastModifiedDate", |v| v.as_str().and_then(parse_date), "a date");
        let last_reviewed_date = fields.optional("lastReviewedDate", |v| v.as_str().and_then(parse_date), "a date");

        let block = match (canonical, version, meta_version, status, created_date) {
            (Some(canonical), Some(version), Some(meta_version), Some(status), Some(created_date)) => Some(MetadataBlock {
                canonical,
                version,
                meta_version,
                status,
                created_date,
                last_modified_date,
                last_reviewed_date,
            }),
            _ => None,
        };
        (block, issues)
    }

    /// Validate `doc` against the blocks of its predecessors (ascending order)
    pub fn validate(&self, doc: &SchemaDocument, history: &[MetadataBlock]) -> Vec<GovernanceIssue> {
        let (block, mut issues) = self.extract(doc);
        if let Some(block) = block {
            issues.extend(self.check(doc, &block, history));
        }
        issues
    }

    /// Validate every version of a family, oldest first
    pub fn validate_family(&self, versions: &[&SchemaDocument]) -> Vec<GovernanceIssue> {
        let mut history: Vec<MetadataBlock> = Vec::with_capacity(versions.len());
        let mut issues = Vec::new();

        for doc in versions {
            let (block, extracted) = self.extract(doc);
            issues.extend(extracted);
            if let Some(block) = block {
                issues.extend(self.check(doc, &block, &history));
                history.push(block);
            }
        }
        issues
    }

    /// Cross-checks for an already extracted block
    pub fn check(&self, doc: &SchemaDocument, block: &MetadataBlock, history: &[MetadataBlock]) -> Vec<GovernanceIssue> {
        let property = self.config.metadata_property.as_str();
        let at = |key: &str| Location::document(doc).at(format!("{}.{}", property, key));
        let mut issues = Vec::new();

        if block.version != doc.folder_version {
            issues.push(GovernanceIssue::new(
                IssueCode::MetadataVersionMismatch,
                at("version"),
                format!(
                    "metadata version {} does not match folder {}",
                    block.version,
                    doc.folder_version.dir_name()
                ),
            ));
        }

        for (key, date) in [
            ("lastModifiedDate", block.last_modified_date),
            ("lastReviewedDate", block.last_reviewed_date),
        ] {
            if let Some(date) = date.filter(|d| *d < block.created_date) {
                issues.push(GovernanceIssue::new(
                    IssueCode::DateBeforeCreation,
                    at(key),
                    format!("{} {} is before createdDate {}", key, date, block.created_date),
                ));
            }
        }

        if let Some(retired) = history.iter().find(|b| b.status.is_terminal()) {
            issues.push(GovernanceIssue::new(
                IssueCode::VersionAfterRetirement,
                at("status"),
                format!("version {} follows retired version {}", block.version, retired.version),
            ));
        } else {
            let previous = history.last().map(|b| b.status).unwrap_or(LifecycleStatus::INITIAL);
            if !previous.can_transition_to(block.status) {
                issues.push(GovernanceIssue::new(
                    IssueCode::IllegalTransition,
                    at("status"),
                    format!("illegal lifecycle transition {} -> {}", previous, block.status),
                ));
            }
        }

        if let Some(prior) = history.last() {
            if block.meta_version <= prior.meta_version {
                issues.push(GovernanceIssue::new(
                    IssueCode::MetaVersionNotIncreasing,
                    at("metaVersion"),
                    format!(
                        "metaVersion {} must be greater than {} of version {}",
                        block.meta_version, prior.meta_version, prior.version
                    ),
                ));
            }
        }

        if let Some(first) = history.first() {
            if block.created_date != first.created_date {
                issues.push(GovernanceIssue::new(
                    IssueCode::CreatedDateChanged,
                    at("createdDate"),
                    format!(
                        "createdDate {} differs from {} recorded by version {}",
                        block.created_date, first.created_date, first.version
                    ),
                ));
            }
            if block.canonical != first.canonical {
                issues.push(GovernanceIssue::new(
                    IssueCode::CanonicalChanged,
                    at("canonical"),
                    format!(
                        "canonical '{}' differs from '{}' of version {}",
                        block.canonical, first.canonical, first.version
                    ),
                ));
            }
        }

        debug!(path = %doc.path_str(), status = %block.status, issues = issues.len(), "lifecycle checked");
        issues
    }
}

/// Reads typed fields out of a metadata object, recording an issue per bad field
struct FieldReader<'a> {
    doc: &'a SchemaDocument,
    property: &'a str,
    meta: &'a Map<String, Value>,
    issues: &'a mut Vec<GovernanceIssue>,
}

impl FieldReader<'_> {
    fn location(&self, key: &str) -> Location {
        Location::document(self.doc).at(format!("{}.{}", self.property, key))
    }

    fn required<T>(&mut self, key: &str, parse: impl Fn(&Value) -> Option<T>, expected: &str) -> Option<T> {
        match self.meta.get(key) {
            None | Some(Value::Null) => {
                let location = self.location(key);
                self.issues.push(GovernanceIssue::new(
                    IssueCode::MissingMetadataField,
                    location,
                    format!("metadata field '{}' is missing", key),
                ));
                None
            }
            Some(value) => self.parse(key, value, parse, expected),
        }
    }

    fn optional<T>(&mut self, key: &str, parse: impl Fn(&Value) -> Option<T>, expected: &str) -> Option<T> {
        match self.meta.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => self.parse(key, value, parse, expected),
        }
    }

    fn parse<T>(&mut self, key: &str, value: &Value, parse: impl Fn(&Value) -> Option<T>, expected: &str) -> Option<T> {
        let parsed = parse(value);
        if parsed.is_none() {
            let location = self.location(key);
            self.issues.push(GovernanceIssue::new(
                IssueCode::InvalidMetadataField,
                location,
                format!("metadata field '{}' must be {}, found {}", key, expected, value),
            ));
        }
        parsed
    }
}
