//! Governance Report
//!
//! Collects issues and compatibility verdicts per document and aggregates
//! them into a deterministic, serialisable report. Ordering never depends on
//! the order in which families finished processing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::compatibility::CompatibilityVerdict;
use crate::error::{LoadError, ResolutionError};
use crate::schema::SchemaDocument;
use crate::store::to_slash;
use crate::version::{CompatibilityClass, VersionTriple};

// =============================================================================
// Issue Codes
// =============================================================================

/// Category an issue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Naming,
    Reference,
    Versioning,
    Lifecycle,
    Structure,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Naming => write!(f, "naming"),
            Self::Reference => write!(f, "reference"),
            Self::Versioning => write!(f, "versioning"),
            Self::Lifecycle => write!(f, "lifecycle"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

/// Stable code identifying the rule behind an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueCode {
    // === Naming ===
    /// Document declares no `$id`
    MissingId,
    /// `$id` path does not match the repository path
    IdPathMismatch,
    /// More than one document in a version folder
    MultipleDocumentsInFolder,
    /// Document is not inside a vMAJOR.MINOR.PATCH folder
    InvalidVersionFolder,
    /// Same `$id` declared by several documents
    DuplicateId,

    // === Structure ===
    /// File could not be read
    Unreadable,
    /// File is not valid JSON or YAML
    ParseFailure,
    /// Top level is not an object
    NotAnObject,
    /// Document is not a well-formed JSON Schema
    InvalidSchema,
    /// An entry of the root `examples` fails the document's own constraints
    InvalidExample,
    /// An instance file fails its schema
    InvalidInstance,
    /// No schema found for an instance file
    InstanceSchemaNotFound,

    // === Reference ===
    UnresolvedReference,
    CyclicReference,
    AmbiguousReference,
    ReferenceTooDeep,
    /// Target of a reference is deprecated or retired
    DeprecatedReference,

    // === Versioning ===
    /// Successor version is not greater than its predecessor
    VersionNotIncreasing,
    /// Declared version step is smaller than the compatibility verdict
    InsufficientVersionBump,
    /// Folder version and metadata version disagree
    MetadataVersionMismatch,

    // === Lifecycle ===
    MissingMetadata,
    MissingMetadataField,
    InvalidMetadataField,
    IllegalTransition,
    VersionAfterRetirement,
    MetaVersionNotIncreasing,
    CreatedDateChanged,
    CanonicalChanged,
    /// lastModifiedDate / lastReviewedDate before createdDate
    DateBeforeCreation,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingId => "N001",
            Self::IdPathMismatch => "N002",
            Self::MultipleDocumentsInFolder => "N003",
            Self::InvalidVersionFolder => "N004",
            Self::DuplicateId => "N005",
            Self::Unreadable => "S001",
            Self::ParseFailure => "S002",
            Self::NotAnObject => "S003",
            Self::InvalidSchema => "S004",
            Self::InvalidExample => "S005",
            Self::InvalidInstance => "S006",
            Self::InstanceSchemaNotFound => "S007",
            Self::UnresolvedReference => "R001",
            Self::CyclicReference => "R002",
            Self::AmbiguousReference => "R003",
            Self::ReferenceTooDeep => "R004",
            Self::DeprecatedReference => "R005",
            Self::VersionNotIncreasing => "V001",
            Self::InsufficientVersionBump => "V002",
            Self::MetadataVersionMismatch => "V003",
            Self::MissingMetadata => "L001",
            Self::MissingMetadataField => "L002",
            Self::InvalidMetadataField => "L003",
            Self::IllegalTransition => "L004",
            Self::VersionAfterRetirement => "L005",
            Self::MetaVersionNotIncreasing => "L006",
            Self::CreatedDateChanged => "L007",
            Self::CanonicalChanged => "L008",
            Self::DateBeforeCreation => "L009",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DeprecatedReference | Self::DateBeforeCreation => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn category(&self) -> IssueCategory {
        match self {
            Self::MissingId
            | Self::IdPathMismatch
            | Self::MultipleDocumentsInFolder
            | Self::InvalidVersionFolder
            | Self::DuplicateId => IssueCategory::Naming,

            Self::Unreadable
            | Self::ParseFailure
            | Self::NotAnObject
            | Self::InvalidSchema
            | Self::InvalidExample
            | Self::InvalidInstance
            | Self::InstanceSchemaNotFound => IssueCategory::Structure,

            Self::UnresolvedReference
            | Self::CyclicReference
            | Self::AmbiguousReference
            | Self::ReferenceTooDeep
            | Self::DeprecatedReference => IssueCategory::Reference,

            Self::VersionNotIncreasing | Self::InsufficientVersionBump | Self::MetadataVersionMismatch => {
                IssueCategory::Versioning
            }

            Self::MissingMetadata
            | Self::MissingMetadataField
            | Self::InvalidMetadataField
            | Self::IllegalTransition
            | Self::VersionAfterRetirement
            | Self::MetaVersionNotIncreasing
            | Self::CreatedDateChanged
            | Self::CanonicalChanged
            | Self::DateBeforeCreation => IssueCategory::Lifecycle,
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Issues
// =============================================================================

/// Where an issue was found
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Repository path of the document
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            property: None,
            id: None,
        }
    }

    pub fn document(doc: &SchemaDocument) -> Self {
        Self {
            path: doc.path_str(),
            property: None,
            id: doc.id.clone(),
        }
    }

    pub fn at(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(property) = &self.property {
            write!(f, " @ {}", property)?;
        }
        Ok(())
    }
}

/// A single finding about a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub category: IssueCategory,
    pub message: String,
    pub location: Location,
    /// Additional context (e.g., cycle members, candidate documents)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl GovernanceIssue {
    pub fn new(code: IssueCode, location: Location, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            category: code.category(),
            message: message.into(),
            location,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Issue for a document that never made it into the corpus
    pub fn from_load_error(error: &LoadError) -> Self {
        let code = match error {
            LoadError::Io { .. } => IssueCode::Unreadable,
            LoadError::Parse { .. } => IssueCode::ParseFailure,
            LoadError::NotAnObject { .. } => IssueCode::NotAnObject,
            LoadError::VersionFolder { .. } => IssueCode::InvalidVersionFolder,
        };
        Self::new(code, Location::new(to_slash(error.path())), error.to_string())
    }

    /// Issue for a document whose references could not be dereferenced
    pub fn from_resolution_error(doc: &SchemaDocument, error: &ResolutionError) -> Self {
        let location = Location::document(doc);
        match error {
            ResolutionError::Cyclic { cycle } => {
                let mut issue = Self::new(IssueCode::CyclicReference, location, error.to_string());
                for identity in cycle.iter().take(cycle.len().saturating_sub(1)) {
                    issue = issue.with_context(identity.clone());
                }
                issue
            }
            ResolutionError::Unresolved { location: at, .. } => {
                Self::new(IssueCode::UnresolvedReference, location.at(at.clone()), error.to_string())
            }
            ResolutionError::Ambiguous { candidates, .. } => {
                let mut issue = Self::new(IssueCode::AmbiguousReference, location, error.to_string());
                issue.context = candidates.clone();
                issue
            }
            ResolutionError::DepthExceeded { location: at, .. } => {
                Self::new(IssueCode::ReferenceTooDeep, location.at(at.clone()), error.to_string())
            }
        }
    }

    fn sort_key(&self) -> (std::cmp::Reverse<Severity>, &Location, &str, IssueCode) {
        (std::cmp::Reverse(self.severity), &self.location, self.message.as_str(), self.code)
    }
}

impl fmt::Display for GovernanceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {} at {}",
            self.code, self.severity, self.category, self.message, self.location
        )?;
        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }
        Ok(())
    }
}

// =============================================================================
// Report
// =============================================================================

/// Everything known about one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionTriple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Verdict against the direct predecessor, if there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<CompatibilityVerdict>,
    pub issues: Vec<GovernanceIssue>,
}

impl DocumentReport {
    fn placeholder(path: String) -> Self {
        Self {
            path,
            id: None,
            family: None,
            version: None,
            checksum: None,
            verdict: None,
            issues: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}

/// Verdict counts per class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub patch: usize,
    pub minor: usize,
    pub major: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub documents: usize,
    pub families: usize,
    pub errors: usize,
    pub warnings: usize,
    pub verdicts: VerdictCounts,
}

/// Aggregated result of a governance scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceReport {
    pub documents: Vec<DocumentReport>,
    pub summary: ReportSummary,
}

impl GovernanceReport {
    /// Whether any issue has error severity
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn document(&self, path: &str) -> Option<&DocumentReport> {
        self.documents.iter().find(|d| d.path == path)
    }

    pub fn issues(&self) -> impl Iterator<Item = &GovernanceIssue> {
        self.documents.iter().flat_map(|d| d.issues.iter())
    }

    pub fn errors(&self) -> impl Iterator<Item = &GovernanceIssue> {
        self.issues().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &GovernanceIssue> {
        self.issues().filter(|i| !i.is_error())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Format all issues for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for doc in &self.documents {
            if let Some(verdict) = &doc.verdict {
                output.push_str(&format!("{}: {}\n", doc.path, verdict.summary()));
            }
            for issue in &doc.issues {
                output.push_str(&format!("{}\n", issue));
            }
        }

        output.push_str(&format!(
            "\n{} document(s), {} error(s), {} warning(s)\n",
            self.summary.documents, self.summary.errors, self.summary.warnings
        ));
        output
    }
}

impl fmt::Display for GovernanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects documents, verdicts and issues, then sorts them into a report
#[derive(Debug, Default)]
pub struct ReportBuilder {
    documents: BTreeMap<String, DocumentReport>,
    versions: BTreeSet<(String, VersionTriple)>,
    verdicts: Vec<(String, CompatibilityVerdict)>,
    issues: Vec<GovernanceIssue>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loaded document
    pub fn document(&mut self, doc: &SchemaDocument) -> &mut Self {
        self.versions.insert((doc.family.clone(), doc.folder_version));
        self.documents.insert(
            doc.path_str(),
            DocumentReport {
                path: doc.path_str(),
                id: doc.id.clone(),
                family: Some(doc.family.clone()),
                version: Some(doc.folder_version),
                checksum: Some(doc.checksum.to_string()),
                verdict: None,
                issues: Vec::new(),
            },
        );
        self
    }

    /// Record the verdict for the document at `path` against its predecessor
    pub fn verdict(&mut self, path: impl Into<String>, verdict: CompatibilityVerdict) -> &mut Self {
        self.verdicts.push((path.into(), verdict));
        self
    }

    pub fn issue(&mut self, issue: GovernanceIssue) -> &mut Self {
        self.issues.push(issue);
        self
    }

    pub fn issues(&mut self, issues: impl IntoIterator<Item = GovernanceIssue>) -> &mut Self {
        self.issues.extend(issues);
        self
    }

    pub fn build(self) -> GovernanceReport {
        let ReportBuilder {
            mut documents,
            versions,
            verdicts,
            issues,
        } = self;

        for (path, verdict) in verdicts {
            let Some(doc) = documents.get_mut(&path) else {
                continue;
            };
            // Only a direct predecessor inside the corpus justifies a verdict
            let has_predecessor = doc
                .family
                .as_ref()
                .is_some_and(|family| versions.contains(&(family.clone(), verdict.from)));
            if has_predecessor && doc.version == Some(verdict.to) {
                doc.verdict = Some(verdict);
            }
        }

        for issue in issues {
            documents
                .entry(issue.location.path.clone())
                .or_insert_with(|| DocumentReport::placeholder(issue.location.path.clone()))
                .issues
                .push(issue);
        }

        let mut summary = ReportSummary::default();
        let mut families = BTreeSet::new();
        let documents: Vec<DocumentReport> = documents
            .into_values()
            .map(|mut doc| {
                doc.issues.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
                doc.issues.dedup();

                summary.documents += 1;
                summary.errors += doc.error_count();
                summary.warnings += doc.warning_count();
                if let Some(family) = &doc.family {
                    families.insert(family.clone());
                }
                if let Some(verdict) = &doc.verdict {
                    match verdict.class {
                        CompatibilityClass::Patch => summary.verdicts.patch += 1,
                        CompatibilityClass::Minor => summary.verdicts.minor += 1,
                        CompatibilityClass::Major => summary.verdicts.major += 1,
                    }
                }
                doc
            })
            .collect();
        summary.families = families.len();

        GovernanceReport { documents, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DereferencedSchema;
    use crate::schema::ConstraintNode;
    use serde_json::json;
    use std::path::PathBuf;

    fn doc(path: &str, version: &str) -> SchemaDocument {
        let family = path.split("/v").next().unwrap_or_default().to_string();
        SchemaDocument::new(
            PathBuf::from(path),
            family,
            VersionTriple::parse(version).unwrap(),
            json!({ "$id": format!("https://schemas.example.org/{}", path), "type": "object" }),
        )
    }

    fn verdict(from: &str, to: &str) -> CompatibilityVerdict {
        let tree = ConstraintNode::from_json(&json!({ "type": "string" }));
        let old = DereferencedSchema::from_tree("x", VersionTriple::parse(from).unwrap(), tree.clone());
        let new = DereferencedSchema::from_tree("x", VersionTriple::parse(to).unwrap(), tree);
        crate::compatibility::classify(&old, &new)
    }

    #[test]
    fn test_issue_code_severity_and_category() {
        assert_eq!(IssueCode::IdPathMismatch.severity(), Severity::Error);
        assert_eq!(IssueCode::IdPathMismatch.category(), IssueCategory::Naming);
        assert_eq!(IssueCode::DeprecatedReference.severity(), Severity::Warning);
        assert_eq!(IssueCode::DateBeforeCreation.category(), IssueCategory::Lifecycle);
        assert_eq!(IssueCode::InvalidSchema.category(), IssueCategory::Structure);
    }

    #[test]
    fn test_issues_sorted_errors_first_then_location() {
        let a = doc("member/v1.0.0/member.schema.json", "1.0.0");
        let mut builder = ReportBuilder::new();
        builder.document(&a);
        builder.issue(GovernanceIssue::new(
            IssueCode::DateBeforeCreation,
            Location::document(&a),
            "lastReviewedDate precedes createdDate",
        ));
        builder.issue(GovernanceIssue::new(
            IssueCode::MissingMetadataField,
            Location::document(&a).at("modelMetadata.status"),
            "missing status",
        ));
        builder.issue(GovernanceIssue::new(
            IssueCode::IdPathMismatch,
            Location::document(&a),
            "id mismatch",
        ));

        let report = builder.build();
        let codes: Vec<IssueCode> = report.documents[0].issues.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![IssueCode::IdPathMismatch, IssueCode::MissingMetadataField, IssueCode::DateBeforeCreation]
        );
        assert_eq!(report.summary.errors, 2);
        assert_eq!(report.summary.warnings, 1);
        assert!(report.has_errors());
    }

    #[test]
    fn test_verdict_requires_predecessor() {
        let v1 = doc("member/v1.0.0/member.schema.json", "1.0.0");
        let v2 = doc("member/v1.1.0/member.schema.json", "1.1.0");

        let mut builder = ReportBuilder::new();
        builder.document(&v1).document(&v2);
        builder.verdict(v2.path_str(), verdict("1.0.0", "1.1.0"));
        // No 0.9.0 in the corpus
        builder.verdict(v1.path_str(), verdict("0.9.0", "1.0.0"));

        let report = builder.build();
        assert!(report.document("member/v1.0.0/member.schema.json").unwrap().verdict.is_none());
        assert!(report.document("member/v1.1.0/member.schema.json").unwrap().verdict.is_some());
        assert_eq!(report.summary.verdicts.patch, 1);
        assert_eq!(report.summary.families, 1);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_load_failures_become_documents() {
        let failure = LoadError::Parse {
            path: PathBuf::from("broken/v1.0.0/broken.schema.json"),
            format: "JSON",
            message: "expected value".to_string(),
        };
        let mut builder = ReportBuilder::new();
        builder.issue(GovernanceIssue::from_load_error(&failure));

        let report = builder.build();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].path, "broken/v1.0.0/broken.schema.json");
        assert_eq!(report.documents[0].issues[0].code, IssueCode::ParseFailure);
        assert!(report.documents[0].version.is_none());
    }

    #[test]
    fn test_cycle_issue_lists_members() {
        let a = doc("a/v1.0.0/a.schema.json", "1.0.0");
        let error = ResolutionError::Cyclic {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        let issue = GovernanceIssue::from_resolution_error(&a, &error);
        assert_eq!(issue.code, IssueCode::CyclicReference);
        assert_eq!(issue.context, vec!["a".to_string(), "b".to_string()]);
        assert!(issue.message.contains("a -> b -> a"));
    }

    #[test]
    fn test_report_serializes() {
        let a = doc("member/v1.0.0/member.schema.json", "1.0.0");
        let mut builder = ReportBuilder::new();
        builder.document(&a);
        let json = builder.build().to_json().unwrap();
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"version\": \"1.0.0\""));
    }
}
