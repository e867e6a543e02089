//! Schema Governance Engine
//!
//! Machine-checkable governance for a repository of versioned JSON Schema
//! documents.
//!
//! ## Features
//!
//! - **Reference Resolution**: every `$ref` replaced by a copy of its target,
//!   with full cycle traces
//! - **Compatibility Classification**: structural diff of two versions, mapped
//!   onto PATCH / MINOR / MAJOR
//! - **Lifecycle Checks**: embedded metadata blocks follow
//!   `draft -> active -> deprecated -> retired`
//! - **Naming Checks**: `$id`, folder and repository path agree
//! - **Deterministic Reports**: serialisable, sorted independently of scheduling
//!
//! ## Layout
//!
//! ```text
//! member/
//! ├── v1.0.0/
//! │   └── member.schema.json   $id: https://schemas.example.org/member/v1.0.0/member.schema.json
//! ├── v1.1.0/
//! │   └── member.schema.json
//! └── v2.0.0/
//!     └── member.schema.json
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use schema_governance::{scan, GovernanceConfig};
//!
//! let report = scan(std::path::Path::new("schemas"), &GovernanceConfig::default())?;
//! if report.has_errors() {
//!     eprintln!("{}", report);
//! }
//! # Ok::<(), schema_governance::GovernanceError>(())
//! ```

pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod lint;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod version;

pub use checksum::Checksum;
pub use compatibility::{classify, CompatibilityClassifier, CompatibilityVerdict, DiffRule, StructuralDiff};
pub use config::GovernanceConfig;
pub use engine::{check_version_step, scan, scan_changed, GovernanceEngine};
pub use error::{GovernanceError, LoadError, ResolutionError, Result};
pub use graph::ReferenceGraph;
pub use lifecycle::{LifecycleStatus, LifecycleValidator, MetadataBlock};
pub use lint::{InstanceValidator, NamingLinter};
pub use report::{
    DocumentReport, GovernanceIssue, GovernanceReport, IssueCategory, IssueCode, Location, ReportBuilder,
    ReportSummary, Severity,
};
pub use resolver::{resolve, DereferencedSchema, ReferenceEdge, ReferenceResolver};
pub use schema::{ConstraintNode, PropertyPath, SchemaDocument};
pub use store::{Corpus, DocumentStore, InstanceFile, LoadOutcome};
pub use version::{CompatibilityClass, VersionTriple};
