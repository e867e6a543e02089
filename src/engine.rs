//! Governance engine
//!
//! Entry points that load a repository, run every check per schema family
//! and aggregate the results into a [`GovernanceReport`].
//!
//! Families are independent of one another, so they are processed in
//! parallel over the shared read-only [`Corpus`]. Inside a family versions are
//! processed in ascending order so each one is compared with its direct
//! predecessor.

use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::compatibility::{CompatibilityClassifier, CompatibilityVerdict};
use crate::config::GovernanceConfig;
use crate::error::Result;
use crate::graph::ReferenceGraph;
use crate::lifecycle::LifecycleValidator;
use crate::lint::{InstanceValidator, NamingLinter};
use crate::report::{GovernanceIssue, GovernanceReport, IssueCode, Location, ReportBuilder};
use crate::resolver::{DereferencedSchema, ReferenceResolver};
use crate::schema::SchemaDocument;
use crate::store::{to_slash, Corpus, DocumentStore, LoadOutcome};
use crate::version::VersionTriple;

/// Scan every family under `root`
pub fn scan(root: &Path, config: &GovernanceConfig) -> Result<GovernanceReport> {
    GovernanceEngine::new(config.clone()).scan(root)
}

/// Scan the families touched by `changed_paths` and the families depending on them
pub fn scan_changed(root: &Path, changed_paths: &[PathBuf], config: &GovernanceConfig) -> Result<GovernanceReport> {
    GovernanceEngine::new(config.clone()).scan_changed(root, changed_paths)
}

/// Check that the step from `old` to `new` covers the verdict's class
pub fn check_version_step(
    old: VersionTriple,
    new: VersionTriple,
    verdict: &CompatibilityVerdict,
    location: Location,
) -> Vec<GovernanceIssue> {
    match old.step_to(&new) {
        None => vec![GovernanceIssue::new(
            IssueCode::VersionNotIncreasing,
            location,
            format!("version {} does not increase on predecessor {}", new, old),
        )],
        Some(step) if step < verdict.class => {
            let mut issue = GovernanceIssue::new(
                IssueCode::InsufficientVersionBump,
                location,
                format!(
                    "{} -> {} is a {} step but the change is {}; expected at least {}",
                    old,
                    new,
                    step,
                    verdict.class,
                    verdict.minimum_version()
                ),
            );
            for diff in verdict.deciding_diffs() {
                issue = issue.with_context(diff.message());
            }
            vec![issue]
        }
        Some(_) => Vec::new(),
    }
}

/// Results for one family
#[derive(Default)]
struct FamilyOutcome {
    issues: Vec<GovernanceIssue>,
    verdicts: Vec<(String, CompatibilityVerdict)>,
}

/// Runs governance scans with a fixed configuration
pub struct GovernanceEngine {
    config: GovernanceConfig,
    store: DocumentStore,
    linter: NamingLinter,
    lifecycle: LifecycleValidator,
    classifier: CompatibilityClassifier,
}

impl GovernanceEngine {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            store: DocumentStore::new(config.scan.clone()),
            linter: NamingLinter::new(config.naming.clone()),
            lifecycle: LifecycleValidator::new(config.lifecycle.clone()),
            classifier: CompatibilityClassifier::new(),
            config,
        }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Scan every family under `root`
    pub fn scan(&self, root: &Path) -> Result<GovernanceReport> {
        info!(root = %root.display(), "starting governance scan");
        let outcome = self.store.load(root)?;
        let report = self.run(outcome, None);
        log_finished(&report);
        Ok(report)
    }

    /// Scan only the families touched by `changed_paths`, plus every family
    /// that references one of them. The whole corpus is still loaded so
    /// references resolve.
    pub fn scan_changed(&self, root: &Path, changed_paths: &[PathBuf]) -> Result<GovernanceReport> {
        info!(root = %root.display(), changed = changed_paths.len(), "starting incremental governance scan");
        let outcome = self.store.load(root)?;

        let changed: Vec<String> = changed_paths
            .iter()
            .map(|p| to_slash(p.strip_prefix(root).unwrap_or(p)))
            .collect();

        let touched: BTreeSet<String> = outcome
            .corpus
            .families()
            .into_keys()
            .filter(|family| {
                changed
                    .iter()
                    .any(|c| c.as_str() == *family || c.starts_with(&format!("{}/", family)))
            })
            .map(String::from)
            .collect();

        let resolver = ReferenceResolver::new(&outcome.corpus, &self.config.resolution);
        let graph = ReferenceGraph::build(&outcome.corpus, &resolver);
        let selected = graph.expand_families(&touched);
        debug!(
            touched = touched.len(),
            selected = selected.len(),
            cycle_groups = graph.cycle_groups().len(),
            "selected families for incremental scan"
        );

        let report = self.run(outcome, Some((selected, changed)));
        log_finished(&report);
        Ok(report)
    }

    /// Process the loaded corpus. With a selection, only those families and
    /// load failures under them (or under a changed path) are reported.
    fn run(&self, outcome: LoadOutcome, selection: Option<(BTreeSet<String>, Vec<String>)>) -> GovernanceReport {
        let LoadOutcome {
            corpus,
            instances,
            failures,
        } = outcome;

        let in_scope = |family: &str| match &selection {
            Some((families, _)) => families.contains(family),
            None => true,
        };
        let failure_in_scope = |path: &str| match &selection {
            Some((families, changed)) => {
                changed.iter().any(|c| c == path)
                    || families.iter().any(|f| path.starts_with(&format!("{}/", f)))
            }
            None => true,
        };

        let families: Vec<(&str, Vec<&SchemaDocument>)> = corpus
            .families()
            .into_iter()
            .filter(|(family, _)| in_scope(*family))
            .collect();

        let resolver = ReferenceResolver::new(&corpus, &self.config.resolution);
        let outcomes: Vec<FamilyOutcome> = families
            .par_iter()
            .map(|(family, versions)| self.process_family(family, versions, &corpus, &resolver))
            .collect();

        let mut builder = ReportBuilder::new();
        for (_, versions) in &families {
            for doc in versions {
                builder.document(doc);
            }
        }
        for outcome in outcomes {
            builder.issues(outcome.issues);
            for (path, verdict) in outcome.verdicts {
                builder.verdict(path, verdict);
            }
        }

        let scoped_paths: BTreeSet<String> = families
            .iter()
            .flat_map(|(_, versions)| versions.iter().map(|d| d.path_str()))
            .collect();
        builder.issues(
            self.linter
                .lint_corpus(&corpus)
                .into_iter()
                .filter(|issue| scoped_paths.contains(&issue.location.path)),
        );

        // An instance is in scope when it changed or its schema's family is selected
        let instance_validator = InstanceValidator::new(&corpus, &self.config.scan.instance_prefixes);
        let instance_issues: Vec<GovernanceIssue> = instances
            .par_iter()
            .filter(|instance| match &selection {
                Some((families, changed)) => {
                    changed.contains(&instance.path_str())
                        || instance_validator
                            .schema_for(instance)
                            .is_some_and(|schema| families.contains(&schema.family))
                }
                None => true,
            })
            .flat_map_iter(|instance| instance_validator.validate(instance))
            .collect();
        debug!(
            instances = instances.len(),
            issues = instance_issues.len(),
            "instances validated"
        );
        builder.issues(instance_issues);

        for failure in &failures {
            let issue = GovernanceIssue::from_load_error(failure);
            if failure_in_scope(issue.location.path.as_str()) {
                builder.issue(issue);
            }
        }

        builder.build()
    }

    fn process_family(
        &self,
        family: &str,
        versions: &[&SchemaDocument],
        corpus: &Corpus,
        resolver: &ReferenceResolver<'_>,
    ) -> FamilyOutcome {
        let mut outcome = FamilyOutcome::default();
        let mut resolved: Vec<Option<DereferencedSchema>> = Vec::with_capacity(versions.len());

        for doc in versions {
            outcome.issues.extend(self.linter.lint(doc));

            let edges = resolver.outgoing_edges(doc);
            outcome.issues.extend(self.linter.lint_references(
                doc,
                &edges,
                corpus,
                &self.config.lifecycle.metadata_property,
            ));

            match resolver.resolve(doc) {
                Ok(schema) => resolved.push(Some(schema)),
                Err(e) => {
                    warn!(path = %doc.path_str(), error = %e, "reference resolution failed");
                    outcome.issues.push(GovernanceIssue::from_resolution_error(doc, &e));
                    resolved.push(None);
                }
            }
        }

        outcome.issues.extend(self.lifecycle.validate_family(versions));

        for (idx, doc) in versions.iter().enumerate() {
            // Direct predecessor: the last document of the closest lower version
            let Some(prev) = (0..idx).rev().find(|&i| versions[i].folder_version < doc.folder_version) else {
                continue;
            };
            let (Some(old), Some(new)) = (&resolved[prev], &resolved[idx]) else {
                continue;
            };

            let verdict = self.classifier.classify(old, new);
            debug!(
                family,
                from = %verdict.from,
                to = %verdict.to,
                class = %verdict.class,
                diffs = verdict.diffs.len(),
                "classified version pair"
            );

            if self.config.versioning.enforce_version_step {
                outcome.issues.extend(check_version_step(
                    versions[prev].folder_version,
                    doc.folder_version,
                    &verdict,
                    Location::document(doc),
                ));
            }
            outcome.verdicts.push((doc.path_str(), verdict));
        }

        debug!(
            family,
            versions = versions.len(),
            issues = outcome.issues.len(),
            "family processed"
        );
        outcome
    }
}

fn log_finished(report: &GovernanceReport) {
    info!(
        documents = report.summary.documents,
        families = report.summary.families,
        errors = report.summary.errors,
        warnings = report.summary.warnings,
        "governance scan finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DereferencedSchema;
    use crate::schema::ConstraintNode;
    use serde_json::json;

    fn verdict(from: &str, to: &str, old: serde_json::Value, new: serde_json::Value) -> CompatibilityVerdict {
        let old = DereferencedSchema::from_tree("x", VersionTriple::parse(from).unwrap(), ConstraintNode::from_json(&old));
        let new = DereferencedSchema::from_tree("x", VersionTriple::parse(to).unwrap(), ConstraintNode::from_json(&new));
        CompatibilityClassifier::new().classify(&old, &new)
    }

    #[test]
    fn test_version_step_covers_verdict() {
        let old = json!({ "type": "object", "properties": { "a": { "type": "string" } } });
        let new = json!({ "type": "object", "properties": { "a": { "type": "string" }, "b": { "type": "string" } } });

        let minor = verdict("1.0.0", "1.1.0", old.clone(), new.clone());
        assert!(check_version_step(minor.from, minor.to, &minor, Location::new("x")).is_empty());

        let major_step = verdict("1.0.0", "2.0.0", old.clone(), new.clone());
        assert!(check_version_step(major_step.from, major_step.to, &major_step, Location::new("x")).is_empty());

        let patch_step = verdict("1.0.0", "1.0.1", old, new);
        let issues = check_version_step(patch_step.from, patch_step.to, &patch_step, Location::new("x"));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::InsufficientVersionBump);
        assert!(issues[0].message.contains("expected at least 1.1.0"));
        assert_eq!(issues[0].context.len(), 1);
    }

    #[test]
    fn test_version_must_increase() {
        let schema = json!({ "type": "string" });
        let v = verdict("1.2.0", "1.1.0", schema.clone(), schema);
        let issues = check_version_step(v.from, v.to, &v, Location::new("x"));
        assert_eq!(issues[0].code, IssueCode::VersionNotIncreasing);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let result = scan(Path::new("/definitely/not/a/repository"), &GovernanceConfig::default());
        assert!(matches!(result, Err(crate::error::GovernanceError::RootNotFound(_))));
    }
}
