//! Document Store
//!
//! Loads schema documents from the `<family>/vMAJOR.MINOR.PATCH/<name>.schema.json`
//! layout into an immutable [`Corpus`]. A document that cannot be loaded is
//! recorded as a [`LoadError`] and the walk carries on. JSON files under an
//! instance prefix are collected as [`InstanceFile`]s for validation against
//! the schema they belong to.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::error::{GovernanceError, LoadError, Result};
use crate::schema::{strip_fragment, SchemaDocument};
use crate::version::VersionTriple;

/// Outcome of loading a repository
#[derive(Debug)]
pub struct LoadOutcome {
    pub corpus: Corpus,
    pub instances: Vec<InstanceFile>,
    pub failures: Vec<LoadError>,
}

/// A JSON data file that should satisfy one of the corpus schemas
#[derive(Debug, Clone)]
pub struct InstanceFile {
    /// Path relative to the repository root
    pub path: PathBuf,
    pub value: Value,
}

impl InstanceFile {
    pub fn path_str(&self) -> String {
        to_slash(&self.path)
    }
}

/// Read-only snapshot of every document loaded from a repository
#[derive(Debug, Default)]
pub struct Corpus {
    documents: Vec<SchemaDocument>,
    by_id: HashMap<String, Vec<usize>>,
    by_path: HashMap<String, usize>,
}

/// Result of looking up a URI in the corpus
#[derive(Debug)]
pub enum Lookup<'a> {
    Found(&'a SchemaDocument),
    Missing,
    Ambiguous(Vec<&'a SchemaDocument>),
}

impl Corpus {
    /// Build a corpus from already-parsed documents
    pub fn new(mut documents: Vec<SchemaDocument>) -> Self {
        documents.sort_by(|a, b| a.path.cmp(&b.path));

        let mut by_id: HashMap<String, Vec<usize>> = HashMap::with_capacity(documents.len());
        let mut by_path = HashMap::with_capacity(documents.len());
        for (idx, doc) in documents.iter().enumerate() {
            if let Some(id) = &doc.id {
                by_id.entry(strip_fragment(id).to_string()).or_default().push(idx);
            }
            by_path.insert(doc.path_str(), idx);
        }

        Self {
            documents,
            by_id,
            by_path,
        }
    }

    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Look up a document by `$id` (fragment ignored)
    pub fn get(&self, uri: &str) -> Lookup<'_> {
        match self.by_id.get(strip_fragment(uri)) {
            None => Lookup::Missing,
            Some(indices) if indices.len() == 1 => Lookup::Found(&self.documents[indices[0]]),
            Some(indices) => Lookup::Ambiguous(indices.iter().map(|&i| &self.documents[i]).collect()),
        }
    }

    /// Look up a document by repository path
    pub fn get_by_path(&self, path: &str) -> Option<&SchemaDocument> {
        self.by_path.get(path).map(|&i| &self.documents[i])
    }

    /// Look up a document by its identity (`$id` without fragment, or path)
    pub fn get_by_identity(&self, identity: &str) -> Option<&SchemaDocument> {
        match self.get(identity) {
            Lookup::Found(doc) => Some(doc),
            Lookup::Ambiguous(_) => None,
            Lookup::Missing => self.get_by_path(identity),
        }
    }

    /// `$id`s declared by more than one document
    pub fn duplicate_ids(&self) -> Vec<(&str, Vec<&SchemaDocument>)> {
        let mut dupes: Vec<_> = self
            .by_id
            .iter()
            .filter(|(_, indices)| indices.len() > 1)
            .map(|(id, indices)| (id.as_str(), indices.iter().map(|&i| &self.documents[i]).collect()))
            .collect();
        dupes.sort_by(|a, b| a.0.cmp(b.0));
        dupes
    }

    /// Documents grouped by family, each family sorted by folder version
    pub fn families(&self) -> BTreeMap<&str, Vec<&SchemaDocument>> {
        let mut families: BTreeMap<&str, Vec<&SchemaDocument>> = BTreeMap::new();
        for doc in &self.documents {
            families.entry(doc.family.as_str()).or_default().push(doc);
        }
        for versions in families.values_mut() {
            versions.sort_by(|a, b| a.folder_version.cmp(&b.folder_version).then(a.path.cmp(&b.path)));
        }
        families
    }
}

/// Loads a repository of versioned schema documents
pub struct DocumentStore {
    config: ScanConfig,
    version_folder: Regex,
}

impl DocumentStore {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            version_folder: Regex::new(r"^v\d+\.\d+\.\d+$").expect("static regex"),
        }
    }

    /// Walk `root` and load every schema document found
    pub fn load(&self, root: &Path) -> Result<LoadOutcome> {
        if !root.is_dir() {
            return Err(GovernanceError::RootNotFound(root.to_path_buf()));
        }

        let mut documents = Vec::new();
        let mut instances = Vec::new();
        let mut failures = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_skipped(root, entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let failure = walk_failure(root, &e);
                    warn!(path = %failure.path().display(), error = %e, "failed to walk repository");
                    failures.push(failure);
                    continue;
                }
            };
            // Broken links are kept so reading them reports the failure
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            let relative_path = match path.strip_prefix(root) {
                Ok(p) => p.to_path_buf(),
                Err(_) => continue,
            };
            let relative_str = to_slash(&relative_path);

            if self.is_instance(&relative_str) {
                match load_instance(path, relative_path) {
                    Ok(instance) => {
                        debug!(path = %relative_str, "loaded instance file");
                        instances.push(instance);
                    }
                    Err(e) => {
                        warn!(path = %relative_str, error = %e, "failed to load instance file");
                        failures.push(e);
                    }
                }
                continue;
            }
            if !self.is_document(&relative_str) {
                continue;
            }

            match self.load_document(path, relative_path) {
                Ok(doc) => {
                    debug!(path = %relative_str, version = %doc.folder_version, checksum = doc.checksum.short(), "loaded schema document");
                    documents.push(doc);
                }
                Err(e) => {
                    warn!(path = %relative_str, error = %e, "failed to load schema document");
                    failures.push(e);
                }
            }
        }

        info!(
            root = %root.display(),
            documents = documents.len(),
            instances = instances.len(),
            failures = failures.len(),
            "document store loaded"
        );

        Ok(LoadOutcome {
            corpus: Corpus::new(documents),
            instances,
            failures,
        })
    }

    /// Entries under a skip prefix are pruned with their whole subtree
    fn is_skipped(&self, root: &Path, entry: &DirEntry) -> bool {
        let Ok(relative) = entry.path().strip_prefix(root) else {
            return false;
        };
        let mut relative = to_slash(relative);
        if entry.file_type().is_dir() {
            relative.push('/');
        }
        self.config.skip_prefixes.iter().any(|p| relative.starts_with(p.as_str()))
    }

    fn is_instance(&self, relative: &str) -> bool {
        relative.ends_with(".json") && self.instance_prefix(relative).is_some()
    }

    /// Configured instance prefix `relative` lives under
    pub fn instance_prefix(&self, relative: &str) -> Option<&str> {
        self.config
            .instance_prefixes
            .iter()
            .map(String::as_str)
            .find(|p| relative.starts_with(p))
    }

    fn is_document(&self, relative: &str) -> bool {
        self.config
            .document_suffixes
            .iter()
            .any(|suffix| relative.ends_with(suffix.as_str()))
    }

    fn load_document(&self, path: &Path, relative_path: PathBuf) -> std::result::Result<SchemaDocument, LoadError> {
        let (folder_version, family) = self.placement(&relative_path)?;

        let content = fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: relative_path.clone(),
            message: e.to_string(),
        })?;

        let raw = parse_content(&relative_path, &content)?;
        if !raw.is_object() {
            return Err(LoadError::NotAnObject { path: relative_path });
        }

        Ok(SchemaDocument::new(relative_path, family, folder_version, raw))
    }

    /// Version folder and family key of a document path
    fn placement(&self, relative_path: &Path) -> std::result::Result<(VersionTriple, String), LoadError> {
        let folder = relative_path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let version = if self.version_folder.is_match(&folder) {
            VersionTriple::parse(&folder).ok()
        } else {
            None
        };

        match version {
            Some(version) => {
                let family = relative_path
                    .parent()
                    .and_then(|p| p.parent())
                    .map(to_slash)
                    .unwrap_or_default();
                Ok((version, family))
            }
            None => Err(LoadError::VersionFolder {
                path: relative_path.to_path_buf(),
                folder,
            }),
        }
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

fn load_instance(path: &Path, relative_path: PathBuf) -> std::result::Result<InstanceFile, LoadError> {
    let content = fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: relative_path.clone(),
        message: e.to_string(),
    })?;
    let value = serde_json::from_str(&content).map_err(|e| LoadError::Parse {
        path: relative_path.clone(),
        format: "JSON",
        message: e.to_string(),
    })?;
    Ok(InstanceFile {
        path: relative_path,
        value,
    })
}

/// Failure for an entry the walk could not visit (permissions, link loops)
fn walk_failure(root: &Path, error: &walkdir::Error) -> LoadError {
    let path = error
        .path()
        .and_then(|p| p.strip_prefix(root).ok())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    LoadError::Io {
        path,
        message: error.to_string(),
    }
}

fn parse_content(relative_path: &Path, content: &str) -> std::result::Result<serde_json::Value, LoadError> {
    let is_yaml = relative_path
        .extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false);

    if is_yaml {
        serde_yaml::from_str(content).map_err(|e| LoadError::Parse {
            path: relative_path.to_path_buf(),
            format: "YAML",
            message: e.to_string(),
        })
    } else {
        serde_json::from_str(content).map_err(|e| LoadError::Parse {
            path: relative_path.to_path_buf(),
            format: "JSON",
            message: e.to_string(),
        })
    }
}

/// Render a relative path with `/` separators
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_families_and_versions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "member/v1.0.0/member.schema.json", r#"{"$id": "https://x.org/member/v1.0.0/member.schema.json"}"#);
        write(dir.path(), "member/v1.10.0/member.schema.json", r#"{"$id": "https://x.org/member/v1.10.0/member.schema.json"}"#);
        write(dir.path(), "member/v1.2.0/member.schema.json", r#"{"$id": "https://x.org/member/v1.2.0/member.schema.json"}"#);
        write(dir.path(), "member/README.md", "not a schema");

        let outcome = DocumentStore::default().load(dir.path()).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.corpus.len(), 3);

        let families = outcome.corpus.families();
        let versions: Vec<String> = families["member"].iter().map(|d| d.folder_version.to_string()).collect();
        assert_eq!(versions, vec!["1.0.0", "1.2.0", "1.10.0"]);
    }

    #[test]
    fn test_failures_do_not_stop_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/v1.0.0/a.schema.json", "{ not json");
        write(dir.path(), "b/latest/b.schema.json", "{}");
        write(dir.path(), "c/v1.0.0/c.schema.json", "[1, 2]");
        write(dir.path(), "d/v1.0.0/d.schema.yaml", "type: object\nproperties:\n  id:\n    type: string\n");

        let outcome = DocumentStore::default().load(dir.path()).unwrap();
        assert_eq!(outcome.corpus.len(), 1);
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.failures.iter().any(|f| matches!(f, LoadError::Parse { format: "JSON", .. })));
        assert!(outcome.failures.iter().any(|f| matches!(f, LoadError::VersionFolder { folder, .. } if folder == "latest")));
        assert!(outcome.failures.iter().any(|f| matches!(f, LoadError::NotAnObject { .. })));
        assert_eq!(outcome.corpus.documents()[0].family, "d");
    }

    #[test]
    fn test_duplicate_ids_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/v1.0.0/a.schema.json", r#"{"$id": "https://x.org/shared.schema.json"}"#);
        write(dir.path(), "b/v1.0.0/b.schema.json", r#"{"$id": "https://x.org/shared.schema.json#"}"#);

        let outcome = DocumentStore::default().load(dir.path()).unwrap();
        assert!(matches!(outcome.corpus.get("https://x.org/shared.schema.json"), Lookup::Ambiguous(ref docs) if docs.len() == 2));
        assert_eq!(outcome.corpus.duplicate_ids().len(), 1);
        assert!(matches!(outcome.corpus.get("https://x.org/other.schema.json"), Lookup::Missing));
    }

    #[test]
    fn test_missing_root() {
        let result = DocumentStore::default().load(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(GovernanceError::RootNotFound(_))));
    }

    #[test]
    fn test_skipped_directories_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "member/v1.0.0/member.schema.json", "{}");
        write(dir.path(), "target/v1.0.0/broken.schema.json", "{ not json");
        write(dir.path(), "node_modules/pkg/v1.0.0/pkg.schema.json", "{ not json");
        write(dir.path(), "targets/v1.0.0/targets.schema.json", "{}");

        let outcome = DocumentStore::default().load(dir.path()).unwrap();
        assert!(outcome.failures.is_empty());
        let families: Vec<&str> = outcome.corpus.families().into_keys().collect();
        assert_eq!(families, vec!["member", "targets"]);
    }

    #[test]
    fn test_instances_are_collected_separately() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "member/v1.0.0/member.schema.json", "{}");
        write(dir.path(), "instances/member/v1.0.0/member.json", r#"{"memberId": "M1"}"#);
        write(dir.path(), "instances/member/v1.0.0/broken.json", "{ not json");
        write(dir.path(), "instances/member/README.md", "notes");

        let outcome = DocumentStore::default().load(dir.path()).unwrap();
        assert_eq!(outcome.corpus.len(), 1);
        assert_eq!(outcome.instances.len(), 1);
        assert_eq!(outcome.instances[0].path_str(), "instances/member/v1.0.0/member.json");
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(&outcome.failures[0], LoadError::Parse { path, .. } if path.ends_with("broken.json")));
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_link_is_reported_as_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "member/v1.0.0/member.schema.json", "{}");
        fs::create_dir_all(dir.path().join("ghost/v1.0.0")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("nowhere.json"),
            dir.path().join("ghost/v1.0.0/ghost.schema.json"),
        )
        .unwrap();

        let outcome = DocumentStore::default().load(dir.path()).unwrap();
        assert_eq!(outcome.corpus.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            LoadError::Io { path, .. } if path == Path::new("ghost/v1.0.0/ghost.schema.json")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_errors_become_failures() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "member/v1.0.0/member.schema.json", "{}");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("member/v1.0.0/back")).unwrap();

        let store = DocumentStore::new(ScanConfig {
            follow_links: true,
            ..ScanConfig::default()
        });
        let outcome = store.load(dir.path()).unwrap();
        assert_eq!(outcome.corpus.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            LoadError::Io { path, .. } if path == Path::new("member/v1.0.0/back")
        ));
    }
}
