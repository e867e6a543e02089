//! Configuration management for the governance engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (governance.toml)
//! - Environment variables (GOVERNANCE__*)
//!
//! ## Example config file (governance.toml):
//! ```toml
//! [scan]
//! skip_prefixes = [".git/", "target/"]
//! instance_prefixes = ["instances/"]
//!
//! [resolution]
//! max_depth = 64
//!
//! [naming]
//! id_base = "https://schemas.example.org/"
//! check_meta_schema = true
//!
//! [lifecycle]
//! metadata_property = "modelMetadata"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a governance scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Document discovery
    #[serde(default)]
    pub scan: ScanConfig,

    /// Reference resolution
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// `$id` and layout conventions
    #[serde(default)]
    pub naming: NamingConfig,

    /// Metadata block and lifecycle rules
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Version step enforcement
    #[serde(default)]
    pub versioning: VersioningConfig,
}

/// Document discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Skip entries whose relative path starts with one of these. Directories
    /// are matched with a trailing `/` and are not descended into.
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,

    /// File name suffixes that mark a schema document
    #[serde(default = "default_document_suffixes")]
    pub document_suffixes: Vec<String>,

    /// `.json` files under these prefixes are instances, validated against
    /// their schema
    #[serde(default = "default_instance_prefixes")]
    pub instance_prefixes: Vec<String>,

    /// Follow symbolic links while walking the repository
    #[serde(default)]
    pub follow_links: bool,
}

/// Reference resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Longest chain of nested references followed before giving up
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Naming convention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// URI prefix that maps onto the repository root. When unset, scheme and
    /// authority of the `$id` are stripped instead.
    #[serde(default)]
    pub id_base: Option<String>,

    /// Report documents without `$id`
    #[serde(default = "default_true")]
    pub require_id: bool,

    /// Compile each document to check it is a well-formed JSON Schema
    #[serde(default = "default_true")]
    pub check_meta_schema: bool,
}

/// Lifecycle metadata settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Property whose `default` carries the metadata block
    #[serde(default = "default_metadata_property")]
    pub metadata_property: String,

    /// Report documents without a metadata block
    #[serde(default = "default_true")]
    pub require_metadata: bool,
}

/// Versioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Require the declared version step to cover the compatibility verdict
    #[serde(default = "default_true")]
    pub enforce_version_step: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_skip_prefixes() -> Vec<String> {
    vec![
        ".git/".to_string(),
        "target/".to_string(),
        "node_modules/".to_string(),
    ]
}

fn default_instance_prefixes() -> Vec<String> {
    vec!["instances/".to_string()]
}

fn default_document_suffixes() -> Vec<String> {
    vec![
        ".schema.json".to_string(),
        ".schema.yaml".to_string(),
        ".schema.yml".to_string(),
    ]
}

fn default_max_depth() -> usize {
    64
}

fn default_metadata_property() -> String {
    "modelMetadata".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: default_skip_prefixes(),
            document_suffixes: default_document_suffixes(),
            instance_prefixes: default_instance_prefixes(),
            follow_links: false,
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            id_base: None,
            require_id: true,
            check_meta_schema: true,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            metadata_property: default_metadata_property(),
            require_metadata: true,
        }
    }
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            enforce_version_step: true,
        }
    }
}

impl GovernanceConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "governance.toml",
            ".governance.toml",
            "config/governance.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "schema-governance", "governance") {
            let xdg_config = config_dir.config_dir().join("governance.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // GOVERNANCE__NAMING__ID_BASE=https://... etc.
        builder = builder.add_source(
            Environment::with_prefix("GOVERNANCE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GovernanceConfig::default();
        assert_eq!(config.resolution.max_depth, 64);
        assert_eq!(config.lifecycle.metadata_property, "modelMetadata");
        assert!(config.naming.require_id);
        assert!(config.scan.document_suffixes.contains(&".schema.json".to_string()));
        assert_eq!(config.scan.instance_prefixes, vec!["instances/".to_string()]);
        assert!(!config.scan.follow_links);
    }

    #[test]
    fn test_serialize_config() {
        let config = GovernanceConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[scan]"));
        assert!(toml_str.contains("[lifecycle]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[naming]\nid_base = \"https://schemas.example.org/\"\n\n[resolution]\nmax_depth = 8\n",
        )
        .unwrap();

        let config = GovernanceConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.naming.id_base.as_deref(), Some("https://schemas.example.org/"));
        assert_eq!(config.resolution.max_depth, 8);
        assert_eq!(config.lifecycle.metadata_property, "modelMetadata");
    }
}
