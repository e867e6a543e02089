//! Schema versioning utilities

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GovernanceError;

/// Semantic version bump class, ordered PATCH < MINOR < MAJOR
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompatibilityClass {
    Patch,
    Minor,
    Major,
}

impl fmt::Display for CompatibilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch => write!(f, "PATCH"),
            Self::Minor => write!(f, "MINOR"),
            Self::Major => write!(f, "MAJOR"),
        }
    }
}

/// A MAJOR.MINOR.PATCH triple as used in version folders and metadata blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse `1.2.3` or `v1.2.3`. Pre-release and build suffixes are rejected
    /// because version folders only carry the plain triple.
    pub fn parse(version_str: &str) -> Result<Self, GovernanceError> {
        let trimmed = version_str.strip_prefix('v').unwrap_or(version_str);
        let version = Version::parse(trimmed)?;
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(GovernanceError::InvalidVersion(version_str.to_string()));
        }
        Ok(Self::new(version.major, version.minor, version.patch))
    }

    /// Get the directory name for this version (e.g., "v1.2.3")
    pub fn dir_name(&self) -> String {
        format!("v{}", self)
    }

    /// Next version for a change of the given class
    pub fn bump(&self, class: CompatibilityClass) -> Self {
        match class {
            CompatibilityClass::Major => Self::new(self.major + 1, 0, 0),
            CompatibilityClass::Minor => Self::new(self.major, self.minor + 1, 0),
            CompatibilityClass::Patch => Self::new(self.major, self.minor, self.patch + 1),
        }
    }

    /// Class of the step from `self` to `next`, or `None` when `next` is not greater
    pub fn step_to(&self, next: &VersionTriple) -> Option<CompatibilityClass> {
        if next <= self {
            None
        } else if next.major > self.major {
            Some(CompatibilityClass::Major)
        } else if next.minor > self.minor {
            Some(CompatibilityClass::Minor)
        } else {
            Some(CompatibilityClass::Patch)
        }
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for VersionTriple {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionTriple {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionTriple {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
