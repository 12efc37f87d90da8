use crate::declaration::Declaration;
use crate::normalize::{normalize_groups, DEFAULT_GROUP};
use crate::types::{Fingerprint, ToolVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lock file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("lock file lists package '{0}' more than once")]
    DuplicatePackage(String),
    #[error("lock file entry has an empty {0}")]
    EmptyField(&'static str),
    #[error("lock file declaration_checksum '{0}' is not a blake3 hex digest")]
    InvalidChecksum(String),
}

/// Where a package's source comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackageSource {
    Registry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Git {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
    Path {
        path: String,
    },
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSource::Registry { url: Some(url) } => write!(f, "registry:{url}"),
            PackageSource::Registry { url: None } => f.write_str("registry"),
            PackageSource::Git {
                uri,
                revision: Some(rev),
            } => write!(f, "git:{uri}@{rev}"),
            PackageSource::Git {
                uri,
                revision: None,
            } => write!(f, "git:{uri}"),
            PackageSource::Path { path } => write!(f, "path:{path}"),
        }
    }
}

/// A resolved package with pinned version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    pub source: PackageSource,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,
}

fn default_groups() -> Vec<String> {
    vec![DEFAULT_GROUP.to_owned()]
}

impl LockedPackage {
    pub fn new(name: &str, version: &str, source: PackageSource) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            source,
            dependencies: Vec::new(),
            groups: default_groups(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        let owned: Vec<String> = groups.iter().map(|g| (*g).to_owned()).collect();
        self.groups = normalize_groups(&owned);
        self
    }
}

/// The lock file: the resolved dependency graph and the
/// fingerprint of the declaration it was resolved from.
///
/// This is the single source of truth for what the sandbox exposes. The
/// resolver writes it; this workspace only reads it (and writes it in tests
/// and for the resolver collaborator's convenience).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockSpec {
    pub declaration_checksum: Fingerprint,
    pub resolver_version: ToolVersion,
    #[serde(default, rename = "package")]
    pub packages: Vec<LockedPackage>,
}

impl LockSpec {
    /// Lock a resolved package set against a declaration.
    pub fn from_resolved(
        declaration: &Declaration,
        resolver_version: &str,
        packages: Vec<LockedPackage>,
    ) -> Self {
        Self {
            declaration_checksum: declaration.fingerprint.clone(),
            resolver_version: ToolVersion::new(resolver_version),
            packages,
        }
    }

    /// Reject a malformed declaration checksum, entries with empty names or
    /// versions, and duplicate names.
    pub fn validate(&self) -> Result<(), LockError> {
        if !self.declaration_checksum.is_hex_digest() {
            return Err(LockError::InvalidChecksum(
                self.declaration_checksum.to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for pkg in &self.packages {
            if pkg.name.trim().is_empty() {
                return Err(LockError::EmptyField("name"));
            }
            if pkg.version.trim().is_empty() {
                return Err(LockError::EmptyField("version"));
            }
            if !seen.insert(pkg.name.as_str()) {
                return Err(LockError::DuplicatePackage(pkg.name.clone()));
            }
        }
        Ok(())
    }

    pub fn package(&self, name: &str) -> Option<&LockedPackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Locked package names in lexicographic order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.packages.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Content hash of the resolved state.
    ///
    /// Covers everything that ends up in a generated artifact, independent of
    /// the order packages appear in the file. Two locks with the same
    /// checksum generate the same artifact.
    pub fn compute_checksum(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(format!("declaration:{}", self.declaration_checksum).as_bytes());
        hasher.update(format!("resolver:{}", self.resolver_version).as_bytes());

        let mut packages: Vec<&LockedPackage> = self.packages.iter().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        for pkg in packages {
            hasher.update(format!("pkg:{}@{}", pkg.name, pkg.version).as_bytes());
            hasher.update(format!("src:{}", pkg.source).as_bytes());
            for dep in &pkg.dependencies {
                hasher.update(format!("dep:{dep}").as_bytes());
            }
            for group in &pkg.groups {
                hasher.update(format!("group:{group}").as_bytes());
            }
        }

        Fingerprint::new(hasher.finalize().to_hex().to_string())
    }

    pub fn parse_str(content: &str) -> Result<Self, LockError> {
        let lock: LockSpec = toml::from_str(content)?;
        lock.validate()?;
        Ok(lock)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_declaration() -> Declaration {
        Declaration::parse_str(
            r#"
[[dependency]]
name = "rack"
version = "1.0.0"

[[dependency]]
name = "activesupport"
version = "2.3.5"
"#,
        )
        .unwrap()
    }

    fn sample_packages() -> Vec<LockedPackage> {
        vec![
            LockedPackage::new("rack", "1.0.0", PackageSource::Registry { url: None }),
            LockedPackage::new(
                "activesupport",
                "2.3.5",
                PackageSource::Registry { url: None },
            )
            .with_dependencies(&["rack"]),
        ]
    }

    #[test]
    fn lock_roundtrip() {
        let lock = LockSpec::from_resolved(&sample_declaration(), "0.1.0", sample_packages());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Gemfile.lock");

        lock.write_to_file(&path).unwrap();
        let loaded = LockSpec::read_from_file(&path).unwrap();
        assert_eq!(lock, loaded);
    }

    #[test]
    fn lock_records_declaration_fingerprint() {
        let decl = sample_declaration();
        let lock = LockSpec::from_resolved(&decl, "0.1.0", sample_packages());
        assert_eq!(lock.declaration_checksum, decl.fingerprint);
        assert_eq!(lock.resolver_version, "0.1.0");
    }

    #[test]
    fn groups_default_when_absent() {
        let lock = LockSpec::parse_str(
            r#"
declaration_checksum = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
resolver_version = "0.1.0"

[[package]]
name = "rack"
version = "1.0.0"
source = { type = "registry" }
"#,
        )
        .unwrap();
        assert_eq!(lock.packages[0].groups, vec!["default"]);
        assert!(lock.packages[0].dependencies.is_empty());
    }

    #[test]
    fn parses_git_and_path_sources() {
        let lock = LockSpec::parse_str(
            r#"
declaration_checksum = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
resolver_version = "0.1.0"

[[package]]
name = "bar"
version = "1.0"
source = { type = "git", uri = "/srv/git/bar", revision = "abc123" }

[[package]]
name = "local"
version = "0.2.0"
source = { type = "path", path = "vendor/local" }
"#,
        )
        .unwrap();
        assert_eq!(
            lock.package("bar").unwrap().source.to_string(),
            "git:/srv/git/bar@abc123"
        );
        assert_eq!(
            lock.package("local").unwrap().source.to_string(),
            "path:vendor/local"
        );
    }

    #[test]
    fn rejects_duplicate_packages() {
        let result = LockSpec::parse_str(
            r#"
declaration_checksum = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
resolver_version = "0.1.0"

[[package]]
name = "rack"
version = "1.0.0"
source = { type = "registry" }

[[package]]
name = "rack"
version = "1.1.0"
source = { type = "registry" }
"#,
        );
        assert!(matches!(result, Err(LockError::DuplicatePackage(n)) if n == "rack"));
    }

    #[test]
    fn rejects_checksum_that_is_not_a_digest() {
        let result = LockSpec::parse_str(
            r#"
declaration_checksum = "a\u00e9\u00e9\u00e9\u00e9\u00e9\u00e9\u00e9"
resolver_version = "0.1.0"
"#,
        );
        assert!(matches!(result, Err(LockError::InvalidChecksum(_))));
    }

    #[test]
    fn rejects_missing_checksum() {
        let result = LockSpec::parse_str(
            r#"
resolver_version = "0.1.0"
"#,
        );
        assert!(matches!(result, Err(LockError::Parse(_))));
    }

    #[test]
    fn checksum_ignores_package_order() {
        let decl = sample_declaration();
        let mut reversed = sample_packages();
        reversed.reverse();
        let a = LockSpec::from_resolved(&decl, "0.1.0", sample_packages());
        let b = LockSpec::from_resolved(&decl, "0.1.0", reversed);
        assert_eq!(a.compute_checksum(), b.compute_checksum());
    }

    #[test]
    fn checksum_tracks_versions() {
        let decl = sample_declaration();
        let a = LockSpec::from_resolved(&decl, "0.1.0", sample_packages());
        let mut packages = sample_packages();
        packages[0].version = "1.1.0".to_owned();
        let b = LockSpec::from_resolved(&decl, "0.1.0", packages);
        assert_ne!(a.compute_checksum(), b.compute_checksum());
    }

    #[test]
    fn names_are_sorted() {
        let lock = LockSpec::from_resolved(&sample_declaration(), "0.1.0", sample_packages());
        assert_eq!(lock.names(), vec!["activesupport", "rack"]);
    }
}
