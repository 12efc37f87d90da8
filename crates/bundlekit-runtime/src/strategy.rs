use crate::host::{HostResolver, PackageHandle, ResolutionScope};
use crate::loader::DescriptorLoader;
use crate::ResolveError;
use bundlekit_schema::{ArtifactEnvironment, EnvironmentArtifact, DEFAULT_GROUP};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// One locked package as the sandbox knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxEntry {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
    pub groups: Vec<String>,
}

/// The locked package set of an activated artifact.
///
/// Lookups for packages outside the set fail with
/// [`ResolveError::BundleViolation`]; lookups inside it delegate to the host
/// resolver scoped to that one package root and its descriptor's files.
/// Immutable once built, so it can be shared read-only across threads.
#[derive(Debug)]
pub struct BundleSandbox {
    entries: BTreeMap<String, SandboxEntry>,
    environment: ArtifactEnvironment,
    declaration_file: String,
    host: Arc<dyn HostResolver>,
    loader: DescriptorLoader,
}

impl BundleSandbox {
    pub fn from_artifact(
        artifact: &EnvironmentArtifact,
        declaration_file: &str,
        host: Arc<dyn HostResolver>,
        loader: DescriptorLoader,
    ) -> Self {
        let entries = artifact
            .load_paths
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    SandboxEntry {
                        name: e.name.clone(),
                        version: e.version.clone(),
                        root: e.root.clone(),
                        groups: e.groups.clone(),
                    },
                )
            })
            .collect();
        Self {
            entries,
            environment: artifact.environment.clone(),
            declaration_file: declaration_file.to_owned(),
            host,
            loader,
        }
    }

    pub fn environment(&self) -> &ArtifactEnvironment {
        &self.environment
    }

    /// Locked names, lexicographically.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&SandboxEntry> {
        self.entries.get(name)
    }

    /// Entries tagged with any of `groups`; no groups means the default one.
    pub fn members_of(&self, groups: &[String]) -> Vec<&SandboxEntry> {
        let wanted: Vec<&str> = if groups.is_empty() {
            vec![DEFAULT_GROUP]
        } else {
            groups.iter().map(String::as_str).collect()
        };
        self.entries
            .values()
            .filter(|e| e.groups.iter().any(|g| wanted.contains(&g.as_str())))
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Result<PackageHandle, ResolveError> {
        let Some(entry) = self.entries.get(name) else {
            return Err(ResolveError::BundleViolation {
                name: name.to_owned(),
                declaration: self.declaration_file.clone(),
            });
        };
        let descriptor = self.loader.load(&entry.root, &entry.name, &entry.version)?;
        self.host.resolve(
            name,
            ResolutionScope::Package {
                root: &entry.root,
                descriptor: &descriptor,
            },
        )
    }
}

/// Host resolution over a fixed list of search roots.
#[derive(Debug)]
pub struct UnrestrictedResolver {
    host: Arc<dyn HostResolver>,
    search_roots: Vec<PathBuf>,
}

impl UnrestrictedResolver {
    pub fn new(host: Arc<dyn HostResolver>, search_roots: Vec<PathBuf>) -> Self {
        Self { host, search_roots }
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    pub fn lookup(&self, name: &str) -> Result<PackageHandle, ResolveError> {
        self.host.resolve(
            name,
            ResolutionScope::Search {
                roots: &self.search_roots,
            },
        )
    }
}

/// How package lookups are answered in this process.
#[derive(Debug)]
pub enum ResolverStrategy {
    Unrestricted(UnrestrictedResolver),
    SandboxRestricted(BundleSandbox),
}

impl ResolverStrategy {
    pub fn is_restricted(&self) -> bool {
        matches!(self, ResolverStrategy::SandboxRestricted(_))
    }

    pub fn sandbox(&self) -> Option<&BundleSandbox> {
        match self {
            ResolverStrategy::SandboxRestricted(sandbox) => Some(sandbox),
            ResolverStrategy::Unrestricted(_) => None,
        }
    }

    pub fn lookup(&self, name: &str) -> Result<PackageHandle, ResolveError> {
        match self {
            ResolverStrategy::Unrestricted(resolver) => resolver.lookup(name),
            ResolverStrategy::SandboxRestricted(sandbox) => sandbox.lookup(name),
        }
    }

    /// Imperative activation of one package; same contract as [`lookup`](Self::lookup).
    pub fn activate(&self, name: &str) -> Result<PackageHandle, ResolveError> {
        let handle = self.lookup(name)?;
        info!("activated {} {}", handle.name, handle.version);
        Ok(handle)
    }

    /// Path of `file` inside package `name`, only if the package owns it.
    pub fn locate(&self, name: &str, file: &str) -> Result<PathBuf, ResolveError> {
        let handle = self.lookup(name)?;
        let path = handle
            .file_path(file)
            .ok_or_else(|| ResolveError::FileNotInPackage {
                name: name.to_owned(),
                file: file.to_owned(),
            })?;
        debug!("located {file} in {name} at {}", path.display());
        Ok(path)
    }
}
