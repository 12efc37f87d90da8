use crate::loader::DescriptorLoader;
use crate::ResolveError;
use bundlekit_schema::{DescriptorOrigin, PackageDescriptor};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A resolved package as handed back to requesting code.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageHandle {
    pub name: String,
    pub version: String,
    pub summary: String,
    pub root: PathBuf,
    pub files: Vec<String>,
    pub origin: DescriptorOrigin,
}

impl PackageHandle {
    pub fn new(root: PathBuf, descriptor: PackageDescriptor) -> Self {
        Self {
            name: descriptor.name,
            version: descriptor.version,
            summary: descriptor.summary,
            root,
            files: descriptor.files,
            origin: descriptor.origin,
        }
    }

    /// Absolute path of `file` if it belongs to this package's file set.
    pub fn file_path(&self, file: &str) -> Option<PathBuf> {
        self.files
            .binary_search_by(|f| f.as_str().cmp(file))
            .ok()
            .map(|_| self.root.join(file))
    }
}

/// Where the host mechanism may look for a package.
#[derive(Debug, Clone, Copy)]
pub enum ResolutionScope<'a> {
    /// Any `<root>/<name>-<version>` directory in the given roots, first root wins.
    Search { roots: &'a [PathBuf] },
    /// Exactly one package root, limited to the descriptor's file set.
    Package {
        root: &'a Path,
        descriptor: &'a PackageDescriptor,
    },
}

/// The host package-resolution mechanism that strategies delegate to.
pub trait HostResolver: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn resolve(&self, name: &str, scope: ResolutionScope<'_>) -> Result<PackageHandle, ResolveError>;
}

/// Resolves packages from directories on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsHostResolver {
    loader: DescriptorLoader,
}

impl FsHostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(loader: DescriptorLoader) -> Self {
        Self { loader }
    }
}

impl HostResolver for FsHostResolver {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn resolve(&self, name: &str, scope: ResolutionScope<'_>) -> Result<PackageHandle, ResolveError> {
        match scope {
            ResolutionScope::Search { roots } => {
                let (root, version) =
                    find_installed(name, roots)?.ok_or_else(|| ResolveError::PackageNotFound {
                        name: name.to_owned(),
                    })?;
                let descriptor = self.loader.load(&root, name, &version)?;
                Ok(PackageHandle::new(root, descriptor))
            }
            ResolutionScope::Package { root, descriptor } => {
                if !root.is_dir() {
                    return Err(ResolveError::NotInstalled {
                        name: name.to_owned(),
                        root: root.to_path_buf(),
                    });
                }
                Ok(PackageHandle::new(root.to_path_buf(), descriptor.clone()))
            }
        }
    }
}

fn find_installed(name: &str, roots: &[PathBuf]) -> Result<Option<(PathBuf, String)>, ResolveError> {
    for search_root in roots {
        if !search_root.is_dir() {
            continue;
        }
        let mut best: Option<(PathBuf, String)> = None;
        for entry in fs::read_dir(search_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(version) = installed_version(name, &file_name.to_string_lossy()) else {
                continue;
            };
            let newer = best
                .as_ref()
                .map_or(true, |(_, v)| compare_versions(&version, v) == Ordering::Greater);
            if newer {
                best = Some((entry.path(), version));
            }
        }
        if best.is_some() {
            return Ok(best);
        }
    }
    Ok(None)
}

/// `rack-1.0.0` → `1.0.0` for `rack`; `rack-test-0.5` is not `rack`.
fn installed_version(name: &str, dir_name: &str) -> Option<String> {
    let version = dir_name.strip_prefix(name)?.strip_prefix('-')?;
    version
        .starts_with(|c: char| c.is_ascii_digit())
        .then(|| version.to_owned())
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<String> {
        s.split(['.', '-'])
            .map(str::to_owned)
            .collect()
    };
    let (pa, pb) = (split(a), split(b));
    for (x, y) in pa.iter().zip(pb.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    pa.len().cmp(&pb.len())
}
