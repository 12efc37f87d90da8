use bundlekit_schema::{DescriptorError, DescriptorOrigin, PackageDescriptor};
use std::io;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Builds descriptors for package sources that ship none.
///
/// The result is never written anywhere; callers synthesize again on every
/// evaluation so the file list follows what is on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualManifestSynthesizer;

impl VirtualManifestSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize<I, S>(&self, name: &str, version: &str, files: I) -> PackageDescriptor
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files: Vec<String> = files.into_iter().map(Into::into).collect();
        files.sort();
        files.dedup();
        PackageDescriptor {
            name: name.to_owned(),
            version: version.to_owned(),
            summary: format!("{name} (no descriptor)"),
            files,
            origin: DescriptorOrigin::Synthesized,
        }
    }

    /// Synthesize from the current listing of `root`. A missing root yields
    /// an empty file list.
    pub fn synthesize_dir(
        &self,
        name: &str,
        version: &str,
        root: &Path,
    ) -> Result<PackageDescriptor, DescriptorError> {
        let files = if root.is_dir() {
            list_files(root).map_err(|source| DescriptorError::Listing {
                path: root.to_path_buf(),
                source,
            })?
        } else {
            Vec::new()
        };
        Ok(self.synthesize(name, version, files))
    }
}

/// Every regular file below `root`, as sorted `/`-separated relative paths.
pub(crate) fn list_files(root: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}
