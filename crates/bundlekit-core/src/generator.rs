use crate::freshness::{probe_artifact, StaleReason};
use crate::layout::BundleLayout;
use crate::CoreError;
use bundlekit_schema::{
    ArtifactEnvironment, ArtifactHeader, ArtifactStamp, EnvironmentArtifact, LoadPathEntry,
    LockSpec, ToolVersion, TOOL_VERSION,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    Written,
    /// The artifact on disk already had exactly this content.
    Unchanged,
}

/// Turns a lock into the environment artifact of a project.
#[derive(Debug, Clone)]
pub struct EnvironmentGenerator {
    layout: BundleLayout,
    version: ToolVersion,
}

impl EnvironmentGenerator {
    pub fn new(layout: BundleLayout) -> Self {
        Self::with_version(layout, TOOL_VERSION)
    }

    pub fn with_version(layout: BundleLayout, version: &str) -> Self {
        Self {
            layout,
            version: ToolVersion::new(version),
        }
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    /// Build the artifact for `lock`. Same lock and version, same bytes.
    pub fn generate(&self, lock: &LockSpec) -> Result<EnvironmentArtifact, CoreError> {
        lock.validate().map_err(|e| CoreError::ManifestUnreadable {
            path: self.layout.lock_path(),
            reason: e.to_string(),
        })?;

        let mut load_paths: Vec<LoadPathEntry> = lock
            .packages
            .iter()
            .map(|pkg| LoadPathEntry {
                name: pkg.name.clone(),
                version: pkg.version.clone(),
                root: self.layout.package_root(pkg),
                groups: pkg.groups.clone(),
            })
            .collect();
        load_paths.sort_by(|a, b| a.name.cmp(&b.name));

        // System paths follow the bundle directories, in configured order,
        // and only when some locked package is installed there.
        let used: BTreeSet<&Path> = lock
            .packages
            .iter()
            .filter_map(|pkg| self.layout.system_path_for(pkg))
            .collect();
        let mut search_path = self.layout.search_path();
        for system in self.layout.system_paths() {
            if used.contains(system.as_path()) && !search_path.contains(system) {
                debug!("using system packages from {}", system.display());
                search_path.push(system.clone());
            }
        }

        Ok(EnvironmentArtifact {
            header: ArtifactHeader {
                generator_version: self.version.clone(),
                declaration_checksum: lock.declaration_checksum.clone(),
                lock_checksum: lock.compute_checksum(),
            },
            environment: ArtifactEnvironment {
                install_root: self.layout.install_root().to_path_buf(),
                search_path,
            },
            load_paths,
        })
    }

    /// Persist `artifact`, replacing whatever is on disk.
    ///
    /// Identical content is left alone. A stale artifact is probed for
    /// writability before anything is written; if it cannot be replaced the
    /// error reflects `reason`.
    pub fn write(
        &self,
        artifact: &EnvironmentArtifact,
        reason: Option<&StaleReason>,
    ) -> Result<WriteOutcome, CoreError> {
        let path = self.layout.artifact_path();
        let rendered = artifact.render()?;

        match fs::read(&path) {
            Ok(existing) if existing == rendered.as_bytes() => {
                debug!("{} unchanged", path.display());
                return Ok(WriteOutcome::Unchanged);
            }
            Ok(_) => {
                OpenOptions::new()
                    .write(true)
                    .open(&path)
                    .map_err(|e| unwritable(&path, reason, e))?;
                atomic_write(&path, rendered.as_bytes())
                    .map_err(|e| unwritable(&path, reason, e))?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(self.layout.bundle_dir()).map_err(|e| {
                    CoreError::ArtifactWrite {
                        path: path.clone(),
                        source: e,
                    }
                })?;
                atomic_write(&path, rendered.as_bytes()).map_err(|e| CoreError::ArtifactWrite {
                    path: path.clone(),
                    source: e,
                })?;
            }
            Err(e) => return Err(CoreError::ArtifactWrite { path, source: e }),
        }

        info!(
            "wrote {} ({} load paths)",
            path.display(),
            artifact.load_paths.len()
        );
        Ok(WriteOutcome::Written)
    }

    /// The cached artifact, as is.
    pub fn load(&self) -> Result<EnvironmentArtifact, CoreError> {
        Ok(EnvironmentArtifact::read_from_file(
            self.layout.artifact_path(),
        )?)
    }

    pub fn probe(&self) -> Result<Option<ArtifactStamp>, CoreError> {
        probe_artifact(&self.layout.artifact_path())
    }
}

fn unwritable(path: &Path, reason: Option<&StaleReason>, source: io::Error) -> CoreError {
    let path: PathBuf = path.to_path_buf();
    match reason {
        Some(StaleReason::GeneratorVersionMismatch {
            found, expected, ..
        }) => CoreError::GeneratorVersionMismatch {
            path,
            found: found.clone(),
            expected: expected.clone(),
            source,
        },
        Some(StaleReason::ArtifactOutOfSync) => CoreError::ArtifactOutOfSync { path, source },
        Some(StaleReason::DeclarationLockMismatch { .. }) | None => {
            CoreError::ArtifactWrite { path, source }
        }
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    if let Ok(f) = fs::File::open(dir) {
        let _ = f.sync_all();
    }
    Ok(())
}
