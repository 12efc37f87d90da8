use crate::config::BundleConfig;
use bundlekit_schema::{LockedPackage, PackageSource};
use std::path::{Path, PathBuf};

/// Per-project state directory.
pub const BUNDLE_DIR: &str = ".bundle";
pub const ARTIFACT_FILE: &str = "environment.toml";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DECLARATION: &str = "Gemfile";

/// File locations of one project.
///
/// The lock sits next to the declaration as `<declaration>.lock`. Registry
/// and git packages live under the install root, path packages wherever the
/// declaration points relative to the project root. A registry package the
/// install root lacks may already be installed in one of the system paths.
#[derive(Debug, Clone)]
pub struct BundleLayout {
    root: PathBuf,
    declaration: String,
    install_root: PathBuf,
    system_paths: Vec<PathBuf>,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::from_config(&root, &BundleConfig::default())
    }

    pub fn from_config(root: &Path, config: &BundleConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            declaration: config.declaration.clone(),
            install_root: root.join(&config.install_root),
            system_paths: config.system_paths.iter().map(|p| root.join(p)).collect(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name of the declaration, as shown in diagnostics.
    #[inline]
    pub fn declaration_file(&self) -> &str {
        &self.declaration
    }

    #[inline]
    pub fn declaration_path(&self) -> PathBuf {
        self.root.join(&self.declaration)
    }

    #[inline]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(format!("{}.lock", self.declaration))
    }

    #[inline]
    pub fn bundle_dir(&self) -> PathBuf {
        self.root.join(BUNDLE_DIR)
    }

    #[inline]
    pub fn artifact_path(&self) -> PathBuf {
        self.bundle_dir().join(ARTIFACT_FILE)
    }

    #[inline]
    pub fn config_path(&self) -> PathBuf {
        self.bundle_dir().join(CONFIG_FILE)
    }

    #[inline]
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    #[inline]
    pub fn gems_dir(&self) -> PathBuf {
        self.install_root.join("gems")
    }

    #[inline]
    pub fn git_dir(&self) -> PathBuf {
        self.install_root.join("git")
    }

    #[inline]
    pub fn system_paths(&self) -> &[PathBuf] {
        &self.system_paths
    }

    /// Bundle directories of the sandbox search path. System paths holding
    /// locked packages are appended at generation time.
    pub fn search_path(&self) -> Vec<PathBuf> {
        vec![self.gems_dir(), self.git_dir()]
    }

    /// The system path that provides `package`, if the install root does
    /// not have it and a system path does.
    pub fn system_path_for(&self, package: &LockedPackage) -> Option<&Path> {
        if !matches!(package.source, PackageSource::Registry { .. }) {
            return None;
        }
        let dir_name = package_dir_name(package);
        if self.gems_dir().join(&dir_name).is_dir() {
            return None;
        }
        self.system_paths
            .iter()
            .find(|p| p.join(&dir_name).is_dir())
            .map(PathBuf::as_path)
    }

    /// Where a locked package is installed.
    pub fn package_root(&self, package: &LockedPackage) -> PathBuf {
        let dir_name = package_dir_name(package);
        if let Some(system) = self.system_path_for(package) {
            return system.join(dir_name);
        }
        match &package.source {
            PackageSource::Registry { .. } => self.gems_dir().join(dir_name),
            PackageSource::Git { .. } => self.git_dir().join(dir_name),
            PackageSource::Path { path } => self.root.join(path),
        }
    }
}

fn package_dir_name(package: &LockedPackage) -> String {
    format!("{}-{}", package.name, package.version)
}
