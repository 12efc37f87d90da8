use crate::layout::{BUNDLE_DIR, CONFIG_FILE, DEFAULT_DECLARATION};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const INSTALL_ROOT_ENV: &str = "BUNDLEKIT_INSTALL_ROOT";
pub const SYSTEM_PATH_ENV: &str = "BUNDLEKIT_SYSTEM_PATH";

/// Per-project settings from `.bundle/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    /// Declaration file name, relative to the project root.
    pub declaration: String,
    pub install_root: PathBuf,
    /// Search roots for lookups made without an active sandbox.
    pub system_paths: Vec<PathBuf>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            declaration: DEFAULT_DECLARATION.to_owned(),
            install_root: Path::new(BUNDLE_DIR).join("packages"),
            system_paths: Vec::new(),
        }
    }
}

impl BundleConfig {
    /// Config file plus environment overrides, relative paths resolved
    /// against `project_root`.
    pub fn load(project_root: &Path) -> Result<Self, CoreError> {
        let mut config = Self::read(&project_root.join(BUNDLE_DIR).join(CONFIG_FILE))?;
        config.apply_overrides(|key| env::var_os(key));
        config.resolve_against(project_root);
        Ok(config)
    }

    /// Defaults when the file does not exist.
    pub fn read(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        debug!("reading config {}", path.display());
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid {}: {e}", path.display())))?;
        if config.declaration.trim().is_empty() {
            return Err(CoreError::Config(format!(
                "invalid {}: declaration must not be empty",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<OsString>) {
        if let Some(root) = lookup(INSTALL_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.install_root = PathBuf::from(root);
        }
        if let Some(paths) = lookup(SYSTEM_PATH_ENV) {
            self.system_paths = env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
    }

    fn resolve_against(&mut self, project_root: &Path) {
        self.install_root = project_root.join(&self.install_root);
        for path in &mut self.system_paths {
            *path = project_root.join(&*path);
        }
    }
}
