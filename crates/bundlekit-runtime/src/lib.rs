//! Package resolution for bundlekit: descriptor evaluation, resolver
//! strategies, and the process-wide load-path sandbox.
//!
//! Descriptors come from the `ManifestEvaluator` (authored `package.toml`
//! files, evaluated in an explicit `EvaluationContext`) or from the
//! `VirtualManifestSynthesizer` when a package ships none. A
//! `ResolverStrategy` decides how package lookups are answered: the
//! `Unrestricted` strategy searches every configured root, the
//! `SandboxRestricted` one answers only for packages in the activated
//! environment artifact. The `sandbox` module holds the one strategy
//! installed for the process.

pub mod evaluator;
pub mod host;
pub mod loader;
pub mod sandbox;
pub mod strategy;
pub mod synthesizer;

pub use evaluator::{DescriptorEvaluator, EvaluationContext, ManifestEvaluator};
pub use host::{FsHostResolver, HostResolver, PackageHandle, ResolutionScope};
pub use loader::DescriptorLoader;
pub use sandbox::{Activation, INSTALL_ROOT_VAR, SEARCH_PATH_VAR};
pub use strategy::{BundleSandbox, ResolverStrategy, SandboxEntry, UnrestrictedResolver};
pub use synthesizer::VirtualManifestSynthesizer;

use bundlekit_schema::DescriptorError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{name} is not part of the bundle. Add it to {declaration}.")]
    BundleViolation { name: String, declaration: String },
    #[error("could not find package '{name}' in any search path")]
    PackageNotFound { name: String },
    #[error("package '{name}' is locked but not installed at {}", .root.display())]
    NotInstalled { name: String, root: PathBuf },
    #[error("'{file}' is not one of the files of package '{name}'")]
    FileNotInPackage { name: String, file: String },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("invalid search path: {0}")]
    SearchPath(#[from] std::env::JoinPathsError),
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    pub fn is_bundle_violation(&self) -> bool {
        matches!(self, ResolveError::BundleViolation { .. })
    }

    /// True for every "the requested package is not available" condition,
    /// sandbox violations included, so callers can treat them alike.
    pub fn is_missing_package(&self) -> bool {
        matches!(
            self,
            ResolveError::BundleViolation { .. }
                | ResolveError::PackageNotFound { .. }
                | ResolveError::NotInstalled { .. }
        )
    }
}
