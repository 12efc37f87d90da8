//! Freshness checks, environment generation, and bundle setup for bundlekit.
//!
//! This crate ties the schema layer and the runtime sandbox together into the
//! `Bundle`, the entry point a package-manager front end calls at process
//! start. It decides whether the cached environment artifact can be trusted
//! (`FingerprintService`), regenerates it when it cannot
//! (`EnvironmentGenerator`), and activates the process-wide sandbox from it.

pub mod bundle;
pub mod config;
pub mod freshness;
pub mod generator;
pub mod layout;
pub mod lifecycle;

pub use bundle::{Bundle, GenerateReport, SetupOutcome, SetupReport};
pub use config::BundleConfig;
pub use freshness::{
    read_declaration, read_lock, FingerprintService, Freshness, FreshnessReport, StaleReason,
    VersionStamp,
};
pub use generator::{EnvironmentGenerator, WriteOutcome};
pub use layout::BundleLayout;
pub use lifecycle::{validate_transition, SetupState};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("could not read {}: {reason}", .path.display())]
    ManifestUnreadable { path: PathBuf, reason: String },
    #[error("{declaration} changed since you last locked. Please run `bundle lock` to relock.")]
    DeclarationLockMismatch { declaration: String },
    #[error(
        "{lock} was resolved by version {found}, running {expected}. Please run `bundle lock` to relock."
    )]
    LockVersionMismatch {
        lock: String,
        found: String,
        expected: String,
    },
    #[error(
        "Cannot write to outdated {} (generated by {found}, running {expected}): {source}",
        .path.display()
    )]
    GeneratorVersionMismatch {
        path: PathBuf,
        found: String,
        expected: String,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "{} is out of date and cannot be rewritten: {source}. Run `bundle install` to regenerate it.",
        .path.display()
    )]
    ArtifactOutOfSync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bundle is not set up; run setup first")]
    NotSetUp,
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Resolve(#[from] bundlekit_runtime::ResolveError),
    #[error("artifact error: {0}")]
    Artifact(#[from] bundlekit_schema::ArtifactError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Declaration or lock could not be trusted.
    pub fn is_manifest_problem(&self) -> bool {
        matches!(
            self,
            CoreError::ManifestUnreadable { .. }
                | CoreError::DeclarationLockMismatch { .. }
                | CoreError::LockVersionMismatch { .. }
        )
    }

    /// The cached artifact is stale and could not be replaced.
    pub fn is_artifact_problem(&self) -> bool {
        matches!(
            self,
            CoreError::GeneratorVersionMismatch { .. }
                | CoreError::ArtifactOutOfSync { .. }
                | CoreError::ArtifactWrite { .. }
                | CoreError::Artifact(_)
        )
    }

    pub fn is_bundle_violation(&self) -> bool {
        matches!(self, CoreError::Resolve(e) if e.is_bundle_violation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn relock_message() {
        let e = CoreError::DeclarationLockMismatch {
            declaration: "Gemfile".to_owned(),
        };
        assert_eq!(
            e.to_string(),
            "Gemfile changed since you last locked. Please run `bundle lock` to relock."
        );
        assert!(e.is_manifest_problem());
    }

    #[test]
    fn outdated_lock_asks_for_relock() {
        let e = CoreError::LockVersionMismatch {
            lock: "Gemfile.lock".to_owned(),
            found: "0.0.1".to_owned(),
            expected: "0.1.0".to_owned(),
        };
        assert_eq!(
            e.to_string(),
            "Gemfile.lock was resolved by version 0.0.1, running 0.1.0. \
             Please run `bundle lock` to relock."
        );
        assert!(e.is_manifest_problem());
        assert!(!e.is_artifact_problem());
    }

    #[test]
    fn version_mismatch_names_both_versions() {
        let e = CoreError::GeneratorVersionMismatch {
            path: PathBuf::from(".bundle/environment.toml"),
            found: "0.0.9".to_owned(),
            expected: "0.1.0".to_owned(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Cannot write to outdated .bundle/environment.toml"));
        assert!(msg.contains("generated by 0.0.9, running 0.1.0"));
        assert!(e.is_artifact_problem());
    }

    #[test]
    fn out_of_sync_suggests_install() {
        let e = CoreError::ArtifactOutOfSync {
            path: PathBuf::from(".bundle/environment.toml"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(e.to_string().contains("Run `bundle install` to regenerate it."));
    }

    #[test]
    fn violation_passes_through() {
        let e = CoreError::from(bundlekit_runtime::ResolveError::BundleViolation {
            name: "rack".to_owned(),
            declaration: "Gemfile".to_owned(),
        });
        assert!(e.is_bundle_violation());
        assert_eq!(
            e.to_string(),
            "rack is not part of the bundle. Add it to Gemfile."
        );
    }
}
