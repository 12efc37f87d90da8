use crate::generator::EnvironmentGenerator;
use crate::CoreError;
use bundlekit_schema::{
    ArtifactStamp, Declaration, EnvironmentArtifact, Fingerprint, LockSpec, ToolVersion,
    TOOL_VERSION,
};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Which stamp carried the foreign tool version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStamp {
    Artifact,
    Lock,
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStamp::Artifact => f.write_str("artifact"),
            VersionStamp::Lock => f.write_str("lock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaleReason {
    GeneratorVersionMismatch {
        stamp: VersionStamp,
        found: String,
        expected: String,
    },
    DeclarationLockMismatch {
        declaration: Fingerprint,
        locked: Fingerprint,
    },
    /// The artifact no longer describes the lock or the current layout.
    ArtifactOutOfSync,
}

impl StaleReason {
    /// Whether regenerating the artifact can cure this. A lock from another
    /// resolver or one that no longer matches the declaration needs a relock.
    pub fn is_regenerable(&self) -> bool {
        match self {
            StaleReason::GeneratorVersionMismatch { stamp, .. } => {
                *stamp == VersionStamp::Artifact
            }
            StaleReason::DeclarationLockMismatch { .. } => false,
            StaleReason::ArtifactOutOfSync => true,
        }
    }
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::GeneratorVersionMismatch {
                stamp,
                found,
                expected,
            } => write!(f, "{stamp} generated by {found}, running {expected}"),
            StaleReason::DeclarationLockMismatch {
                declaration,
                locked,
            } => write!(
                f,
                "declaration {} does not match locked {}",
                declaration.short(),
                locked.short()
            ),
            StaleReason::ArtifactOutOfSync => f.write_str("artifact out of sync with lock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(StaleReason),
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }

    pub fn reason(&self) -> Option<&StaleReason> {
        match self {
            Freshness::Fresh => None,
            Freshness::Stale(reason) => Some(reason),
        }
    }
}

/// Freshness of a project on disk, with the inputs that decided it.
#[derive(Debug, Clone, Serialize)]
pub struct FreshnessReport {
    pub fresh: bool,
    pub reason: Option<StaleReason>,
    pub running_version: ToolVersion,
    pub declaration_checksum: Fingerprint,
    pub lock_checksum: Fingerprint,
    pub artifact: Option<ArtifactStamp>,
}

impl FreshnessReport {
    pub fn freshness(&self) -> Freshness {
        match &self.reason {
            None => Freshness::Fresh,
            Some(reason) => Freshness::Stale(reason.clone()),
        }
    }
}

/// Decides whether a cached artifact can be trusted. Content only; file
/// modification times are never consulted.
#[derive(Debug, Clone)]
pub struct FingerprintService {
    version: ToolVersion,
}

impl Default for FingerprintService {
    fn default() -> Self {
        Self::new(TOOL_VERSION)
    }
}

impl FingerprintService {
    pub fn new(version: &str) -> Self {
        Self {
            version: ToolVersion::new(version),
        }
    }

    pub fn version(&self) -> &ToolVersion {
        &self.version
    }

    /// First applicable reason wins: artifact version, lock version,
    /// declaration drift, then artifact checksums.
    pub fn check(
        &self,
        declaration: &Declaration,
        lock: &LockSpec,
        artifact: Option<&ArtifactStamp>,
    ) -> Freshness {
        if let Some(stamp) = artifact {
            if stamp.generator_version != self.version {
                return self.version_mismatch(VersionStamp::Artifact, &stamp.generator_version);
            }
        }
        if lock.resolver_version != self.version {
            return self.version_mismatch(VersionStamp::Lock, &lock.resolver_version);
        }
        if declaration.fingerprint != lock.declaration_checksum {
            return Freshness::Stale(StaleReason::DeclarationLockMismatch {
                declaration: declaration.fingerprint.clone(),
                locked: lock.declaration_checksum.clone(),
            });
        }
        if let Some(stamp) = artifact {
            let lock_checksum = lock.compute_checksum();
            let in_sync = stamp.declaration_checksum.as_ref() == Some(&declaration.fingerprint)
                && stamp.lock_checksum.as_ref() == Some(&lock_checksum);
            if !in_sync {
                return Freshness::Stale(StaleReason::ArtifactOutOfSync);
            }
        }
        Freshness::Fresh
    }

    /// `check`, then whether a cached artifact still exports what
    /// generating `expected` now would. An install root or system path
    /// change makes the cached one out of sync.
    pub fn check_against(
        &self,
        declaration: &Declaration,
        lock: &LockSpec,
        artifact: Option<&ArtifactStamp>,
        expected: &EnvironmentArtifact,
    ) -> Freshness {
        let freshness = self.check(declaration, lock, artifact);
        match artifact {
            Some(stamp)
                if freshness.is_fresh()
                    && stamp.content_checksum.as_ref() != Some(&expected.content_checksum()) =>
            {
                Freshness::Stale(StaleReason::ArtifactOutOfSync)
            }
            _ => freshness,
        }
    }

    /// Read declaration, lock and any cached artifact of the generator's
    /// layout and check them. Writes nothing.
    pub fn check_files(
        &self,
        generator: &EnvironmentGenerator,
    ) -> Result<FreshnessReport, CoreError> {
        let layout = generator.layout();
        let declaration = read_declaration(&layout.declaration_path())?;
        let lock = read_lock(&layout.lock_path())?;
        let artifact = probe_artifact(&layout.artifact_path())?;
        let expected = generator.generate(&lock)?;
        let freshness = self.check_against(&declaration, &lock, artifact.as_ref(), &expected);
        Ok(FreshnessReport {
            fresh: freshness.is_fresh(),
            reason: freshness.reason().cloned(),
            running_version: self.version.clone(),
            declaration_checksum: declaration.fingerprint,
            lock_checksum: lock.compute_checksum(),
            artifact,
        })
    }

    fn version_mismatch(&self, stamp: VersionStamp, found: &ToolVersion) -> Freshness {
        Freshness::Stale(StaleReason::GeneratorVersionMismatch {
            stamp,
            found: found.to_string(),
            expected: self.version.to_string(),
        })
    }
}

pub fn read_declaration(path: &Path) -> Result<Declaration, CoreError> {
    Declaration::read_from_file(path).map_err(|e| CoreError::ManifestUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn read_lock(path: &Path) -> Result<LockSpec, CoreError> {
    LockSpec::read_from_file(path).map_err(|e| CoreError::ManifestUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Stamp of the artifact at `path`, or `None` if there is none.
pub(crate) fn probe_artifact(path: &Path) -> Result<Option<ArtifactStamp>, CoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(ArtifactStamp::probe(&content))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BundleLayout;
    use bundlekit_schema::{LockedPackage, PackageSource};

    const DECL: &str = "source = \"https://rubygems.org\"\n\n[[dependency]]\nname = \"rack\"\nversion = \"= 1.0.0\"\n";

    fn declaration(text: &str) -> Declaration {
        Declaration::parse_str(text).unwrap()
    }

    fn lock_for(decl: &Declaration, version: &str) -> LockSpec {
        LockSpec::from_resolved(
            decl,
            version,
            vec![LockedPackage::new(
                "rack",
                "1.0.0",
                PackageSource::Registry { url: None },
            )],
        )
    }

    fn stamp_for(decl: &Declaration, lock: &LockSpec, version: &str) -> ArtifactStamp {
        ArtifactStamp {
            generator_version: ToolVersion::new(version),
            declaration_checksum: Some(decl.fingerprint.clone()),
            lock_checksum: Some(lock.compute_checksum()),
            content_checksum: None,
        }
    }

    fn generator(layout: &BundleLayout) -> EnvironmentGenerator {
        EnvironmentGenerator::with_version(layout.clone(), "0.1.0")
    }

    #[test]
    fn fresh_when_everything_matches() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.1.0");
        assert!(svc.check(&decl, &lock, None).is_fresh());
        let stamp = stamp_for(&decl, &lock, "0.1.0");
        assert!(svc.check(&decl, &lock, Some(&stamp)).is_fresh());
    }

    #[test]
    fn whitespace_only_edits_stay_fresh() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.1.0");
        let reformatted = declaration(&DECL.replace("name = ", "name   =   "));
        assert!(svc.check(&reformatted, &lock, None).is_fresh());
    }

    #[test]
    fn declaration_drift_is_detected() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.1.0");
        let edited = declaration(&format!("{DECL}\n[[dependency]]\nname = \"activesupport\"\n"));
        let result = svc.check(&edited, &lock, None);
        assert!(matches!(
            result.reason(),
            Some(StaleReason::DeclarationLockMismatch { .. })
        ));
        assert!(!result.reason().unwrap().is_regenerable());
    }

    #[test]
    fn lock_from_other_version_is_stale() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.0.9");
        assert_eq!(
            svc.check(&decl, &lock, None),
            Freshness::Stale(StaleReason::GeneratorVersionMismatch {
                stamp: VersionStamp::Lock,
                found: "0.0.9".to_owned(),
                expected: "0.1.0".to_owned(),
            })
        );
    }

    #[test]
    fn outdated_lock_needs_relock_not_regeneration() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.0.9");
        let reason = svc.check(&decl, &lock, None).reason().cloned().unwrap();
        assert!(!reason.is_regenerable());

        let artifact = StaleReason::GeneratorVersionMismatch {
            stamp: VersionStamp::Artifact,
            found: "0.0.9".to_owned(),
            expected: "0.1.0".to_owned(),
        };
        assert!(artifact.is_regenerable());
        assert!(StaleReason::ArtifactOutOfSync.is_regenerable());
    }

    #[test]
    fn moved_install_root_is_out_of_sync() {
        let dir = tempfile::tempdir().unwrap();
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.1.0");
        let old = generator(&BundleLayout::new(dir.path()))
            .generate(&lock)
            .unwrap();
        let stamp = ArtifactStamp::from_artifact(&old);
        assert!(svc.check_against(&decl, &lock, Some(&stamp), &old).is_fresh());

        let config = crate::BundleConfig {
            install_root: "vendor/bundle".into(),
            ..crate::BundleConfig::default()
        };
        let moved = generator(&BundleLayout::from_config(dir.path(), &config))
            .generate(&lock)
            .unwrap();
        assert!(svc.check(&decl, &lock, Some(&stamp)).is_fresh());
        assert_eq!(
            svc.check_against(&decl, &lock, Some(&stamp), &moved),
            Freshness::Stale(StaleReason::ArtifactOutOfSync)
        );
    }

    #[test]
    fn artifact_version_takes_precedence() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.0.9");
        let edited = declaration(&format!("{DECL}\n[[dependency]]\nname = \"thin\"\n"));
        let stamp = stamp_for(&decl, &lock, "0.0.8");
        let result = svc.check(&edited, &lock, Some(&stamp));
        assert!(matches!(
            result.reason(),
            Some(StaleReason::GeneratorVersionMismatch {
                stamp: VersionStamp::Artifact,
                ..
            })
        ));
    }

    #[test]
    fn lock_version_precedes_declaration_drift() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.0.9");
        let edited = declaration(&format!("{DECL}\n[[dependency]]\nname = \"thin\"\n"));
        assert!(matches!(
            svc.check(&edited, &lock, None).reason(),
            Some(StaleReason::GeneratorVersionMismatch {
                stamp: VersionStamp::Lock,
                ..
            })
        ));
    }

    #[test]
    fn relocked_without_regeneration_is_out_of_sync() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.1.0");
        let stamp = stamp_for(&decl, &lock, "0.1.0");
        let relocked = LockSpec::from_resolved(
            &decl,
            "0.1.0",
            vec![LockedPackage::new(
                "rack",
                "1.0.1",
                PackageSource::Registry { url: None },
            )],
        );
        assert_eq!(
            svc.check(&decl, &relocked, Some(&stamp)),
            Freshness::Stale(StaleReason::ArtifactOutOfSync)
        );
    }

    #[test]
    fn unparseable_artifact_with_current_banner_is_out_of_sync() {
        let svc = FingerprintService::new("0.1.0");
        let decl = declaration(DECL);
        let lock = lock_for(&decl, "0.1.0");
        let stamp = ArtifactStamp::probe("# Generated by bundlekit 0.1.0. Do not edit.\n[[[");
        assert_eq!(
            svc.check(&decl, &lock, Some(&stamp)),
            Freshness::Stale(StaleReason::ArtifactOutOfSync)
        );
    }

    #[test]
    fn check_files_reports_unreadable_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let err = FingerprintService::new("0.1.0")
            .check_files(&generator(&layout))
            .unwrap_err();
        match err {
            CoreError::ManifestUnreadable { path, .. } => {
                assert_eq!(path, layout.declaration_path());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn check_files_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        fs::write(layout.declaration_path(), DECL).unwrap();
        let decl = declaration(DECL);
        lock_for(&decl, "0.1.0")
            .write_to_file(layout.lock_path())
            .unwrap();
        let report = FingerprintService::new("0.1.0")
            .check_files(&generator(&layout))
            .unwrap();
        assert!(report.fresh);
        assert!(report.artifact.is_none());
        assert_eq!(report.declaration_checksum, decl.fingerprint);
    }
}
