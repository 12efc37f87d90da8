use crate::config::BundleConfig;
use crate::freshness::{
    read_declaration, read_lock, FingerprintService, Freshness, FreshnessReport, StaleReason,
};
use crate::generator::{EnvironmentGenerator, WriteOutcome};
use crate::layout::BundleLayout;
use crate::lifecycle::{validate_transition, SetupState};
use crate::CoreError;
use bundlekit_runtime::{
    sandbox, Activation, BundleSandbox, DescriptorLoader, FsHostResolver, HostResolver,
    PackageHandle, ResolverStrategy, UnrestrictedResolver,
};
use bundlekit_schema::{ArtifactStamp, EnvironmentArtifact};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SetupOutcome {
    /// The process sandbox was already active; nothing was checked or written.
    AlreadyActive,
    Fresh,
    /// `reason` is `None` when there was no artifact to begin with.
    Regenerated { reason: Option<StaleReason> },
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    #[serde(flatten)]
    pub outcome: SetupOutcome,
    pub artifact: PathBuf,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub write: WriteOutcome,
    pub reason: Option<StaleReason>,
    pub artifact: PathBuf,
    pub packages: Vec<String>,
}

/// One project: its declaration, lock, and environment artifact.
///
/// `setup` is the process entry point. It verifies the cached artifact
/// against the declaration and lock, regenerates it when that is safe, and
/// installs the sandbox built from it for the rest of the process.
#[derive(Debug)]
pub struct Bundle {
    layout: BundleLayout,
    config: BundleConfig,
    fingerprints: FingerprintService,
    generator: EnvironmentGenerator,
    host: Arc<dyn HostResolver>,
    loader: DescriptorLoader,
    state: SetupState,
}

impl Bundle {
    /// Open the project at `root` with its `.bundle/config.toml` applied.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let root = root.into();
        let config = BundleConfig::load(&root)?;
        Ok(Self::with_config(&root, config))
    }

    pub fn with_config(root: &Path, config: BundleConfig) -> Self {
        let layout = BundleLayout::from_config(root, &config);
        let loader = DescriptorLoader::new();
        Self {
            generator: EnvironmentGenerator::new(layout.clone()),
            fingerprints: FingerprintService::default(),
            host: Arc::new(FsHostResolver::with_loader(loader.clone())),
            loader,
            layout,
            config,
            state: SetupState::Uninitialized,
        }
    }

    /// Pretend to be another tool release when stamping and checking.
    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.fingerprints = FingerprintService::new(version);
        self.generator = EnvironmentGenerator::with_version(self.layout.clone(), version);
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn HostResolver>) -> Self {
        self.host = host;
        self
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn state(&self) -> SetupState {
        self.state
    }

    /// Freshness of the files on disk; writes nothing.
    pub fn check(&self) -> Result<FreshnessReport, CoreError> {
        self.fingerprints.check_files(&self.generator)
    }

    /// Regenerate the artifact from the lock, whatever its freshness.
    pub fn generate(&self) -> Result<GenerateReport, CoreError> {
        let declaration = read_declaration(&self.layout.declaration_path())?;
        let lock = read_lock(&self.layout.lock_path())?;
        let stamp = self.generator.probe()?;
        let artifact = self.generator.generate(&lock)?;
        let reason = self
            .fingerprints
            .check_against(&declaration, &lock, stamp.as_ref(), &artifact)
            .reason()
            .cloned();
        if let Some(r) = reason.as_ref().filter(|r| !r.is_regenerable()) {
            warn!("generating from a lock that needs relocking: {r}");
        }

        let write = self.generator.write(&artifact, reason.as_ref())?;
        Ok(GenerateReport {
            write,
            reason,
            artifact: self.layout.artifact_path(),
            packages: owned_names(&artifact),
        })
    }

    /// Verify, regenerate if needed, and activate the sandbox.
    ///
    /// A no-op when this process already has an active sandbox.
    pub fn setup(&mut self) -> Result<SetupReport, CoreError> {
        if let Some(strategy) = sandbox::current().filter(|s| s.is_restricted()) {
            info!("sandbox already active, skipping setup");
            let packages = strategy
                .sandbox()
                .map(|s| s.names().into_iter().map(str::to_owned).collect())
                .unwrap_or_default();
            return Ok(SetupReport {
                outcome: SetupOutcome::AlreadyActive,
                artifact: self.layout.artifact_path(),
                packages,
            });
        }
        if self.state != SetupState::Uninitialized {
            self.advance(SetupState::Uninitialized)?;
        }

        match self.run_setup() {
            Ok(report) => Ok(report),
            Err(e) => {
                if validate_transition(self.state, SetupState::Failed).is_ok() {
                    self.state = SetupState::Failed;
                }
                Err(e)
            }
        }
    }

    /// Activate every locked package in `groups`, in load-path order.
    /// An empty list means the default group.
    pub fn require_groups(&self, groups: &[String]) -> Result<Vec<PackageHandle>, CoreError> {
        let strategy = sandbox::current()
            .filter(|s| s.is_restricted())
            .ok_or(CoreError::NotSetUp)?;
        let restricted = strategy.sandbox().ok_or(CoreError::NotSetUp)?;
        let mut handles = Vec::new();
        for entry in restricted.members_of(groups) {
            handles.push(strategy.activate(&entry.name)?);
        }
        Ok(handles)
    }

    /// Look a package up through the installed strategy, or through the
    /// configured system paths when no sandbox is active.
    pub fn lookup(&self, name: &str) -> Result<PackageHandle, CoreError> {
        match sandbox::current() {
            Some(strategy) => Ok(strategy.lookup(name)?),
            None => Ok(self.unrestricted().lookup(name)?),
        }
    }

    /// Drop the process sandbox. Test isolation only.
    pub fn teardown(&mut self) {
        sandbox::teardown();
        self.state = SetupState::Uninitialized;
    }

    fn run_setup(&mut self) -> Result<SetupReport, CoreError> {
        let declaration = read_declaration(&self.layout.declaration_path())?;
        let lock = read_lock(&self.layout.lock_path())?;
        let stamp = self.generator.probe()?;
        let generated = self.generator.generate(&lock)?;

        let freshness = self
            .fingerprints
            .check_against(&declaration, &lock, stamp.as_ref(), &generated);
        let (artifact, outcome) = match freshness {
            Freshness::Fresh if stamp.is_some() => {
                self.advance(SetupState::Fresh)?;
                debug!("{} is fresh", self.layout.artifact_path().display());
                (self.generator.load()?, SetupOutcome::Fresh)
            }
            Freshness::Fresh => {
                self.advance(SetupState::Fresh)?;
                self.regenerate(&generated, None)?;
                (generated, SetupOutcome::Regenerated { reason: None })
            }
            Freshness::Stale(reason) => {
                self.advance(SetupState::Stale)?;
                if !reason.is_regenerable() {
                    return Err(self.relock_required(&reason));
                }
                // Regeneration only cures the artifact. A newer artifact stamp
                // can mask an outdated or drifted lock, so check again first.
                let regenerated = ArtifactStamp::from_artifact(&generated);
                if let Freshness::Stale(remaining) =
                    self.fingerprints.check(&declaration, &lock, Some(&regenerated))
                {
                    return Err(self.relock_required(&remaining));
                }
                warn!("environment artifact is stale: {reason}");
                self.regenerate(&generated, Some(&reason))?;
                (generated, SetupOutcome::Regenerated { reason: Some(reason) })
            }
        };

        self.activate(&artifact)?;
        Ok(SetupReport {
            outcome,
            artifact: self.layout.artifact_path(),
            packages: owned_names(&artifact),
        })
    }

    fn regenerate(
        &mut self,
        artifact: &EnvironmentArtifact,
        reason: Option<&StaleReason>,
    ) -> Result<(), CoreError> {
        self.generator.write(artifact, reason)?;
        self.advance(SetupState::Regenerated)
    }

    fn activate(&mut self, artifact: &EnvironmentArtifact) -> Result<(), CoreError> {
        let restricted = BundleSandbox::from_artifact(
            artifact,
            self.layout.declaration_file(),
            Arc::clone(&self.host),
            self.loader.clone(),
        );
        if sandbox::install(ResolverStrategy::SandboxRestricted(restricted))?
            == Activation::AlreadyActive
        {
            debug!("another setup activated the sandbox first");
        }
        self.advance(SetupState::Active)?;
        info!(
            "bundle set up with {} package(s)",
            artifact.load_paths.len()
        );
        Ok(())
    }

    fn unrestricted(&self) -> ResolverStrategy {
        ResolverStrategy::Unrestricted(UnrestrictedResolver::new(
            Arc::clone(&self.host),
            self.config.system_paths.clone(),
        ))
    }

    fn relock_required(&self, reason: &StaleReason) -> CoreError {
        match reason {
            StaleReason::GeneratorVersionMismatch {
                found, expected, ..
            } => CoreError::LockVersionMismatch {
                lock: format!("{}.lock", self.layout.declaration_file()),
                found: found.clone(),
                expected: expected.clone(),
            },
            _ => CoreError::DeclarationLockMismatch {
                declaration: self.layout.declaration_file().to_owned(),
            },
        }
    }

    fn advance(&mut self, to: SetupState) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        debug!("setup state {} -> {to}", self.state);
        self.state = to;
        Ok(())
    }
}

fn owned_names(artifact: &EnvironmentArtifact) -> Vec<String> {
    artifact.names().into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlekit_schema::{Declaration, LockSpec, LockedPackage, PackageSource};
    use std::fs;
    use std::sync::{Mutex, PoisonError};

    static GLOBAL: Mutex<()> = Mutex::new(());

    const GEMFILE: &str = "[[dependency]]\nname = \"rack\"\n";

    fn project(version: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        fs::write(layout.declaration_path(), GEMFILE).unwrap();
        let decl = Declaration::parse_str(GEMFILE).unwrap();
        let rack = LockedPackage::new("rack", "1.0.0", PackageSource::Registry { url: None });
        fs::create_dir_all(layout.package_root(&rack).join("lib")).unwrap();
        fs::write(layout.package_root(&rack).join("lib/rack.rb"), "").unwrap();
        LockSpec::from_resolved(&decl, version, vec![rack])
            .write_to_file(layout.lock_path())
            .unwrap();
        dir
    }

    #[test]
    fn setup_walks_lifecycle_to_active() {
        let _guard = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        sandbox::teardown();
        let dir = project("0.1.0");
        let mut bundle =
            Bundle::with_config(dir.path(), BundleConfig::default()).with_version("0.1.0");
        assert_eq!(bundle.state(), SetupState::Uninitialized);

        let report = bundle.setup().unwrap();
        assert_eq!(report.outcome, SetupOutcome::Regenerated { reason: None });
        assert_eq!(report.packages, vec!["rack"]);
        assert_eq!(bundle.state(), SetupState::Active);
        bundle.teardown();
    }

    #[test]
    fn require_groups_before_setup_fails() {
        let _guard = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        sandbox::teardown();
        let dir = project("0.1.0");
        let bundle = Bundle::with_config(dir.path(), BundleConfig::default());
        assert!(matches!(
            bundle.require_groups(&[]),
            Err(CoreError::NotSetUp)
        ));
    }

    #[test]
    fn failed_setup_can_be_retried() {
        let _guard = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        sandbox::teardown();
        let dir = project("0.1.0");
        let layout = BundleLayout::new(dir.path());
        fs::write(
            layout.declaration_path(),
            format!("{GEMFILE}\n[[dependency]]\nname = \"thin\"\n"),
        )
        .unwrap();

        let mut bundle =
            Bundle::with_config(dir.path(), BundleConfig::default()).with_version("0.1.0");
        assert!(matches!(
            bundle.setup(),
            Err(CoreError::DeclarationLockMismatch { .. })
        ));
        assert_eq!(bundle.state(), SetupState::Failed);
        assert!(!sandbox::is_active());

        fs::write(layout.declaration_path(), GEMFILE).unwrap();
        bundle.setup().unwrap();
        assert_eq!(bundle.state(), SetupState::Active);
        bundle.teardown();
    }

    #[test]
    fn lookup_without_sandbox_uses_system_paths() {
        let _guard = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        sandbox::teardown();
        let dir = project("0.1.0");
        let config = BundleConfig {
            system_paths: vec![dir.path().join(".bundle/packages/gems")],
            ..BundleConfig::default()
        };
        let bundle = Bundle::with_config(dir.path(), config);
        assert_eq!(bundle.lookup("rack").unwrap().version, "1.0.0");
    }
}
